use crate::error::{TypeCheckError, ValidationError, ValidationResult};
use crate::field::{FieldSchema, FieldType};
use crate::value::check_value;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Whether a container is a top-level schema or an embeddable microschema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    Schema,
    Microschema,
}

/// The field layout and metadata of one container version.
///
/// Field order is significant: it is the display and storage order of the
/// fields of every instance bound to the version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerDefinition {
    pub name: String,
    pub kind: ContainerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_field: Option<String>,
    /// Whether instances may contain nested instances.
    #[serde(default)]
    pub container: bool,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

impl ContainerDefinition {
    /// An empty schema definition.
    pub fn schema(name: &str) -> Self {
        Self::empty(name, ContainerKind::Schema)
    }

    /// An empty microschema definition.
    pub fn microschema(name: &str) -> Self {
        Self::empty(name, ContainerKind::Microschema)
    }

    fn empty(name: &str, kind: ContainerKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            display_field: None,
            segment_field: None,
            container: false,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_display_field(mut self, name: &str) -> Self {
        self.display_field = Some(name.into());
        self
    }

    pub fn with_segment_field(mut self, name: &str) -> Self {
        self.segment_field = Some(name.into());
        self
    }

    pub fn with_container(mut self, container: bool) -> Self {
        self.container = container;
        self
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a field by name for modification.
    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldSchema> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    /// Position of a field in the field order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Field names in field order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Checks the structural invariants of the definition.
    pub fn validate(&self) -> ValidationResult<()> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(ValidationError::EmptyFieldName);
            }
            if !seen.insert(field.name.as_str()) {
                return Err(ValidationError::DuplicateField(field.name.clone()));
            }
            self.validate_field(field)?;
        }

        if let Some(display) = &self.display_field {
            let field = self
                .field(display)
                .ok_or_else(|| ValidationError::DanglingDisplayField(display.clone()))?;
            if field.field_type != FieldType::String {
                return Err(ValidationError::DisplayFieldType {
                    field: display.clone(),
                    found: field.field_type,
                });
            }
        }

        if let Some(segment) = &self.segment_field {
            if self.kind == ContainerKind::Microschema {
                return Err(ValidationError::MicroschemaSegmentField);
            }
            let field = self
                .field(segment)
                .ok_or_else(|| ValidationError::DanglingSegmentField(segment.clone()))?;
            if !matches!(field.field_type, FieldType::String | FieldType::Binary) {
                return Err(ValidationError::SegmentFieldType {
                    field: segment.clone(),
                    found: field.field_type,
                });
            }
        }

        if self.container && self.kind == ContainerKind::Microschema {
            return Err(ValidationError::MicroschemaContainerFlag);
        }

        Ok(())
    }

    fn validate_field(&self, field: &FieldSchema) -> ValidationResult<()> {
        match (field.field_type, field.list_type) {
            (FieldType::List, None) => {
                return Err(ValidationError::MissingListType(field.name.clone()));
            }
            (FieldType::List, Some(FieldType::List)) => {
                return Err(ValidationError::NestedList(field.name.clone()));
            }
            (FieldType::List, Some(_)) | (_, None) => {}
            (_, Some(_)) => {
                return Err(ValidationError::UnexpectedListType(field.name.clone()));
            }
        }

        if let (Some(min), Some(max)) = (field.attributes.min, field.attributes.max) {
            if min > max {
                return Err(ValidationError::InvalidRange {
                    field: field.name.clone(),
                    min,
                    max,
                });
            }
        }

        if self.kind == ContainerKind::Microschema
            && (field.field_type == FieldType::Micronode
                || field.list_type == Some(FieldType::Micronode))
        {
            return Err(ValidationError::MicroschemaMicronodeField(field.name.clone()));
        }

        Ok(())
    }

    /// Checks instance field data against this definition. Keys the
    /// definition does not declare fail. A `required` field must be present
    /// and non-null; other fields may be absent or null.
    pub fn type_check(&self, fields: &Map<String, Value>) -> Result<(), TypeCheckError> {
        for (name, value) in fields {
            let schema = self
                .field(name)
                .ok_or_else(|| TypeCheckError::UnknownField(name.clone()))?;
            check_value(schema, value)?;
        }
        for field in &self.fields {
            if field.attributes.required && fields.get(&field.name).is_none_or(Value::is_null) {
                return Err(TypeCheckError::MissingRequired(field.name.clone()));
            }
        }
        Ok(())
    }
}
