use serde::{Deserialize, Serialize};
use std::fmt;

/// The declared type of a field.
///
/// For `List` the element type lives on [`FieldSchema::list_type`] so the
/// JSON shape stays flat: `{"name": "tags", "type": "list", "list_type": "string"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Html,
    Binary,
    Node,
    List,
    Micronode,
}

impl FieldType {
    /// Returns the lowercase name used in JSON and in change properties.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Html => "html",
            FieldType::Binary => "binary",
            FieldType::Node => "node",
            FieldType::List => "list",
            FieldType::Micronode => "micronode",
        }
    }

    /// Whether this type references other containers by name
    /// (and therefore honours `allowed_schemas`).
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Node | FieldType::Micronode)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything about a field except its identity (name) and declared type.
///
/// Two fields with the same name and declared type but different attributes
/// differ by an UPDATEFIELD change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub required: bool,
    /// Whether the field is mapped into the search index.
    #[serde(default = "default_searchable")]
    pub searchable: bool,
    /// Allowed literal values. Only meaningful for string fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
    /// Allowed referenced container names. Only meaningful for node,
    /// micronode, and lists of either.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_schemas: Option<Vec<String>>,
    /// Allowed MIME types. Only meaningful for binary fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_mime_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

fn default_searchable() -> bool {
    true
}

impl Default for FieldAttributes {
    fn default() -> Self {
        Self {
            label: None,
            required: false,
            searchable: true,
            allowed_values: None,
            allowed_schemas: None,
            allowed_mime_types: None,
            min: None,
            max: None,
        }
    }
}

/// One field of a container definition. Identity is by `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Element type. Only meaningful when `field_type` is `List`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_type: Option<FieldType>,
    #[serde(flatten)]
    pub attributes: FieldAttributes,
}

impl FieldSchema {
    fn simple(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            list_type: None,
            attributes: FieldAttributes::default(),
        }
    }

    /// Shorthand for a string field.
    pub fn string(name: &str) -> Self {
        Self::simple(name, FieldType::String)
    }

    /// Shorthand for a number field.
    pub fn number(name: &str) -> Self {
        Self::simple(name, FieldType::Number)
    }

    /// Shorthand for a boolean field.
    pub fn boolean(name: &str) -> Self {
        Self::simple(name, FieldType::Boolean)
    }

    /// Shorthand for a date field (RFC 3339 strings).
    pub fn date(name: &str) -> Self {
        Self::simple(name, FieldType::Date)
    }

    /// Shorthand for an HTML field.
    pub fn html(name: &str) -> Self {
        Self::simple(name, FieldType::Html)
    }

    /// Shorthand for a binary field.
    pub fn binary(name: &str) -> Self {
        Self::simple(name, FieldType::Binary)
    }

    /// Shorthand for a node reference field.
    pub fn node(name: &str, allowed_schemas: &[&str]) -> Self {
        Self::simple(name, FieldType::Node).with_allowed_schemas(allowed_schemas)
    }

    /// Shorthand for an embedded micronode field.
    pub fn micronode(name: &str, allowed_microschemas: &[&str]) -> Self {
        Self::simple(name, FieldType::Micronode).with_allowed_schemas(allowed_microschemas)
    }

    /// Shorthand for a list field with the given element type.
    pub fn list(name: &str, element: FieldType) -> Self {
        Self {
            list_type: Some(element),
            ..Self::simple(name, FieldType::List)
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.attributes.label = Some(label.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.attributes.required = true;
        self
    }

    pub fn not_searchable(mut self) -> Self {
        self.attributes.searchable = false;
        self
    }

    pub fn with_allowed_values(mut self, values: &[&str]) -> Self {
        self.attributes.allowed_values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn with_allowed_schemas(mut self, schemas: &[&str]) -> Self {
        self.attributes.allowed_schemas = Some(schemas.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn with_allowed_mime_types(mut self, types: &[&str]) -> Self {
        self.attributes.allowed_mime_types = Some(types.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.attributes.min = min;
        self.attributes.max = max;
        self
    }

    /// Whether `other` has the same declared type. A list's element type is
    /// part of its declared type.
    pub fn same_declared_type(&self, other: &FieldSchema) -> bool {
        self.field_type == other.field_type
            && (self.field_type != FieldType::List || self.list_type == other.list_type)
    }

    /// Human-readable declared type, e.g. `list<number>`.
    pub fn declared_type(&self) -> String {
        match (self.field_type, self.list_type) {
            (FieldType::List, Some(element)) => format!("list<{element}>"),
            (field_type, _) => field_type.to_string(),
        }
    }
}
