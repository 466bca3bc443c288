//! The change model: one atomic, typed edit between two container versions.
//!
//! The set of change kinds is closed. Both the comparator and the applicator
//! match on [`SchemaChange`] exhaustively, so adding a kind is a compile
//! error everywhere it needs handling.

use schemaflow_model::{FieldAttributes, FieldSchema, FieldType};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// One atomic schema edit.
///
/// Serialized with an `operation` tag, e.g.
/// `{"operation": "CHANGEFIELDTYPE", "field": "content", "type": "number", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "UPPERCASE")]
pub enum SchemaChange {
    /// A new field, appended to the end of the field order.
    AddField { field: FieldSchema },

    /// Drops a field and, during migration, its stored values.
    RemoveField { field: String },

    /// Replaces a field's declared type and, with it, all of its attributes.
    ChangeFieldType {
        field: String,
        #[serde(rename = "type")]
        new_type: FieldType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        list_type: Option<FieldType>,
        #[serde(default)]
        attributes: FieldAttributes,
    },

    /// Replaces the attributes of a field whose declared type is unchanged.
    UpdateField {
        field: String,
        attributes: FieldAttributes,
    },

    /// Moves a field, and its stored values, to a new name.
    RenameField { field: String, new_name: String },

    /// Container metadata and/or a complete new field order.
    UpdateSchema(SchemaUpdate),
}

/// The kind of a [`SchemaChange`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOperation {
    AddField,
    RemoveField,
    ChangeFieldType,
    UpdateField,
    RenameField,
    UpdateSchema,
}

impl ChangeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOperation::AddField => "ADDFIELD",
            ChangeOperation::RemoveField => "REMOVEFIELD",
            ChangeOperation::ChangeFieldType => "CHANGEFIELDTYPE",
            ChangeOperation::UpdateField => "UPDATEFIELD",
            ChangeOperation::RenameField => "RENAMEFIELD",
            ChangeOperation::UpdateSchema => "UPDATESCHEMA",
        }
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SchemaChange {
    /// Creates a CHANGEFIELDTYPE change that turns a field into `target`
    /// (the field keeps its name; `target.name` is ignored).
    pub fn change_field_type(field: &str, target: &FieldSchema) -> Self {
        SchemaChange::ChangeFieldType {
            field: field.into(),
            new_type: target.field_type,
            list_type: target.list_type,
            attributes: target.attributes.clone(),
        }
    }

    pub fn operation(&self) -> ChangeOperation {
        match self {
            SchemaChange::AddField { .. } => ChangeOperation::AddField,
            SchemaChange::RemoveField { .. } => ChangeOperation::RemoveField,
            SchemaChange::ChangeFieldType { .. } => ChangeOperation::ChangeFieldType,
            SchemaChange::UpdateField { .. } => ChangeOperation::UpdateField,
            SchemaChange::RenameField { .. } => ChangeOperation::RenameField,
            SchemaChange::UpdateSchema(_) => ChangeOperation::UpdateSchema,
        }
    }

    /// The field this change targets, if it targets one.
    pub fn field_name(&self) -> Option<&str> {
        match self {
            SchemaChange::AddField { field } => Some(&field.name),
            SchemaChange::RemoveField { field }
            | SchemaChange::ChangeFieldType { field, .. }
            | SchemaChange::UpdateField { field, .. }
            | SchemaChange::RenameField { field, .. } => Some(field),
            SchemaChange::UpdateSchema(_) => None,
        }
    }

    /// Whether the change alters the shape of stored field data. Metadata
    /// changes (UPDATEFIELD, UPDATESCHEMA) never touch stored values.
    pub fn is_structural(&self) -> bool {
        match self {
            SchemaChange::AddField { .. }
            | SchemaChange::RemoveField { .. }
            | SchemaChange::ChangeFieldType { .. }
            | SchemaChange::RenameField { .. } => true,
            SchemaChange::UpdateField { .. } | SchemaChange::UpdateSchema(_) => false,
        }
    }
}

/// Container-level properties carried by an UPDATESCHEMA change.
///
/// `None` means "unchanged". For the optional metadata, `Some(None)` means
/// "cleared" and serializes as an explicit `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "nullable"
    )]
    pub description: Option<Option<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "nullable"
    )]
    pub display_field: Option<Option<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "nullable"
    )]
    pub segment_field: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<bool>,
    /// The complete new field order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_order: Option<Vec<String>>,
}

impl SchemaUpdate {
    /// Whether no property is set.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.display_field.is_none()
            && self.segment_field.is_none()
            && self.container.is_none()
            && self.field_order.is_none()
    }

    /// Names of the properties this update carries, in a fixed order.
    pub fn properties(&self) -> Vec<&'static str> {
        let mut props = Vec::new();
        if self.name.is_some() {
            props.push("name");
        }
        if self.description.is_some() {
            props.push("description");
        }
        if self.display_field.is_some() {
            props.push("display_field");
        }
        if self.segment_field.is_some() {
            props.push("segment_field");
        }
        if self.container.is_some() {
            props.push("container");
        }
        if self.field_order.is_some() {
            props.push("field_order");
        }
        props
    }
}

/// Present-but-null deserializes to `Some(None)`; absence is handled by
/// `#[serde(default)]`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
