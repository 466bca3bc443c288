//! Change applicator: replays a change chain on a definition.
//!
//! Replay is strictly in chain order on a private copy; the input is never
//! mutated. Intermediate states may be temporarily inconsistent (a display
//! field removed before UPDATESCHEMA points it elsewhere), so only the final
//! definition is validated.

use crate::change::{ChangeOperation, SchemaChange, SchemaUpdate};
use crate::error::{ApplyResult, InvalidChangeError};
use schemaflow_model::{ContainerDefinition, FieldSchema};
use std::collections::HashSet;
use tracing::debug;

/// Produces the definition that results from replaying `changes` on `old`.
pub fn apply(old: &ContainerDefinition, changes: &[SchemaChange]) -> ApplyResult<ContainerDefinition> {
    let mut def = old.clone();
    for (index, change) in changes.iter().enumerate() {
        apply_change(&mut def, index, change)?;
    }
    def.validate()?;
    Ok(def)
}

/// Applies the change at position `index` of its chain to `def`.
///
/// Exposed so the migration coordinator can track the declared type of each
/// field as it replays the same chain over stored data.
pub fn apply_change(
    def: &mut ContainerDefinition,
    index: usize,
    change: &SchemaChange,
) -> ApplyResult<()> {
    debug!("Applying change #{} ({}) to {}", index, change.operation(), def.name);

    match change {
        SchemaChange::AddField { field } => {
            if def.has_field(&field.name) {
                return Err(InvalidChangeError::DuplicateField {
                    index,
                    operation: ChangeOperation::AddField,
                    field: field.name.clone(),
                });
            }
            def.fields.push(field.clone());
        }
        SchemaChange::RemoveField { field } => {
            let pos = require(def, index, ChangeOperation::RemoveField, field)?;
            def.fields.remove(pos);
        }
        SchemaChange::ChangeFieldType {
            field,
            new_type,
            list_type,
            attributes,
        } => {
            let pos = require(def, index, ChangeOperation::ChangeFieldType, field)?;
            def.fields[pos] = FieldSchema {
                name: field.clone(),
                field_type: *new_type,
                list_type: *list_type,
                attributes: attributes.clone(),
            };
        }
        SchemaChange::UpdateField { field, attributes } => {
            let pos = require(def, index, ChangeOperation::UpdateField, field)?;
            def.fields[pos].attributes = attributes.clone();
        }
        SchemaChange::RenameField { field, new_name } => {
            let pos = require(def, index, ChangeOperation::RenameField, field)?;
            if def.has_field(new_name) {
                return Err(InvalidChangeError::DuplicateField {
                    index,
                    operation: ChangeOperation::RenameField,
                    field: new_name.clone(),
                });
            }
            def.fields[pos].name = new_name.clone();
            if def.display_field.as_deref() == Some(field.as_str()) {
                def.display_field = Some(new_name.clone());
            }
            if def.segment_field.as_deref() == Some(field.as_str()) {
                def.segment_field = Some(new_name.clone());
            }
        }
        SchemaChange::UpdateSchema(update) => apply_update(def, index, update)?,
    }
    Ok(())
}

fn require(
    def: &ContainerDefinition,
    index: usize,
    operation: ChangeOperation,
    field: &str,
) -> ApplyResult<usize> {
    def.position(field).ok_or_else(|| InvalidChangeError::UnknownField {
        index,
        operation,
        field: field.to_string(),
    })
}

fn apply_update(def: &mut ContainerDefinition, index: usize, update: &SchemaUpdate) -> ApplyResult<()> {
    if let Some(order) = &update.field_order {
        reorder(def, index, order)?;
    }
    if let Some(name) = &update.name {
        def.name = name.clone();
    }
    if let Some(description) = &update.description {
        def.description = description.clone();
    }
    if let Some(display_field) = &update.display_field {
        def.display_field = display_field.clone();
    }
    if let Some(segment_field) = &update.segment_field {
        def.segment_field = segment_field.clone();
    }
    if let Some(container) = update.container {
        def.container = container;
    }
    Ok(())
}

fn reorder(def: &mut ContainerDefinition, index: usize, order: &[String]) -> ApplyResult<()> {
    if order.len() != def.fields.len() {
        return Err(InvalidChangeError::InvalidFieldOrder {
            index,
            reason: format!(
                "expected {} field names, got {}",
                def.fields.len(),
                order.len()
            ),
        });
    }

    let mut seen = HashSet::new();
    let mut reordered = Vec::with_capacity(order.len());
    for name in order {
        if !seen.insert(name.as_str()) {
            return Err(InvalidChangeError::InvalidFieldOrder {
                index,
                reason: format!("field {name} listed twice"),
            });
        }
        let field = def.field(name).ok_or_else(|| InvalidChangeError::InvalidFieldOrder {
            index,
            reason: format!("unknown field {name}"),
        })?;
        reordered.push(field.clone());
    }
    def.fields = reordered;
    Ok(())
}
