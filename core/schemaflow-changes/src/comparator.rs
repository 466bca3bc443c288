//! Container comparator: computes the change list between two definitions.
//!
//! The comparator is pure and deterministic. Changes are emitted in a fixed
//! order so that replaying them in sequence is always well-defined:
//!
//! 1. ADDFIELD for every new field, in the new definition's order
//! 2. REMOVEFIELD for every dropped field, in the old definition's order
//! 3. CHANGEFIELDTYPE / UPDATEFIELD for surviving fields, in the new order
//! 4. at most one UPDATESCHEMA carrying the new field order (if the order
//!    produced by steps 1–2 differs from the requested one) and every
//!    changed metadata property
//!
//! Fields are identified by name, so a rename shows up as a remove plus an
//! add. Explicit RENAMEFIELD changes only enter through client-supplied
//! change lists.

use crate::change::{SchemaChange, SchemaUpdate};
use crate::error::DiffResult;
use schemaflow_model::{ContainerDefinition, ValidationError};
use tracing::debug;

/// Computes the ordered changes that turn `old` into `new`.
///
/// The new definition is validated first; a malformed definition (duplicate
/// names, a display or segment field that names a removed field, ...) is
/// rejected before any change is computed. An empty result means the two
/// definitions are equivalent and no new version must be created.
pub fn diff(old: &ContainerDefinition, new: &ContainerDefinition) -> DiffResult<Vec<SchemaChange>> {
    if old.kind != new.kind {
        return Err(ValidationError::KindMismatch {
            old: old.kind,
            new: new.kind,
        }
        .into());
    }
    new.validate()?;

    let mut changes = Vec::new();

    for field in &new.fields {
        if !old.has_field(&field.name) {
            changes.push(SchemaChange::AddField {
                field: field.clone(),
            });
        }
    }

    for field in &old.fields {
        if !new.has_field(&field.name) {
            changes.push(SchemaChange::RemoveField {
                field: field.name.clone(),
            });
        }
    }

    for new_field in &new.fields {
        let Some(old_field) = old.field(&new_field.name) else {
            continue;
        };
        if !old_field.same_declared_type(new_field) {
            changes.push(SchemaChange::change_field_type(&new_field.name, new_field));
        } else if old_field.attributes != new_field.attributes {
            changes.push(SchemaChange::UpdateField {
                field: new_field.name.clone(),
                attributes: new_field.attributes.clone(),
            });
        }
    }

    let mut update = compare_metadata(old, new);

    let requested = new.field_names();
    if implied_order(old, new) != requested {
        update.field_order = Some(requested.iter().map(|s| s.to_string()).collect());
    }

    if !update.is_empty() {
        changes.push(SchemaChange::UpdateSchema(update));
    }

    debug!(
        "Compared {} against {}: {} change(s)",
        old.name,
        new.name,
        changes.len()
    );
    Ok(changes)
}

/// The field order after replaying only the adds and removes: surviving old
/// fields in their old order, followed by the added fields in new order.
fn implied_order<'a>(old: &'a ContainerDefinition, new: &'a ContainerDefinition) -> Vec<&'a str> {
    let surviving = old
        .fields
        .iter()
        .filter(|f| new.has_field(&f.name))
        .map(|f| f.name.as_str());
    let added = new
        .fields
        .iter()
        .filter(|f| !old.has_field(&f.name))
        .map(|f| f.name.as_str());
    surviving.chain(added).collect()
}

/// Every differing metadata property, coalesced into one update.
fn compare_metadata(old: &ContainerDefinition, new: &ContainerDefinition) -> SchemaUpdate {
    let mut update = SchemaUpdate::default();
    if old.name != new.name {
        update.name = Some(new.name.clone());
    }
    if old.description != new.description {
        update.description = Some(new.description.clone());
    }
    if old.display_field != new.display_field {
        update.display_field = Some(new.display_field.clone());
    }
    if old.segment_field != new.segment_field {
        update.segment_field = Some(new.segment_field.clone());
    }
    if old.container != new.container {
        update.container = Some(new.container);
    }
    update
}
