use pretty_assertions::assert_eq;
use schemaflow_changes::{diff, ChangeOperation, DiffError, SchemaChange, SchemaUpdate};
use schemaflow_model::{ContainerDefinition, FieldSchema, FieldType, ValidationError};

fn minimal_schema() -> ContainerDefinition {
    ContainerDefinition::schema("dummySchema")
        .with_field(FieldSchema::string("displayFieldName"))
        .with_display_field("displayFieldName")
}

fn minimal_microschema() -> ContainerDefinition {
    ContainerDefinition::microschema("dummyMicroschema")
        .with_field(FieldSchema::string("displayFieldName"))
        .with_display_field("displayFieldName")
}

fn only_update(changes: &[SchemaChange]) -> &SchemaUpdate {
    assert_eq!(changes.len(), 1, "expected exactly one change: {changes:?}");
    match &changes[0] {
        SchemaChange::UpdateSchema(update) => update,
        other => panic!("expected UPDATESCHEMA, got {other:?}"),
    }
}

// ── No-op ────────────────────────────────────────────────────────

#[test]
fn identical_schemas_produce_no_changes() {
    assert!(diff(&minimal_schema(), &minimal_schema()).unwrap().is_empty());
}

#[test]
fn same_field_order_produces_no_changes() {
    let a = minimal_schema()
        .with_field(FieldSchema::html("first"))
        .with_field(FieldSchema::html("second"));
    let b = a.clone();
    assert!(diff(&a, &b).unwrap().is_empty());
}

// ── Field add / remove ───────────────────────────────────────────

#[test]
fn added_field_emits_addfield() {
    let a = minimal_schema();
    let b = minimal_schema().with_field(FieldSchema::number("count").required());
    let changes = diff(&a, &b).unwrap();
    assert_eq!(
        changes,
        vec![SchemaChange::AddField {
            field: FieldSchema::number("count").required()
        }]
    );
}

#[test]
fn removed_field_emits_removefield() {
    let a = minimal_schema().with_field(FieldSchema::html("body"));
    let b = minimal_schema();
    let changes = diff(&a, &b).unwrap();
    assert_eq!(
        changes,
        vec![SchemaChange::RemoveField {
            field: "body".into()
        }]
    );
}

#[test]
fn rename_shows_as_remove_plus_add() {
    let a = minimal_schema().with_field(FieldSchema::html("body"));
    let b = minimal_schema().with_field(FieldSchema::html("content"));
    let ops: Vec<ChangeOperation> = diff(&a, &b).unwrap().iter().map(|c| c.operation()).collect();
    assert_eq!(ops, vec![ChangeOperation::AddField, ChangeOperation::RemoveField]);
}

#[test]
fn appended_fields_need_no_reorder() {
    let a = minimal_schema().with_field(FieldSchema::html("first"));
    let b = minimal_schema()
        .with_field(FieldSchema::html("first"))
        .with_field(FieldSchema::html("second"))
        .with_field(FieldSchema::html("third"));
    let ops: Vec<ChangeOperation> = diff(&a, &b).unwrap().iter().map(|c| c.operation()).collect();
    assert_eq!(ops, vec![ChangeOperation::AddField, ChangeOperation::AddField]);
}

#[test]
fn field_added_in_the_middle_emits_order() {
    let a = minimal_schema().with_field(FieldSchema::html("last"));
    let b = minimal_schema()
        .with_field(FieldSchema::html("middle"))
        .with_field(FieldSchema::html("last"));
    let changes = diff(&a, &b).unwrap();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].operation(), ChangeOperation::AddField);
    match &changes[1] {
        SchemaChange::UpdateSchema(update) => assert_eq!(
            update.field_order,
            Some(vec![
                "displayFieldName".to_string(),
                "middle".to_string(),
                "last".to_string()
            ])
        ),
        other => panic!("expected UPDATESCHEMA, got {other:?}"),
    }
}

// ── Type changes ─────────────────────────────────────────────────

#[test]
fn changed_field_type_emits_changefieldtype() {
    let a = minimal_schema().with_field(FieldSchema::string("content"));
    let b = minimal_schema().with_field(FieldSchema::number("content"));
    let changes = diff(&a, &b).unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].operation(), ChangeOperation::ChangeFieldType);
    assert_eq!(changes[0].field_name(), Some("content"));
    match &changes[0] {
        SchemaChange::ChangeFieldType { new_type, .. } => assert_eq!(*new_type, FieldType::Number),
        _ => unreachable!(),
    }
}

#[test]
fn changed_list_element_type_is_a_type_change() {
    let a = minimal_schema().with_field(FieldSchema::list("tags", FieldType::String));
    let b = minimal_schema().with_field(FieldSchema::list("tags", FieldType::Number));
    let changes = diff(&a, &b).unwrap();
    assert_eq!(
        changes,
        vec![SchemaChange::ChangeFieldType {
            field: "tags".into(),
            new_type: FieldType::List,
            list_type: Some(FieldType::Number),
            attributes: Default::default(),
        }]
    );
}

#[test]
fn type_change_carries_new_attributes() {
    let a = minimal_schema().with_field(FieldSchema::string("ref").with_label("Ref"));
    let b = minimal_schema().with_field(FieldSchema::node("ref", &["page"]));
    let changes = diff(&a, &b).unwrap();
    match &changes[0] {
        SchemaChange::ChangeFieldType { attributes, .. } => {
            assert_eq!(attributes.label, None);
            assert_eq!(attributes.allowed_schemas, Some(vec!["page".to_string()]));
        }
        other => panic!("unexpected {other:?}"),
    }
}

// ── Attribute updates ────────────────────────────────────────────

#[test]
fn changed_allowed_schemas_emits_updatefield() {
    let a = minimal_schema().with_field(FieldSchema::node("author", &["person"]));
    let b = minimal_schema().with_field(FieldSchema::node("author", &["person", "team"]));
    let changes = diff(&a, &b).unwrap();
    assert_eq!(changes.len(), 1);
    match &changes[0] {
        SchemaChange::UpdateField { field, attributes } => {
            assert_eq!(field, "author");
            assert_eq!(
                attributes.allowed_schemas,
                Some(vec!["person".to_string(), "team".to_string()])
            );
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn changed_label_emits_updatefield() {
    let a = minimal_schema().with_field(FieldSchema::binary("file"));
    let b = minimal_schema().with_field(FieldSchema::binary("file").with_label("File"));
    let ops: Vec<ChangeOperation> = diff(&a, &b).unwrap().iter().map(|c| c.operation()).collect();
    assert_eq!(ops, vec![ChangeOperation::UpdateField]);
}

// ── Reordering ───────────────────────────────────────────────────

#[test]
fn swapped_fields_emit_one_order_update() {
    let a = minimal_schema()
        .with_field(FieldSchema::html("first"))
        .with_field(FieldSchema::html("second"));
    let b = minimal_schema()
        .with_field(FieldSchema::html("second"))
        .with_field(FieldSchema::html("first"));
    let update = only_update(&diff(&a, &b).unwrap()).clone();
    assert_eq!(
        update,
        SchemaUpdate {
            field_order: Some(vec![
                "displayFieldName".to_string(),
                "second".to_string(),
                "first".to_string()
            ]),
            ..Default::default()
        }
    );
}

// ── Metadata ─────────────────────────────────────────────────────

#[test]
fn segment_field_added() {
    let a = minimal_schema();
    let b = minimal_schema().with_segment_field("displayFieldName");
    let update = only_update(&diff(&a, &b).unwrap()).clone();
    assert_eq!(update.segment_field, Some(Some("displayFieldName".into())));
}

#[test]
fn segment_field_removed() {
    let a = minimal_schema().with_segment_field("displayFieldName");
    let b = minimal_schema();
    let update = only_update(&diff(&a, &b).unwrap()).clone();
    assert_eq!(update.segment_field, Some(None));
}

#[test]
fn segment_field_updated() {
    let a = minimal_schema()
        .with_field(FieldSchema::string("someExtraField"))
        .with_segment_field("someExtraField");
    let b = minimal_schema()
        .with_field(FieldSchema::string("someExtraField"))
        .with_segment_field("displayFieldName");
    let update = only_update(&diff(&a, &b).unwrap()).clone();
    assert_eq!(update.segment_field, Some(Some("displayFieldName".into())));
}

#[test]
fn display_field_updated() {
    let a = minimal_schema().with_field(FieldSchema::string("someExtraField"));
    let b = minimal_schema()
        .with_field(FieldSchema::string("someExtraField"))
        .with_display_field("someExtraField");
    let update = only_update(&diff(&a, &b).unwrap()).clone();
    assert_eq!(update.display_field, Some(Some("someExtraField".into())));
}

#[test]
fn container_flag_updated() {
    let a = minimal_schema().with_container(true);
    let b = minimal_schema().with_container(false);
    let update = only_update(&diff(&a, &b).unwrap()).clone();
    assert_eq!(update.container, Some(false));
}

#[test]
fn container_flag_same() {
    let a = minimal_schema().with_container(true);
    assert!(diff(&a, &a.clone()).unwrap().is_empty());
}

#[test]
fn description_updated_and_cleared() {
    let a = minimal_schema().with_description("test123");
    let b = minimal_schema().with_description("test123-changed");
    let update = only_update(&diff(&a, &b).unwrap()).clone();
    assert_eq!(update.description, Some(Some("test123-changed".into())));

    let cleared = minimal_schema();
    let update = only_update(&diff(&a, &cleared).unwrap()).clone();
    assert_eq!(update.description, Some(None));
}

#[test]
fn name_updated() {
    let a = minimal_schema();
    let mut b = minimal_schema();
    b.name = "test123-changed".into();
    let update = only_update(&diff(&a, &b).unwrap()).clone();
    assert_eq!(update.name.as_deref(), Some("test123-changed"));
}

#[test]
fn metadata_and_order_share_one_update() {
    let a = minimal_schema()
        .with_field(FieldSchema::html("first"))
        .with_field(FieldSchema::html("second"))
        .with_description("old");
    let b = minimal_schema()
        .with_field(FieldSchema::html("second"))
        .with_field(FieldSchema::html("first"))
        .with_description("new")
        .with_container(true);
    let update = only_update(&diff(&a, &b).unwrap()).clone();
    assert_eq!(
        update.properties(),
        vec!["description", "container", "field_order"]
    );
}

// ── Microschemas ─────────────────────────────────────────────────

#[test]
fn microschema_number_field_added() {
    let a = minimal_microschema();
    let b = minimal_microschema().with_field(FieldSchema::number("test").with_range(Some(1.0), None));
    let changes = diff(&a, &b).unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].operation(), ChangeOperation::AddField);
}

#[test]
fn microschema_number_range_changed() {
    let a = minimal_microschema().with_field(FieldSchema::number("test").with_range(Some(1.0), None));
    let b = minimal_microschema().with_field(FieldSchema::number("test").with_range(Some(2.0), None));
    let changes = diff(&a, &b).unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].operation(), ChangeOperation::UpdateField);
}

// ── Validation ───────────────────────────────────────────────────

#[test]
fn kind_mismatch_rejected() {
    let result = diff(&minimal_schema(), &minimal_microschema());
    assert!(matches!(
        result,
        Err(DiffError::Validation(ValidationError::KindMismatch { .. }))
    ));
}

#[test]
fn removing_the_display_field_is_rejected() {
    let a = minimal_schema().with_field(FieldSchema::string("title"));
    let mut b = ContainerDefinition::schema("dummySchema").with_field(FieldSchema::string("title"));
    b.display_field = Some("displayFieldName".into());
    assert_eq!(
        diff(&a, &b),
        Err(DiffError::Validation(ValidationError::DanglingDisplayField(
            "displayFieldName".into()
        )))
    );
}

#[test]
fn removing_the_segment_field_is_rejected() {
    let a = minimal_schema()
        .with_field(FieldSchema::string("slug"))
        .with_segment_field("slug");
    let b = minimal_schema().with_segment_field("slug");
    assert_eq!(
        diff(&a, &b),
        Err(DiffError::Validation(ValidationError::DanglingSegmentField(
            "slug".into()
        )))
    );
}

#[test]
fn duplicate_names_rejected_before_diffing() {
    let b = minimal_schema()
        .with_field(FieldSchema::string("x"))
        .with_field(FieldSchema::number("x"));
    assert_eq!(
        diff(&minimal_schema(), &b),
        Err(DiffError::Validation(ValidationError::DuplicateField("x".into())))
    );
}
