use formwork_core::AppError;
use serde_json::{Map, Value, json};

use super::{FormState, StateNode};
use crate::path::FieldPath;
use crate::schema::FormSchema;

fn schema() -> FormSchema {
    FormSchema::from_json(json!([
        {"name": "name", "type": "text", "defaultValue": "unnamed"},
        {"name": "caption", "type": "label", "title": "Student details"},
        {"name": "tags", "type": "shadcn-multiselect"},
        {"name": "photo", "type": "file"},
        {
            "name": "contacts",
            "type": "group",
            "nestedType": "array",
            "arrayMinItems": 1,
            "isOpen": true,
            "fields": [
                {"name": "phone", "type": "text"},
                {"name": "kind", "type": "radio", "defaultValue": "mobile"}
            ]
        },
        {
            "name": "address",
            "type": "composite",
            "compositeFieldsStyle": {
                "defaultItem": "home",
                "items": [
                    {
                        "label": "Home",
                        "value": "home",
                        "fields": [{"name": "street", "type": "text"}]
                    },
                    {
                        "label": "Work",
                        "value": "work",
                        "fields": [{"name": "company", "type": "text", "defaultValue": "school"}]
                    }
                ]
            }
        }
    ]))
    .unwrap_or_else(|_| unreachable!())
}

fn path(value: &str) -> FieldPath {
    FieldPath::parse(value).unwrap_or_else(|_| unreachable!())
}

fn object(value: Value) -> Map<String, Value> {
    serde_json::from_value(value).unwrap_or_else(|_| unreachable!())
}

#[test]
fn empty_state_is_seeded_from_the_schema() {
    let state = FormState::empty(&schema());

    assert_eq!(state.value(&path("name")), Some(&json!("unnamed")));
    assert_eq!(state.value(&path("tags")), Some(&json!([])));
    assert_eq!(state.value(&path("photo")), Some(&Value::Null));
    assert_eq!(state.value(&path("contacts.0.kind")), Some(&json!("mobile")));

    let contacts = state
        .array(&path("contacts"))
        .unwrap_or_else(|| unreachable!());
    assert_eq!(contacts.len(), 1);
    assert!(contacts.expanded());

    let address = state
        .composite(&path("address"))
        .unwrap_or_else(|| unreachable!());
    assert_eq!(address.selected(), Some("home"));
    assert!(!address.visited("work"));
}

#[test]
fn every_leaf_resolves_to_a_schema_field() {
    let schema = schema();
    let state = FormState::empty(&schema);

    for leaf in state.leaf_paths() {
        assert!(schema.resolve(&leaf).is_ok(), "orphan state at {leaf}");
    }
}

#[test]
fn hydrate_ignores_undeclared_keys_and_normalizes_files() {
    let data = object(json!({
        "name": "Sara",
        "legacyColumn": 4,
        "photo": [{
            "originalName": "sara.png",
            "filename": "1-sara.png",
            "filepath": "/uploads/1-sara.png",
            "size": 10,
            "type": "image/png",
            "uploadedAt": "2024-02-01T10:00:00Z"
        }],
        "contacts": [],
        "address": {"type": "work", "work": {"company": "District office"}}
    }));

    let state = FormState::hydrate(&schema(), &data).unwrap_or_else(|_| unreachable!());

    assert_eq!(state.value(&path("name")), Some(&json!("Sara")));
    assert!(state.get(&path("legacyColumn")).is_none());
    assert!(matches!(state.value(&path("photo")), Some(Value::Object(_))));
    assert_eq!(
        state.array(&path("contacts")).map(|array| array.len()),
        Some(0)
    );
    assert_eq!(
        state.value(&path("address.work.company")),
        Some(&json!("District office"))
    );
}

#[test]
fn composite_branches_survive_switching() {
    let schema = schema();
    let mut state = FormState::empty(&schema);
    state
        .set_value(&path("address.home.street"), json!("Valiasr 12"))
        .unwrap_or_else(|_| unreachable!());

    let composite = schema
        .find("address")
        .and_then(|field| field.composite())
        .unwrap_or_else(|| unreachable!());
    let work = composite.item("work").unwrap_or_else(|| unreachable!());
    let home = composite.item("home").unwrap_or_else(|| unreachable!());

    let node = state
        .composite_mut(&path("address"))
        .unwrap_or_else(|| unreachable!());
    assert!(node.select(work));
    assert!(!node.select(home));

    assert_eq!(
        state.value(&path("address.home.street")),
        Some(&json!("Valiasr 12"))
    );
    assert_eq!(
        state.value(&path("address.work.company")),
        Some(&json!("school"))
    );
}

#[test]
fn payload_skips_labels_and_unselected_branches() {
    let schema = schema();
    let mut state = FormState::empty(&schema);
    state
        .set_value(&path("address.home.street"), json!("Valiasr 12"))
        .unwrap_or_else(|_| unreachable!());

    let payload = state.to_payload(schema.fields());

    assert!(!payload.contains_key("caption"));
    assert_eq!(
        payload.get("address"),
        Some(&json!({"type": "home", "home": {"street": "Valiasr 12"}}))
    );
    assert_eq!(
        payload.get("contacts"),
        Some(&json!([{"phone": "", "kind": "mobile"}]))
    );
}

#[test]
fn set_value_rejects_unknown_and_container_paths() {
    let mut state = FormState::empty(&schema());

    let unknown = state.set_value(&path("nickname"), json!("x"));
    let container = state.set_value(&path("contacts"), json!([]));

    assert!(matches!(unknown, Err(AppError::Validation(_))));
    assert!(matches!(container, Err(AppError::Validation(_))));
    assert!(matches!(
        state.get(&path("contacts")),
        Some(StateNode::Array(_))
    ));
}
