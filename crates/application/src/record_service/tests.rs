use std::sync::Arc;
use std::sync::atomic::Ordering;

use formwork_domain::{Entity, SearchFilter};
use serde_json::{Map, Value, json};

use super::RecordService;
use crate::form_ports::RecordWrite;
use crate::test_support::FakeCrudApi;

fn data(value: Value) -> Map<String, Value> {
    serde_json::from_value(value).unwrap_or_else(|_| unreachable!())
}

fn filter(value: Value) -> SearchFilter {
    SearchFilter::from_map(data(value))
}

async fn seeded() -> Arc<FakeCrudApi> {
    let crud = Arc::new(FakeCrudApi::default());
    for (id, name, class_code, status) in [
        ("a", "Sara", "7A", "active"),
        ("b", "Reza", "7B", "active"),
        ("c", "Mina", "7A", "left"),
    ] {
        let record = json!({"name": name, "classCode": class_code, "status": status});
        crud.seed(Entity::new(id, data(record))).await;
    }
    crud
}

#[tokio::test]
async fn fixed_scope_cannot_be_overridden_by_advanced_search() {
    let crud = seeded().await;
    let mut service =
        RecordService::new(crud.clone(), "students", filter(json!({"classCode": "7A"})));

    let ids: Vec<String> = service
        .apply_filters(filter(json!({"classCode": "7B", "status": "active"})))
        .await
        .unwrap_or_else(|_| unreachable!())
        .iter()
        .map(|entity| entity.id.clone())
        .collect();

    assert_eq!(ids, vec!["a".to_owned()]);
    assert_eq!(service.state().applied_filter_count, 1);
    let sent = crud.queries.lock().await.last().cloned().unwrap_or_default();
    assert_eq!(sent.filters.as_map().get("classCode"), Some(&json!("7A")));
}

#[tokio::test]
async fn mutations_refresh_the_list_after_they_succeed() {
    let crud = seeded().await;
    let mut service = RecordService::new(crud.clone(), "students", SearchFilter::empty());

    let created = service
        .create(RecordWrite {
            data: data(json!({"name": "Ali"})),
            form_structure: Vec::new(),
        })
        .await
        .unwrap_or_else(|_| unreachable!());
    service.delete("b").await.unwrap_or_else(|_| unreachable!());

    assert_eq!(
        *crud.calls.lock().await,
        vec![
            "create students".to_owned(),
            "list students".to_owned(),
            "delete students b".to_owned(),
            "list students".to_owned(),
        ]
    );
    assert!(service.state().entities.iter().any(|entity| entity.id == created.id));
    assert!(service.state().entities.iter().all(|entity| entity.id != "b"));
}

#[tokio::test]
async fn failures_are_reported_once_without_retry() {
    let crud = seeded().await;
    crud.fail_mutations.store(true, Ordering::SeqCst);
    let mut service = RecordService::new(crud.clone(), "students", SearchFilter::empty());

    let result = service.delete("a").await;

    assert!(result.is_err());
    assert_eq!(crud.calls.lock().await.len(), 1);
    assert!(
        service
            .state()
            .error
            .as_deref()
            .is_some_and(|error| error.contains("500"))
    );
}

#[tokio::test]
async fn failed_refresh_keeps_the_mutation_result() {
    let crud = seeded().await;
    crud.fail_list.store(true, Ordering::SeqCst);
    let mut service = RecordService::new(crud.clone(), "students", SearchFilter::empty());

    let updated = service
        .update(
            "a",
            RecordWrite {
                data: data(json!({"name": "Sara Ahmadi"})),
                form_structure: Vec::new(),
            },
        )
        .await;

    assert!(updated.is_ok());
    assert!(service.state().error.is_some());
    assert!(!service.state().loading);
}

#[tokio::test]
async fn free_text_search_and_clearing_filters() {
    let crud = seeded().await;
    let mut service = RecordService::new(crud.clone(), "students", SearchFilter::empty());

    let found = service
        .set_search_query("Min")
        .await
        .unwrap_or_else(|_| unreachable!())
        .len();
    assert_eq!(found, 1);

    service
        .apply_filters(filter(json!({"status": "active"})))
        .await
        .unwrap_or_else(|_| unreachable!());
    service.set_search_query("  ").await.unwrap_or_else(|_| unreachable!());
    let all = service.clear_filters().await.unwrap_or_else(|_| unreachable!()).len();

    assert_eq!(all, 3);
    assert!(service.state().advanced_search.is_empty());
    assert_eq!(service.state().applied_filter_count, 0);
    assert_eq!(crud.queries.lock().await.last().and_then(|query| query.query.clone()), None);
}

#[tokio::test]
async fn filter_and_query_together_fetch_once() {
    let crud = seeded().await;
    let mut service = RecordService::new(crud.clone(), "students", SearchFilter::empty());

    let ids: Vec<String> = service
        .search(Some(filter(json!({"status": "active"}))), Some("Rez".to_owned()))
        .await
        .unwrap_or_else(|_| unreachable!())
        .iter()
        .map(|entity| entity.id.clone())
        .collect();

    assert_eq!(ids, vec!["b".to_owned()]);
    assert_eq!(*crud.calls.lock().await, vec!["list students".to_owned()]);
    assert_eq!(service.state().applied_filter_count, 1);
    assert_eq!(service.state().search_query, "Rez");
}
