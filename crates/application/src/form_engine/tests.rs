use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use formwork_core::AppError;
use formwork_domain::{FieldPath, FormSchema, SearchFilter};
use serde_json::{Value, json};

use super::FormEngine;
use crate::form_ports::FileUpload;
use crate::record_service::RecordService;
use crate::test_support::{FakeCrudApi, FakeLookupApi, FakeUploadApi};
use crate::upload_pipeline::UploadPipeline;

struct Harness {
    engine: FormEngine,
    crud: Arc<FakeCrudApi>,
    uploads: Arc<FakeUploadApi>,
    records: RecordService,
}

fn harness() -> Harness {
    let crud = Arc::new(FakeCrudApi::default());
    let uploads = Arc::new(FakeUploadApi::new());
    let engine = FormEngine::new(
        Arc::new(FakeLookupApi::default()),
        crud.clone(),
        UploadPipeline::new(uploads.clone(), Duration::from_millis(1000)),
    );
    let records = RecordService::new(crud.clone(), "students", SearchFilter::empty());

    Harness {
        engine,
        crud,
        uploads,
        records,
    }
}

fn schema() -> Arc<FormSchema> {
    Arc::new(
        FormSchema::from_json(json!([
            {"name": "name", "type": "text", "required": true},
            {
                "name": "province",
                "type": "dropdown",
                "options": [{"label": "Tehran", "value": "Tehran"}]
            },
            {
                "name": "city",
                "type": "dropdown",
                "dataSource": {
                    "collectionName": "cities",
                    "labelField": "name",
                    "valueField": "_id",
                    "dependsOn": "province"
                }
            },
            {
                "name": "documents",
                "type": "file",
                "isMultiple": true,
                "fileConfig": {"allowedTypes": [".pdf"], "maxSize": 100}
            }
        ]))
        .unwrap_or_else(|_| unreachable!()),
    )
}

fn path(value: &str) -> FieldPath {
    FieldPath::parse(value).unwrap_or_else(|_| unreachable!())
}

fn file(name: &str, size: usize) -> FileUpload {
    FileUpload {
        file_name: name.to_owned(),
        content_type: "application/pdf".to_owned(),
        bytes: Bytes::from(vec![1_u8; size]),
    }
}

#[tokio::test]
async fn attachments_survive_a_reopen_and_resubmit() {
    let mut harness = harness();
    let schema = schema();
    let mut session = harness
        .engine
        .open(Arc::clone(&schema), "students", None)
        .unwrap_or_else(|_| unreachable!());
    session
        .set_value(&path("name"), json!("Sara"))
        .unwrap_or_else(|_| unreachable!());
    let batch = harness
        .engine
        .upload_files(
            &mut session,
            &path("documents"),
            vec![file("a.pdf", 10), file("b.pdf", 10), file("c.pdf", 10)],
        )
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(batch.uploaded.len(), 3);

    let created = harness
        .engine
        .submit(&mut session, &mut harness.records)
        .await
        .unwrap_or_else(|_| unreachable!());

    let mut reopened = harness
        .engine
        .open(Arc::clone(&schema), "students", Some(&created))
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(reopened.attachments(&path("documents")).map(|files| files.len()).ok(), Some(3));
    harness
        .engine
        .submit(&mut reopened, &mut harness.records)
        .await
        .unwrap_or_else(|_| unreachable!());

    let writes = harness.crud.writes.lock().await;
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].data.get("documents"), writes[1].data.get("documents"));
    assert_eq!(
        writes[1].data.get("documents").and_then(Value::as_array).map(Vec::len),
        Some(3)
    );
    assert!(!writes[1].form_structure.is_empty());
    assert!(harness.crud.calls.lock().await.contains(&format!("update students {}", created.id)));
}

#[tokio::test]
async fn oversized_file_is_reported_on_its_field() {
    let harness = harness();
    let mut session = harness
        .engine
        .open(schema(), "students", None)
        .unwrap_or_else(|_| unreachable!());

    let batch = harness
        .engine
        .upload_files(
            &mut session,
            &path("documents"),
            vec![file("a.pdf", 10), file("huge.pdf", 500), file("c.pdf", 10)],
        )
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(batch.uploaded.len(), 2);
    let messages = session.errors().get("documents").cloned().unwrap_or_default();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("huge.pdf"));
    assert_eq!(session.attachments(&path("documents")).map(|files| files.len()).ok(), Some(2));
}

#[tokio::test]
async fn deleting_an_attachment_removes_it_remotely_and_locally() {
    let harness = harness();
    let mut session = harness
        .engine
        .open(schema(), "students", None)
        .unwrap_or_else(|_| unreachable!());
    harness
        .engine
        .upload_files(&mut session, &path("documents"), vec![file("a.pdf", 10)])
        .await
        .unwrap_or_else(|_| unreachable!());

    let removed = harness
        .engine
        .delete_attachment(&mut session, &path("documents"), "stored-a.pdf")
        .await
        .unwrap_or_else(|_| unreachable!());
    let missing = harness
        .engine
        .delete_attachment(&mut session, &path("documents"), "stored-a.pdf")
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(removed);
    assert!(!missing);
    assert_eq!(*harness.uploads.deleted.lock().await, vec!["stored-a.pdf".to_owned()]);
    assert_eq!(session.payload().get("documents"), Some(&json!([])));
}

#[tokio::test]
async fn settle_resolves_dependent_options() {
    let harness = harness();
    let mut session = harness
        .engine
        .open(schema(), "students", None)
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(harness.engine.settle(&mut session).await, 0);

    session
        .set_value(&path("province"), json!("Tehran"))
        .unwrap_or_else(|_| unreachable!());
    let applied = harness.engine.settle(&mut session).await;

    assert_eq!(applied, 1);
    let options = session.options().options(&path("city"));
    assert_eq!(options.len(), 1);
    assert_eq!(options[0].label, "cities of Tehran");
}

#[tokio::test]
async fn invalid_forms_never_reach_the_record_api() {
    let mut harness = harness();
    let mut session = harness
        .engine
        .open(schema(), "students", None)
        .unwrap_or_else(|_| unreachable!());

    let result = harness.engine.submit(&mut session, &mut harness.records).await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(session.errors().contains_key("name"));
    assert!(harness.crud.calls.lock().await.is_empty());
}

#[tokio::test]
async fn closed_forms_cancel_their_uploads() {
    let harness = harness();
    let mut session = harness
        .engine
        .open(schema(), "students", None)
        .unwrap_or_else(|_| unreachable!());
    session.cancel();

    let result = harness
        .engine
        .upload_files(&mut session, &path("documents"), vec![file("a.pdf", 10)])
        .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert!(harness.uploads.uploaded.lock().await.is_empty());
}
