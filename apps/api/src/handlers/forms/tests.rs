use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use bytes::Bytes;
use formwork_application::{
    CrudApi, FileUpload, FormEngine, ListQuery, UploadApi, UploadPipeline, UploadProgress,
    UploadTarget, Widget,
};
use formwork_core::{AppError, AppResult, TenantDomain};
use formwork_domain::{Entity, FieldPath, UploadedFile};
use formwork_infrastructure::InMemoryBackend;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::dto::{
    DeleteFileRequest, FormViewResponse, ImportTextRequest, ItemPathRequest, OpenFormRequest,
    RemovalRequest, SelectDiscriminantRequest, SetValueRequest, UploadProgressQuery,
};
use crate::error::ApiError;
use crate::state::AppState;

use super::{
    cancel_removal_handler, close_form_handler, confirm_removal_handler, delete_file_handler,
    get_form_handler, import_text_handler, insert_item_handler, open_form_handler,
    request_removal_handler, select_discriminant_handler, set_value_handler,
    submit_form_handler, upload_batch, upload_progress_handler,
};

/// Uploads that never finish on their own.
struct StalledUploads;

#[async_trait]
impl UploadApi for StalledUploads {
    async fn upload_file(
        &self,
        _file: FileUpload,
        _target: &UploadTarget,
        _progress: UploadProgress,
    ) -> AppResult<UploadedFile> {
        std::future::pending().await
    }

    async fn delete_file(&self, _filename: &str) -> AppResult<()> {
        Ok(())
    }
}

fn tenant() -> TenantDomain {
    TenantDomain::new("school.example").unwrap_or_else(|_| unreachable!())
}

async fn school_state() -> (AppState, Arc<InMemoryBackend>) {
    let backend = Arc::new(InMemoryBackend::new());
    backend
        .seed(
            "cities",
            [
                Entity::new("c1", object(json!({"name": "Shemiran", "province": "Tehran"}))),
                Entity::new("c2", object(json!({"name": "Kashan", "province": "Isfahan"}))),
            ],
        )
        .await;

    let engine = FormEngine::new(
        backend.clone(),
        backend.clone(),
        UploadPipeline::new(backend.clone(), Duration::from_millis(1000)),
    );
    (AppState::new(tenant(), engine, Duration::from_secs(1800)), backend)
}

fn stalled_state() -> AppState {
    let backend = Arc::new(InMemoryBackend::new());
    let engine = FormEngine::new(
        backend.clone(),
        backend,
        UploadPipeline::new(Arc::new(StalledUploads), Duration::from_millis(1000)),
    );
    AppState::new(tenant(), engine, Duration::from_secs(1800))
}

fn object(value: Value) -> serde_json::Map<String, Value> {
    serde_json::from_value(value).unwrap_or_else(|_| unreachable!())
}

fn student_form() -> OpenFormRequest {
    serde_json::from_value(json!({
        "schema": [
            {"name": "name", "type": "text", "required": true},
            {"name": "province", "type": "text"},
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
                "name": "contacts",
                "type": "group",
                "nestedType": "array",
                "arrayMinItems": 1,
                "arrayMaxItems": 2,
                "fields": [{"name": "phone", "type": "text"}]
            },
            {
                "name": "payment",
                "type": "composite",
                "compositeFieldsStyle": {
                    "defaultItem": "cash",
                    "items": [
                        {
                            "label": "Cash",
                            "value": "cash",
                            "fields": [{"name": "amount", "type": "number"}]
                        },
                        {
                            "label": "Cheque",
                            "value": "cheque",
                            "fields": [{"name": "bank", "type": "text"}]
                        }
                    ]
                }
            },
            {
                "name": "roster",
                "type": "import-text",
                "importTextBoxStyle": {
                    "nameBinding": [{"name": "code", "isUnique": true}, {"name": "name"}]
                }
            },
            {
                "name": "documents",
                "type": "file",
                "isMultiple": true,
                "fileConfig": {"allowedTypes": [".pdf"], "maxSize": 100}
            }
        ]
    }))
    .unwrap_or_else(|_| unreachable!())
}

async fn open(state: &AppState) -> Uuid {
    let response = open_form_handler(
        State(state.clone()),
        Path("students".to_owned()),
        Json(student_form()),
    )
    .await;
    let (status, Json(view)) = response.unwrap_or_else(|_| unreachable!());
    assert_eq!(status, StatusCode::CREATED);
    Uuid::parse_str(view.session_id.as_str()).unwrap_or_else(|_| unreachable!())
}

async fn set(state: &AppState, session_id: Uuid, path: &str, value: Value) -> FormViewResponse {
    let response = set_value_handler(
        State(state.clone()),
        Path(session_id),
        Json(SetValueRequest {
            path: path.to_owned(),
            value,
        }),
    )
    .await;
    let Json(view) = response.unwrap_or_else(|_| unreachable!());
    view
}

fn city_options(view: &FormViewResponse) -> Vec<String> {
    view.controls
        .iter()
        .find(|control| control.name == "city")
        .map(|control| match &control.widget {
            Widget::Select { options, .. } => {
                options.iter().map(|option| option.label.clone()).collect()
            }
            _ => Vec::new(),
        })
        .unwrap_or_default()
}

fn pdf(name: &str) -> FileUpload {
    FileUpload {
        file_name: name.to_owned(),
        content_type: "application/pdf".to_owned(),
        bytes: Bytes::from_static(b"%PDF-1.7"),
    }
}

#[tokio::test]
async fn dependent_options_load_after_a_value_change() {
    let (state, _) = school_state().await;
    let session_id = open(&state).await;

    let view = set(&state, session_id, "province", json!("Tehran")).await;

    assert_eq!(view.mode, "create");
    assert_eq!(city_options(&view), vec!["Shemiran".to_owned()]);

    let view = set(&state, session_id, "province", json!("Isfahan")).await;
    assert_eq!(city_options(&view), vec!["Kashan".to_owned()]);
    assert_eq!(view.payload.get("city"), Some(&json!("")));
}

#[tokio::test]
async fn repeating_group_items_need_confirmed_removal() {
    let (state, _) = school_state().await;
    let session_id = open(&state).await;
    let contacts = || ItemPathRequest {
        path: "contacts".to_owned(),
    };

    let Json(first) = insert_item_handler(State(state.clone()), Path(session_id), Json(contacts()))
        .await
        .unwrap_or_else(|_| unreachable!());
    let Json(full) = insert_item_handler(State(state.clone()), Path(session_id), Json(contacts()))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(first.applied);
    assert!(!full.applied);

    let Json(requested) = request_removal_handler(
        State(state.clone()),
        Path(session_id),
        Json(RemovalRequest {
            path: "contacts".to_owned(),
            index: 1,
        }),
    )
    .await
    .unwrap_or_else(|_| unreachable!());
    assert!(requested.applied);
    assert_eq!(
        requested
            .form
            .pending_removal
            .as_ref()
            .map(|pending| (pending.path.as_str(), pending.index)),
        Some(("contacts", 1))
    );

    let Json(cancelled) = cancel_removal_handler(State(state.clone()), Path(session_id))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(cancelled.pending_removal.is_none());
    let Json(unconfirmed) = confirm_removal_handler(State(state.clone()), Path(session_id))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(!unconfirmed.applied);

    request_removal_handler(
        State(state.clone()),
        Path(session_id),
        Json(RemovalRequest {
            path: "contacts".to_owned(),
            index: 1,
        }),
    )
    .await
    .unwrap_or_else(|_| unreachable!());
    let Json(confirmed) = confirm_removal_handler(State(state.clone()), Path(session_id))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(confirmed.applied);
    assert_eq!(
        confirmed
            .form
            .payload
            .get("contacts")
            .and_then(Value::as_array)
            .map(Vec::len),
        Some(1)
    );
}

#[tokio::test]
async fn composite_and_import_routes_update_the_payload() {
    let (state, _) = school_state().await;
    let session_id = open(&state).await;

    let Json(switched) = select_discriminant_handler(
        State(state.clone()),
        Path(session_id),
        Json(SelectDiscriminantRequest {
            path: "payment".to_owned(),
            value: "cheque".to_owned(),
        }),
    )
    .await
    .unwrap_or_else(|_| unreachable!());
    let Json(imported) = import_text_handler(
        State(state.clone()),
        Path(session_id),
        Json(ImportTextRequest {
            path: "roster".to_owned(),
            text: "1\tSara\n2\tReza".to_owned(),
        }),
    )
    .await
    .unwrap_or_else(|_| unreachable!());

    assert!(switched.applied);
    assert_eq!(
        switched.form.payload.get("payment").and_then(|payment| payment.get("type")),
        Some(&json!("cheque"))
    );
    assert_eq!(imported.imported, 2);
    assert_eq!(
        imported.form.payload.get("roster"),
        Some(&json!([{"code": "1", "name": "Sara"}, {"code": "2", "name": "Reza"}]))
    );
}

#[tokio::test]
async fn submit_validates_then_stores_the_record() {
    let (state, backend) = school_state().await;
    let session_id = open(&state).await;

    let invalid = submit_form_handler(State(state.clone()), Path(session_id)).await;
    assert!(matches!(invalid, Err(ApiError(AppError::Validation(_)))));
    let Json(view) = get_form_handler(State(state.clone()), Path(session_id))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(view.errors.contains_key("name"));

    set(&state, session_id, "name", json!("Sara")).await;
    let Json(record) = submit_form_handler(State(state.clone()), Path(session_id))
        .await
        .unwrap_or_else(|_| unreachable!());

    let stored = backend
        .list("students", &ListQuery::default())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, record.id);
    assert_eq!(record.data.get("name"), Some(&json!("Sara")));

    let closed = get_form_handler(State(state.clone()), Path(session_id)).await;
    assert!(matches!(closed, Err(ApiError(AppError::NotFound(_)))));
}

#[tokio::test]
async fn uploads_attach_to_the_field_until_deleted() {
    let (state, backend) = school_state().await;
    let session_id = open(&state).await;
    let documents = FieldPath::parse("documents").unwrap_or_else(|_| unreachable!());

    let batch = upload_batch(
        &state,
        session_id,
        &documents,
        vec![pdf("report.pdf"), pdf("photo.png")],
    )
    .await
    .unwrap_or_else(|_| unreachable!());

    assert_eq!(batch.uploaded.len(), 1);
    assert_eq!(batch.failures.len(), 1);
    assert_eq!(batch.failures[0].file_name, "photo.png");
    assert!(batch.form.errors.contains_key("documents"));
    let filename = batch.uploaded[0].filename.clone();
    assert!(backend.stored_file(filename.as_str()).await.is_some());

    let Json(view) = delete_file_handler(
        State(state.clone()),
        Path(session_id),
        Json(DeleteFileRequest {
            path: "documents".to_owned(),
            filename: filename.clone(),
        }),
    )
    .await
    .unwrap_or_else(|_| unreachable!());
    let again = delete_file_handler(
        State(state.clone()),
        Path(session_id),
        Json(DeleteFileRequest {
            path: "documents".to_owned(),
            filename: filename.clone(),
        }),
    )
    .await;

    assert_eq!(view.payload.get("documents"), Some(&json!([])));
    assert!(backend.stored_file(filename.as_str()).await.is_none());
    assert!(matches!(again, Err(ApiError(AppError::NotFound(_)))));
}

#[tokio::test]
async fn closed_sessions_are_gone() {
    let (state, _) = school_state().await;
    let session_id = open(&state).await;

    let status = close_form_handler(State(state.clone()), Path(session_id))
        .await
        .unwrap_or_else(|_| unreachable!());
    let render = get_form_handler(State(state.clone()), Path(session_id)).await;
    let progress = upload_progress_handler(
        State(state.clone()),
        Path(session_id),
        Query(UploadProgressQuery {
            field: "documents".to_owned(),
        }),
    )
    .await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(matches!(render, Err(ApiError(AppError::NotFound(_)))));
    assert!(matches!(progress, Err(ApiError(AppError::NotFound(_)))));
}

#[tokio::test]
async fn closing_a_form_cancels_its_running_upload() {
    let state = stalled_state();
    let session_id = open(&state).await;
    let neighbour = open(&state).await;
    let documents = FieldPath::parse("documents").unwrap_or_else(|_| unreachable!());

    let upload = tokio::spawn({
        let state = state.clone();
        async move { upload_batch(&state, session_id, &documents, vec![pdf("report.pdf")]).await }
    });
    let progress = |id: Uuid| {
        upload_progress_handler(
            State(state.clone()),
            Path(id),
            Query(UploadProgressQuery {
                field: "documents".to_owned(),
            }),
        )
    };
    loop {
        let Json(entries) = progress(session_id).await.unwrap_or_else(|_| unreachable!());
        if !entries.is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    let Json(others) = progress(neighbour).await.unwrap_or_else(|_| unreachable!());
    assert!(others.is_empty());

    let closed = tokio::time::timeout(
        Duration::from_secs(2),
        close_form_handler(State(state.clone()), Path(session_id)),
    )
    .await;
    assert_eq!(closed.ok().and_then(Result::ok), Some(StatusCode::NO_CONTENT));

    let batch = upload
        .await
        .unwrap_or_else(|_| unreachable!())
        .unwrap_or_else(|_| unreachable!());
    assert!(batch.uploaded.is_empty());
    assert!(batch.failures[0].message.contains("cancelled"));
}

#[tokio::test]
async fn malformed_paths_are_rejected() {
    let (state, _) = school_state().await;
    let session_id = open(&state).await;

    let response = set_value_handler(
        State(state.clone()),
        Path(session_id),
        Json(SetValueRequest {
            path: "contacts..phone".to_owned(),
            value: json!("0912"),
        }),
    )
    .await;

    assert!(matches!(response, Err(ApiError(AppError::Validation(_)))));
}
