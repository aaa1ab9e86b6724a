use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Multipart, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use formwork_application::{FileUpload, UploadApi, UploadProgress, UploadTarget};
use formwork_core::{AppError, TenantDomain};
use serde_json::json;
use tokio::sync::Mutex;
use url::Url;

use super::{HttpUploadApi, chunks};
use crate::backend_client::BackendClient;

#[derive(Clone, Default)]
struct Storage {
    fields: Arc<Mutex<BTreeMap<String, String>>>,
    received: Arc<Mutex<Vec<(String, usize)>>>,
    deleted: Arc<Mutex<Vec<String>>>,
}

async fn upload(State(storage): State<Storage>, mut multipart: Multipart) -> Response {
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_owned();
        if name == "file" {
            let file_name = field.file_name().unwrap_or_default().to_owned();
            let bytes = field.bytes().await.unwrap_or_default();
            if file_name.starts_with("broken") {
                return (StatusCode::INTERNAL_SERVER_ERROR, "disk full").into_response();
            }
            storage.received.lock().await.push((file_name, bytes.len()));
        } else {
            let text = field.text().await.unwrap_or_default();
            storage.fields.lock().await.insert(name, text);
        }
    }

    let received = storage.received.lock().await;
    let Some((file_name, size)) = received.last() else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    Json(json!({
        "originalName": file_name,
        "filename": format!("1700000000-{file_name}"),
        "filepath": format!("/uploads/1700000000-{file_name}"),
        "size": size,
        "type": "application/pdf",
        "uploadedAt": "2024-01-01T00:00:00Z"
    }))
    .into_response()
}

async fn remove(State(storage): State<Storage>, RawQuery(query): RawQuery) -> StatusCode {
    let filename = url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
        .find(|(key, _)| key == "filename")
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default();
    storage.deleted.lock().await.push(filename);
    StatusCode::NO_CONTENT
}

async fn serve() -> (HttpUploadApi, Storage) {
    let storage = Storage::default();
    let router = Router::new()
        .route("/upload", post(upload).delete(remove))
        .with_state(storage.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap_or_else(|_| unreachable!());
    let address = listener.local_addr().unwrap_or_else(|_| unreachable!());
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    let client = BackendClient::new(
        reqwest::Client::new(),
        Url::parse(format!("http://{address}").as_str()).unwrap_or_else(|_| unreachable!()),
        TenantDomain::new("school.example").unwrap_or_else(|_| unreachable!()),
    )
    .unwrap_or_else(|_| unreachable!());

    (HttpUploadApi::new(client), storage)
}

fn file(name: &str, size: usize) -> FileUpload {
    FileUpload {
        file_name: name.to_owned(),
        content_type: "application/pdf".to_owned(),
        bytes: Bytes::from(vec![7_u8; size]),
    }
}

#[test]
fn chunks_cover_the_whole_file() {
    let bytes = Bytes::from(vec![0_u8; 150 * 1024]);

    let parts = chunks(&bytes);

    assert_eq!(parts.len(), 3);
    assert_eq!(parts.iter().map(Bytes::len).sum::<usize>(), bytes.len());
    assert!(chunks(&Bytes::new()).is_empty());
}

#[tokio::test]
async fn upload_sends_the_file_and_target_fields() {
    let (api, storage) = serve().await;
    let (progress, receiver) = UploadProgress::channel();
    let target = UploadTarget {
        directory: Some("students".to_owned()),
        document_id: Some("s1".to_owned()),
        collection_name: Some("students".to_owned()),
        field_name: Some("documents".to_owned()),
    };

    let stored = api
        .upload_file(file("report.pdf", 200 * 1024), &target, progress)
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(stored.original_name, "report.pdf");
    assert_eq!(stored.size, 200 * 1024);
    assert_eq!(*receiver.borrow(), 100);
    let fields = storage.fields.lock().await;
    assert_eq!(fields.get("directory").map(String::as_str), Some("students"));
    assert_eq!(fields.get("documentId").map(String::as_str), Some("s1"));
    assert_eq!(fields.get("fieldName").map(String::as_str), Some("documents"));
    assert_eq!(
        *storage.received.lock().await,
        vec![("report.pdf".to_owned(), 200 * 1024)]
    );
}

#[tokio::test]
async fn absent_target_fields_are_not_sent() {
    let (api, storage) = serve().await;
    let (progress, _receiver) = UploadProgress::channel();

    api.upload_file(file("a.pdf", 10), &UploadTarget::default(), progress)
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(storage.fields.lock().await.is_empty());
}

#[tokio::test]
async fn failed_store_keeps_progress_below_complete() {
    let (api, _) = serve().await;
    let (progress, receiver) = UploadProgress::channel();

    let result = api
        .upload_file(file("broken.pdf", 10), &UploadTarget::default(), progress)
        .await;

    assert!(matches!(result, Err(AppError::Network(message)) if message.contains("disk full")));
    assert!(*receiver.borrow() < 100);
}

#[tokio::test]
async fn delete_names_the_stored_file() {
    let (api, storage) = serve().await;

    api.delete_file("1700000000-a b.pdf")
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(
        *storage.deleted.lock().await,
        vec!["1700000000-a b.pdf".to_owned()]
    );
}
