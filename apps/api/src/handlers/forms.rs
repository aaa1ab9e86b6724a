use std::sync::Arc;

use axum::Json;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use bytes::Bytes;
use formwork_application::{FileUpload, FormEngine, FormSession, PendingLookup};
use formwork_core::{AppError, AppResult};
use formwork_domain::{FieldPath, FormSchema};
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::dto::{
    DeleteFileRequest, FormActionResponse, FormViewResponse, ImportTextRequest,
    ImportTextResponse, ItemPathRequest, OpenFormRequest, OptionSearchRequest, RecordResponse,
    RemovalRequest, SelectDiscriminantRequest, SetValueRequest, UploadBatchResponse,
    UploadProgressQuery, UploadProgressResponse,
};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn open_form_handler(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(payload): Json<OpenFormRequest>,
) -> ApiResult<(StatusCode, Json<FormViewResponse>)> {
    let schema = Arc::new(FormSchema::new(payload.schema)?);
    let mut session = state
        .engine
        .open(Arc::clone(&schema), collection.as_str(), payload.record.as_ref())?;
    state.collections.register_schema(collection.as_str(), schema).await;

    let lookups = session.drain_lookups();
    let (session_id, session) = state.sessions.insert(session).await;
    settle_lookups(&state.engine, &session, lookups).await;

    let view = form_view(session_id, &session).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_form_handler(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<FormViewResponse>> {
    let (_, view) = mutate(&state, session_id, |session| {
        Ok(session.poll_refresh(Instant::now()))
    })
    .await?;
    Ok(Json(view))
}

pub async fn close_form_handler(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.sessions.remove(session_id).await?.close().await;
    tracing::debug!(%session_id, "closed form session");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_value_handler(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<SetValueRequest>,
) -> ApiResult<Json<FormViewResponse>> {
    let path = FieldPath::parse(payload.path.as_str())?;
    let (_, view) = mutate(&state, session_id, |session| {
        session.set_value(&path, payload.value)
    })
    .await?;
    Ok(Json(view))
}

pub async fn select_discriminant_handler(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<SelectDiscriminantRequest>,
) -> ApiResult<Json<FormActionResponse>> {
    let path = FieldPath::parse(payload.path.as_str())?;
    let (applied, form) = mutate(&state, session_id, |session| {
        session.select_discriminant(&path, payload.value.as_str())
    })
    .await?;
    Ok(Json(FormActionResponse { applied, form }))
}

pub async fn insert_item_handler(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<ItemPathRequest>,
) -> ApiResult<Json<FormActionResponse>> {
    let path = FieldPath::parse(payload.path.as_str())?;
    let (applied, form) =
        mutate(&state, session_id, |session| session.insert_item(&path)).await?;
    Ok(Json(FormActionResponse { applied, form }))
}

pub async fn request_removal_handler(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<RemovalRequest>,
) -> ApiResult<Json<FormActionResponse>> {
    let path = FieldPath::parse(payload.path.as_str())?;
    let (applied, form) = mutate(&state, session_id, |session| {
        session.request_removal(&path, payload.index)
    })
    .await?;
    Ok(Json(FormActionResponse { applied, form }))
}

pub async fn confirm_removal_handler(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<FormActionResponse>> {
    let (applied, form) = mutate(&state, session_id, FormSession::confirm_removal).await?;
    Ok(Json(FormActionResponse { applied, form }))
}

pub async fn cancel_removal_handler(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<FormViewResponse>> {
    let (_, view) = mutate(&state, session_id, |session| {
        session.cancel_removal();
        Ok(())
    })
    .await?;
    Ok(Json(view))
}

pub async fn toggle_expanded_handler(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<ItemPathRequest>,
) -> ApiResult<Json<FormActionResponse>> {
    let path = FieldPath::parse(payload.path.as_str())?;
    let (applied, form) =
        mutate(&state, session_id, |session| session.toggle_expanded(&path)).await?;
    Ok(Json(FormActionResponse { applied, form }))
}

pub async fn search_options_handler(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<OptionSearchRequest>,
) -> ApiResult<Json<FormActionResponse>> {
    let path = FieldPath::parse(payload.path.as_str())?;
    let (applied, form) = mutate(&state, session_id, |session| {
        session.search_options(&path, payload.query.as_str())
    })
    .await?;
    Ok(Json(FormActionResponse { applied, form }))
}

pub async fn import_text_handler(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<ImportTextRequest>,
) -> ApiResult<Json<ImportTextResponse>> {
    let path = FieldPath::parse(payload.path.as_str())?;
    let (imported, form) = mutate(&state, session_id, |session| {
        session.paste_import_text(&path, payload.text.as_str())
    })
    .await?;
    Ok(Json(ImportTextResponse { imported, form }))
}

pub async fn upload_files_handler(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    multipart: Multipart,
) -> ApiResult<Json<UploadBatchResponse>> {
    let (path, files) = read_upload(multipart).await?;
    let response = upload_batch(&state, session_id, &path, files).await?;
    Ok(Json(response))
}

pub async fn delete_file_handler(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<DeleteFileRequest>,
) -> ApiResult<Json<FormViewResponse>> {
    let path = FieldPath::parse(payload.path.as_str())?;
    let session = state.sessions.get(session_id).await?;
    let mut guard = session.lock().await;

    let removed = state
        .engine
        .delete_attachment(&mut guard, &path, payload.filename.as_str())
        .await?;
    if !removed {
        return Err(AppError::NotFound(format!(
            "attachment '{}' on '{path}'",
            payload.filename
        ))
        .into());
    }

    Ok(Json(FormViewResponse::from_session(session_id, &guard)?))
}

pub async fn upload_progress_handler(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<UploadProgressQuery>,
) -> ApiResult<Json<Vec<UploadProgressResponse>>> {
    state.sessions.get(session_id).await?;
    let entries = state
        .engine
        .progress(session_id, query.field.as_str())
        .await
        .into_iter()
        .map(UploadProgressResponse::from)
        .collect();

    Ok(Json(entries))
}

/// Stores the record, then closes the form.
pub async fn submit_form_handler(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<RecordResponse>> {
    let entity = {
        let session = state.sessions.get(session_id).await?;
        let mut guard = session.lock().await;
        let records = state.collections.current_records(guard.collection()).await;
        let mut records = records.lock().await;
        state.engine.submit(&mut guard, &mut records).await?
    };

    if let Ok(open) = state.sessions.remove(session_id).await {
        open.close().await;
    }
    Ok(Json(RecordResponse::from(entity)))
}

/// Runs one synchronous session mutation, then resolves the lookups it
/// queued without holding the session lock.
async fn mutate<T, F>(
    state: &AppState,
    session_id: Uuid,
    action: F,
) -> AppResult<(T, FormViewResponse)>
where
    F: FnOnce(&mut FormSession) -> AppResult<T>,
{
    let session = state.sessions.get(session_id).await?;
    let (outcome, lookups) = {
        let mut guard = session.lock().await;
        let outcome = action(&mut guard)?;
        (outcome, guard.drain_lookups())
    };

    settle_lookups(&state.engine, &session, lookups).await;
    let view = form_view(session_id, &session).await?;
    Ok((outcome, view))
}

async fn settle_lookups(
    engine: &FormEngine,
    session: &Mutex<FormSession>,
    mut lookups: Vec<PendingLookup>,
) {
    while !lookups.is_empty() {
        let responses = engine.fetch_options(lookups).await;
        let mut guard = session.lock().await;
        FormEngine::apply_responses(&mut guard, responses);
        lookups = guard.drain_lookups();
    }
}

async fn form_view(session_id: Uuid, session: &Mutex<FormSession>) -> AppResult<FormViewResponse> {
    let guard = session.lock().await;
    FormViewResponse::from_session(session_id, &guard)
}

/// Reads the `path` field and every `files` part of an upload form.
async fn read_upload(mut multipart: Multipart) -> AppResult<(FieldPath, Vec<FileUpload>)> {
    let invalid = |error: axum::extract::multipart::MultipartError| {
        AppError::Validation(format!("invalid upload form: {error}"))
    };

    let mut path = None;
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        let name = field.name().map(ToOwned::to_owned);
        match name.as_deref() {
            Some("path") => {
                let text = field.text().await.map_err(invalid)?;
                path = Some(FieldPath::parse(text.as_str())?);
            }
            Some("files") => {
                let file_name = field.file_name().unwrap_or("file").to_owned();
                let content_type = field.content_type().unwrap_or_default().to_owned();
                let bytes: Bytes = field.bytes().await.map_err(invalid)?;
                files.push(FileUpload {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            _ => {}
        }
    }

    let path =
        path.ok_or_else(|| AppError::Validation("upload form needs a 'path' field".to_owned()))?;
    Ok((path, files))
}

/// Uploads a batch while holding the session lock, so a submit waits for it.
async fn upload_batch(
    state: &AppState,
    session_id: Uuid,
    path: &FieldPath,
    files: Vec<FileUpload>,
) -> AppResult<UploadBatchResponse> {
    let session = state.sessions.get(session_id).await?;
    let mut guard = session.lock().await;
    let batch = state.engine.upload_files(&mut guard, path, files).await?;

    Ok(UploadBatchResponse {
        uploaded: batch.uploaded.into_iter().map(Into::into).collect(),
        failures: batch.failures.into_iter().map(Into::into).collect(),
        form: FormViewResponse::from_session(session_id, &guard)?,
    })
}

#[cfg(test)]
mod tests;
