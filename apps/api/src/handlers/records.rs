use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use formwork_core::{AppError, AppResult};
use formwork_domain::{FormSchema, SearchFilter};
use serde_json::Value;

use crate::dto::{ApplyFiltersRequest, RecordListQuery, RecordListResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_records_handler(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(query): Query<RecordListQuery>,
) -> ApiResult<Json<RecordListResponse>> {
    let scope = parse_filter("scope", query.scope.as_deref())?;
    let filters = query
        .filters
        .as_deref()
        .map(|raw| parse_filter("filters", Some(raw)))
        .transpose()?;

    let service = state.collections.records(collection.as_str(), scope).await;
    let mut records = service.lock().await;
    records.search(filters, query.query).await?;

    Ok(Json(RecordListResponse::from(records.state())))
}

pub async fn delete_record_handler(
    State(state): State<AppState>,
    Path((collection, record_id)): Path<(String, String)>,
) -> ApiResult<Json<RecordListResponse>> {
    let service = state.collections.current_records(collection.as_str()).await;
    let mut records = service.lock().await;
    records.delete(record_id.as_str()).await?;

    tracing::info!(%collection, %record_id, "deleted record");
    Ok(Json(RecordListResponse::from(records.state())))
}

pub async fn apply_search_handler(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(payload): Json<ApplyFiltersRequest>,
) -> ApiResult<Json<RecordListResponse>> {
    if let Some(definitions) = payload.schema {
        let schema = Arc::new(FormSchema::new(definitions)?);
        state.collections.register_schema(collection.as_str(), schema).await;
    }

    let search = state.collections.search(collection.as_str()).await?;
    let filter = search
        .lock()
        .await
        .apply_filters(SearchFilter::from_map(payload.filters))?;

    let service = state.collections.current_records(collection.as_str()).await;
    let mut records = service.lock().await;
    records.apply_filters(filter).await?;

    Ok(Json(RecordListResponse::from(records.state())))
}

pub async fn clear_search_handler(
    State(state): State<AppState>,
    Path(collection): Path<String>,
) -> ApiResult<Json<RecordListResponse>> {
    let search = state.collections.search(collection.as_str()).await?;
    search.lock().await.clear()?;

    let service = state.collections.current_records(collection.as_str()).await;
    let mut records = service.lock().await;
    records.clear_filters().await?;

    Ok(Json(RecordListResponse::from(records.state())))
}

/// Reads a JSON object query parameter; absent or blank means no filter.
fn parse_filter(name: &str, raw: Option<&str>) -> AppResult<SearchFilter> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(SearchFilter::empty());
    };

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(SearchFilter::from_map(map)),
        Ok(_) => Err(AppError::Validation(format!("{name} must be a JSON object"))),
        Err(error) => Err(AppError::Validation(format!("invalid {name}: {error}"))),
    }
}
