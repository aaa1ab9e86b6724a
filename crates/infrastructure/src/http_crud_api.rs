use async_trait::async_trait;
use formwork_application::{CrudApi, ListQuery, RecordWrite};
use formwork_core::{AppError, AppResult};
use formwork_domain::Entity;
use reqwest::{Method, Response, StatusCode};
use serde_json::{Map, Value, json};
use url::Url;

use crate::backend_client::{BackendClient, message_of};

/// Document-store CRUD over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCrudApi {
    client: BackendClient,
}

impl HttpCrudApi {
    /// Creates a CRUD adapter.
    #[must_use]
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    fn collection_url(&self, collection: &str) -> AppResult<Url> {
        self.client.endpoint(&["crud", collection])
    }

    fn list_url(&self, collection: &str, query: &ListQuery) -> AppResult<Url> {
        let mut url = self.collection_url(collection)?;
        let text = query.query.as_deref().map(str::trim).filter(|text| !text.is_empty());
        if text.is_none() && query.filters.is_empty() {
            return Ok(url);
        }

        {
            let mut pairs = url.query_pairs_mut();
            if let Some(text) = text {
                pairs.append_pair("query", text);
            }
            if !query.filters.is_empty() {
                let filters = serde_json::to_string(&query.filters).map_err(|error| {
                    AppError::Internal(format!("failed to encode filters: {error}"))
                })?;
                pairs.append_pair("filters", filters.as_str());
            }
        }

        Ok(url)
    }

    async fn write(
        &self,
        method: Method,
        collection: &str,
        body: Value,
        action: &str,
    ) -> AppResult<Entity> {
        let url = self.collection_url(collection)?;
        let response = self
            .client
            .send(self.client.request(method, url).json(&body), action)
            .await?;
        let response = reject_duplicates(response, action).await?;

        BackendClient::read_json(response, action).await
    }
}

fn write_body(id: Option<&str>, record: RecordWrite) -> Value {
    let mut body = json!({
        "data": record.data,
        "formStructure": record.form_structure,
    });
    if let (Some(id), Some(object)) = (id, body.as_object_mut()) {
        object.insert("id".to_owned(), Value::String(id.to_owned()));
    }
    body
}

/// Maps a 400 response listing `duplicateFields` to a conflict.
async fn reject_duplicates(response: Response, action: &str) -> AppResult<Response> {
    if response.status() != StatusCode::BAD_REQUEST {
        return BackendClient::ensure_success(response, action).await;
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<response body unavailable>".to_owned());
    let duplicates = serde_json::from_str::<Value>(body.as_str())
        .ok()
        .and_then(|value| value.get("duplicateFields").and_then(Value::as_object).cloned());

    match duplicates {
        Some(fields) if !fields.is_empty() => Err(AppError::Conflict(duplicate_message(&fields))),
        _ => Err(AppError::Network(format!(
            "{action} failed with status 400: {}",
            message_of(body.as_str())
        ))),
    }
}

/// Joins per-field uniqueness messages as `field: message` pairs.
pub(crate) fn duplicate_message(fields: &Map<String, Value>) -> String {
    fields
        .iter()
        .map(|(field, message)| match message.as_str() {
            Some(message) => format!("{field}: {message}"),
            None => field.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[async_trait]
impl CrudApi for HttpCrudApi {
    async fn list(&self, collection: &str, query: &ListQuery) -> AppResult<Vec<Entity>> {
        let url = self.list_url(collection, query)?;
        let action = format!("list '{collection}'");
        let response = self
            .client
            .send(self.client.request(Method::GET, url), action.as_str())
            .await?;

        BackendClient::read_json(response, action.as_str()).await
    }

    async fn create(&self, collection: &str, record: RecordWrite) -> AppResult<Entity> {
        let action = format!("create in '{collection}'");
        self.write(
            Method::POST,
            collection,
            write_body(None, record),
            action.as_str(),
        )
        .await
    }

    async fn update(&self, collection: &str, id: &str, record: RecordWrite) -> AppResult<Entity> {
        let action = format!("update '{id}' in '{collection}'");
        self.write(
            Method::PUT,
            collection,
            write_body(Some(id), record),
            action.as_str(),
        )
        .await
    }

    async fn delete(&self, collection: &str, id: &str) -> AppResult<()> {
        let url = self.collection_url(collection)?;
        let action = format!("delete '{id}' in '{collection}'");
        let response = self
            .client
            .send(
                self.client
                    .request(Method::DELETE, url)
                    .json(&json!({ "id": id })),
                action.as_str(),
            )
            .await?;

        BackendClient::ensure_success(response, action.as_str()).await?;
        Ok(())
    }
}
