use async_trait::async_trait;
use formwork_core::AppResult;
use formwork_domain::{Entity, FieldDefinition, SearchFilter};
use serde_json::{Map, Value};

/// List inputs: free-text search plus structured filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    /// Free-text search.
    pub query: Option<String>,
    /// Structured filters, already merged with the fixed scope.
    pub filters: SearchFilter,
}

/// Body of a create or update call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordWrite {
    /// Flattened form payload.
    pub data: Map<String, Value>,
    /// Form definition, used by the store for uniqueness checks.
    pub form_structure: Vec<FieldDefinition>,
}

/// Document-store CRUD API.
#[async_trait]
pub trait CrudApi: Send + Sync {
    /// Lists records of a collection.
    async fn list(&self, collection: &str, query: &ListQuery) -> AppResult<Vec<Entity>>;

    /// Creates a record.
    async fn create(&self, collection: &str, record: RecordWrite) -> AppResult<Entity>;

    /// Replaces a record's data.
    async fn update(&self, collection: &str, id: &str, record: RecordWrite) -> AppResult<Entity>;

    /// Deletes a record.
    async fn delete(&self, collection: &str, id: &str) -> AppResult<()>;
}
