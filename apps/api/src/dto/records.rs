use formwork_application::RecordListState;
use formwork_domain::{Entity, FieldDefinition};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ts_rs::TS;

/// Query string of the record list route.
///
/// `filters` and `scope` carry JSON objects.
#[derive(Debug, Default, Deserialize)]
pub struct RecordListQuery {
    pub query: Option<String>,
    pub filters: Option<String>,
    pub scope: Option<String>,
}

/// Advanced search submission for one collection.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/apply-filters-request.ts"
)]
pub struct ApplyFiltersRequest {
    #[ts(type = "Record<string, unknown>")]
    pub filters: Map<String, Value>,
    /// Form schema of the collection, when no form was opened for it yet.
    #[serde(default)]
    #[ts(type = "Array<Record<string, unknown>> | null")]
    pub schema: Option<Vec<FieldDefinition>>,
}

/// API representation of a stored record.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/record-response.ts"
)]
pub struct RecordResponse {
    pub id: String,
    #[ts(type = "Record<string, unknown>")]
    pub data: Map<String, Value>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<Entity> for RecordResponse {
    fn from(entity: Entity) -> Self {
        Self {
            id: entity.id,
            data: entity.data,
            created_at: entity.created_at.map(|at| at.to_rfc3339()),
            updated_at: entity.updated_at.map(|at| at.to_rfc3339()),
        }
    }
}

/// Visible record list of a collection.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/record-list-response.ts"
)]
pub struct RecordListResponse {
    pub records: Vec<RecordResponse>,
    pub loading: bool,
    pub error: Option<String>,
    pub search_query: String,
    #[ts(type = "Record<string, unknown>")]
    pub advanced_search: Map<String, Value>,
    pub applied_filter_count: usize,
}

impl From<&RecordListState> for RecordListResponse {
    fn from(state: &RecordListState) -> Self {
        Self {
            records: state
                .entities
                .iter()
                .cloned()
                .map(RecordResponse::from)
                .collect(),
            loading: state.loading,
            error: state.error.clone(),
            search_query: state.search_query.clone(),
            advanced_search: state.advanced_search.as_map().clone(),
            applied_filter_count: state.applied_filter_count,
        }
    }
}
