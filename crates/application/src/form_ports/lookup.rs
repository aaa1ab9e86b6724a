use async_trait::async_trait;
use formwork_core::AppResult;
use formwork_domain::{DataSource, OptionItem, SortOrder};
use serde_json::{Map, Value};

/// One options request against the lookup API.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionsLookupRequest {
    /// Source collection.
    pub collection_name: String,
    /// Field rendered as the label.
    pub label_field: String,
    /// Secondary label field.
    pub label_field2: Option<String>,
    /// Third label field.
    pub label_field3: Option<String>,
    /// Field stored as the value.
    pub value_field: String,
    /// Label template.
    pub custom_label: Option<String>,
    /// Fixed filter merged with dependency values.
    pub filter_query: Map<String, Value>,
    /// Sort field.
    pub sort_field: Option<String>,
    /// Sort direction.
    pub sort_order: Option<SortOrder>,
    /// Maximum number of options.
    pub limit: Option<u32>,
    /// Search text typed into an autocomplete.
    pub query: Option<String>,
}

impl OptionsLookupRequest {
    /// Builds a request from a data source; `scope` entries override
    /// `filterQuery` keys of the same name.
    #[must_use]
    pub fn from_data_source(
        source: &DataSource,
        scope: Map<String, Value>,
        query: Option<String>,
    ) -> Self {
        let mut filter_query = source.filter_query.clone().unwrap_or_default();
        filter_query.extend(scope);

        Self {
            collection_name: source.collection_name.clone(),
            label_field: source.label_field.clone(),
            label_field2: source.label_field2.clone(),
            label_field3: source.label_field3.clone(),
            value_field: source.value_field.clone(),
            custom_label: source.custom_label.clone(),
            filter_query,
            sort_field: source.sort_field.clone(),
            sort_order: source.sort_order,
            limit: source.limit,
            query,
        }
    }
}

/// Dropdown-options lookup API.
#[async_trait]
pub trait LookupApi: Send + Sync {
    /// Fetches ordered `{label, value}` pairs.
    async fn fetch_options(&self, request: OptionsLookupRequest) -> AppResult<Vec<OptionItem>>;
}
