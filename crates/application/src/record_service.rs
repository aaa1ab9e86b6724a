use std::sync::Arc;

use formwork_core::AppResult;
use formwork_domain::{Entity, SearchFilter};
use serde::Serialize;

use crate::form_ports::{CrudApi, ListQuery, RecordWrite};

/// Visible list of one collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordListState {
    /// Records from the last successful list call.
    pub entities: Vec<Entity>,
    /// Whether a list call is running.
    pub loading: bool,
    /// Message of the last failed call.
    pub error: Option<String>,
    /// Free-text search.
    pub search_query: String,
    /// Filter built by the advanced search.
    pub advanced_search: SearchFilter,
    /// Advanced filter keys not fixed by the collection scope.
    pub applied_filter_count: usize,
}

/// List, search and mutation of one collection's records.
///
/// Every successful mutation is followed by a fresh list call so the visible
/// list reflects stored state. Failures are recorded in `error`; nothing is
/// retried here.
#[derive(Clone)]
pub struct RecordService {
    crud: Arc<dyn CrudApi>,
    collection: String,
    initial_filter: SearchFilter,
    state: RecordListState,
}

impl RecordService {
    /// Creates a service whose lists are always scoped by `initial_filter`.
    #[must_use]
    pub fn new(
        crud: Arc<dyn CrudApi>,
        collection: impl Into<String>,
        initial_filter: SearchFilter,
    ) -> Self {
        Self {
            crud,
            collection: collection.into(),
            initial_filter,
            state: RecordListState::default(),
        }
    }

    /// Returns the collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        self.collection.as_str()
    }

    /// Returns the fixed scope.
    #[must_use]
    pub fn initial_filter(&self) -> &SearchFilter {
        &self.initial_filter
    }

    /// Returns the list state.
    #[must_use]
    pub fn state(&self) -> &RecordListState {
        &self.state
    }

    /// Returns the advanced filter with the fixed scope laid over it.
    #[must_use]
    pub fn merged_filter(&self) -> SearchFilter {
        self.state.advanced_search.scoped_by(&self.initial_filter)
    }

    /// Re-fetches the list with the current search inputs.
    pub async fn list(&mut self) -> AppResult<&[Entity]> {
        let query = ListQuery {
            query: Some(self.state.search_query.trim().to_owned())
                .filter(|query| !query.is_empty()),
            filters: self.merged_filter(),
        };

        self.state.loading = true;
        let result = self.crud.list(self.collection.as_str(), &query).await;
        self.state.loading = false;

        match result {
            Ok(entities) => {
                tracing::debug!(
                    collection = %self.collection,
                    count = entities.len(),
                    "refreshed record list"
                );
                self.state.entities = entities;
                self.state.error = None;
                Ok(self.state.entities.as_slice())
            }
            Err(error) => {
                tracing::warn!(collection = %self.collection, error = %error, "record list failed");
                self.state.error = Some(error.to_string());
                Err(error)
            }
        }
    }

    /// Sets the free-text search and re-fetches.
    pub async fn set_search_query(&mut self, query: impl Into<String>) -> AppResult<&[Entity]> {
        self.state.search_query = query.into();
        self.list().await
    }

    /// Replaces the advanced filter and re-fetches.
    pub async fn apply_filters(&mut self, filter: SearchFilter) -> AppResult<&[Entity]> {
        self.replace_filter(filter);
        self.list().await
    }

    /// Replaces whichever of the advanced filter and free-text query are
    /// given, then fetches once.
    pub async fn search(
        &mut self,
        filter: Option<SearchFilter>,
        query: Option<String>,
    ) -> AppResult<&[Entity]> {
        if let Some(filter) = filter {
            self.replace_filter(filter);
        }
        if let Some(query) = query {
            self.state.search_query = query;
        }
        self.list().await
    }

    fn replace_filter(&mut self, filter: SearchFilter) {
        self.state.applied_filter_count = filter.count_beyond(&self.initial_filter);
        self.state.advanced_search = filter;
    }

    /// Drops the advanced filter and re-fetches.
    pub async fn clear_filters(&mut self) -> AppResult<&[Entity]> {
        self.state.advanced_search = SearchFilter::empty();
        self.state.applied_filter_count = 0;
        self.list().await
    }

    /// Creates a record, then refreshes the list.
    pub async fn create(&mut self, record: RecordWrite) -> AppResult<Entity> {
        let result = self.crud.create(self.collection.as_str(), record).await;
        let entity = self.record_outcome(result)?;
        self.refresh_after_mutation().await;
        Ok(entity)
    }

    /// Replaces a record's data, then refreshes the list.
    pub async fn update(&mut self, id: &str, record: RecordWrite) -> AppResult<Entity> {
        let result = self.crud.update(self.collection.as_str(), id, record).await;
        let entity = self.record_outcome(result)?;
        self.refresh_after_mutation().await;
        Ok(entity)
    }

    /// Deletes a record, then refreshes the list.
    pub async fn delete(&mut self, id: &str) -> AppResult<()> {
        let result = self.crud.delete(self.collection.as_str(), id).await;
        self.record_outcome(result)?;
        self.refresh_after_mutation().await;
        Ok(())
    }

    fn record_outcome<T>(&mut self, result: AppResult<T>) -> AppResult<T> {
        result.inspect_err(|error| {
            tracing::warn!(collection = %self.collection, error = %error, "record mutation failed");
            self.state.error = Some(error.to_string());
        })
    }

    async fn refresh_after_mutation(&mut self) {
        // The mutation already succeeded; a failed refresh only shows up in `error`.
        let _ = self.list().await;
    }
}

#[cfg(test)]
mod tests;
