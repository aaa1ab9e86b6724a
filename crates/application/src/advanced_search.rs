use std::sync::Arc;

use formwork_core::AppResult;
use formwork_domain::{FormSchema, SearchFilter, is_empty_value};
use serde_json::{Map, Value};

use crate::form_session::FormSession;

/// Builds structured filters with a search form over the searchable fields.
///
/// Empty values do not constrain the search, and applied filters only ever
/// carry top-level searchable field names.
#[derive(Debug)]
pub struct AdvancedSearch {
    schema: Arc<FormSchema>,
    collection: String,
    session: FormSession,
    applied: SearchFilter,
}

impl AdvancedSearch {
    /// Opens a search form for the searchable subset of `schema`.
    pub fn new(schema: &FormSchema, collection: impl Into<String>) -> AppResult<Self> {
        let schema = Arc::new(schema.searchable_subset()?);
        let collection = collection.into();
        let session = FormSession::open_search(
            Arc::clone(&schema),
            collection.as_str(),
            &SearchFilter::empty(),
        )?;

        Ok(Self {
            schema,
            collection,
            session,
            applied: SearchFilter::empty(),
        })
    }

    /// Returns the searchable schema.
    #[must_use]
    pub fn schema(&self) -> &Arc<FormSchema> {
        &self.schema
    }

    /// Returns the search form.
    #[must_use]
    pub fn session(&self) -> &FormSession {
        &self.session
    }

    /// Returns the search form for editing.
    pub fn session_mut(&mut self) -> &mut FormSession {
        &mut self.session
    }

    /// Returns the last applied filter.
    #[must_use]
    pub fn applied(&self) -> &SearchFilter {
        &self.applied
    }

    /// Builds the filter from the current search form and records it as applied.
    pub fn apply(&mut self) -> SearchFilter {
        let names = self.schema.field_names();
        let entries = self
            .session
            .payload()
            .into_iter()
            .filter_map(|(key, value)| prune(value).map(|value| (key, value)))
            .collect();

        let filter = SearchFilter::from_map(entries).retain_keys(&names);
        self.applied = filter.clone();
        filter
    }

    /// Loads a filter into the search form, dropping keys that are not
    /// searchable fields.
    pub fn apply_filters(&mut self, filter: SearchFilter) -> AppResult<SearchFilter> {
        let names = self.schema.field_names();
        let filter = filter.retain_keys(&names);
        self.reopen(&filter)?;
        self.applied = filter.clone();
        Ok(filter)
    }

    /// Resets the search form and returns the empty filter.
    pub fn clear(&mut self) -> AppResult<SearchFilter> {
        self.reopen(&SearchFilter::empty())?;
        self.applied = SearchFilter::empty();
        Ok(SearchFilter::empty())
    }

    fn reopen(&mut self, filter: &SearchFilter) -> AppResult<()> {
        let session =
            FormSession::open_search(Arc::clone(&self.schema), self.collection.as_str(), filter)?;
        self.session.cancel();
        self.session = session;
        Ok(())
    }
}

/// Drops empty values recursively; `None` when nothing is left.
fn prune(value: Value) -> Option<Value> {
    match value {
        Value::Object(map) => {
            let kept: Map<String, Value> = map
                .into_iter()
                .filter_map(|(key, value)| prune(value).map(|value| (key, value)))
                .collect();
            (!kept.is_empty()).then_some(Value::Object(kept))
        }
        Value::Array(items) => {
            let kept: Vec<Value> = items.into_iter().filter_map(prune).collect();
            (!kept.is_empty()).then_some(Value::Array(kept))
        }
        other if is_empty_value(&other) => None,
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use formwork_domain::{FieldPath, FormSchema, SearchFilter};
    use serde_json::{Value, json};

    use super::AdvancedSearch;

    fn schema() -> FormSchema {
        FormSchema::from_json(json!([
            {"name": "name", "type": "text", "isSearchable": true, "required": true},
            {
                "name": "status",
                "type": "dropdown",
                "isSearchable": true,
                "options": [{"label": "Active", "value": "active"}]
            },
            {"name": "graduated", "type": "switch", "isSearchable": true},
            {"name": "notes", "type": "textarea"},
            {"name": "photo", "type": "file", "isSearchable": true},
            {
                "name": "contacts",
                "type": "group",
                "nestedType": "array",
                "isSearchable": true,
                "arrayMinItems": 1,
                "fields": [{"name": "phone", "type": "text", "isSearchable": true}]
            }
        ]))
        .unwrap_or_else(|_| unreachable!())
    }

    fn open_search() -> AdvancedSearch {
        AdvancedSearch::new(&schema(), "students").unwrap_or_else(|_| unreachable!())
    }

    fn path(value: &str) -> FieldPath {
        FieldPath::parse(value).unwrap_or_else(|_| unreachable!())
    }

    fn filter(value: Value) -> SearchFilter {
        SearchFilter::from_map(serde_json::from_value(value).unwrap_or_else(|_| unreachable!()))
    }

    #[test]
    fn only_searchable_fields_are_offered() {
        let search = open_search();

        assert_eq!(
            search.schema().field_names(),
            vec!["name", "status", "graduated", "contacts"]
        );
        assert!(search.schema().find("name").is_some_and(|field| !field.required()));
        assert!(
            search
                .session()
                .state()
                .array(&path("contacts"))
                .is_some_and(|array| array.is_empty())
        );
    }

    #[test]
    fn apply_keeps_entered_values_only() {
        let mut search = open_search();
        let session = search.session_mut();
        session
            .set_value(&path("status"), json!("active"))
            .unwrap_or_else(|_| unreachable!());
        session
            .insert_item(&path("contacts"))
            .unwrap_or_else(|_| unreachable!());
        session
            .set_value(&path("contacts.0.phone"), json!("0912"))
            .unwrap_or_else(|_| unreachable!());

        let applied = search.apply();

        assert_eq!(
            Value::Object(applied.into_map()),
            json!({"status": "active", "contacts": [{"phone": "0912"}]})
        );
    }

    #[test]
    fn stale_keys_are_dropped_when_a_filter_is_loaded() {
        let mut search = open_search();

        let loaded = search
            .apply_filters(filter(json!({"status": "active", "classCode": "7A"})))
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(Value::Object(loaded.into_map()), json!({"status": "active"}));
        assert_eq!(
            search.session().state().value(&path("status")),
            Some(&json!("active"))
        );
        assert_eq!(search.apply().len(), 1);
    }

    #[test]
    fn a_false_toggle_is_a_filter_and_an_untouched_one_is_not() {
        let mut search = open_search();
        assert!(search.apply().is_empty());

        let loaded = search
            .apply_filters(filter(json!({"graduated": false})))
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(Value::Object(loaded.into_map()), json!({"graduated": false}));
        assert_eq!(
            search.session().state().value(&path("graduated")),
            Some(&json!(false))
        );

        search
            .session_mut()
            .set_value(&path("graduated"), json!(false))
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(
            Value::Object(search.apply().into_map()),
            json!({"graduated": false})
        );

        search.clear().unwrap_or_else(|_| unreachable!());
        assert_eq!(search.session().state().value(&path("graduated")), Some(&Value::Null));
        assert!(search.apply().is_empty());
    }

    #[test]
    fn clear_after_apply_yields_an_empty_filter() {
        let mut search = open_search();
        search
            .apply_filters(filter(json!({"status": "active"})))
            .unwrap_or_else(|_| unreachable!());

        let cleared = search.clear().unwrap_or_else(|_| unreachable!());

        assert!(cleared.is_empty());
        assert_eq!(serde_json::to_value(&cleared).ok(), Some(json!({})));
        assert!(search.apply().is_empty());
        assert!(search.applied().is_empty());
    }
}
