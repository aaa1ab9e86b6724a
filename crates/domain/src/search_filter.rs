use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::value::is_empty_value;

/// Structured filter object keyed by top-level field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchFilter(Map<String, Value>);

impl SearchFilter {
    /// Returns an empty filter.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wraps an object, dropping missing values.
    #[must_use]
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(
            map.into_iter()
                .filter(|(_, value)| !is_empty_value(value))
                .collect(),
        )
    }

    /// Returns whether the filter constrains nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of constrained keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns the filter entries.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Returns a filter restricted to the given keys.
    #[must_use]
    pub fn retain_keys(&self, keys: &[&str]) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(key, _)| keys.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }

    /// Overlays `scope` on top of this filter; scope keys always win.
    #[must_use]
    pub fn scoped_by(&self, scope: &SearchFilter) -> Self {
        let mut merged = self.0.clone();
        for (key, value) in &scope.0 {
            merged.insert(key.clone(), value.clone());
        }
        Self(merged)
    }

    /// Counts keys that `scope` does not fix.
    #[must_use]
    pub fn count_beyond(&self, scope: &SearchFilter) -> usize {
        self.0.keys().filter(|key| !scope.0.contains_key(*key)).count()
    }

    /// Consumes the filter into its map.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}
