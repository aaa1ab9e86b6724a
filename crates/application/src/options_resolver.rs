use std::collections::BTreeMap;
use std::time::Duration;

use formwork_core::AppResult;
use formwork_domain::{FieldPath, OptionItem};
use tokio::time::Instant;

use crate::form_ports::OptionsLookupRequest;

/// Lookup issued by the resolver and not yet applied.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingLookup {
    /// Field the options belong to.
    pub path: FieldPath,
    /// Issue number; only the latest one per field is applied.
    pub generation: u64,
    /// Request to send.
    pub request: OptionsLookupRequest,
}

/// Result of handing a lookup response to the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    /// The response was the latest for its field.
    Applied,
    /// A newer request superseded it, or the field no longer exists.
    Discarded,
}

/// Option list and request bookkeeping for one field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionSlot {
    options: Vec<OptionItem>,
    latest: u64,
    loading: bool,
    error: Option<String>,
    fetched_at: Option<Instant>,
}

impl OptionSlot {
    /// Returns the current options.
    #[must_use]
    pub fn options(&self) -> &[OptionItem] {
        &self.options
    }

    /// Returns whether a request is in flight.
    #[must_use]
    pub fn loading(&self) -> bool {
        self.loading
    }

    /// Returns the last lookup failure.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Per-field option sets with last-request-wins application.
///
/// Every issued lookup gets a fresh generation number. A response is applied
/// only while its generation is still the latest one recorded for the field.
#[derive(Debug, Clone, Default)]
pub struct OptionsResolver {
    slots: BTreeMap<FieldPath, OptionSlot>,
    in_flight: BTreeMap<u64, FieldPath>,
    next_generation: u64,
}

impl OptionsResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot for `path`.
    #[must_use]
    pub fn slot(&self, path: &FieldPath) -> Option<&OptionSlot> {
        self.slots.get(path)
    }

    /// Returns the options for `path`, empty when none were resolved.
    #[must_use]
    pub fn options(&self, path: &FieldPath) -> &[OptionItem] {
        self.slots
            .get(path)
            .map(OptionSlot::options)
            .unwrap_or_default()
    }

    /// Records a new request for `path`, superseding any in flight.
    pub fn begin(&mut self, path: FieldPath, request: OptionsLookupRequest) -> PendingLookup {
        self.next_generation += 1;
        let generation = self.next_generation;

        let slot = self.slots.entry(path.clone()).or_default();
        slot.latest = generation;
        slot.loading = true;
        self.in_flight.insert(generation, path.clone());

        PendingLookup {
            path,
            generation,
            request,
        }
    }

    /// Clears the options of `path` and makes any in-flight response stale.
    pub fn invalidate(&mut self, path: &FieldPath) {
        self.next_generation += 1;
        let slot = self.slots.entry(path.clone()).or_default();
        slot.latest = self.next_generation;
        slot.options.clear();
        slot.loading = false;
        slot.error = None;
    }

    /// Applies a lookup response if it is still the latest for its field.
    /// Failures leave the field with no options.
    pub fn apply(&mut self, generation: u64, result: AppResult<Vec<OptionItem>>) -> LookupOutcome {
        let Some(path) = self.in_flight.remove(&generation) else {
            return LookupOutcome::Discarded;
        };

        let Some(slot) = self.slots.get_mut(&path) else {
            return LookupOutcome::Discarded;
        };

        if slot.latest != generation {
            tracing::debug!(
                path = %path,
                generation,
                latest = slot.latest,
                "discarded stale options response"
            );
            return LookupOutcome::Discarded;
        }

        slot.loading = false;
        slot.fetched_at = Some(Instant::now());
        match result {
            Ok(options) => {
                slot.options = options;
                slot.error = None;
            }
            Err(error) => {
                tracing::warn!(path = %path, error = %error, "options lookup failed");
                slot.options.clear();
                slot.error = Some(error.to_string());
            }
        }

        LookupOutcome::Applied
    }

    /// Returns whether a polled field is due for another lookup.
    #[must_use]
    pub fn refresh_due(&self, path: &FieldPath, interval: Duration, now: Instant) -> bool {
        match self.slots.get(path) {
            Some(slot) if slot.loading => false,
            Some(OptionSlot {
                fetched_at: Some(fetched_at),
                ..
            }) => now.saturating_duration_since(*fetched_at) >= interval,
            _ => true,
        }
    }

    /// Moves slots of items under `array_path` after an insert at `index`.
    pub fn shift_after_insert(&mut self, array_path: &FieldPath, index: usize) {
        self.remap(array_path, |item| Some(if item >= index { item + 1 } else { item }));
    }

    /// Drops slots of the removed item and moves the ones after it.
    pub fn shift_after_remove(&mut self, array_path: &FieldPath, index: usize) {
        self.remap(array_path, |item| match item.cmp(&index) {
            std::cmp::Ordering::Less => Some(item),
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => Some(item - 1),
        });
    }

    /// Forgets every slot and in-flight request.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.in_flight.clear();
    }

    fn remap(&mut self, array_path: &FieldPath, map_index: impl Fn(usize) -> Option<usize>) {
        let rewrite = |path: &FieldPath| -> Option<Option<FieldPath>> {
            let index = path.item_index_under(array_path)?;
            Some(
                map_index(index).and_then(|new_index| path.with_item_index(array_path, new_index)),
            )
        };

        let slots = std::mem::take(&mut self.slots);
        for (path, slot) in slots {
            match rewrite(&path) {
                None => {
                    self.slots.insert(path, slot);
                }
                Some(Some(moved)) => {
                    self.slots.insert(moved, slot);
                }
                Some(None) => {}
            }
        }

        self.in_flight.retain(|_, path| match rewrite(path) {
            None => true,
            Some(Some(moved)) => {
                *path = moved;
                true
            }
            Some(None) => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use formwork_core::AppError;
    use formwork_domain::{FieldPath, OptionItem};
    use serde_json::Map;

    use super::{LookupOutcome, OptionsResolver};
    use crate::form_ports::OptionsLookupRequest;

    fn path(value: &str) -> FieldPath {
        FieldPath::parse(value).unwrap_or_else(|_| unreachable!())
    }

    fn request() -> OptionsLookupRequest {
        OptionsLookupRequest {
            collection_name: "cities".to_owned(),
            label_field: "name".to_owned(),
            label_field2: None,
            label_field3: None,
            value_field: "_id".to_owned(),
            custom_label: None,
            filter_query: Map::new(),
            sort_field: None,
            sort_order: None,
            limit: None,
            query: None,
        }
    }

    #[test]
    fn only_the_latest_request_is_applied() {
        let mut resolver = OptionsResolver::new();
        let tehran = resolver.begin(path("city"), request());
        let isfahan = resolver.begin(path("city"), request());

        let late = resolver.apply(
            isfahan.generation,
            Ok(vec![OptionItem::new("Kashan", "kashan")]),
        );
        let stale = resolver.apply(tehran.generation, Ok(vec![OptionItem::new("Rey", "rey")]));

        assert_eq!(late, LookupOutcome::Applied);
        assert_eq!(stale, LookupOutcome::Discarded);
        assert_eq!(resolver.options(&path("city"))[0].label, "Kashan");
    }

    #[tokio::test]
    async fn invalidation_discards_the_in_flight_response() {
        let mut resolver = OptionsResolver::new();
        let pending = resolver.begin(path("city"), request());
        resolver.invalidate(&path("city"));

        let outcome = resolver.apply(pending.generation, Ok(vec![OptionItem::new("Rey", "rey")]));

        assert_eq!(outcome, LookupOutcome::Discarded);
        assert!(resolver.options(&path("city")).is_empty());
    }

    #[tokio::test]
    async fn failures_leave_no_stale_options() {
        let mut resolver = OptionsResolver::new();
        let first = resolver.begin(path("city"), request());
        resolver.apply(first.generation, Ok(vec![OptionItem::new("Rey", "rey")]));

        let second = resolver.begin(path("city"), request());
        resolver.apply(second.generation, Err(AppError::Network("timeout".to_owned())));

        let slot = resolver.slot(&path("city")).unwrap_or_else(|| unreachable!());
        assert!(slot.options().is_empty());
        assert!(slot.error().is_some());
    }

    #[tokio::test]
    async fn in_flight_lookups_follow_their_item_when_rows_shift() {
        let mut resolver = OptionsResolver::new();
        let pending = resolver.begin(path("addresses.0.city"), request());

        resolver.shift_after_insert(&path("addresses"), 0);
        let outcome = resolver.apply(pending.generation, Ok(vec![OptionItem::new("Rey", "rey")]));

        assert_eq!(outcome, LookupOutcome::Applied);
        assert_eq!(resolver.options(&path("addresses.1.city")).len(), 1);
        assert!(resolver.options(&path("addresses.0.city")).is_empty());

        resolver.shift_after_remove(&path("addresses"), 1);
        assert!(resolver.slot(&path("addresses.1.city")).is_none());
    }
}
