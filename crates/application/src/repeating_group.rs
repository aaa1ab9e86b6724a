use formwork_core::{AppError, AppResult};
use formwork_domain::{ArrayNode, FieldPath, FieldSchema, FormState, Nesting, seed_scope};

/// Returns the cardinality bounds of a repeating group.
fn bounds(field: &FieldSchema) -> AppResult<(usize, Option<usize>)> {
    match field.nesting() {
        Some(Nesting::Array {
            min_items,
            max_items,
        }) => Ok((min_items.unwrap_or(0), max_items)),
        _ => Err(AppError::Validation(format!(
            "field '{}' is not a repeating group",
            field.path()
        ))),
    }
}

/// Returns whether another item may be added.
#[must_use]
pub fn can_insert(field: &FieldSchema, count: usize) -> bool {
    bounds(field).is_ok_and(|(_, max)| max.is_none_or(|max| count < max))
}

/// Returns whether an item may be removed.
#[must_use]
pub fn can_remove(field: &FieldSchema, count: usize) -> bool {
    bounds(field).is_ok_and(|(min, _)| count > min)
}

fn array_mut<'a>(state: &'a mut FormState, path: &FieldPath) -> AppResult<&'a mut ArrayNode> {
    state
        .array_mut(path)
        .ok_or_else(|| AppError::Validation(format!("path '{path}' is not a repeating group")))
}

/// Inserts a new item at the top, seeded from child defaults.
///
/// Returns `false` without changing anything when the maximum is reached.
pub fn insert_at_top(
    state: &mut FormState,
    field: &FieldSchema,
    path: &FieldPath,
) -> AppResult<bool> {
    bounds(field)?;
    let array = array_mut(state, path)?;
    if !can_insert(field, array.len()) {
        return Ok(false);
    }

    array.insert(0, seed_scope(field.fields()));
    Ok(true)
}

/// Removes the item at `index`.
///
/// Returns `false` without changing anything when the minimum would be
/// violated or the index is out of range.
pub fn remove_at(
    state: &mut FormState,
    field: &FieldSchema,
    path: &FieldPath,
    index: usize,
) -> AppResult<bool> {
    bounds(field)?;
    let array = array_mut(state, path)?;
    if index >= array.len() || !can_remove(field, array.len()) {
        return Ok(false);
    }

    Ok(array.remove(index).is_some())
}

/// Flips the expand/collapse flag and returns the new value.
pub fn toggle_expanded(state: &mut FormState, path: &FieldPath) -> AppResult<bool> {
    let array = array_mut(state, path)?;
    let expanded = !array.expanded();
    array.set_expanded(expanded);
    Ok(expanded)
}

/// Item removal waiting for confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRemoval {
    /// Repeating group path.
    pub array: FieldPath,
    /// Item index.
    pub index: usize,
}

/// Two-step item deletion: a request must be confirmed before the item goes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalConfirmation {
    pending: Option<PendingRemoval>,
}

impl RemovalConfirmation {
    /// Returns the removal awaiting confirmation.
    #[must_use]
    pub fn pending(&self) -> Option<&PendingRemoval> {
        self.pending.as_ref()
    }

    /// Returns whether `index` of `array` awaits confirmation.
    #[must_use]
    pub fn is_pending(&self, array: &FieldPath, index: usize) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|pending| &pending.array == array && pending.index == index)
    }

    /// Starts confirming a removal, replacing any earlier request.
    pub fn request(&mut self, array: FieldPath, index: usize) {
        self.pending = Some(PendingRemoval { array, index });
    }

    /// Accepts the pending removal.
    pub fn confirm(&mut self) -> Option<PendingRemoval> {
        self.pending.take()
    }

    /// Drops the pending removal.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Keeps the pending removal pointing at the same item after an insert
    /// into `array`, including removals inside items of `array`.
    pub fn shift_after_insert(&mut self, array: &FieldPath, index: usize) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };

        if &pending.array == array {
            if pending.index >= index {
                pending.index += 1;
            }
        } else if let Some(item) = pending.array.item_index_under(array)
            && item >= index
            && let Some(moved) = pending.array.with_item_index(array, item + 1)
        {
            pending.array = moved;
        }
    }
}
