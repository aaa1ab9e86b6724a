use std::sync::Arc;
use std::time::Duration;

use formwork_core::{AppError, AppResult};
use formwork_domain::{
    ArrayNode, DataSource, Entity, FieldPath, FieldSchema, FieldType, FileConfig, FormSchema,
    FormState, Nesting, OptionItem, SearchFilter, StateNode, UploadedFile, attachments_from_value,
    attachments_to_value, is_empty_value,
};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::field_renderer::{
    Control, DEFAULT_MIN_SEARCH_LENGTH, FormMode, RenderContext, is_disabled, render_fields,
};
use crate::form_ports::{OptionsLookupRequest, UploadTarget};
use crate::import_text::parse_import_text;
use crate::options_resolver::{LookupOutcome, OptionsResolver, PendingLookup};
use crate::repeating_group::{
    RemovalConfirmation, can_remove, insert_at_top, remove_at, toggle_expanded,
};
use crate::upload_pipeline::accumulate;
use crate::validation_rules::{FieldErrors, RuleBook, clear_errors_under, push_error};

/// One open form: schema, live values, option sets and field messages.
///
/// Lookups are queued rather than performed; the caller drains them with
/// [`FormSession::drain_lookups`], runs them, and hands each response back
/// through [`FormSession::apply_lookup`]. Only the latest request per field
/// is ever applied.
#[derive(Debug)]
pub struct FormSession {
    id: Uuid,
    schema: Arc<FormSchema>,
    collection: String,
    record_id: Option<String>,
    mode: FormMode,
    rules: RuleBook,
    state: FormState,
    resolver: OptionsResolver,
    errors: FieldErrors,
    removal: RemovalConfirmation,
    pending: Vec<PendingLookup>,
    cancel: CancellationToken,
}

impl FormSession {
    /// Opens a form for a new record, or for editing `existing`.
    pub fn open(
        schema: Arc<FormSchema>,
        collection: impl Into<String>,
        existing: Option<&Entity>,
    ) -> AppResult<Self> {
        let (state, mode) = match existing {
            Some(entity) => (FormState::hydrate(&schema, &entity.data)?, FormMode::Edit),
            None => (FormState::empty(&schema), FormMode::Create),
        };
        let record_id = existing.map(|entity| entity.id.clone());

        Self::build(schema, collection.into(), record_id, mode, state)
    }

    /// Opens a search form seeded from an applied filter.
    ///
    /// Toggles the filter does not mention start unset, so both `true` and
    /// `false` stay selectable as constraints.
    pub fn open_search(
        schema: Arc<FormSchema>,
        collection: impl Into<String>,
        filter: &SearchFilter,
    ) -> AppResult<Self> {
        let mut state = FormState::hydrate(&schema, filter.as_map())?;
        unset_toggles(schema.fields(), &FieldPath::root(), filter.as_map(), &mut state)?;
        Self::build(schema, collection.into(), None, FormMode::Search, state)
    }

    fn build(
        schema: Arc<FormSchema>,
        collection: String,
        record_id: Option<String>,
        mode: FormMode,
        state: FormState,
    ) -> AppResult<Self> {
        let rules = RuleBook::derive(&schema)?;
        let mut session = Self {
            id: Uuid::new_v4(),
            schema: Arc::clone(&schema),
            collection,
            record_id,
            mode,
            rules,
            state,
            resolver: OptionsResolver::new(),
            errors: FieldErrors::new(),
            removal: RemovalConfirmation::default(),
            pending: Vec::new(),
            cancel: CancellationToken::new(),
        };

        session.mount_lookups(schema.fields(), &FieldPath::root())?;
        Ok(session)
    }

    /// Returns the id the form is addressed by.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the schema.
    #[must_use]
    pub fn schema(&self) -> &Arc<FormSchema> {
        &self.schema
    }

    /// Returns the collection the record belongs to.
    #[must_use]
    pub fn collection(&self) -> &str {
        self.collection.as_str()
    }

    /// Returns the id of the record being edited.
    #[must_use]
    pub fn record_id(&self) -> Option<&str> {
        self.record_id.as_deref()
    }

    /// Returns why the form is open.
    #[must_use]
    pub fn mode(&self) -> FormMode {
        self.mode
    }

    /// Returns the live values.
    #[must_use]
    pub fn state(&self) -> &FormState {
        &self.state
    }

    /// Returns the resolved option sets.
    #[must_use]
    pub fn options(&self) -> &OptionsResolver {
        &self.resolver
    }

    /// Returns the field messages keyed by state path.
    #[must_use]
    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    /// Returns the item removal awaiting confirmation.
    #[must_use]
    pub fn removal(&self) -> &RemovalConfirmation {
        &self.removal
    }

    /// Returns the token cancelled when the form closes.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Returns whether the form was closed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Sets one field and re-resolves every field that depends on it.
    pub fn set_value(&mut self, path: &FieldPath, value: Value) -> AppResult<()> {
        let schema = Arc::clone(&self.schema);
        let field = schema.resolve(path)?;
        self.ensure_editable(field, path)?;
        match field.field_type() {
            FieldType::Label => {
                return Err(AppError::Validation(format!(
                    "field '{path}' is a label and holds no value"
                )));
            }
            FieldType::File => {
                return Err(AppError::Validation(format!(
                    "file field '{path}' changes through uploads"
                )));
            }
            _ => {}
        }

        self.state.set_value(path, value)?;
        self.errors.remove(&path.to_string());
        self.propagate(&schema, path)
    }

    /// Selects a composite branch. Values of other branches are kept.
    ///
    /// Returns whether the branch was visited for the first time.
    pub fn select_discriminant(&mut self, path: &FieldPath, value: &str) -> AppResult<bool> {
        let schema = Arc::clone(&self.schema);
        let field = schema.resolve(path)?;
        let Some(config) = field.composite() else {
            return Err(AppError::Validation(format!(
                "field '{path}' is not a composite"
            )));
        };
        self.ensure_editable(field, path)?;

        let item = config.item(value).ok_or_else(|| {
            AppError::Validation(format!("composite '{path}' has no branch '{value}'"))
        })?;
        let node = self
            .state
            .composite_mut(path)
            .ok_or_else(|| AppError::Schema(format!("field '{path}' has no form state")))?;

        let first_visit = node.select(item);
        clear_errors_under(&mut self.errors, &path.to_string());
        if first_visit {
            self.mount_lookups(item.fields(), &path.child(item.value()))?;
        }

        Ok(first_visit)
    }

    /// Adds an item at the top of a repeating group.
    ///
    /// Returns `false` when the group is already at its maximum.
    pub fn insert_item(&mut self, path: &FieldPath) -> AppResult<bool> {
        let schema = Arc::clone(&self.schema);
        let field = array_field(&schema, path)?;
        self.ensure_editable(field, path)?;

        if !insert_at_top(&mut self.state, field, path)? {
            return Ok(false);
        }

        self.resolver.shift_after_insert(path, 0);
        self.removal.shift_after_insert(path, 0);
        self.remap_errors(path, |item| Some(item + 1));
        self.mount_lookups(field.fields(), &path.item(0))?;
        self.recheck_count(field, path);
        Ok(true)
    }

    /// Asks for confirmation before removing an item.
    ///
    /// Returns `false` when the item may not be removed.
    pub fn request_removal(&mut self, path: &FieldPath, index: usize) -> AppResult<bool> {
        let schema = Arc::clone(&self.schema);
        let field = array_field(&schema, path)?;
        self.ensure_editable(field, path)?;

        let count = self.state.array(path).map_or(0, ArrayNode::len);
        if index >= count || !can_remove(field, count) {
            return Ok(false);
        }

        self.removal.request(path.clone(), index);
        Ok(true)
    }

    /// Removes the item awaiting confirmation.
    pub fn confirm_removal(&mut self) -> AppResult<bool> {
        let Some(pending) = self.removal.confirm() else {
            return Ok(false);
        };

        let schema = Arc::clone(&self.schema);
        let field = array_field(&schema, &pending.array)?;
        if !remove_at(&mut self.state, field, &pending.array, pending.index)? {
            return Ok(false);
        }

        self.resolver.shift_after_remove(&pending.array, pending.index);
        let removed = pending.index;
        self.remap_errors(&pending.array, |item| match item.cmp(&removed) {
            std::cmp::Ordering::Less => Some(item),
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => Some(item - 1),
        });
        self.recheck_count(field, &pending.array);
        Ok(true)
    }

    /// Drops the removal awaiting confirmation.
    pub fn cancel_removal(&mut self) {
        self.removal.cancel();
    }

    /// Flips a repeating group between expanded and collapsed.
    pub fn toggle_expanded(&mut self, path: &FieldPath) -> AppResult<bool> {
        array_field(&self.schema, path)?;
        toggle_expanded(&mut self.state, path)
    }

    /// Queues an autocomplete search.
    ///
    /// Queries shorter than the field's minimum length clear the options
    /// without a request. Returns whether a lookup was queued.
    pub fn search_options(&mut self, path: &FieldPath, query: &str) -> AppResult<bool> {
        let schema = Arc::clone(&self.schema);
        let field = schema.resolve(path)?;
        let source = match (field.field_type(), field.data_source()) {
            (FieldType::Autocomplete | FieldType::AutocompleteText, Some(source)) => source,
            _ => {
                return Err(AppError::Validation(format!(
                    "field '{path}' does not search options"
                )));
            }
        };

        let query = query.trim();
        let min_length = field
            .autocomplete()
            .min_length
            .unwrap_or(DEFAULT_MIN_SEARCH_LENGTH);
        if query.chars().count() < min_length {
            self.resolver.invalidate(path);
            return Ok(false);
        }

        let Some(scope) = self.dependency_scope(source, path) else {
            self.resolver.invalidate(path);
            return Ok(false);
        };

        let request = OptionsLookupRequest::from_data_source(source, scope, Some(query.to_owned()));
        let pending = self.resolver.begin(path.clone(), request);
        self.pending.push(pending);
        Ok(true)
    }

    /// Replaces an import field's rows with pasted text. Returns the row count.
    pub fn paste_import_text(&mut self, path: &FieldPath, text: &str) -> AppResult<usize> {
        let schema = Arc::clone(&self.schema);
        let field = schema.resolve(path)?;
        if field.field_type() != FieldType::ImportText {
            return Err(AppError::Validation(format!(
                "field '{path}' does not accept pasted rows"
            )));
        }
        self.ensure_editable(field, path)?;

        let rows = parse_import_text(field.import_text(), text);
        let count = rows.len();
        self.state
            .set_value(path, Value::Array(rows.into_iter().map(Value::Object).collect()))?;
        clear_errors_under(&mut self.errors, &path.to_string());
        Ok(count)
    }

    /// Takes every lookup queued since the last call.
    pub fn drain_lookups(&mut self) -> Vec<PendingLookup> {
        std::mem::take(&mut self.pending)
    }

    /// Hands a lookup response back. Superseded responses are dropped.
    pub fn apply_lookup(
        &mut self,
        generation: u64,
        result: AppResult<Vec<OptionItem>>,
    ) -> LookupOutcome {
        self.resolver.apply(generation, result)
    }

    /// Queues lookups for polled fields whose refresh interval elapsed.
    /// Returns the number queued.
    pub fn poll_refresh(&mut self, now: Instant) -> usize {
        let schema = Arc::clone(&self.schema);
        let mut bound = Vec::new();
        collect_bound(schema.fields(), &FieldPath::root(), &self.state, &mut bound);

        let mut queued = 0;
        for (field, path) in bound {
            let Some(source) = field.data_source() else {
                continue;
            };
            let Some(seconds) = source.refresh_interval.filter(|seconds| *seconds > 0) else {
                continue;
            };
            if !source.dependency_names().is_empty() || is_search_driven(field) {
                continue;
            }

            if self
                .resolver
                .refresh_due(&path, Duration::from_secs(seconds), now)
            {
                let request = OptionsLookupRequest::from_data_source(source, Map::new(), None);
                let pending = self.resolver.begin(path, request);
                self.pending.push(pending);
                queued += 1;
            }
        }

        queued
    }

    /// Renders the whole form.
    pub fn render(&self) -> AppResult<Vec<Control>> {
        render_fields(
            self.schema.fields(),
            RenderContext {
                state: &self.state,
                options: &self.resolver,
                errors: &self.errors,
                removal: &self.removal,
                mode: self.mode,
            },
        )
    }

    /// Checks every visible, editable field and annotates failures by path.
    pub fn validate(&mut self) -> AppResult<()> {
        let mut errors = FieldErrors::new();
        if self.mode != FormMode::Search {
            self.validate_scope(self.schema.fields(), &FieldPath::root(), &mut errors);
        }

        let failed = errors.len();
        self.errors = errors;
        if failed == 0 {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "{failed} field(s) need attention"
            )))
        }
    }

    /// Returns the upload constraints and multipart target for a file field.
    pub fn upload_target(&self, path: &FieldPath) -> AppResult<(FileConfig, UploadTarget)> {
        let field = file_field(&self.schema, path)?;
        self.ensure_editable(field, path)?;

        let config = field.file_config().clone();
        let target = UploadTarget {
            directory: config
                .directory
                .clone()
                .or_else(|| Some(self.collection.clone())),
            document_id: self.record_id.clone(),
            collection_name: Some(self.collection.clone()),
            field_name: Some(path.to_string()),
        };
        Ok((config, target))
    }

    /// Adds uploaded files to a file field: appended when the field takes
    /// several files, replacing otherwise.
    pub fn attach_files(&mut self, path: &FieldPath, uploaded: Vec<UploadedFile>) -> AppResult<()> {
        let schema = Arc::clone(&self.schema);
        let field = file_field(&schema, path)?;
        if uploaded.is_empty() {
            return Ok(());
        }

        let existing = self.attachments(path)?;
        let files = accumulate(existing, uploaded, field.is_multiple());
        self.state
            .set_value(path, attachments_to_value(&files, field.is_multiple())?)?;
        self.errors.remove(&path.to_string());
        Ok(())
    }

    /// Removes one attachment by stored name. Returns whether it was present.
    pub fn detach_file(&mut self, path: &FieldPath, filename: &str) -> AppResult<bool> {
        let schema = Arc::clone(&self.schema);
        let field = file_field(&schema, path)?;
        self.ensure_editable(field, path)?;

        let mut files = self.attachments(path)?;
        let before = files.len();
        files.retain(|file| file.filename != filename);
        if files.len() == before {
            return Ok(false);
        }

        self.state
            .set_value(path, attachments_to_value(&files, field.is_multiple())?)?;
        Ok(true)
    }

    /// Returns the attachments of a file field.
    pub fn attachments(&self, path: &FieldPath) -> AppResult<Vec<UploadedFile>> {
        let value = self
            .state
            .value(path)
            .ok_or_else(|| AppError::Validation(format!("path '{path}' is not part of the form")))?;
        attachments_from_value(value)
    }

    /// Attaches a message to a field, for failures of actions on it.
    pub fn report_error(&mut self, path: &FieldPath, message: impl Into<String>) {
        push_error(&mut self.errors, path.to_string(), message);
    }

    /// Builds the plain payload for the record API.
    #[must_use]
    pub fn payload(&self) -> Map<String, Value> {
        self.state.to_payload(self.schema.fields())
    }

    /// Closes the form: in-flight uploads are cancelled and late lookup
    /// responses are discarded.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.resolver.clear();
        self.pending.clear();
        self.removal.cancel();
    }

    fn ensure_editable(&self, field: &FieldSchema, path: &FieldPath) -> AppResult<()> {
        if self.cancel.is_cancelled() {
            return Err(AppError::Conflict("the form was closed".to_owned()));
        }

        if is_disabled(field, self.mode) {
            return Err(AppError::Validation(format!("field '{path}' is read-only")));
        }

        Ok(())
    }

    fn propagate(&mut self, schema: &FormSchema, changed: &FieldPath) -> AppResult<()> {
        let scope_path = changed.parent().unwrap_or_default();
        for affected in schema.dependency_graph().affected_by(&changed.schema_path()) {
            let Some(field) = schema.find(&affected) else {
                continue;
            };
            let target = scope_path.child(field.name());
            self.errors.remove(&target.to_string());
            self.resolve_options(field, &target, true)?;
        }

        Ok(())
    }

    fn mount_lookups(&mut self, fields: &[FieldSchema], scope_path: &FieldPath) -> AppResult<()> {
        let schema = Arc::clone(&self.schema);
        let order = schema.dependency_graph().order();
        let mut bound = Vec::new();
        collect_bound(fields, scope_path, &self.state, &mut bound);
        bound.sort_by_key(|(field, _)| {
            order
                .iter()
                .position(|candidate| candidate == field.path())
                .unwrap_or(usize::MAX)
        });

        for (field, path) in bound {
            self.resolve_options(field, &path, false)?;
        }

        Ok(())
    }

    /// Re-resolves one data-bound field. A missing dependency empties both
    /// the value and the options; `changed` also empties the value when
    /// every dependency is present.
    fn resolve_options(
        &mut self,
        field: &FieldSchema,
        path: &FieldPath,
        changed: bool,
    ) -> AppResult<()> {
        let Some(source) = field.data_source() else {
            return Ok(());
        };

        let Some(scope) = self.dependency_scope(source, path) else {
            self.state.set_value(path, field.empty_value())?;
            self.resolver.invalidate(path);
            return Ok(());
        };

        if changed {
            self.state.set_value(path, field.empty_value())?;
        }

        if is_search_driven(field) {
            self.resolver.invalidate(path);
            return Ok(());
        }

        let request = OptionsLookupRequest::from_data_source(source, scope, None);
        let pending = self.resolver.begin(path.clone(), request);
        self.pending.push(pending);
        Ok(())
    }

    /// Values of every dependency, or `None` when one of them is empty.
    fn dependency_scope(
        &self,
        source: &DataSource,
        path: &FieldPath,
    ) -> Option<Map<String, Value>> {
        let scope_path = path.parent().unwrap_or_default();
        let mut scope = Map::new();
        for name in source.dependency_names() {
            let value = self.state.value(&scope_path.child(name))?;
            if is_empty_value(value) {
                return None;
            }
            scope.insert(name.to_owned(), value.clone());
        }

        Some(scope)
    }

    fn recheck_count(&mut self, field: &FieldSchema, path: &FieldPath) {
        let key = path.to_string();
        self.errors.remove(&key);
        let count = self.state.array(path).map_or(0, ArrayNode::len);
        if let Some(message) = self
            .rules
            .rules_for(field.path())
            .and_then(|rules| rules.check_count(count))
        {
            push_error(&mut self.errors, key, message);
        }
    }

    fn remap_errors(&mut self, array: &FieldPath, map_index: impl Fn(usize) -> Option<usize>) {
        let errors = std::mem::take(&mut self.errors);
        for (key, messages) in errors {
            let moved = FieldPath::parse(&key)
                .ok()
                .and_then(|path| path.item_index_under(array).map(|index| (path, index)));
            match moved {
                Some((path, index)) => {
                    if let Some(moved) =
                        map_index(index).and_then(|next| path.with_item_index(array, next))
                    {
                        self.errors.insert(moved.to_string(), messages);
                    }
                }
                None => {
                    self.errors.insert(key, messages);
                }
            }
        }
    }

    fn validate_scope(
        &self,
        fields: &[FieldSchema],
        scope_path: &FieldPath,
        errors: &mut FieldErrors,
    ) {
        for field in fields {
            let path = scope_path.child(field.name());
            if !field.visible()
                || is_disabled(field, self.mode)
                || field.field_type() == FieldType::Label
            {
                continue;
            }

            let Some(node) = self.state.get(&path) else {
                continue;
            };
            let rules = self.rules.rules_for(field.path());

            match node {
                StateNode::Leaf(value) => {
                    for message in rules.map(|rules| rules.check_value(value)).unwrap_or_default() {
                        push_error(errors, path.to_string(), message);
                    }
                }
                StateNode::Group(_) => self.validate_scope(field.fields(), &path, errors),
                StateNode::Array(array) => {
                    if let Some(message) = rules.and_then(|rules| rules.check_count(array.len())) {
                        push_error(errors, path.to_string(), message);
                    }
                    for index in 0..array.len() {
                        self.validate_scope(field.fields(), &path.item(index), errors);
                    }
                }
                StateNode::Composite(composite) => {
                    let selected = composite
                        .selected()
                        .and_then(|value| field.composite().and_then(|config| config.item(value)));
                    match selected {
                        Some(item) => {
                            self.validate_scope(item.fields(), &path.child(item.value()), errors);
                        }
                        None => {
                            if let Some(message) = rules.and_then(|rules| rules.required()) {
                                push_error(errors, path.to_string(), message);
                            }
                        }
                    }
                }
            }
        }
    }
}

fn unset_toggles(
    fields: &[FieldSchema],
    scope_path: &FieldPath,
    data: &Map<String, Value>,
    state: &mut FormState,
) -> AppResult<()> {
    for field in fields {
        let path = scope_path.child(field.name());
        match (field.nesting(), data.get(field.name())) {
            (Some(Nesting::Object), Some(Value::Object(nested))) => {
                unset_toggles(field.fields(), &path, nested, state)?;
            }
            (Some(Nesting::Object), _) => {
                unset_toggles(field.fields(), &path, &Map::new(), state)?;
            }
            (None, None) if field.empty_value().is_boolean() => {
                state.set_value(&path, Value::Null)?;
            }
            _ => {}
        }
    }

    Ok(())
}

fn is_search_driven(field: &FieldSchema) -> bool {
    matches!(
        field.field_type(),
        FieldType::Autocomplete | FieldType::AutocompleteText
    )
}

fn array_field<'s>(schema: &'s FormSchema, path: &FieldPath) -> AppResult<&'s FieldSchema> {
    let field = schema.resolve(path)?;
    if field.is_array() {
        Ok(field)
    } else {
        Err(AppError::Validation(format!(
            "path '{path}' is not a repeating group"
        )))
    }
}

fn file_field<'s>(schema: &'s FormSchema, path: &FieldPath) -> AppResult<&'s FieldSchema> {
    let field = schema.resolve(path)?;
    if field.field_type() == FieldType::File {
        Ok(field)
    } else {
        Err(AppError::Validation(format!("field '{path}' is not a file field")))
    }
}

/// Collects every data-bound field at its concrete state path, walking array
/// items and visited composite branches.
fn collect_bound<'s>(
    fields: &'s [FieldSchema],
    scope_path: &FieldPath,
    state: &FormState,
    bound: &mut Vec<(&'s FieldSchema, FieldPath)>,
) {
    for field in fields {
        let path = scope_path.child(field.name());
        match field.nesting() {
            Some(Nesting::Object) => collect_bound(field.fields(), &path, state, bound),
            Some(Nesting::Array { .. }) => {
                let count = state.array(&path).map_or(0, ArrayNode::len);
                for index in 0..count {
                    collect_bound(field.fields(), &path.item(index), state, bound);
                }
            }
            None => {
                if let (Some(config), Some(node)) = (field.composite(), state.composite(&path)) {
                    for item in config.items() {
                        if node.visited(item.value()) {
                            collect_bound(item.fields(), &path.child(item.value()), state, bound);
                        }
                    }
                } else if field.data_source().is_some() {
                    bound.push((field, path));
                }
            }
        }
    }
}
