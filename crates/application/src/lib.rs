//! Form engine services and ports.

#![forbid(unsafe_code)]

mod advanced_search;
mod field_renderer;
mod form_engine;
mod form_ports;
mod form_session;
mod import_text;
mod options_resolver;
mod record_service;
mod repeating_group;
mod upload_pipeline;
mod validation_rules;

#[cfg(test)]
mod test_support;

pub use advanced_search::AdvancedSearch;
pub use field_renderer::{
    Control, FormMode, RenderContext, RepeaterItem, SelectStyle, Widget, is_disabled,
    render_field, render_fields,
};
pub use form_engine::{FormEngine, LookupResponse};
pub use form_ports::{
    CrudApi, FileUpload, ListQuery, LookupApi, OptionsLookupRequest, RecordWrite, UploadApi,
    UploadProgress, UploadTarget,
};
pub use form_session::FormSession;
pub use import_text::{latin_digits, parse_import_text};
pub use options_resolver::{LookupOutcome, OptionSlot, OptionsResolver, PendingLookup};
pub use record_service::{RecordListState, RecordService};
pub use repeating_group::{
    PendingRemoval, RemovalConfirmation, can_insert, can_remove, insert_at_top, remove_at,
    toggle_expanded,
};
pub use upload_pipeline::{
    ProgressBoard, UploadBatch, UploadFailure, UploadPipeline, UploadProgressEntry, accumulate,
    validate_file,
};
pub use validation_rules::{
    FieldErrors, FieldRules, PatternRule, RuleBook, clear_errors_under, push_error,
};
