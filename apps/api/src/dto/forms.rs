use std::collections::BTreeMap;

use formwork_application::Control;
use formwork_domain::{Entity, FieldDefinition};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ts_rs::TS;

mod conversions;

/// Incoming payload opening a form session.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/open-form-request.ts"
)]
pub struct OpenFormRequest {
    #[ts(type = "Array<Record<string, unknown>>")]
    pub schema: Vec<FieldDefinition>,
    /// Record to edit; a new record is created when absent.
    #[serde(default)]
    #[ts(type = "Record<string, unknown> | null")]
    pub record: Option<Entity>,
}

/// Sets one field value.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/set-value-request.ts"
)]
pub struct SetValueRequest {
    pub path: String,
    #[ts(type = "unknown")]
    pub value: Value,
}

/// Chooses the discriminant of a composite field.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/select-discriminant-request.ts"
)]
pub struct SelectDiscriminantRequest {
    pub path: String,
    pub value: String,
}

/// Names a repeating group or one of its items.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/item-path-request.ts"
)]
pub struct ItemPathRequest {
    pub path: String,
}

/// Asks to remove one item of a repeating group.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/removal-request.ts"
)]
pub struct RemovalRequest {
    pub path: String,
    pub index: usize,
}

/// Autocomplete search text typed into a lookup field.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/option-search-request.ts"
)]
pub struct OptionSearchRequest {
    pub path: String,
    pub query: String,
}

/// Pasted multi-line text for a repeating group.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/import-text-request.ts"
)]
pub struct ImportTextRequest {
    pub path: String,
    pub text: String,
}

/// Removes one stored attachment from a file field.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/delete-file-request.ts"
)]
pub struct DeleteFileRequest {
    pub path: String,
    pub filename: String,
}

/// Query string of the upload progress route.
#[derive(Debug, Deserialize)]
pub struct UploadProgressQuery {
    #[serde(default)]
    pub field: String,
}

/// Rendered state of one form session.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/form-view-response.ts"
)]
pub struct FormViewResponse {
    pub session_id: String,
    pub collection: String,
    pub mode: String,
    pub record_id: Option<String>,
    #[ts(type = "Array<Record<string, unknown>>")]
    pub controls: Vec<Control>,
    pub errors: BTreeMap<String, Vec<String>>,
    pub pending_removal: Option<PendingRemovalResponse>,
    #[ts(type = "Record<string, unknown>")]
    pub payload: Map<String, Value>,
}

/// Item removal awaiting confirmation.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/pending-removal-response.ts"
)]
pub struct PendingRemovalResponse {
    pub path: String,
    pub index: usize,
}

/// Form view after an action that may be refused.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/form-action-response.ts"
)]
pub struct FormActionResponse {
    /// Whether the action changed the form.
    pub applied: bool,
    pub form: FormViewResponse,
}

/// Outcome of a paste import.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/import-text-response.ts"
)]
pub struct ImportTextResponse {
    pub imported: usize,
    pub form: FormViewResponse,
}

/// Stored file descriptor.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/uploaded-file-response.ts"
)]
pub struct UploadedFileResponse {
    pub original_name: String,
    pub filename: String,
    pub filepath: String,
    #[ts(type = "number")]
    pub size: u64,
    pub content_type: String,
    pub uploaded_at: String,
}

/// File rejected or failed during an upload batch.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/upload-failure-response.ts"
)]
pub struct UploadFailureResponse {
    pub file_name: String,
    pub message: String,
}

/// Outcome of one upload batch.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/upload-batch-response.ts"
)]
pub struct UploadBatchResponse {
    pub uploaded: Vec<UploadedFileResponse>,
    pub failures: Vec<UploadFailureResponse>,
    pub form: FormViewResponse,
}

/// Progress of one in-flight upload.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/upload-progress-response.ts"
)]
pub struct UploadProgressResponse {
    pub id: String,
    pub field: String,
    pub file_name: String,
    pub percent: u8,
}
