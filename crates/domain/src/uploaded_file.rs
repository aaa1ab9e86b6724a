use chrono::{DateTime, Utc};
use formwork_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stored-file descriptor returned by the upload API.
///
/// Newly uploaded files and files loaded from an existing record share this
/// representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    /// Name the user picked.
    pub original_name: String,
    /// Stored name, unique per storage.
    pub filename: String,
    /// Storage path or public URL.
    #[serde(alias = "path")]
    pub filepath: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
    /// MIME type.
    #[serde(rename = "type", default)]
    pub content_type: String,
    /// Upload timestamp.
    #[serde(default)]
    pub uploaded_at: DateTime<Utc>,
}

/// Reads the attachments held by a file field value.
///
/// Accepts `null`, a single descriptor or a list of descriptors.
pub fn attachments_from_value(value: &Value) -> AppResult<Vec<UploadedFile>> {
    let parse = |item: &Value| {
        serde_json::from_value::<UploadedFile>(item.clone()).map_err(|error| {
            AppError::Validation(format!("invalid stored file descriptor: {error}"))
        })
    };

    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(text) if text.is_empty() => Ok(Vec::new()),
        Value::Array(items) => items.iter().map(parse).collect(),
        Value::Object(_) => Ok(vec![parse(value)?]),
        other => Err(AppError::Validation(format!(
            "file field holds a non-file value '{other}'"
        ))),
    }
}

/// Builds the value a file field stores for its attachments.
///
/// Single-file fields hold the one descriptor, or `null` once cleared.
pub fn attachments_to_value(files: &[UploadedFile], multiple: bool) -> AppResult<Value> {
    let encode = |file: &UploadedFile| {
        serde_json::to_value(file).map_err(|error| {
            AppError::Internal(format!("failed to encode file descriptor: {error}"))
        })
    };

    if multiple {
        return files
            .iter()
            .map(encode)
            .collect::<AppResult<Vec<_>>>()
            .map(Value::Array);
    }

    match files.last() {
        Some(file) => encode(file),
        None => Ok(Value::Null),
    }
}
