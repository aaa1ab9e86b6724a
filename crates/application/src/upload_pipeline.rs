use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use formwork_core::{AppError, AppResult};
use formwork_domain::{FileConfig, UploadedFile};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::form_ports::{FileUpload, UploadApi, UploadProgress, UploadTarget};

/// Checks a file against a field's upload constraints.
///
/// The error message names the file.
pub fn validate_file(config: &FileConfig, file: &FileUpload) -> Result<(), String> {
    if let Some(max) = config.max_size
        && file.size() > max
    {
        return Err(format!(
            "{}: file is too large ({} bytes, maximum {max} bytes)",
            file.file_name,
            file.size()
        ));
    }

    if config.allowed_types.is_empty() {
        return Ok(());
    }

    let content_type = effective_content_type(file);
    let extension = file
        .file_name
        .rsplit_once('.')
        .map(|(_, extension)| format!(".{}", extension.to_ascii_lowercase()));

    let allowed = config.allowed_types.iter().any(|allowed| {
        let allowed = allowed.trim().to_ascii_lowercase();
        if allowed.starts_with('.') {
            extension.as_deref() == Some(allowed.as_str())
        } else if let Some(prefix) = allowed.strip_suffix("/*") {
            content_type
                .split_once('/')
                .is_some_and(|(kind, _)| kind == prefix)
        } else {
            content_type == allowed
        }
    });

    if allowed {
        Ok(())
    } else {
        Err(format!(
            "{}: file type '{content_type}' is not allowed",
            file.file_name
        ))
    }
}

fn effective_content_type(file: &FileUpload) -> String {
    let declared = file.content_type.trim();
    if declared.is_empty() {
        mime_guess::from_path(&file.file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_owned()
    } else {
        declared.to_ascii_lowercase()
    }
}

/// Merges new uploads into a field's attachments: multi-file fields append,
/// single-file fields replace.
#[must_use]
pub fn accumulate(
    existing: Vec<UploadedFile>,
    uploaded: Vec<UploadedFile>,
    multiple: bool,
) -> Vec<UploadedFile> {
    if multiple {
        let mut files = existing;
        files.extend(uploaded);
        return files;
    }

    match uploaded.into_iter().last() {
        Some(file) => vec![file],
        None => existing,
    }
}

/// Progress of one in-flight upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgressEntry {
    /// Locally generated id.
    pub id: Uuid,
    /// Form session that started the upload.
    pub session: Uuid,
    /// Field path receiving the file.
    pub field: String,
    /// Original file name.
    pub file_name: String,
    /// Percentage, 0-100.
    pub percent: u8,
}

/// Shared progress entries keyed by upload id. Readers only see the entries
/// of their own form session.
#[derive(Debug, Clone, Default)]
pub struct ProgressBoard {
    entries: Arc<RwLock<BTreeMap<Uuid, UploadProgressEntry>>>,
}

impl ProgressBoard {
    /// Registers a new upload at zero percent.
    pub async fn start(&self, session: Uuid, field: &str, file_name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.entries.write().await.insert(
            id,
            UploadProgressEntry {
                id,
                session,
                field: field.to_owned(),
                file_name: file_name.to_owned(),
                percent: 0,
            },
        );
        id
    }

    /// Raises the percentage of an upload.
    pub async fn set(&self, id: Uuid, percent: u8) {
        if let Some(entry) = self.entries.write().await.get_mut(&id) {
            entry.percent = entry.percent.max(percent.min(100));
        }
    }

    /// Drops an upload.
    pub async fn remove(&self, id: Uuid) {
        self.entries.write().await.remove(&id);
    }

    /// Returns the entries of one session's field path.
    pub async fn for_field(&self, session: Uuid, field: &str) -> Vec<UploadProgressEntry> {
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.session == session && entry.field == field)
            .cloned()
            .collect()
    }
}

/// File that did not make it into the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    /// Original file name.
    pub file_name: String,
    /// User-facing message naming the file.
    pub message: String,
}

/// Outcome of one selection batch, in selection order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadBatch {
    /// Stored descriptors of the files that succeeded.
    pub uploaded: Vec<UploadedFile>,
    /// Files that failed validation or upload.
    pub failures: Vec<UploadFailure>,
}

impl UploadBatch {
    /// Returns one message covering every failure.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }

        Some(
            self.failures
                .iter()
                .map(|failure| failure.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

enum BatchSlot {
    Rejected(UploadFailure),
    Started {
        file_name: String,
        handle: JoinHandle<AppResult<UploadedFile>>,
    },
}

/// Validates and uploads files one request per file, reporting progress on a
/// shared board.
#[derive(Clone)]
pub struct UploadPipeline {
    api: Arc<dyn UploadApi>,
    board: ProgressBoard,
    retention: Duration,
}

impl UploadPipeline {
    /// Creates a pipeline. Completed entries stay on the board for `retention`.
    #[must_use]
    pub fn new(api: Arc<dyn UploadApi>, retention: Duration) -> Self {
        Self {
            api,
            board: ProgressBoard::default(),
            retention,
        }
    }

    /// Returns the progress board.
    #[must_use]
    pub fn board(&self) -> &ProgressBoard {
        &self.board
    }

    /// Deletes a stored file.
    pub async fn delete(&self, filename: &str) -> AppResult<()> {
        self.api.delete_file(filename).await
    }

    /// Uploads one selection batch for `session` and waits for every file to
    /// settle.
    ///
    /// Invalid files are skipped without blocking the others; each valid file
    /// is uploaded independently and may be cancelled through `cancel`.
    pub async fn upload_batch(
        &self,
        session: Uuid,
        config: &FileConfig,
        files: Vec<FileUpload>,
        target: &UploadTarget,
        cancel: &CancellationToken,
    ) -> UploadBatch {
        let field = target.field_name.clone().unwrap_or_default();
        let mut slots = Vec::with_capacity(files.len());

        for file in files {
            if let Err(message) = validate_file(config, &file) {
                tracing::info!(field = %field, file = %file.file_name, "rejected upload");
                slots.push(BatchSlot::Rejected(UploadFailure {
                    file_name: file.file_name,
                    message,
                }));
                continue;
            }

            let file_name = file.file_name.clone();
            let handle = self
                .spawn_upload(session, file, target.clone(), cancel.child_token())
                .await;
            slots.push(BatchSlot::Started { file_name, handle });
        }

        let mut batch = UploadBatch::default();
        let mut started = Vec::new();
        let mut order = Vec::with_capacity(slots.len());
        for slot in slots {
            match slot {
                BatchSlot::Rejected(failure) => order.push(Err(failure)),
                BatchSlot::Started { file_name, handle } => {
                    order.push(Ok(file_name));
                    started.push(handle);
                }
            }
        }

        let mut results = join_all(started).await.into_iter();
        for entry in order {
            match entry {
                Err(failure) => batch.failures.push(failure),
                Ok(file_name) => {
                    let outcome = match results.next() {
                        Some(Ok(result)) => result,
                        Some(Err(error)) => Err(AppError::Internal(format!(
                            "upload task for '{file_name}' failed: {error}"
                        ))),
                        None => Err(AppError::Internal(format!(
                            "upload task for '{file_name}' was lost"
                        ))),
                    };
                    match outcome {
                        Ok(stored) => batch.uploaded.push(stored),
                        Err(error) => batch.failures.push(UploadFailure {
                            message: format!("{file_name}: {error}"),
                            file_name,
                        }),
                    }
                }
            }
        }

        batch
    }

    async fn spawn_upload(
        &self,
        session: Uuid,
        file: FileUpload,
        target: UploadTarget,
        cancel: CancellationToken,
    ) -> JoinHandle<AppResult<UploadedFile>> {
        let field = target.field_name.clone().unwrap_or_default();
        let id = self.board.start(session, &field, &file.file_name).await;
        let (progress, mut receiver) = UploadProgress::channel();

        let forward_board = self.board.clone();
        let forward = tokio::spawn(async move {
            while receiver.changed().await.is_ok() {
                let percent = *receiver.borrow_and_update();
                forward_board.set(id, percent).await;
            }
        });

        let api = Arc::clone(&self.api);
        let board = self.board.clone();
        let retention = self.retention;
        tokio::spawn(async move {
            let file_name = file.file_name.clone();
            let size = file.size();
            let result = tokio::select! {
                () = cancel.cancelled() => Err(AppError::Network(format!(
                    "upload of '{file_name}' was cancelled"
                ))),
                result = api.upload_file(file, &target, progress) => result,
            };
            let _ = forward.await;

            match &result {
                Ok(stored) => {
                    tracing::info!(
                        field = %field,
                        file = %file_name,
                        size,
                        stored = %stored.filename,
                        "uploaded file"
                    );
                    board.set(id, 100).await;
                    tokio::spawn(async move {
                        tokio::time::sleep(retention).await;
                        board.remove(id).await;
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        field = %field,
                        file = %file_name,
                        error = %error,
                        "upload failed"
                    );
                    board.remove(id).await;
                }
            }

            result
        })
    }
}
