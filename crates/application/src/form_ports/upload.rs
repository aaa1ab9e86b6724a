use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use formwork_core::AppResult;
use formwork_domain::UploadedFile;
use tokio::sync::watch;

/// One file picked by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    /// Original file name.
    pub file_name: String,
    /// Declared MIME type; may be empty.
    pub content_type: String,
    /// File contents.
    pub bytes: Bytes,
}

impl FileUpload {
    /// Returns the size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Multipart fields sent alongside the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadTarget {
    /// Storage directory.
    pub directory: Option<String>,
    /// Record the file belongs to.
    pub document_id: Option<String>,
    /// Collection the record belongs to.
    pub collection_name: Option<String>,
    /// Field path holding the file.
    pub field_name: Option<String>,
}

/// Sender half of an upload's progress stream (0-100).
///
/// Reports never decrease the published value.
#[derive(Debug, Clone)]
pub struct UploadProgress {
    sender: Arc<watch::Sender<u8>>,
}

impl UploadProgress {
    /// Creates a progress stream starting at zero.
    #[must_use]
    pub fn channel() -> (Self, watch::Receiver<u8>) {
        let (sender, receiver) = watch::channel(0);
        (
            Self {
                sender: Arc::new(sender),
            },
            receiver,
        )
    }

    /// Publishes a new percentage, clamped to 100.
    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        self.sender.send_if_modified(|current| {
            if percent > *current {
                *current = percent;
                true
            } else {
                false
            }
        });
    }

    /// Publishes progress from transferred and total byte counts.
    pub fn report_bytes(&self, sent: u64, total: u64) {
        if total == 0 {
            return;
        }
        let percent = (sent.saturating_mul(100) / total).min(100);
        self.report(u8::try_from(percent).unwrap_or(100));
    }

    /// Returns the last published percentage.
    #[must_use]
    pub fn current(&self) -> u8 {
        *self.sender.borrow()
    }
}

/// File-storage API.
#[async_trait]
pub trait UploadApi: Send + Sync {
    /// Stores one file and returns its descriptor.
    async fn upload_file(
        &self,
        file: FileUpload,
        target: &UploadTarget,
        progress: UploadProgress,
    ) -> AppResult<UploadedFile>;

    /// Removes a stored file by its stored name.
    async fn delete_file(&self, filename: &str) -> AppResult<()>;
}
