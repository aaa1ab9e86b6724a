use formwork_application::{FormSession, UploadFailure, UploadProgressEntry};
use formwork_core::AppResult;
use formwork_domain::UploadedFile;
use uuid::Uuid;

use super::{
    FormViewResponse, PendingRemovalResponse, UploadFailureResponse, UploadProgressResponse,
    UploadedFileResponse,
};

impl FormViewResponse {
    /// Renders a session into its API view.
    pub fn from_session(session_id: Uuid, session: &FormSession) -> AppResult<Self> {
        Ok(Self {
            session_id: session_id.to_string(),
            collection: session.collection().to_owned(),
            mode: session.mode().as_str().to_owned(),
            record_id: session.record_id().map(ToOwned::to_owned),
            controls: session.render()?,
            errors: session.errors().clone(),
            pending_removal: session
                .removal()
                .pending()
                .map(|pending| PendingRemovalResponse {
                    path: pending.array.to_string(),
                    index: pending.index,
                }),
            payload: session.payload(),
        })
    }
}

impl From<UploadedFile> for UploadedFileResponse {
    fn from(file: UploadedFile) -> Self {
        Self {
            original_name: file.original_name,
            filename: file.filename,
            filepath: file.filepath,
            size: file.size,
            content_type: file.content_type,
            uploaded_at: file.uploaded_at.to_rfc3339(),
        }
    }
}

impl From<UploadFailure> for UploadFailureResponse {
    fn from(failure: UploadFailure) -> Self {
        Self {
            file_name: failure.file_name,
            message: failure.message,
        }
    }
}

impl From<UploadProgressEntry> for UploadProgressResponse {
    fn from(entry: UploadProgressEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            field: entry.field,
            file_name: entry.file_name,
            percent: entry.percent,
        }
    }
}
