use async_trait::async_trait;
use bytes::Bytes;
use formwork_application::{FileUpload, UploadApi, UploadProgress, UploadTarget};
use formwork_core::{AppError, AppResult};
use formwork_domain::UploadedFile;
use futures::stream::{self, StreamExt};
use reqwest::Method;
use reqwest::multipart::{Form, Part};

use crate::backend_client::BackendClient;

const CHUNK_SIZE: usize = 64 * 1024;

/// File storage over HTTP, one multipart request per file.
#[derive(Debug, Clone)]
pub struct HttpUploadApi {
    client: BackendClient,
}

impl HttpUploadApi {
    /// Creates an upload adapter.
    #[must_use]
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

/// Splits a file into transfer chunks.
pub(crate) fn chunks(bytes: &Bytes) -> Vec<Bytes> {
    (0..bytes.len())
        .step_by(CHUNK_SIZE)
        .map(|start| bytes.slice(start..(start + CHUNK_SIZE).min(bytes.len())))
        .collect()
}

/// Builds the file part; progress advances as the transport pulls chunks.
fn file_part(file: FileUpload, progress: UploadProgress) -> AppResult<Part> {
    let total = file.size();
    let mut sent = 0_u64;
    let body = stream::iter(chunks(&file.bytes)).map(move |chunk| {
        sent = sent.saturating_add(chunk.len() as u64);
        // 100 is reported once the store answers.
        progress.report_bytes(sent.min(total.saturating_sub(1)), total);
        Ok::<Bytes, std::io::Error>(chunk)
    });

    let part = Part::stream_with_length(reqwest::Body::wrap_stream(body), total)
        .file_name(file.file_name);
    if file.content_type.is_empty() {
        return Ok(part);
    }

    part.mime_str(file.content_type.as_str()).map_err(|error| {
        AppError::Validation(format!(
            "invalid content type '{}': {error}",
            file.content_type
        ))
    })
}

fn upload_form(
    file: FileUpload,
    target: &UploadTarget,
    progress: UploadProgress,
) -> AppResult<Form> {
    let mut form = Form::new().part("file", file_part(file, progress)?);
    let fields = [
        ("directory", &target.directory),
        ("documentId", &target.document_id),
        ("collectionName", &target.collection_name),
        ("fieldName", &target.field_name),
    ];
    for (name, value) in fields {
        if let Some(value) = value {
            form = form.text(name, value.clone());
        }
    }
    Ok(form)
}

#[async_trait]
impl UploadApi for HttpUploadApi {
    async fn upload_file(
        &self,
        file: FileUpload,
        target: &UploadTarget,
        progress: UploadProgress,
    ) -> AppResult<UploadedFile> {
        let action = format!("upload of '{}'", file.file_name);
        let url = self.client.endpoint(&["upload"])?;
        let form = upload_form(file, target, progress.clone())?;
        let response = self
            .client
            .send(
                self.client.request(Method::POST, url).multipart(form),
                action.as_str(),
            )
            .await?;

        let stored: UploadedFile = BackendClient::read_json(response, action.as_str()).await?;
        progress.report(100);
        tracing::debug!(filename = %stored.filename, size = stored.size, "stored file");
        Ok(stored)
    }

    async fn delete_file(&self, filename: &str) -> AppResult<()> {
        let mut url = self.client.endpoint(&["upload"])?;
        url.query_pairs_mut().append_pair("filename", filename);
        let action = format!("delete of stored file '{filename}'");
        let response = self
            .client
            .send(self.client.request(Method::DELETE, url), action.as_str())
            .await?;

        BackendClient::ensure_success(response, action.as_str()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests;
