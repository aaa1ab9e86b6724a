use std::sync::Arc;

use formwork_core::AppResult;
use formwork_domain::{Entity, FieldPath, FormSchema, OptionItem};
use futures::future::join_all;
use uuid::Uuid;

use crate::form_ports::{CrudApi, FileUpload, LookupApi, RecordWrite};
use crate::form_session::FormSession;
use crate::options_resolver::{LookupOutcome, PendingLookup};
use crate::record_service::RecordService;
use crate::upload_pipeline::{UploadBatch, UploadPipeline, UploadProgressEntry};

/// Response to one queued lookup, ready to hand back to its session.
pub type LookupResponse = (u64, AppResult<Vec<OptionItem>>);

/// Connects form sessions to the lookup, CRUD and upload APIs.
#[derive(Clone)]
pub struct FormEngine {
    lookup: Arc<dyn LookupApi>,
    crud: Arc<dyn CrudApi>,
    uploads: UploadPipeline,
}

impl FormEngine {
    /// Creates an engine over the three collaborators.
    #[must_use]
    pub fn new(
        lookup: Arc<dyn LookupApi>,
        crud: Arc<dyn CrudApi>,
        uploads: UploadPipeline,
    ) -> Self {
        Self {
            lookup,
            crud,
            uploads,
        }
    }

    /// Returns the CRUD API.
    #[must_use]
    pub fn crud(&self) -> Arc<dyn CrudApi> {
        Arc::clone(&self.crud)
    }

    /// Returns the upload pipeline.
    #[must_use]
    pub fn uploads(&self) -> &UploadPipeline {
        &self.uploads
    }

    /// Opens a form for a new record, or for editing `existing`.
    pub fn open(
        &self,
        schema: Arc<FormSchema>,
        collection: &str,
        existing: Option<&Entity>,
    ) -> AppResult<FormSession> {
        let session = FormSession::open(schema, collection, existing)?;
        tracing::debug!(collection, mode = session.mode().as_str(), "opened form");
        Ok(session)
    }

    /// Runs lookups concurrently. Responses come back in request order.
    pub async fn fetch_options(&self, lookups: Vec<PendingLookup>) -> Vec<LookupResponse> {
        join_all(lookups.into_iter().map(|lookup| {
            let api = Arc::clone(&self.lookup);
            async move { (lookup.generation, api.fetch_options(lookup.request).await) }
        }))
        .await
    }

    /// Hands responses back to a session and returns how many were applied.
    pub fn apply_responses(session: &mut FormSession, responses: Vec<LookupResponse>) -> usize {
        responses
            .into_iter()
            .map(|(generation, result)| session.apply_lookup(generation, result))
            .filter(|outcome| *outcome == LookupOutcome::Applied)
            .count()
    }

    /// Drains, runs and applies every lookup queued by a session.
    pub async fn run_lookups(&self, session: &mut FormSession) -> usize {
        let lookups = session.drain_lookups();
        if lookups.is_empty() {
            return 0;
        }

        let responses = self.fetch_options(lookups).await;
        Self::apply_responses(session, responses)
    }

    /// Runs lookups until the session queues no more.
    pub async fn settle(&self, session: &mut FormSession) -> usize {
        let mut applied = 0;
        loop {
            let lookups = session.drain_lookups();
            if lookups.is_empty() {
                return applied;
            }
            let responses = self.fetch_options(lookups).await;
            applied += Self::apply_responses(session, responses);
        }
    }

    /// Uploads one selection batch into a file field and waits for every
    /// file to settle. Failures are reported on the field.
    pub async fn upload_files(
        &self,
        session: &mut FormSession,
        path: &FieldPath,
        files: Vec<FileUpload>,
    ) -> AppResult<UploadBatch> {
        let (config, target) = session.upload_target(path)?;
        let batch = self
            .uploads
            .upload_batch(session.id(), &config, files, &target, &session.cancellation())
            .await;

        session.attach_files(path, batch.uploaded.clone())?;
        if let Some(message) = batch.error_message() {
            session.report_error(path, message);
        }

        Ok(batch)
    }

    /// Deletes a stored attachment, then drops it from the field.
    ///
    /// Returns `false` when the field does not hold the file.
    pub async fn delete_attachment(
        &self,
        session: &mut FormSession,
        path: &FieldPath,
        filename: &str,
    ) -> AppResult<bool> {
        session.upload_target(path)?;
        if !session
            .attachments(path)?
            .iter()
            .any(|file| file.filename == filename)
        {
            return Ok(false);
        }

        self.uploads.delete(filename).await?;
        session.detach_file(path, filename)
    }

    /// Validates the form and creates or updates its record.
    pub async fn submit(
        &self,
        session: &mut FormSession,
        records: &mut RecordService,
    ) -> AppResult<Entity> {
        session.validate()?;
        let record = RecordWrite {
            data: session.payload(),
            form_structure: session.schema().definitions().to_vec(),
        };

        let entity = match session.record_id() {
            Some(id) => {
                let id = id.to_owned();
                records.update(&id, record).await?
            }
            None => records.create(record).await?,
        };

        tracing::info!(collection = session.collection(), id = %entity.id, "submitted form");
        Ok(entity)
    }

    /// Returns in-flight upload progress for one field path of a session.
    pub async fn progress(&self, session: Uuid, field: &str) -> Vec<UploadProgressEntry> {
        self.uploads.board().for_field(session, field).await
    }
}

#[cfg(test)]
mod tests;
