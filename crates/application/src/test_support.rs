use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use formwork_core::{AppError, AppResult};
use formwork_domain::{Entity, OptionItem, UploadedFile};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::form_ports::{
    CrudApi, FileUpload, ListQuery, LookupApi, OptionsLookupRequest, RecordWrite, UploadApi,
    UploadProgress, UploadTarget,
};

/// Collection-agnostic record store with call logging.
#[derive(Default)]
pub(crate) struct FakeCrudApi {
    pub(crate) records: Mutex<Vec<Entity>>,
    pub(crate) calls: Mutex<Vec<String>>,
    pub(crate) queries: Mutex<Vec<ListQuery>>,
    pub(crate) writes: Mutex<Vec<RecordWrite>>,
    pub(crate) fail_list: AtomicBool,
    pub(crate) fail_mutations: AtomicBool,
    next_id: AtomicU64,
}

impl FakeCrudApi {
    pub(crate) async fn seed(&self, entity: Entity) {
        self.records.lock().await.push(entity);
    }

    async fn log(&self, call: String) {
        self.calls.lock().await.push(call);
    }

    fn mutation_guard(&self) -> AppResult<()> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(AppError::Network("crud request failed with status 500".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl CrudApi for FakeCrudApi {
    async fn list(&self, collection: &str, query: &ListQuery) -> AppResult<Vec<Entity>> {
        self.log(format!("list {collection}")).await;
        self.queries.lock().await.push(query.clone());
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(AppError::Network("crud request failed with status 503".to_owned()));
        }

        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|entity| {
                query
                    .filters
                    .as_map()
                    .iter()
                    .all(|(key, value)| entity.field(key) == Some(value))
            })
            .filter(|entity| {
                query.query.as_deref().is_none_or(|text| {
                    entity
                        .data
                        .values()
                        .any(|value| value.as_str().is_some_and(|value| value.contains(text)))
                })
            })
            .cloned()
            .collect())
    }

    async fn create(&self, collection: &str, record: RecordWrite) -> AppResult<Entity> {
        self.log(format!("create {collection}")).await;
        self.mutation_guard()?;
        let id = format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let entity = Entity::new(id, record.data.clone());
        self.writes.lock().await.push(record);
        self.records.lock().await.push(entity.clone());
        Ok(entity)
    }

    async fn update(&self, collection: &str, id: &str, record: RecordWrite) -> AppResult<Entity> {
        self.log(format!("update {collection} {id}")).await;
        self.mutation_guard()?;
        let mut records = self.records.lock().await;
        let entity = records
            .iter_mut()
            .find(|entity| entity.id == id)
            .ok_or_else(|| AppError::NotFound(format!("record '{id}'")))?;
        entity.data = record.data.clone();
        let updated = entity.clone();
        drop(records);
        self.writes.lock().await.push(record);
        Ok(updated)
    }

    async fn delete(&self, collection: &str, id: &str) -> AppResult<()> {
        self.log(format!("delete {collection} {id}")).await;
        self.mutation_guard()?;
        self.records.lock().await.retain(|entity| entity.id != id);
        Ok(())
    }
}

/// Answers every lookup with one option naming the filter values.
#[derive(Default)]
pub(crate) struct FakeLookupApi {
    pub(crate) requests: Mutex<Vec<OptionsLookupRequest>>,
}

#[async_trait]
impl LookupApi for FakeLookupApi {
    async fn fetch_options(&self, request: OptionsLookupRequest) -> AppResult<Vec<OptionItem>> {
        let scope: Vec<String> = request
            .filter_query
            .values()
            .map(|value| match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect();
        let label = if scope.is_empty() {
            request.collection_name.clone()
        } else {
            format!("{} of {}", request.collection_name, scope.join("/"))
        };
        self.requests.lock().await.push(request);
        Ok(vec![OptionItem::new(label.clone(), label)])
    }
}

/// Stores every file except names containing `broken`.
pub(crate) struct FakeUploadApi {
    pub(crate) uploaded: Mutex<Vec<String>>,
    pub(crate) deleted: Mutex<Vec<String>>,
    pub(crate) hang: bool,
}

impl FakeUploadApi {
    pub(crate) fn new() -> Self {
        Self {
            uploaded: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            hang: false,
        }
    }

    pub(crate) fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl UploadApi for FakeUploadApi {
    async fn upload_file(
        &self,
        file: FileUpload,
        _target: &UploadTarget,
        progress: UploadProgress,
    ) -> AppResult<UploadedFile> {
        if self.hang {
            std::future::pending::<()>().await;
        }

        progress.report(50);
        if file.file_name.contains("broken") {
            return Err(AppError::Network("storage unavailable".to_owned()));
        }

        progress.report(100);
        self.uploaded.lock().await.push(file.file_name.clone());
        Ok(stored(&file.file_name))
    }

    async fn delete_file(&self, filename: &str) -> AppResult<()> {
        self.deleted.lock().await.push(filename.to_owned());
        Ok(())
    }
}

pub(crate) fn stored(name: &str) -> UploadedFile {
    UploadedFile {
        original_name: name.to_owned(),
        filename: format!("stored-{name}"),
        filepath: format!("/uploads/stored-{name}"),
        size: 4,
        content_type: "application/pdf".to_owned(),
        uploaded_at: Utc::now(),
    }
}
