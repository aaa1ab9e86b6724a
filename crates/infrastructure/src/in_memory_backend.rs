use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use formwork_application::{
    CrudApi, FileUpload, ListQuery, LookupApi, OptionsLookupRequest, RecordWrite, UploadApi,
    UploadProgress, UploadTarget,
};
use formwork_core::{AppError, AppResult};
use formwork_domain::{Entity, FieldDefinition, OptionItem, SortOrder, UploadedFile};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::http_crud_api::duplicate_message;

mod matching;

use matching::{
    display_value, filter_matches, lookup_matches, option_label, query_matches, sort_by_field,
};

/// In-process document store serving the lookup, CRUD and upload ports.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    collections: RwLock<HashMap<String, Vec<Entity>>>,
    files: RwLock<HashMap<String, UploadedFile>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds records to a collection as-is.
    pub async fn seed(&self, collection: &str, entities: impl IntoIterator<Item = Entity>) {
        self.collections
            .write()
            .await
            .entry(collection.to_owned())
            .or_default()
            .extend(entities);
    }

    /// Returns the stored descriptor for a file name.
    pub async fn stored_file(&self, filename: &str) -> Option<UploadedFile> {
        self.files.read().await.get(filename).cloned()
    }
}

/// Field-level uniqueness and group uniqueness against the other records.
fn duplicate_fields(
    others: &[&Entity],
    data: &Map<String, Value>,
    form_structure: &[FieldDefinition],
) -> Map<String, Value> {
    let mut duplicates = Map::new();
    let taken = |field: &str, value: &Value| {
        others
            .iter()
            .any(|entity| entity.field(field) == Some(value))
    };

    for field in form_structure.iter().filter(|field| field.is_unique) {
        if let Some(value) = data.get(&field.name).filter(|value| !value.is_null())
            && taken(field.name.as_str(), value)
        {
            let message = field
                .validation
                .as_ref()
                .and_then(|validation| validation.unique_message.clone())
                .unwrap_or_else(|| format!("{} must be unique", field.name));
            duplicates.insert(field.name.clone(), Value::String(message));
        }
    }

    let group: Vec<(&FieldDefinition, &Value)> = form_structure
        .iter()
        .filter(|field| field.group_uniqueness)
        .filter_map(|field| {
            data.get(&field.name)
                .filter(|value| !value.is_null())
                .map(|value| (field, value))
        })
        .collect();
    let group_taken = !group.is_empty()
        && others.iter().any(|entity| {
            group
                .iter()
                .all(|(field, value)| entity.field(field.name.as_str()) == Some(*value))
        });
    if group_taken {
        for (field, _) in group {
            let message = field
                .validation
                .as_ref()
                .and_then(|validation| validation.group_unique_message.clone())
                .unwrap_or_else(|| format!("{} must be unique within its group", field.name));
            duplicates.insert(field.name.clone(), Value::String(message));
        }
    }

    duplicates
}

fn check_unique(others: &[&Entity], record: &RecordWrite) -> AppResult<()> {
    let duplicates = duplicate_fields(others, &record.data, &record.form_structure);
    if duplicates.is_empty() {
        return Ok(());
    }
    Err(AppError::Conflict(duplicate_message(&duplicates)))
}

#[async_trait]
impl LookupApi for InMemoryBackend {
    async fn fetch_options(&self, request: OptionsLookupRequest) -> AppResult<Vec<OptionItem>> {
        let collections = self.collections.read().await;
        let mut rows: Vec<Entity> = collections
            .get(&request.collection_name)
            .map(|entities| {
                entities
                    .iter()
                    .filter(|entity| lookup_matches(entity, &request.filter_query))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(collections);

        if let Some(field) = &request.sort_field {
            sort_by_field(&mut rows, field, request.sort_order.unwrap_or(SortOrder::Asc));
        }

        let query = request
            .query
            .as_deref()
            .map(str::trim)
            .filter(|query| !query.is_empty())
            .map(str::to_lowercase);
        let options = rows
            .iter()
            .map(|entity| {
                OptionItem::new(
                    option_label(&request, entity),
                    display_value(entity, request.value_field.as_str()),
                )
            })
            .filter(|option| {
                query
                    .as_deref()
                    .is_none_or(|query| option.label.to_lowercase().contains(query))
            });

        Ok(match request.limit.filter(|limit| *limit > 0) {
            Some(limit) => options.take(limit as usize).collect(),
            None => options.collect(),
        })
    }
}

#[async_trait]
impl CrudApi for InMemoryBackend {
    async fn list(&self, collection: &str, query: &ListQuery) -> AppResult<Vec<Entity>> {
        let collections = self.collections.read().await;
        let text = query
            .query
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty());
        let mut entities: Vec<Entity> = collections
            .get(collection)
            .map(|entities| {
                entities
                    .iter()
                    .filter(|entity| filter_matches(entity, query.filters.as_map()))
                    .filter(|entity| text.is_none_or(|text| query_matches(entity, text)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        entities.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(entities)
    }

    async fn create(&self, collection: &str, record: RecordWrite) -> AppResult<Entity> {
        let mut collections = self.collections.write().await;
        let entities = collections.entry(collection.to_owned()).or_default();
        check_unique(&entities.iter().collect::<Vec<_>>(), &record)?;

        let now = Utc::now();
        let entity = Entity {
            id: Uuid::new_v4().simple().to_string(),
            data: record.data,
            created_at: Some(now),
            updated_at: Some(now),
        };
        entities.push(entity.clone());
        tracing::debug!(collection, id = %entity.id, "created record");
        Ok(entity)
    }

    async fn update(&self, collection: &str, id: &str, record: RecordWrite) -> AppResult<Entity> {
        let mut collections = self.collections.write().await;
        let entities = collections
            .get_mut(collection)
            .ok_or_else(|| AppError::NotFound(format!("record '{id}' in '{collection}'")))?;
        let others: Vec<&Entity> = entities.iter().filter(|entity| entity.id != id).collect();
        check_unique(&others, &record)?;

        let entity = entities
            .iter_mut()
            .find(|entity| entity.id == id)
            .ok_or_else(|| AppError::NotFound(format!("record '{id}' in '{collection}'")))?;
        entity.data = record.data;
        entity.updated_at = Some(Utc::now());
        Ok(entity.clone())
    }

    async fn delete(&self, collection: &str, id: &str) -> AppResult<()> {
        let mut collections = self.collections.write().await;
        let entities = collections.get_mut(collection);
        let Some(entities) =
            entities.filter(|entities| entities.iter().any(|entity| entity.id == id))
        else {
            return Err(AppError::NotFound(format!(
                "record '{id}' in '{collection}'"
            )));
        };

        entities.retain(|entity| entity.id != id);
        Ok(())
    }
}

#[async_trait]
impl UploadApi for InMemoryBackend {
    async fn upload_file(
        &self,
        file: FileUpload,
        target: &UploadTarget,
        progress: UploadProgress,
    ) -> AppResult<UploadedFile> {
        let filename = format!("{}-{}", Uuid::new_v4().simple(), file.file_name);
        let directory = target.directory.as_deref().unwrap_or("general");
        let stored = UploadedFile {
            original_name: file.file_name.clone(),
            filepath: format!("/uploads/{directory}/{filename}"),
            filename: filename.clone(),
            size: file.size(),
            content_type: file.content_type,
            uploaded_at: Utc::now(),
        };

        self.files.write().await.insert(filename, stored.clone());
        progress.report(100);
        Ok(stored)
    }

    async fn delete_file(&self, filename: &str) -> AppResult<()> {
        self.files
            .write()
            .await
            .remove(filename)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("stored file '{filename}'")))
    }
}
