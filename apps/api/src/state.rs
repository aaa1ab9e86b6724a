use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use formwork_application::{AdvancedSearch, CrudApi, FormEngine, FormSession, RecordService};
use formwork_core::{AppError, AppResult, TenantDomain};
use formwork_domain::{FormSchema, SearchFilter};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub tenant: TenantDomain,
    pub engine: FormEngine,
    pub sessions: SessionStore,
    pub collections: CollectionStore,
}

impl AppState {
    #[must_use]
    pub fn new(tenant: TenantDomain, engine: FormEngine, session_idle_timeout: Duration) -> Self {
        let collections = CollectionStore::new(engine.crud());
        Self {
            tenant,
            engine,
            sessions: SessionStore::new(session_idle_timeout),
            collections,
        }
    }
}

/// An open form and the token that cancels its uploads.
///
/// The token is reachable without the session lock, which an upload batch
/// holds until every file settles.
#[derive(Clone)]
pub struct OpenSession {
    pub session: Arc<Mutex<FormSession>>,
    pub cancel: CancellationToken,
}

impl OpenSession {
    /// Cancels in-flight uploads, then closes the form once the lock is free.
    pub async fn close(&self) {
        self.cancel.cancel();
        self.session.lock().await.cancel();
    }
}

struct SessionEntry {
    open: OpenSession,
    touched: Instant,
}

/// Open form sessions, each behind its own lock.
///
/// Sessions untouched for longer than the idle timeout are expired whenever
/// a new form opens.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
    idle_timeout: Duration,
}

impl SessionStore {
    #[must_use]
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::default(),
            idle_timeout,
        }
    }

    pub async fn insert(&self, session: FormSession) -> (Uuid, Arc<Mutex<FormSession>>) {
        let id = session.id();
        let open = OpenSession {
            cancel: session.cancellation(),
            session: Arc::new(Mutex::new(session)),
        };
        let session = Arc::clone(&open.session);

        let now = Instant::now();
        self.expire_idle(now).await;
        self.sessions
            .write()
            .await
            .insert(id, SessionEntry { open, touched: now });
        (id, session)
    }

    /// Returns a session and marks it as used.
    pub async fn get(&self, id: Uuid) -> AppResult<Arc<Mutex<FormSession>>> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&id).ok_or_else(|| missing(id))?;
        entry.touched = Instant::now();
        Ok(Arc::clone(&entry.open.session))
    }

    pub async fn remove(&self, id: Uuid) -> AppResult<OpenSession> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(|entry| entry.open)
            .ok_or_else(|| missing(id))
    }

    /// Drops sessions idle for longer than the timeout at `now` and cancels
    /// their uploads. Returns how many expired.
    pub async fn expire_idle(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<Uuid> = sessions
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.touched) > self.idle_timeout)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            if let Some(entry) = sessions.remove(id) {
                entry.open.cancel.cancel();
                tracing::debug!(session_id = %id, "expired idle form session");
            }
        }
        expired.len()
    }
}

fn missing(id: Uuid) -> AppError {
    AppError::NotFound(format!("form session '{id}'"))
}

#[derive(Clone)]
struct ScopedRecords {
    scope: SearchFilter,
    service: Arc<Mutex<RecordService>>,
}

/// Per-collection schemas, record lists and search composers.
#[derive(Clone)]
pub struct CollectionStore {
    crud: Arc<dyn CrudApi>,
    schemas: Arc<RwLock<HashMap<String, Arc<FormSchema>>>>,
    records: Arc<RwLock<HashMap<String, ScopedRecords>>>,
    searches: Arc<RwLock<HashMap<String, Arc<Mutex<AdvancedSearch>>>>>,
}

impl CollectionStore {
    #[must_use]
    pub fn new(crud: Arc<dyn CrudApi>) -> Self {
        Self {
            crud,
            schemas: Arc::default(),
            records: Arc::default(),
            searches: Arc::default(),
        }
    }

    /// Stores the schema the latest form of a collection was opened with.
    ///
    /// A changed schema drops the collection's search composer so the next
    /// search is built from the new searchable fields.
    pub async fn register_schema(&self, collection: &str, schema: Arc<FormSchema>) {
        let previous = self
            .schemas
            .write()
            .await
            .insert(collection.to_owned(), Arc::clone(&schema));
        if previous.is_some_and(|previous| previous.definitions() != schema.definitions()) {
            self.searches.write().await.remove(collection);
        }
    }

    pub async fn schema(&self, collection: &str) -> AppResult<Arc<FormSchema>> {
        self.schemas
            .read()
            .await
            .get(collection)
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!("no form schema registered for '{collection}'"))
            })
    }

    /// Returns the record list of a collection scoped by `scope`.
    ///
    /// A list opened with a different scope starts over with empty state.
    pub async fn records(
        &self,
        collection: &str,
        scope: SearchFilter,
    ) -> Arc<Mutex<RecordService>> {
        let mut records = self.records.write().await;
        if let Some(existing) = records.get(collection)
            && existing.scope == scope
        {
            return Arc::clone(&existing.service);
        }

        let service = Arc::new(Mutex::new(RecordService::new(
            Arc::clone(&self.crud),
            collection,
            scope.clone(),
        )));
        records.insert(
            collection.to_owned(),
            ScopedRecords {
                scope,
                service: Arc::clone(&service),
            },
        );
        service
    }

    /// Returns the record list of a collection, unscoped when first opened.
    pub async fn current_records(&self, collection: &str) -> Arc<Mutex<RecordService>> {
        if let Some(existing) = self.records.read().await.get(collection) {
            return Arc::clone(&existing.service);
        }
        self.records(collection, SearchFilter::empty()).await
    }

    pub async fn search(&self, collection: &str) -> AppResult<Arc<Mutex<AdvancedSearch>>> {
        if let Some(existing) = self.searches.read().await.get(collection) {
            return Ok(Arc::clone(existing));
        }

        let schema = self.schema(collection).await?;
        let mut searches = self.searches.write().await;
        let search = match searches.get(collection) {
            Some(existing) => Arc::clone(existing),
            None => {
                let search = Arc::new(Mutex::new(AdvancedSearch::new(&schema, collection)?));
                searches.insert(collection.to_owned(), Arc::clone(&search));
                search
            }
        };
        Ok(search)
    }
}
