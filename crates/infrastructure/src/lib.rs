//! Infrastructure adapters for the lookup, CRUD and upload ports.

#![forbid(unsafe_code)]

mod backend_client;
mod http_crud_api;
mod http_lookup_api;
mod http_upload_api;
mod in_memory_backend;

pub use backend_client::{BackendClient, TENANT_HEADER};
pub use http_crud_api::HttpCrudApi;
pub use http_lookup_api::HttpLookupApi;
pub use http_upload_api::HttpUploadApi;
pub use in_memory_backend::InMemoryBackend;
