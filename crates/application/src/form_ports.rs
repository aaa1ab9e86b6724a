mod crud;
mod lookup;
mod upload;

pub use crud::{CrudApi, ListQuery, RecordWrite};
pub use lookup::{LookupApi, OptionsLookupRequest};
pub use upload::{FileUpload, UploadApi, UploadProgress, UploadTarget};
