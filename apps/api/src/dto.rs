mod common;
mod forms;
mod records;

pub use common::HealthResponse;
pub use forms::{
    DeleteFileRequest, FormActionResponse, FormViewResponse, ImportTextRequest,
    ImportTextResponse, ItemPathRequest, OpenFormRequest, OptionSearchRequest,
    PendingRemovalResponse, RemovalRequest, SelectDiscriminantRequest, SetValueRequest,
    UploadBatchResponse, UploadFailureResponse, UploadProgressQuery, UploadProgressResponse,
    UploadedFileResponse,
};
pub use records::{ApplyFiltersRequest, RecordListQuery, RecordListResponse, RecordResponse};
