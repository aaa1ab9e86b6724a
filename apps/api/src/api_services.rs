use std::sync::Arc;

use formwork_application::{CrudApi, FormEngine, LookupApi, UploadApi, UploadPipeline};
use formwork_core::AppError;
use formwork_infrastructure::{
    BackendClient, HttpCrudApi, HttpLookupApi, HttpUploadApi, InMemoryBackend,
};

use crate::api_config::{ApiConfig, BackendConfig};
use crate::state::AppState;

struct BackendPorts {
    lookup: Arc<dyn LookupApi>,
    crud: Arc<dyn CrudApi>,
    uploads: Arc<dyn UploadApi>,
}

pub fn build_app_state(config: &ApiConfig) -> Result<AppState, AppError> {
    let ports = build_backend_ports(config)?;
    let engine = FormEngine::new(
        ports.lookup,
        ports.crud,
        UploadPipeline::new(ports.uploads, config.upload_progress_retention),
    );

    Ok(AppState::new(
        config.tenant_domain.clone(),
        engine,
        config.session_idle_timeout,
    ))
}

fn build_backend_ports(config: &ApiConfig) -> Result<BackendPorts, AppError> {
    match &config.backend {
        BackendConfig::Memory => {
            tracing::info!("serving forms from the in-memory backend");
            let backend = Arc::new(InMemoryBackend::new());
            Ok(BackendPorts {
                lookup: backend.clone(),
                crud: backend.clone(),
                uploads: backend,
            })
        }
        BackendConfig::Http { base_url } => {
            tracing::info!(
                %base_url,
                tenant = %config.tenant_domain,
                "serving forms from the HTTP backend"
            );
            let client = BackendClient::new(
                reqwest::Client::new(),
                base_url.clone(),
                config.tenant_domain.clone(),
            )?;
            Ok(BackendPorts {
                lookup: Arc::new(HttpLookupApi::new(client.clone())),
                crud: Arc::new(HttpCrudApi::new(client.clone())),
                uploads: Arc::new(HttpUploadApi::new(client)),
            })
        }
    }
}
