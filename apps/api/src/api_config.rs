use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use formwork_core::{AppError, TenantDomain};
use tracing_subscriber::EnvFilter;
use url::Url;

/// Where the lookup, CRUD and upload ports are served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// In-process document store.
    Memory,
    /// Remote services rooted at a base URL.
    Http { base_url: Url },
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_host: String,
    pub api_port: u16,
    pub frontend_url: String,
    pub backend: BackendConfig,
    pub tenant_domain: TenantDomain,
    pub upload_progress_retention: Duration,
    pub session_idle_timeout: Duration,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let api_host = optional("API_HOST").unwrap_or_else(|| "127.0.0.1".to_owned());
        let api_port = optional("API_PORT")
            .map(|value| {
                value
                    .trim()
                    .parse::<u16>()
                    .map_err(|error| AppError::Validation(format!("invalid API_PORT: {error}")))
            })
            .transpose()?
            .unwrap_or(3001);
        let frontend_url =
            optional("FRONTEND_URL").unwrap_or_else(|| "http://localhost:3000".to_owned());

        let backend = match optional("BACKEND_MODE")
            .unwrap_or_else(|| "memory".to_owned())
            .trim()
        {
            "memory" => BackendConfig::Memory,
            "http" => {
                let raw = optional("BACKEND_BASE_URL").ok_or_else(|| {
                    AppError::Validation(
                        "BACKEND_BASE_URL is required when BACKEND_MODE is 'http'".to_owned(),
                    )
                })?;
                let base_url = Url::parse(raw.trim()).map_err(|error| {
                    AppError::Validation(format!("invalid BACKEND_BASE_URL: {error}"))
                })?;
                BackendConfig::Http { base_url }
            }
            other => {
                return Err(AppError::Validation(format!(
                    "BACKEND_MODE must be either 'memory' or 'http', got '{other}'"
                )));
            }
        };

        let tenant_domain = optional("TENANT_DOMAIN")
            .ok_or_else(|| AppError::Validation("TENANT_DOMAIN is required".to_owned()))
            .and_then(|value| {
                TenantDomain::new(value).map_err(|error| {
                    AppError::Validation(format!("invalid TENANT_DOMAIN: {error}"))
                })
            })?;

        let number = |name: &str, default: u64| {
            optional(name)
                .map(|value| {
                    value
                        .trim()
                        .parse::<u64>()
                        .map_err(|error| AppError::Validation(format!("invalid {name}: {error}")))
                })
                .transpose()
                .map(|value| value.unwrap_or(default))
        };
        let retention_ms = number("UPLOAD_PROGRESS_RETENTION_MS", 1000)?;
        let idle_secs = number("SESSION_IDLE_TIMEOUT_SECS", 1800)?;

        Ok(Self {
            api_host,
            api_port,
            frontend_url,
            backend,
            tenant_domain,
            upload_progress_retention: Duration::from_millis(retention_ms),
            session_idle_timeout: Duration::from_secs(idle_secs),
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Validation(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use formwork_core::AppError;

    use super::{ApiConfig, BackendConfig};

    fn load(pairs: &[(&str, &str)]) -> Result<ApiConfig, AppError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        ApiConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_with_only_a_tenant() {
        let config =
            load(&[("TENANT_DOMAIN", "school.example")]).unwrap_or_else(|_| unreachable!());

        assert_eq!(config.api_port, 3001);
        assert_eq!(config.frontend_url, "http://localhost:3000");
        assert_eq!(config.backend, BackendConfig::Memory);
        assert_eq!(config.upload_progress_retention, Duration::from_millis(1000));
        assert_eq!(config.session_idle_timeout, Duration::from_secs(1800));
        assert_eq!(
            config.socket_address().map(|address| address.to_string()).ok(),
            Some("127.0.0.1:3001".to_owned())
        );
    }

    #[test]
    fn missing_tenant_is_rejected() {
        let result = load(&[]);

        assert!(matches!(
            result,
            Err(AppError::Validation(message)) if message.contains("TENANT_DOMAIN")
        ));
    }

    #[test]
    fn http_mode_needs_a_base_url() {
        let missing = load(&[("TENANT_DOMAIN", "school.example"), ("BACKEND_MODE", "http")]);
        let invalid = load(&[
            ("TENANT_DOMAIN", "school.example"),
            ("BACKEND_MODE", "http"),
            ("BACKEND_BASE_URL", "not a url"),
        ]);
        let valid = load(&[
            ("TENANT_DOMAIN", "school.example"),
            ("BACKEND_MODE", "http"),
            ("BACKEND_BASE_URL", "https://backend.example/api"),
        ])
        .unwrap_or_else(|_| unreachable!());

        assert!(matches!(
            missing,
            Err(AppError::Validation(message)) if message.contains("BACKEND_BASE_URL")
        ));
        assert!(matches!(
            invalid,
            Err(AppError::Validation(message)) if message.contains("BACKEND_BASE_URL")
        ));
        assert!(matches!(
            valid.backend,
            BackendConfig::Http { base_url } if base_url.host_str() == Some("backend.example")
        ));
    }

    #[test]
    fn invalid_values_name_their_variable() {
        let port = load(&[("TENANT_DOMAIN", "school.example"), ("API_PORT", "eighty")]);
        let mode = load(&[("TENANT_DOMAIN", "school.example"), ("BACKEND_MODE", "mongo")]);
        let retention = load(&[
            ("TENANT_DOMAIN", "school.example"),
            ("UPLOAD_PROGRESS_RETENTION_MS", "-5"),
        ]);
        let idle = load(&[
            ("TENANT_DOMAIN", "school.example"),
            ("SESSION_IDLE_TIMEOUT_SECS", "soon"),
        ]);

        assert!(matches!(
            port,
            Err(AppError::Validation(message)) if message.contains("API_PORT")
        ));
        assert!(matches!(
            mode,
            Err(AppError::Validation(message)) if message.contains("BACKEND_MODE")
        ));
        assert!(matches!(
            retention,
            Err(AppError::Validation(message)) if message.contains("UPLOAD_PROGRESS_RETENTION_MS")
        ));
        assert!(matches!(
            idle,
            Err(AppError::Validation(message)) if message.contains("SESSION_IDLE_TIMEOUT_SECS")
        ));
    }
}
