use formwork_core::{AppError, AppResult, TenantDomain};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

/// Header carrying the tenant domain on every backend call.
pub const TENANT_HEADER: &str = "x-domain";

/// Shared HTTP client for the lookup, CRUD and upload APIs.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http_client: reqwest::Client,
    base_url: Url,
    tenant: TenantDomain,
}

impl BackendClient {
    /// Creates a client rooted at `base_url`.
    ///
    /// A missing trailing slash is added so relative segments append to the
    /// base path instead of replacing its last segment.
    pub fn new(
        http_client: reqwest::Client,
        base_url: Url,
        tenant: TenantDomain,
    ) -> AppResult<Self> {
        if base_url.cannot_be_a_base() {
            return Err(AppError::Validation(format!(
                "backend url '{base_url}' cannot be used as a base"
            )));
        }

        let mut base_url = base_url;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(path.as_str());
        }

        Ok(Self {
            http_client,
            base_url,
            tenant,
        })
    }

    /// Returns the tenant domain sent with each call.
    #[must_use]
    pub fn tenant(&self) -> &TenantDomain {
        &self.tenant
    }

    /// Builds an endpoint URL from path segments, percent-encoding each one.
    pub fn endpoint(&self, segments: &[&str]) -> AppResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                AppError::Internal(format!("backend url '{}' has no path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Starts a request with the tenant header set.
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .header(TENANT_HEADER, self.tenant.as_str())
    }

    /// Sends a request, mapping transport failures to network errors.
    pub async fn send(&self, builder: RequestBuilder, action: &str) -> AppResult<Response> {
        builder.send().await.map_err(|error| {
            tracing::warn!(action, error = %error, "backend request failed");
            AppError::Network(format!("{action} failed: {error}"))
        })
    }

    /// Decodes a successful JSON body, or turns the status into an error.
    pub async fn read_json<T>(response: Response, action: &str) -> AppResult<T>
    where
        T: DeserializeOwned,
    {
        let response = Self::ensure_success(response, action).await?;
        response.json::<T>().await.map_err(|error| {
            AppError::Network(format!("{action} returned an unreadable body: {error}"))
        })
    }

    /// Passes successful responses through and turns the rest into errors.
    pub async fn ensure_success(response: Response, action: &str) -> AppResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<response body unavailable>".to_owned());
        tracing::warn!(action, %status, "backend rejected request");
        Err(status_error(status, action, body.as_str()))
    }
}

fn status_error(status: StatusCode, action: &str, body: &str) -> AppError {
    match status {
        StatusCode::NOT_FOUND => AppError::NotFound(format!("{action}: {}", message_of(body))),
        _ => AppError::Network(format!(
            "{action} failed with status {status}: {}",
            message_of(body)
        )),
    }
}

/// Extracts `error` or `message` from a JSON error body, else the raw text.
pub(crate) fn message_of(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["error", "message"].iter().find_map(|key| {
                value
                    .get(*key)
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            })
        })
        .unwrap_or_else(|| body.trim().to_owned())
}
