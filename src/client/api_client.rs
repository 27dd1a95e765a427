//! HTTP client for the Productboard REST API
//!
//! Every request runs the same pipeline: auth headers, one slot from the
//! global rate-limit bucket, then the HTTP call inside the retry handler.

use crate::auth::AuthenticationManager;
use crate::cache::{CacheConfig, ResponseCache};
use crate::client::error_mapping::error_from_response;
use crate::config::ApiConfig;
use crate::error::{ProductboardError, Result};
use crate::rate_limit::{RateLimiter, GLOBAL_KEY};
use crate::retry::RetryHandler;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Header carrying the API version
pub const API_VERSION_HEADER: &str = "X-Version";

/// HTTP methods the client issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether a successful call may change server state
    pub fn is_mutating(&self) -> bool {
        !matches!(self, HttpMethod::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Build the shared reqwest client: timeout, user agent, default headers
pub fn build_http_client(config: &ApiConfig) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    reqwest::Client::builder()
        .timeout(config.timeout())
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .build()
        .map_err(ProductboardError::Http)
}

/// Productboard API client
pub struct ApiClient {
    http: reqwest::Client,
    config: ApiConfig,
    auth: Arc<AuthenticationManager>,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryHandler,
    cache: ResponseCache,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url)
            .field("retry", &self.retry)
            .field("cache_enabled", &self.cache.is_enabled())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client around injected collaborators
    pub fn new(
        http: reqwest::Client,
        config: ApiConfig,
        auth: Arc<AuthenticationManager>,
        rate_limiter: Arc<RateLimiter>,
        retry: RetryHandler,
        cache: CacheConfig,
    ) -> Result<Self> {
        url::Url::parse(&config.base_url).map_err(|e| {
            ProductboardError::config(format!("Invalid API base URL '{}': {}", config.base_url, e))
        })?;
        Ok(Self {
            http,
            config,
            auth,
            rate_limiter,
            retry,
            cache: ResponseCache::new(cache),
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn auth(&self) -> &Arc<AuthenticationManager> {
        &self.auth
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Join a relative path onto the base URL
    ///
    /// Absolute URLs are accepted only on the base URL's origin, since the
    /// request carries the managed credentials.
    pub fn resolve_url(&self, path: &str) -> Result<String> {
        if path.starts_with("http://") || path.starts_with("https://") {
            let target = url::Url::parse(path)
                .map_err(|e| ProductboardError::validation(format!("Invalid URL '{}': {}", path, e)))?;
            let base = url::Url::parse(&self.config.base_url).map_err(|e| {
                ProductboardError::config(format!("Invalid API base URL '{}': {}", self.config.base_url, e))
            })?;
            if target.origin() != base.origin() {
                warn!(url = %path, "Refusing request outside the API origin");
                return Err(ProductboardError::validation(format!(
                    "URL '{}' is outside the Productboard API at {}",
                    path,
                    base.origin().ascii_serialization()
                )));
            }
            return Ok(target.to_string());
        }
        let base = self.config.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            Ok(format!("{}{}", base, path))
        } else {
            Ok(format!("{}/{}", base, path))
        }
    }

    pub async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value> {
        self.request(HttpMethod::Get, path, query, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(HttpMethod::Post, path, &[], Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(HttpMethod::Put, path, &[], Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(HttpMethod::Patch, path, &[], Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.request(HttpMethod::Delete, path, &[], None).await
    }

    /// Issue one request through the full pipeline
    #[instrument(skip_all, fields(method = %method, path = path))]
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = self.resolve_url(path)?;

        let cache_key = (!method.is_mutating()).then(|| ResponseCache::key(method.as_str(), path, query));
        if let Some(hit) = cache_key.as_deref().and_then(|key| self.cache.get(key)) {
            return Ok(hit);
        }
        let generation = self.cache.generation();

        let headers = self.authorization_headers().await?;
        self.rate_limiter.wait_for_slot(GLOBAL_KEY).await?;

        let operation = format!("{} {}", method, path);
        let value = self
            .retry
            .with_retries(&operation, || self.send_once(method, &url, query, body, &headers))
            .await?;

        match cache_key {
            Some(key) => {
                self.cache.insert_if_current(key, value.clone(), generation);
            }
            None => self.cache.invalidate_all(),
        }
        Ok(value)
    }

    async fn authorization_headers(&self) -> Result<HeaderMap> {
        if self.auth.is_token_expired() {
            self.auth.validate_credentials().await?;
        }

        let mut headers = HeaderMap::new();
        for (name, value) in self.auth.auth_headers()? {
            let name = if name.eq_ignore_ascii_case("authorization") {
                AUTHORIZATION
            } else {
                HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| ProductboardError::internal(format!("Invalid auth header name: {}", e)))?
            };
            let value = HeaderValue::from_str(&value)
                .map_err(|e| ProductboardError::internal(format!("Invalid auth header value: {}", e)))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    async fn send_once(
        &self,
        method: HttpMethod,
        url: &str,
        query: &[(String, String)],
        body: Option<&Value>,
        headers: &HeaderMap,
    ) -> Result<Value> {
        let mut request = self
            .http
            .request(method.into(), url)
            .headers(headers.clone())
            .header(API_VERSION_HEADER, self.config.version.as_str());
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        // Transport failures propagate unwrapped.
        let response = request.send().await?;
        let status = response.status();
        debug!(status = status.as_u16(), "Productboard API responded");

        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text)))
    }
}
