//! Configuration management for the Productboard MCP bridge

use crate::cache::CacheConfig;
use crate::error::{ProductboardError, Result};
use crate::rate_limit::RateLimitConfig;
use crate::retry::RetryPolicy;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Custom serde module for Option<Secret<String>>
mod option_secret_string {
    use secrecy::Secret;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Secret<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt_s = Option::<String>::deserialize(deserializer)?;
        Ok(opt_s.map(Secret::new))
    }
}

fn default_base_url() -> String {
    "https://api.productboard.com".to_string()
}

fn default_api_version() -> String {
    "1".to_string()
}

fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

fn default_redirect_uri() -> String {
    "http://localhost:3000/callback".to_string()
}

fn default_authorization_url() -> String {
    "https://app.productboard.com/oauth2/authorize".to_string()
}

fn default_token_url() -> String {
    "https://app.productboard.com/oauth2/token".to_string()
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Productboard REST API settings
    pub api: ApiConfig,
    /// Authentication settings
    pub auth: AuthConfig,
    /// Token bucket settings
    pub rate_limit: RateLimitConfig,
    /// Retry policy for outbound calls
    pub retry: RetryPolicy,
    /// Response cache settings
    pub cache: CacheConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Productboard REST API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the API
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout: u64,
    /// Value of the `X-Version` header
    pub version: String,
    /// User agent sent with every request
    pub user_agent: String,
    /// Upper bound on pages fetched by a single `get_all_pages` call
    pub max_pages: usize,
    /// Default page size for paginated listings
    pub page_size: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout: 10,
            version: default_api_version(),
            user_agent: default_user_agent(),
            max_pages: 100,
            page_size: 100,
        }
    }
}

impl ApiConfig {
    /// Request timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Authentication scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    /// Static API token
    #[default]
    Bearer,
    /// OAuth2 authorization code flow with refreshable tokens
    #[serde(alias = "oauth")]
    OAuth2,
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthType::Bearer => write!(f, "bearer"),
            AuthType::OAuth2 => write!(f, "oauth2"),
        }
    }
}

impl FromStr for AuthType {
    type Err = ProductboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "bearer" | "token" => Ok(AuthType::Bearer),
            "oauth2" | "oauth" => Ok(AuthType::OAuth2),
            other => Err(ProductboardError::config(format!(
                "Unknown auth type '{}' (valid options: bearer, oauth2)",
                other
            ))),
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Selected scheme
    #[serde(rename = "type")]
    pub r#type: AuthType,
    /// Static API token (bearer scheme)
    #[serde(deserialize_with = "option_secret_string::deserialize")]
    pub token: Option<Secret<String>>,
    /// OAuth2 client id
    pub client_id: Option<String>,
    /// OAuth2 client secret
    #[serde(deserialize_with = "option_secret_string::deserialize")]
    pub client_secret: Option<Secret<String>>,
    /// OAuth2 redirect URI registered with Productboard
    pub redirect_uri: String,
    /// OAuth2 scopes requested during authorization
    pub scopes: Vec<String>,
    /// OAuth2 authorization endpoint
    pub authorization_url: String,
    /// OAuth2 token endpoint
    pub token_url: String,
    /// Explicit token file location, searched before the well-known ones
    pub token_file: Option<PathBuf>,
    /// Persist refreshed tokens to the token file
    pub persist_tokens: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            r#type: AuthType::default(),
            token: None,
            client_id: None,
            client_secret: None,
            redirect_uri: default_redirect_uri(),
            scopes: Vec::new(),
            authorization_url: default_authorization_url(),
            token_url: default_token_url(),
            token_file: None,
            persist_tokens: true,
        }
    }
}

impl AuthConfig {
    /// Check that the selected scheme has what it needs
    pub fn validate(&self) -> Result<()> {
        match self.r#type {
            AuthType::Bearer => {
                let has_token = self
                    .token
                    .as_ref()
                    .map_or(false, |t| !t.expose_secret().trim().is_empty());
                if !has_token {
                    return Err(ProductboardError::config(
                        "Bearer authentication requires an API token (PRODUCTBOARD_API_TOKEN)",
                    ));
                }
            }
            AuthType::OAuth2 => {
                if self.client_id.as_deref().map_or(true, |id| id.trim().is_empty()) {
                    return Err(ProductboardError::config(
                        "OAuth2 authentication requires a client id (PRODUCTBOARD_CLIENT_ID)",
                    ));
                }
                let has_secret = self
                    .client_secret
                    .as_ref()
                    .map_or(false, |s| !s.expose_secret().is_empty());
                if !has_secret {
                    return Err(ProductboardError::config(
                        "OAuth2 authentication requires a client secret (PRODUCTBOARD_CLIENT_SECRET)",
                    ));
                }
                url::Url::parse(&self.token_url).map_err(|e| {
                    ProductboardError::config(format!("Invalid token URL '{}': {}", self.token_url, e))
                })?;
                url::Url::parse(&self.authorization_url).map_err(|e| {
                    ProductboardError::config(format!(
                        "Invalid authorization URL '{}': {}",
                        self.authorization_url, e
                    ))
                })?;
            }
        }
        Ok(())
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level filter used when RUST_LOG is not set
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Load .env files in order of precedence
    fn load_env_files() {
        let env = std::env::var("PRODUCTBOARD_ENV")
            .or_else(|_| std::env::var("ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let env_specific_file = format!(".env.{}", env);
        for env_file in [".env", env_specific_file.as_str(), ".env.local"] {
            match dotenvy::from_filename(env_file) {
                Ok(_) => tracing::info!("Loaded environment variables from {}", env_file),
                Err(e) if e.not_found() => {
                    tracing::debug!("No {} file found, skipping", env_file);
                }
                Err(e) => tracing::warn!("Failed to load {}: {}", env_file, e),
            }
        }
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Precedence: .env < file < process environment. CLI overrides are
    /// applied by the caller before `validate`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_env_files();

        let mut config = if path.as_ref().exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                ProductboardError::config(format!("Failed to read config file: {}", e))
            })?;
            Self::from_yaml(&content)?
        } else {
            tracing::debug!("Config file {:?} not found, using defaults", path.as_ref());
            Self::default()
        };

        config.apply_environment_overrides()?;
        Ok(config)
    }

    /// Parse configuration from a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| ProductboardError::config(format!("Failed to parse config file: {}", e)))
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.api.base_url).map_err(|e| {
            ProductboardError::config(format!("Invalid API base URL '{}': {}", self.api.base_url, e))
        })?;
        if self.api.timeout == 0 {
            return Err(ProductboardError::config("API timeout must be greater than zero"));
        }
        self.auth.validate()?;
        self.rate_limit.validate()?;
        self.retry.validate()?;
        Ok(())
    }
}
