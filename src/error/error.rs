//! Error types and handling for the Productboard MCP bridge

use crate::auth::AuthError;
use serde_json::Value;
use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, ProductboardError>;

/// Main error type for the bridge
///
/// The first seven variants form the domain taxonomy produced by translating
/// HTTP responses of the Productboard API. Transport failures are kept as
/// the raw `reqwest::Error` so callers can tell "the server said no" apart
/// from "the server was never reached".
#[derive(Error, Debug)]
pub enum ProductboardError {
    /// The request was rejected as malformed (HTTP 400)
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    /// Credentials were missing or rejected (HTTP 401)
    #[error("Authentication error: {message}")]
    Authentication {
        message: String,
        details: Option<Value>,
    },

    /// Credentials were accepted but lack permission (HTTP 403)
    #[error("Authorization error: {message}")]
    Authorization {
        message: String,
        details: Option<Value>,
    },

    /// The addressed entity does not exist (HTTP 404)
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        resource: Option<String>,
        details: Option<Value>,
    },

    /// The API budget is exhausted (HTTP 429)
    #[error("Rate limit exceeded: {message} (retry after {retry_after}s)")]
    RateLimit {
        message: String,
        retry_after: u64,
        details: Option<Value>,
    },

    /// The server failed (HTTP 5xx)
    #[error("Server error ({status}): {message}")]
    ServerError {
        message: String,
        status: u16,
        details: Option<Value>,
    },

    /// Any other non-success status
    #[error("API error {code} ({status}): {message}")]
    Generic {
        message: String,
        code: String,
        status: u16,
        details: Option<Value>,
    },

    /// Credential lifecycle errors
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Configuration errors (fatal at startup)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Pure transport failures, never wrapped into a domain error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ProductboardError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    /// Create an authentication error
    pub fn authentication<S: Into<String>>(message: S) -> Self {
        Self::Authentication {
            message: message.into(),
            details: None,
        }
    }

    /// Create an authorization error
    pub fn authorization<S: Into<String>>(message: S) -> Self {
        Self::Authorization {
            message: message.into(),
            details: None,
        }
    }

    /// Create a not-found error with an optional resource hint
    pub fn not_found<S: Into<String>>(message: S, resource: Option<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            resource,
            details: None,
        }
    }

    /// Create a rate limit error
    pub fn rate_limit<S: Into<String>>(message: S, retry_after: u64) -> Self {
        Self::RateLimit {
            message: message.into(),
            retry_after,
            details: None,
        }
    }

    /// Create a server error
    pub fn server_error<S: Into<String>>(message: S, status: u16) -> Self {
        Self::ServerError {
            message: message.into(),
            status,
            details: None,
        }
    }

    /// Create an internal error from anything displayable
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(anyhow::anyhow!(message.into()))
    }

    /// HTTP status this error was translated from, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Validation { .. } => Some(400),
            Self::Authentication { .. } => Some(401),
            Self::Authorization { .. } => Some(403),
            Self::NotFound { .. } => Some(404),
            Self::RateLimit { .. } => Some(429),
            Self::ServerError { status, .. } | Self::Generic { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Structured details attached by the server, if any
    pub fn details(&self) -> Option<&Value> {
        match self {
            Self::Validation { details, .. }
            | Self::Authentication { details, .. }
            | Self::Authorization { details, .. }
            | Self::NotFound { details, .. }
            | Self::RateLimit { details, .. }
            | Self::ServerError { details, .. }
            | Self::Generic { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    /// Attach structured details to a domain error; other variants are returned unchanged
    pub fn with_details(mut self, value: Value) -> Self {
        match &mut self {
            Self::Validation { details, .. }
            | Self::Authentication { details, .. }
            | Self::Authorization { details, .. }
            | Self::NotFound { details, .. }
            | Self::RateLimit { details, .. }
            | Self::ServerError { details, .. }
            | Self::Generic { details, .. } => *details = Some(value),
            _ => {}
        }
        self
    }

    /// Check if this error is retryable
    ///
    /// Rate limits, 5xx responses and transport faults are transient. Typed
    /// client and permission errors are not. Untyped errors fail open.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimit { .. } | Self::ServerError { .. } => true,
            Self::Http(e) => !e.is_builder() && !e.is_redirect(),
            Self::Io(_) | Self::Internal(_) => true,
            Self::Validation { .. }
            | Self::Authentication { .. }
            | Self::Authorization { .. }
            | Self::NotFound { .. }
            | Self::Generic { .. }
            | Self::Auth(_)
            | Self::Config { .. }
            | Self::Serde(_)
            | Self::Yaml(_) => false,
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Authentication { .. } => "authentication",
            Self::Authorization { .. } => "authorization",
            Self::NotFound { .. } => "not_found",
            Self::RateLimit { .. } => "rate_limit",
            Self::ServerError { .. } => "server_error",
            Self::Generic { .. } => "generic",
            Self::Auth(_) => "auth",
            Self::Config { .. } => "config",
            Self::Http(_) => "http",
            Self::Io(_) => "io",
            Self::Serde(_) => "serialization",
            Self::Yaml(_) => "yaml",
            Self::Internal(_) => "internal",
        }
    }
}
