//! Environment variable integration for bridge configuration

use crate::config::{AuthType, Config};
use crate::error::{ProductboardError, Result};
use secrecy::Secret;
use std::env;
use std::path::PathBuf;
use tracing::debug;

/// Environment variable names read by the bridge
pub struct EnvVars;

impl EnvVars {
    pub const AUTH_TYPE: &'static str = "PRODUCTBOARD_AUTH_TYPE";
    pub const API_TOKEN: &'static str = "PRODUCTBOARD_API_TOKEN";
    pub const CLIENT_ID: &'static str = "PRODUCTBOARD_CLIENT_ID";
    pub const CLIENT_SECRET: &'static str = "PRODUCTBOARD_CLIENT_SECRET";
    pub const REDIRECT_URI: &'static str = "PRODUCTBOARD_REDIRECT_URI";
    pub const API_BASE_URL: &'static str = "PRODUCTBOARD_API_BASE_URL";
    pub const TIMEOUT: &'static str = "PRODUCTBOARD_TIMEOUT";
    pub const RATE_LIMIT_GLOBAL: &'static str = "PRODUCTBOARD_RATE_LIMIT_GLOBAL";
    pub const RATE_LIMIT_WINDOW: &'static str = "PRODUCTBOARD_RATE_LIMIT_WINDOW";
    pub const TOKEN_FILE: &'static str = "PRODUCTBOARD_TOKEN_FILE";
    pub const LOG_LEVEL: &'static str = "PRODUCTBOARD_LOG_LEVEL";
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ProductboardError::config(format!("Invalid {}: '{}' is not a number", name, value)))
}

impl Config {
    /// Apply environment variable overrides to configuration
    pub fn apply_environment_overrides(&mut self) -> Result<()> {
        if let Some(auth_type) = non_empty(EnvVars::AUTH_TYPE) {
            self.auth.r#type = auth_type.parse::<AuthType>()?;
            debug!("Environment override: {}={}", EnvVars::AUTH_TYPE, self.auth.r#type);
        }

        if let Some(token) = non_empty(EnvVars::API_TOKEN) {
            debug!("Environment override: {}=<redacted>", EnvVars::API_TOKEN);
            self.auth.token = Some(Secret::new(token));
        }

        if let Some(client_id) = non_empty(EnvVars::CLIENT_ID) {
            debug!("Environment override: {}={}", EnvVars::CLIENT_ID, client_id);
            self.auth.client_id = Some(client_id);
        }

        if let Some(client_secret) = non_empty(EnvVars::CLIENT_SECRET) {
            debug!("Environment override: {}=<redacted>", EnvVars::CLIENT_SECRET);
            self.auth.client_secret = Some(Secret::new(client_secret));
        }

        if let Some(redirect_uri) = non_empty(EnvVars::REDIRECT_URI) {
            self.auth.redirect_uri = redirect_uri;
        }

        if let Some(base_url) = non_empty(EnvVars::API_BASE_URL) {
            debug!("Environment override: {}={}", EnvVars::API_BASE_URL, base_url);
            self.api.base_url = base_url;
        }

        if let Some(timeout) = non_empty(EnvVars::TIMEOUT) {
            self.api.timeout = parse_number(EnvVars::TIMEOUT, &timeout)?;
        }

        if let Some(limit) = non_empty(EnvVars::RATE_LIMIT_GLOBAL) {
            self.rate_limit.global_limit = parse_number(EnvVars::RATE_LIMIT_GLOBAL, &limit)?;
        }

        if let Some(window) = non_empty(EnvVars::RATE_LIMIT_WINDOW) {
            self.rate_limit.window_seconds = parse_number(EnvVars::RATE_LIMIT_WINDOW, &window)?;
        }

        if let Some(path) = non_empty(EnvVars::TOKEN_FILE) {
            let expanded = shellexpand::tilde(&path).into_owned();
            self.auth.token_file = Some(PathBuf::from(expanded));
        }

        if let Some(level) = non_empty(EnvVars::LOG_LEVEL) {
            self.logging.level = level;
        }

        Ok(())
    }
}
