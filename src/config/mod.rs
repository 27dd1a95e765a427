//! Configuration module
//!
//! YAML file, `.env` files and environment variable overrides.

mod config;
mod environment;

pub use config::{ApiConfig, AuthConfig, AuthType, Config, LogFormat, LoggingConfig};
pub use environment::EnvVars;
