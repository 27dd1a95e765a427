//! Productboard MCP bridge
//!
//! Exposes the Productboard REST API as MCP tools over newline-delimited
//! JSON-RPC. Outbound calls carry managed credentials, respect a token-bucket
//! rate limit and retry transient failures with exponential backoff.

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod mcp;
pub mod rate_limit;
pub mod retry;
pub mod startup;
pub mod tools;

pub use config::Config;
pub use error::{ProductboardError, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
