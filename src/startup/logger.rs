//! Startup summary logging

use crate::auth::AuthState;
use crate::config::Config;
use tracing::info;

/// Startup logger for system information
pub struct StartupLogger;

impl StartupLogger {
    /// Log version, auth scheme, limits and tool count
    pub fn display_startup_info(config: &Config, version: &str, tool_count: usize, auth_state: AuthState) {
        info!("🚀 productboard-mcp v{} starting...", version);
        Self::display_api(config);
        Self::display_auth(config, auth_state);
        Self::display_limits(config);
        info!("   Tools registered: {}", tool_count);
        info!("✅ Ready to serve requests over stdio");
    }

    fn display_api(config: &Config) {
        info!("🌐 API:");
        info!("   Base URL: {}", config.api.base_url);
        info!("   Version header: {}", config.api.version);
        info!("   Timeout: {}s", config.api.timeout);
    }

    fn display_auth(config: &Config, auth_state: AuthState) {
        info!("🔐 Authentication:");
        info!("   Scheme: {}", config.auth.r#type);
        info!("   State: {}", auth_state);
        if config.auth.persist_tokens {
            match &config.auth.token_file {
                Some(path) => info!("   Token file: {}", path.display()),
                None => info!("   Token file: default search locations"),
            }
        }
    }

    fn display_limits(config: &Config) {
        let rate_limit = &config.rate_limit;
        info!("⏱️  Limits:");
        info!(
            "   Rate limit: {} requests / {}s (global)",
            rate_limit.global_limit, rate_limit.window_seconds
        );
        let mut overrides: Vec<_> = rate_limit.tool_limits.iter().collect();
        overrides.sort();
        for (tool, limit) in overrides {
            info!("   Rate limit override: {} = {} / {}s", tool, limit, rate_limit.window_seconds);
        }
        info!(
            "   Retry: {} attempts, {}ms initial delay, {}ms max delay",
            config.retry.max_attempts, config.retry.initial_delay_ms, config.retry.max_delay_ms
        );
        if config.cache.enabled {
            info!(
                "   Response cache: {} entries, {}s TTL",
                config.cache.max_entries, config.cache.ttl_seconds
            );
        }
    }
}
