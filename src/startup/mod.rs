//! Application wiring
//!
//! Every shared component is built here and handed to its users through
//! constructors, so two applications in one process share nothing.

mod logger;

pub use logger::StartupLogger;

use crate::auth::{AuthenticationManager, Credentials, TokenStore};
use crate::client::{build_http_client, ApiClient};
use crate::config::Config;
use crate::error::{ProductboardError, Result};
use crate::mcp::{run_stdio, ProtocolHandler};
use crate::rate_limit::RateLimiter;
use crate::retry::RetryHandler;
use crate::tools::build_registry;
use std::sync::Arc;
use tracing::info;

/// Fully wired bridge
pub struct Application {
    pub config: Config,
    pub auth: Arc<AuthenticationManager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub client: Arc<ApiClient>,
    pub handler: ProtocolHandler,
}

impl Application {
    /// Validate the configuration and build every component; no API call is made
    pub async fn build(config: Config) -> Result<Self> {
        config.validate()?;

        let http = build_http_client(&config.api)?;
        let store = Arc::new(TokenStore::with_credentials(Credentials::try_from(&config.auth)?));
        let auth = Arc::new(AuthenticationManager::new(&config.auth, store, http.clone()));
        auth.load_persisted_tokens().await;

        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let client = Arc::new(ApiClient::new(
            http,
            config.api.clone(),
            Arc::clone(&auth),
            Arc::clone(&rate_limiter),
            RetryHandler::new(config.retry.clone()),
            config.cache.clone(),
        )?);

        let registry = Arc::new(build_registry(Arc::clone(&client))?);
        let handler = ProtocolHandler::new(registry, Arc::clone(&rate_limiter));

        Ok(Self {
            config,
            auth,
            rate_limiter,
            client,
            handler,
        })
    }

    /// Credentials must validate before anything is served
    pub async fn ensure_credentials(&self) -> Result<()> {
        if !self.auth.validate_credentials().await? {
            return Err(ProductboardError::authentication(
                "Configured credentials are not usable; check the API token or re-run the OAuth2 authorization",
            ));
        }
        info!(state = %self.auth.state(), "Credentials validated");
        Ok(())
    }

    /// Validate credentials, log the startup summary and serve stdio until EOF or shutdown
    pub async fn run(self) -> Result<()> {
        self.ensure_credentials().await?;
        StartupLogger::display_startup_info(
            &self.config,
            crate::VERSION,
            self.handler.registry().len(),
            self.auth.state(),
        );
        run_stdio(&self.handler).await
    }
}
