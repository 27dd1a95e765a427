//! Credential lifecycle orchestration
//!
//! `auth_headers` is synchronous and never refreshes. Callers keep the token
//! fresh by calling `validate_credentials` (or `refresh_credentials`) before
//! building a request.

use crate::auth::{
    AuthError, AuthHeaders, BearerAuth, Credentials, OAuth2Auth, OAuth2Settings, PersistedTokens,
    TokenCache, TokenFile, TokenStore,
};
use crate::config::{AuthConfig, AuthType};
use crate::error::{ProductboardError, Result};
use secrecy::{ExposeSecret, Secret};
use std::fmt;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Scheme-specific provider selected at construction
#[derive(Debug)]
pub enum AuthProvider {
    Bearer(BearerAuth),
    OAuth2(OAuth2Auth),
}

impl AuthProvider {
    pub fn name(&self) -> &'static str {
        match self {
            AuthProvider::Bearer(_) => "bearer",
            AuthProvider::OAuth2(_) => "oauth2",
        }
    }
}

/// OAuth2 credential lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
    Expired,
    Refreshing,
    /// Refresh token rejected; stays here until credentials are set again
    Failed,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::Authenticated => "authenticated",
            AuthState::Expired => "expired",
            AuthState::Refreshing => "refreshing",
            AuthState::Failed => "failed",
        };
        f.write_str(name)
    }
}

impl TryFrom<&AuthConfig> for Credentials {
    type Error = ProductboardError;

    fn try_from(config: &AuthConfig) -> Result<Self> {
        config.validate()?;
        match config.r#type {
            AuthType::Bearer => {
                let token = config
                    .token
                    .as_ref()
                    .map(|t| t.expose_secret().trim().to_string())
                    .ok_or_else(|| ProductboardError::config("Missing API token"))?;
                Ok(Credentials::Bearer {
                    token: Secret::new(token),
                })
            }
            AuthType::OAuth2 => {
                let client_id = config
                    .client_id
                    .clone()
                    .ok_or_else(|| ProductboardError::config("Missing OAuth2 client id"))?;
                let client_secret = config
                    .client_secret
                    .clone()
                    .ok_or_else(|| ProductboardError::config("Missing OAuth2 client secret"))?;
                Ok(Credentials::OAuth2 {
                    client_id,
                    client_secret,
                })
            }
        }
    }
}

/// Owns the token store and the selected auth provider
pub struct AuthenticationManager {
    store: Arc<TokenStore>,
    provider: AuthProvider,
    token_file: Option<TokenFile>,
    state: RwLock<AuthState>,
    refresh_lock: Mutex<()>,
}

impl fmt::Debug for AuthenticationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationManager")
            .field("provider", &self.provider.name())
            .field("state", &self.state())
            .field("persist_tokens", &self.token_file.is_some())
            .finish()
    }
}

impl AuthenticationManager {
    /// Create a manager for the configured scheme around an injected store
    pub fn new(config: &AuthConfig, store: Arc<TokenStore>, http: reqwest::Client) -> Self {
        let provider = match config.r#type {
            AuthType::Bearer => AuthProvider::Bearer(BearerAuth::new()),
            AuthType::OAuth2 => AuthProvider::OAuth2(OAuth2Auth::new(OAuth2Settings::from(config), http)),
        };
        let token_file = match (&provider, config.persist_tokens) {
            (AuthProvider::OAuth2(_), true) => Some(TokenFile::new(config.token_file.clone())),
            _ => None,
        };

        debug!(
            provider = provider.name(),
            persist_tokens = token_file.is_some(),
            "Authentication manager created"
        );

        Self {
            store,
            provider,
            token_file,
            state: RwLock::new(AuthState::Unauthenticated),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn provider(&self) -> &AuthProvider {
        &self.provider
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    fn oauth(&self) -> std::result::Result<&OAuth2Auth, AuthError> {
        match &self.provider {
            AuthProvider::OAuth2(oauth) => Ok(oauth),
            AuthProvider::Bearer(_) => Err(AuthError::OAuthNotConfigured),
        }
    }

    fn oauth_client(&self) -> std::result::Result<(String, Secret<String>), AuthError> {
        match self.store.credentials() {
            Some(Credentials::OAuth2 {
                client_id,
                client_secret,
            }) => Ok((client_id, client_secret)),
            Some(Credentials::Bearer { .. }) => Err(AuthError::OAuthNotConfigured),
            None => Err(AuthError::NoCredentials),
        }
    }

    fn set_state(&self, state: AuthState) {
        let mut current = self.state.write().unwrap_or_else(|p| p.into_inner());
        if *current != state {
            debug!(from = %*current, to = %state, "Auth state transition");
            *current = state;
        }
    }

    fn stored_state(&self) -> AuthState {
        *self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    /// Current state; an authenticated OAuth2 session turns `Expired` with the clock
    pub fn state(&self) -> AuthState {
        let state = self.stored_state();
        if state == AuthState::Authenticated && self.is_token_expired() {
            return AuthState::Expired;
        }
        state
    }

    /// Headers for the next request; never triggers a refresh
    pub fn auth_headers(&self) -> std::result::Result<AuthHeaders, AuthError> {
        match self.store.credentials() {
            None => Err(AuthError::NoCredentials),
            Some(Credentials::Bearer { token }) => BearerAuth::new().headers(&token),
            Some(Credentials::OAuth2 { .. }) => self.oauth()?.headers(&self.store.tokens()),
        }
    }

    /// Always false for bearer tokens, which carry no expiry
    pub fn is_token_expired(&self) -> bool {
        match self.store.credentials() {
            Some(Credentials::OAuth2 { .. }) => self.store.is_token_expired(),
            _ => false,
        }
    }

    /// Make sure usable credentials are in place, refreshing an expired OAuth2 token
    pub async fn validate_credentials(&self) -> Result<bool> {
        match self.store.credentials() {
            None => Err(AuthError::NoCredentials.into()),
            Some(Credentials::Bearer { token }) => {
                let valid = BearerAuth::new().validate(&token);
                self.set_state(if valid {
                    AuthState::Authenticated
                } else {
                    AuthState::Unauthenticated
                });
                Ok(valid)
            }
            Some(Credentials::OAuth2 { .. }) => {
                if self.stored_state() == AuthState::Failed {
                    return Err(AuthError::RefreshTokenInvalid.into());
                }

                if self.is_token_expired() {
                    let _guard = self.refresh_lock.lock().await;
                    // Another task may have refreshed while we waited.
                    if self.is_token_expired() {
                        self.set_state(AuthState::Expired);
                        self.refresh_locked().await?;
                    }
                }

                let valid = self.store.tokens().has_access_token();
                if valid {
                    self.set_state(AuthState::Authenticated);
                }
                Ok(valid)
            }
        }
    }

    /// Exchange the cached refresh token for a new access token
    pub async fn refresh_credentials(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Result<()> {
        let (client_id, client_secret) = match self.store.credentials() {
            None => return Err(AuthError::NoCredentials.into()),
            Some(Credentials::Bearer { .. }) => return Err(AuthError::RefreshNotSupported.into()),
            Some(Credentials::OAuth2 {
                client_id,
                client_secret,
            }) => (client_id, client_secret),
        };
        let oauth = self.oauth()?;

        let refresh_token = self
            .store
            .tokens()
            .refresh_token
            .filter(|t| !t.expose_secret().is_empty())
            .ok_or(AuthError::NoRefreshToken)?;

        self.set_state(AuthState::Refreshing);
        match oauth.refresh_token(&client_id, &client_secret, &refresh_token).await {
            Ok(response) => {
                let cache = response.into_cache(Some(refresh_token));
                self.store.set_tokens(cache.clone());
                self.set_state(AuthState::Authenticated);
                self.persist(&cache).await;
                Ok(())
            }
            Err(e) => {
                if matches!(e, ProductboardError::Auth(AuthError::RefreshTokenInvalid)) {
                    warn!("Refresh token rejected; re-run the OAuth2 authorization flow");
                    self.set_state(AuthState::Failed);
                } else {
                    self.set_state(AuthState::Expired);
                }
                Err(e)
            }
        }
    }

    /// Replace credentials wholesale; cached tokens and any failure state are dropped
    pub fn set_credentials(&self, credentials: Credentials) {
        info!(scheme = credentials.scheme(), "Credentials replaced");
        self.store.set_credentials(credentials);
        if let AuthProvider::OAuth2(oauth) = &self.provider {
            oauth.clear_state();
        }
        self.set_state(AuthState::Unauthenticated);
    }

    /// Start the OAuth2 flow: URL the user must visit
    pub fn authorization_url(&self) -> Result<String> {
        let (client_id, _) = self.oauth_client()?;
        self.oauth()?.authorization_url(&client_id)
    }

    /// Finish the OAuth2 flow with the code and state from the redirect
    pub async fn complete_authorization(&self, code: &str, state: &str) -> Result<()> {
        let oauth = self.oauth()?;
        if !oauth.validate_state(state) {
            warn!("OAuth2 state mismatch; authorization rejected");
            return Err(AuthError::InvalidState.into());
        }
        let (client_id, client_secret) = self.oauth_client()?;

        let _guard = self.refresh_lock.lock().await;
        let response = oauth.exchange_code_for_token(&client_id, &client_secret, code).await?;
        oauth.clear_state();

        let cache = response.into_cache(None);
        self.store.set_tokens(cache.clone());
        self.set_state(AuthState::Authenticated);
        self.persist(&cache).await;
        Ok(())
    }

    /// Seed the token cache from the token file; returns whether tokens were loaded
    pub async fn load_persisted_tokens(&self) -> bool {
        let Some(file) = &self.token_file else {
            return false;
        };
        if !matches!(self.store.credentials(), Some(Credentials::OAuth2 { .. })) {
            return false;
        }
        match file.load().await {
            Some(tokens) => {
                self.store.set_tokens(tokens.into_cache());
                self.set_state(AuthState::Authenticated);
                true
            }
            None => {
                debug!("No persisted OAuth2 tokens found");
                false
            }
        }
    }

    // Local persistence never turns a successful exchange into a failure.
    async fn persist(&self, cache: &TokenCache) {
        let Some(file) = &self.token_file else {
            return;
        };
        let Some(tokens) = PersistedTokens::from_cache(cache) else {
            return;
        };
        if let Err(e) = file.save(&tokens).await {
            warn!("Failed to persist OAuth2 tokens: {}", e);
        }
    }
}
