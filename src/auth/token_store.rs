//! In-memory credential and token cache
//!
//! The store is owned by one `AuthenticationManager` and injected where
//! needed; two clients built in the same process never share a store.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, Secret};
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Credentials for one of the two supported schemes
#[derive(Clone)]
pub enum Credentials {
    /// Static API token
    Bearer { token: Secret<String> },
    /// OAuth2 client registration
    OAuth2 {
        client_id: String,
        client_secret: Secret<String>,
    },
}

impl Credentials {
    /// Bearer credentials from a plain token
    pub fn bearer<S: Into<String>>(token: S) -> Self {
        Credentials::Bearer {
            token: Secret::new(token.into()),
        }
    }

    /// OAuth2 credentials from a client id and secret
    pub fn oauth2<S: Into<String>>(client_id: S, client_secret: S) -> Self {
        Credentials::OAuth2 {
            client_id: client_id.into(),
            client_secret: Secret::new(client_secret.into()),
        }
    }

    /// Scheme name for logs
    pub fn scheme(&self) -> &'static str {
        match self {
            Credentials::Bearer { .. } => "bearer",
            Credentials::OAuth2 { .. } => "oauth2",
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Bearer { .. } => f.debug_struct("Bearer").field("token", &"[REDACTED]").finish(),
            Credentials::OAuth2 { client_id, .. } => f
                .debug_struct("OAuth2")
                .field("client_id", client_id)
                .field("client_secret", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Cached OAuth2 tokens
#[derive(Clone, Default)]
pub struct TokenCache {
    pub access_token: Option<Secret<String>>,
    pub refresh_token: Option<Secret<String>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenCache {
    /// Build a cache entry from raw token strings
    pub fn new(access_token: String, refresh_token: Option<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            access_token: Some(Secret::new(access_token)),
            refresh_token: refresh_token.map(Secret::new),
            expires_at,
        }
    }

    /// A missing or past expiry counts as expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Expiry check against an explicit clock reading
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now,
            None => true,
        }
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token
            .as_ref()
            .map_or(false, |t| !t.expose_secret().is_empty())
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token
            .as_ref()
            .map_or(false, |t| !t.expose_secret().is_empty())
    }
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Holder of credentials and cached tokens
///
/// Every mutation is a single synchronous replacement under a lock that is
/// never held across an await.
#[derive(Debug, Default)]
pub struct TokenStore {
    credentials: RwLock<Option<Credentials>>,
    tokens: RwLock<TokenCache>,
}

impl TokenStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `credentials`
    pub fn with_credentials(credentials: Credentials) -> Self {
        let store = Self::new();
        store.set_credentials(credentials);
        store
    }

    fn read_credentials(&self) -> RwLockReadGuard<'_, Option<Credentials>> {
        self.credentials.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_credentials(&self) -> RwLockWriteGuard<'_, Option<Credentials>> {
        self.credentials.write().unwrap_or_else(|p| p.into_inner())
    }

    fn read_tokens(&self) -> RwLockReadGuard<'_, TokenCache> {
        self.tokens.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_tokens(&self) -> RwLockWriteGuard<'_, TokenCache> {
        self.tokens.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Replace the credentials wholesale and drop any cached tokens
    pub fn set_credentials(&self, credentials: Credentials) {
        *self.write_credentials() = Some(credentials);
        *self.write_tokens() = TokenCache::default();
    }

    /// Current credentials, if any
    pub fn credentials(&self) -> Option<Credentials> {
        self.read_credentials().clone()
    }

    pub fn has_credentials(&self) -> bool {
        self.read_credentials().is_some()
    }

    /// Snapshot of the cached tokens
    pub fn tokens(&self) -> TokenCache {
        self.read_tokens().clone()
    }

    /// Replace the cached tokens; access and refresh token change together
    pub fn set_tokens(&self, tokens: TokenCache) {
        *self.write_tokens() = tokens;
    }

    /// Drop the cached tokens
    pub fn clear_tokens(&self) {
        *self.write_tokens() = TokenCache::default();
    }

    pub fn is_token_expired(&self) -> bool {
        self.read_tokens().is_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_missing_expiry_counts_as_expired() {
        let cache = TokenCache::new("at".to_string(), None, None);
        assert!(cache.is_expired());

        let cache = TokenCache::new("at".to_string(), None, Some(Utc::now() + Duration::hours(1)));
        assert!(!cache.is_expired());

        let cache = TokenCache::new("at".to_string(), None, Some(Utc::now() - Duration::seconds(1)));
        assert!(cache.is_expired());
    }

    #[test]
    fn test_set_credentials_clears_tokens() {
        let store = TokenStore::with_credentials(Credentials::oauth2("cid", "secret"));
        store.set_tokens(TokenCache::new(
            "at".to_string(),
            Some("rt".to_string()),
            Some(Utc::now() + Duration::hours(1)),
        ));
        assert!(store.tokens().has_access_token());

        store.set_credentials(Credentials::bearer("pat"));
        assert!(!store.tokens().has_access_token());
        assert_eq!(store.credentials().map(|c| c.scheme()), Some("bearer"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials::oauth2("cid", "top-secret");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("cid"));
        assert!(!rendered.contains("top-secret"));

        let cache = TokenCache::new("access-value".to_string(), None, None);
        assert!(!format!("{:?}", cache).contains("access-value"));
    }
}
