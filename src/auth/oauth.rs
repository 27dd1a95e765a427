//! OAuth2 authorization-code flow against the Productboard token endpoint

use crate::auth::{AuthError, AuthHeaders, TokenCache};
use crate::config::AuthConfig;
use crate::error::{ProductboardError, Result};
use chrono::{Duration, Utc};
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

// 32 random bytes, well above the 128-bit minimum for an opaque state value.
const STATE_BYTES: usize = 32;

// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Endpoint and client settings for the OAuth2 flow
#[derive(Debug, Clone)]
pub struct OAuth2Settings {
    pub authorization_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl From<&AuthConfig> for OAuth2Settings {
    fn from(config: &AuthConfig) -> Self {
        Self {
            authorization_url: config.authorization_url.clone(),
            token_url: config.token_url.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes.clone(),
        }
    }
}

/// Token endpoint response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Convert into a cache entry. A response without a refresh token keeps
    /// `previous_refresh`; both fields are replaced together by the caller.
    pub fn into_cache(self, previous_refresh: Option<Secret<String>>) -> TokenCache {
        let expires_in = self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        TokenCache {
            access_token: Some(Secret::new(self.access_token)),
            refresh_token: self.refresh_token.map(Secret::new).or(previous_refresh),
            expires_at: Some(Utc::now() + Duration::seconds(expires_in)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grant {
    AuthorizationCode,
    RefreshToken,
}

impl Grant {
    fn as_str(self) -> &'static str {
        match self {
            Grant::AuthorizationCode => "authorization_code",
            Grant::RefreshToken => "refresh_token",
        }
    }
}

/// OAuth2 provider
///
/// Holds at most one pending authorization state; generating a new
/// authorization URL supersedes the previous one.
#[derive(Debug)]
pub struct OAuth2Auth {
    settings: OAuth2Settings,
    http: reqwest::Client,
    pending_state: Mutex<Option<String>>,
}

impl OAuth2Auth {
    pub fn new(settings: OAuth2Settings, http: reqwest::Client) -> Self {
        Self {
            settings,
            http,
            pending_state: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &OAuth2Settings {
        &self.settings
    }

    /// `Authorization: Bearer <access token>` from the cache
    pub fn headers(&self, tokens: &TokenCache) -> std::result::Result<AuthHeaders, AuthError> {
        let token = tokens
            .access_token
            .as_ref()
            .filter(|t| !t.expose_secret().is_empty())
            .ok_or(AuthError::NotAuthenticated)?;
        Ok(vec![(
            "Authorization".to_string(),
            format!("Bearer {}", token.expose_secret()),
        )])
    }

    fn generate_state() -> String {
        let mut bytes = [0u8; STATE_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Build the authorization URL and remember its state value
    pub fn authorization_url(&self, client_id: &str) -> Result<String> {
        let mut url = url::Url::parse(&self.settings.authorization_url).map_err(|e| {
            ProductboardError::config(format!(
                "Invalid authorization URL '{}': {}",
                self.settings.authorization_url, e
            ))
        })?;

        let state = Self::generate_state();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", client_id)
                .append_pair("redirect_uri", &self.settings.redirect_uri)
                .append_pair("state", &state);
            if !self.settings.scopes.is_empty() {
                query.append_pair("scope", &self.settings.scopes.join(" "));
            }
        }

        *self.pending_state.lock().unwrap_or_else(|p| p.into_inner()) = Some(state);
        debug!("Generated OAuth2 authorization URL with fresh state");
        Ok(url.into())
    }

    /// True only for the most recently generated state
    pub fn validate_state(&self, state: &str) -> bool {
        let pending = self.pending_state.lock().unwrap_or_else(|p| p.into_inner());
        match pending.as_deref() {
            Some(expected) => constant_time_eq(expected.as_bytes(), state.as_bytes()),
            None => false,
        }
    }

    /// Forget the pending state once a flow has completed
    pub fn clear_state(&self) {
        *self.pending_state.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }

    /// Exchange an authorization code for tokens
    pub async fn exchange_code_for_token(
        &self,
        client_id: &str,
        client_secret: &Secret<String>,
        code: &str,
    ) -> Result<TokenResponse> {
        let params = [
            ("grant_type", Grant::AuthorizationCode.as_str()),
            ("code", code),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
            ("client_id", client_id),
            ("client_secret", client_secret.expose_secret().as_str()),
        ];
        let response = self.post_token_request(Grant::AuthorizationCode, &params).await?;
        info!("OAuth2 authorization code exchanged for tokens");
        Ok(response)
    }

    /// Exchange a refresh token for a new access token
    pub async fn refresh_token(
        &self,
        client_id: &str,
        client_secret: &Secret<String>,
        refresh_token: &Secret<String>,
    ) -> Result<TokenResponse> {
        let params = [
            ("grant_type", Grant::RefreshToken.as_str()),
            ("refresh_token", refresh_token.expose_secret().as_str()),
            ("client_id", client_id),
            ("client_secret", client_secret.expose_secret().as_str()),
        ];
        let response = self.post_token_request(Grant::RefreshToken, &params).await?;
        info!("OAuth2 access token refreshed");
        Ok(response)
    }

    async fn post_token_request(&self, grant: Grant, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(&self.settings.token_url)
            .header("Accept", "application/json")
            .form(params)
            .send()
            .await
            .map_err(|e| {
                error!(grant = grant.as_str(), "Token endpoint unreachable: {}", e);
                ProductboardError::Http(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed: Option<TokenErrorBody> = serde_json::from_str(&body).ok();
            let error_code = parsed.as_ref().and_then(|b| b.error.clone());

            // A rejected refresh token means the full authorization flow must be restarted.
            if grant == Grant::RefreshToken
                && (status.as_u16() == 401 || error_code.as_deref() == Some("invalid_grant"))
            {
                warn!(status = status.as_u16(), "Refresh token rejected by token endpoint");
                return Err(AuthError::RefreshTokenInvalid.into());
            }

            let message = parsed
                .and_then(|b| b.error_description.or(b.error))
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("token endpoint error")
                        .to_string()
                });
            error!(
                grant = grant.as_str(),
                status = status.as_u16(),
                "Token exchange failed: {}",
                message
            );
            return Err(AuthError::TokenExchange {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let token: TokenResponse = response.json().await?;
        if token.access_token.is_empty() {
            return Err(AuthError::TokenExchange {
                status: status.as_u16(),
                message: "Token endpoint returned an empty access token".to_string(),
            }
            .into());
        }
        Ok(token)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OAuth2Auth {
        OAuth2Auth::new(
            OAuth2Settings {
                authorization_url: "https://app.example.com/oauth2/authorize".to_string(),
                token_url: "https://app.example.com/oauth2/token".to_string(),
                redirect_uri: "http://localhost:3000/callback".to_string(),
                scopes: vec!["product_hierarchy_data:read".to_string(), "notes:create".to_string()],
            },
            reqwest::Client::new(),
        )
    }

    fn state_of(url: &str) -> String {
        url::Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[test]
    fn test_authorization_url_parameters() {
        let auth = provider();
        let url = url::Url::parse(&auth.authorization_url("client-1").unwrap()).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(params["response_type"], "code");
        assert_eq!(params["client_id"], "client-1");
        assert_eq!(params["redirect_uri"], "http://localhost:3000/callback");
        assert_eq!(params["scope"], "product_hierarchy_data:read notes:create");
        assert_eq!(params["state"].len(), STATE_BYTES * 2);
    }

    #[test]
    fn test_only_latest_state_validates() {
        let auth = provider();
        assert!(!auth.validate_state("anything"));

        let first = state_of(&auth.authorization_url("cid").unwrap());
        assert!(auth.validate_state(&first));

        let second = state_of(&auth.authorization_url("cid").unwrap());
        assert_ne!(first, second);
        assert!(auth.validate_state(&second));
        assert!(!auth.validate_state(&first));
        assert!(!auth.validate_state(""));

        auth.clear_state();
        assert!(!auth.validate_state(&second));
    }

    #[test]
    fn test_refresh_token_is_kept_when_not_rotated() {
        let response = TokenResponse {
            access_token: "new-access".to_string(),
            refresh_token: None,
            expires_in: Some(120),
            token_type: Some("Bearer".to_string()),
            scope: None,
        };
        let cache = response.into_cache(Some(Secret::new("old-refresh".to_string())));
        assert_eq!(cache.refresh_token.as_ref().unwrap().expose_secret(), "old-refresh");
        assert!(!cache.is_expired());
    }

    #[test]
    fn test_headers_require_access_token() {
        let auth = provider();
        assert_eq!(auth.headers(&TokenCache::default()).unwrap_err(), AuthError::NotAuthenticated);

        let cache = TokenCache::new("at".to_string(), None, None);
        assert_eq!(auth.headers(&cache).unwrap()[0].1, "Bearer at");
    }
}
