//! Authentication for outbound Productboard API calls
//!
//! Two schemes are supported: a static bearer token and the OAuth2
//! authorization-code flow with refreshable tokens. The
//! [`AuthenticationManager`] owns the credential lifecycle and hands the API
//! client ready-made headers.

mod bearer;
mod manager;
mod oauth;
mod token_file;
mod token_store;

pub use bearer::BearerAuth;
pub use manager::{AuthProvider, AuthState, AuthenticationManager};
pub use oauth::{OAuth2Auth, OAuth2Settings, TokenResponse};
pub use token_file::{PersistedTokens, TokenFile, TOKEN_FILE_NAME};
pub use token_store::{Credentials, TokenCache, TokenStore};

use thiserror::Error;

/// Headers attached to every authenticated request
pub type AuthHeaders = Vec<(String, String)>;

/// Credential lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No credentials were configured
    #[error("No credentials configured")]
    NoCredentials,

    /// The active scheme has nothing to refresh
    #[error("Token refresh is not supported for bearer authentication")]
    RefreshNotSupported,

    /// The token cache holds no refresh token
    #[error("No refresh token available")]
    NoRefreshToken,

    /// The token endpoint rejected the refresh token; the authorization flow must be restarted
    #[error("Refresh token is invalid or expired")]
    RefreshTokenInvalid,

    /// No usable access token is cached
    #[error("Not authenticated: no valid access token")]
    NotAuthenticated,

    /// The OAuth2 state parameter did not match the pending authorization
    #[error("Invalid OAuth2 state parameter")]
    InvalidState,

    /// The token endpoint returned an error
    #[error("Token exchange failed ({status}): {message}")]
    TokenExchange { status: u16, message: String },

    /// OAuth2 operations were requested while another scheme is active
    #[error("OAuth2 is not configured")]
    OAuthNotConfigured,
}
