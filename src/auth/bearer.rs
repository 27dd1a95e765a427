//! Static API token authentication

use crate::auth::{AuthError, AuthHeaders};
use secrecy::{ExposeSecret, Secret};

/// Bearer scheme: one long-lived token, no expiry, nothing to refresh
#[derive(Debug, Clone, Default)]
pub struct BearerAuth;

impl BearerAuth {
    pub fn new() -> Self {
        Self
    }

    /// `Authorization: Bearer <token>`
    pub fn headers(&self, token: &Secret<String>) -> Result<AuthHeaders, AuthError> {
        if !self.validate(token) {
            return Err(AuthError::NoCredentials);
        }
        Ok(vec![(
            "Authorization".to_string(),
            format!("Bearer {}", token.expose_secret().trim()),
        )])
    }

    /// A token is usable when it is non-blank
    pub fn validate(&self, token: &Secret<String>) -> bool {
        !token.expose_secret().trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_header() {
        let auth = BearerAuth::new();
        let headers = auth.headers(&Secret::new("pb-token".to_string())).unwrap();
        assert_eq!(headers, vec![("Authorization".to_string(), "Bearer pb-token".to_string())]);
    }

    #[test]
    fn test_blank_token_is_rejected() {
        let auth = BearerAuth::new();
        assert!(!auth.validate(&Secret::new("   ".to_string())));
        assert_eq!(
            auth.headers(&Secret::new(String::new())).unwrap_err(),
            AuthError::NoCredentials
        );
    }
}
