//! OAuth2 refresh, authorization and persistence against a mocked token endpoint

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use productboard_mcp::auth::{AuthError, AuthState, TokenCache, TOKEN_FILE_NAME};
use productboard_mcp::ProductboardError;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn expired_tokens(refresh: &str) -> TokenCache {
    TokenCache::new(
        "stale-access".to_string(),
        Some(refresh.to_string()),
        Some(Utc::now() - ChronoDuration::minutes(5)),
    )
}

async fn mount_refresh(server: &MockServer, refresh: &str, response: ResponseTemplate, calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains(format!("refresh_token={}", refresh)))
        .respond_with(response)
        .expect(calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_persisted() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let token_path = dir.path().join(TOKEN_FILE_NAME);
    mount_refresh(
        &server,
        "r1",
        ResponseTemplate::new(200).set_body_json(json!({"access_token": "a2", "expires_in": 3600})),
        1,
    )
    .await;

    let app = common::build(common::oauth_config(&server, &token_path)).await;
    app.auth.store().set_tokens(expired_tokens("r1"));

    assert!(app.auth.validate_credentials().await.unwrap());
    assert_eq!(app.auth.state(), AuthState::Authenticated);

    let tokens = app.auth.store().tokens();
    assert_eq!(tokens.access_token.as_ref().unwrap().expose_secret(), "a2");
    // No new refresh token was issued, so the old one is kept.
    assert_eq!(tokens.refresh_token.as_ref().unwrap().expose_secret(), "r1");

    let saved: Value = serde_json::from_str(&std::fs::read_to_string(&token_path).unwrap()).unwrap();
    assert_eq!(saved["accessToken"], "a2");
    assert_eq!(saved["refreshToken"], "r1");
    assert!(saved["expiresAt"].is_string());
}

#[tokio::test]
async fn test_unwritable_token_file_does_not_fail_the_refresh() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-directory");
    std::fs::write(&blocker, "plain file").unwrap();
    let token_path = blocker.join(TOKEN_FILE_NAME);
    mount_refresh(
        &server,
        "r1",
        ResponseTemplate::new(200).set_body_json(json!({"access_token": "a2", "expires_in": 3600})),
        1,
    )
    .await;

    let app = common::build(common::oauth_config(&server, &token_path)).await;
    app.auth.store().set_tokens(expired_tokens("r1"));

    assert!(app.auth.validate_credentials().await.unwrap());
    assert_eq!(app.auth.state(), AuthState::Authenticated);
    let tokens = app.auth.store().tokens();
    assert_eq!(tokens.access_token.as_ref().unwrap().expose_secret(), "a2");
    assert!(!token_path.exists());
}

#[tokio::test]
async fn test_rejected_refresh_token_fails_permanently() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_refresh(
        &server,
        "revoked",
        ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})),
        1,
    )
    .await;

    let app = common::build(common::oauth_config(&server, &dir.path().join(TOKEN_FILE_NAME))).await;
    app.auth.store().set_tokens(expired_tokens("revoked"));

    let err = app.auth.validate_credentials().await.unwrap_err();
    assert!(matches!(err, ProductboardError::Auth(AuthError::RefreshTokenInvalid)));
    assert_eq!(app.auth.state(), AuthState::Failed);

    // Failed is sticky: no second exchange is attempted.
    let err = app.auth.validate_credentials().await.unwrap_err();
    assert!(matches!(err, ProductboardError::Auth(AuthError::RefreshTokenInvalid)));
}

#[tokio::test]
async fn test_transient_refresh_failure_leaves_session_expired() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_refresh(&server, "r1", ResponseTemplate::new(503), 1).await;

    let app = common::build(common::oauth_config(&server, &dir.path().join(TOKEN_FILE_NAME))).await;
    app.auth.store().set_tokens(expired_tokens("r1"));

    let err = app.auth.validate_credentials().await.unwrap_err();
    assert!(matches!(
        err,
        ProductboardError::Auth(AuthError::TokenExchange { status: 503, .. })
    ));
    assert_eq!(app.auth.state(), AuthState::Expired);
}

#[tokio::test]
async fn test_concurrent_validation_refreshes_once() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_refresh(
        &server,
        "r1",
        ResponseTemplate::new(200)
            .set_body_json(json!({"access_token": "a2", "refresh_token": "r2", "expires_in": 3600}))
            .set_delay(Duration::from_millis(100)),
        1,
    )
    .await;

    let app = common::build(common::oauth_config(&server, &dir.path().join(TOKEN_FILE_NAME))).await;
    app.auth.store().set_tokens(expired_tokens("r1"));

    let auth = Arc::clone(&app.auth);
    let results = futures::future::join_all((0..5).map(|_| {
        let auth = Arc::clone(&auth);
        async move { auth.validate_credentials().await }
    }))
    .await;

    assert!(results.into_iter().all(|r| r.unwrap()));
    let tokens = auth.store().tokens();
    assert_eq!(tokens.refresh_token.as_ref().unwrap().expose_secret(), "r2");
}

#[tokio::test]
async fn test_api_call_refreshes_before_sending() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_refresh(
        &server,
        "r1",
        ResponseTemplate::new(200).set_body_json(json!({"access_token": "fresh", "expires_in": 3600})),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/features"))
        .and(header("Authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;

    let app = common::build(common::oauth_config(&server, &dir.path().join(TOKEN_FILE_NAME))).await;
    app.auth.store().set_tokens(expired_tokens("r1"));

    let body = app.client.get("/features", &[]).await.unwrap();
    assert_eq!(body, json!({"data": []}));
}

#[tokio::test]
async fn test_authorization_code_flow_checks_state() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let token_path = dir.path().join(TOKEN_FILE_NAME);
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=the-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a1",
            "refresh_token": "r1",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = common::build(common::oauth_config(&server, &token_path)).await;
    assert_eq!(app.auth.state(), AuthState::Unauthenticated);

    let url = url::Url::parse(&app.auth.authorization_url().unwrap()).unwrap();
    let state = url
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    let err = app.auth.complete_authorization("the-code", "forged").await.unwrap_err();
    assert!(matches!(err, ProductboardError::Auth(AuthError::InvalidState)));

    app.auth.complete_authorization("the-code", &state).await.unwrap();
    assert_eq!(app.auth.state(), AuthState::Authenticated);
    assert_eq!(
        app.auth.auth_headers().unwrap(),
        vec![("Authorization".to_string(), "Bearer a1".to_string())]
    );
    assert!(token_path.exists());

    // The state is single use.
    let err = app.auth.complete_authorization("the-code", &state).await.unwrap_err();
    assert!(matches!(err, ProductboardError::Auth(AuthError::InvalidState)));
}

#[tokio::test]
async fn test_persisted_tokens_are_loaded_at_startup() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let token_path = dir.path().join(TOKEN_FILE_NAME);
    let stored = json!({
        "accessToken": "from-disk",
        "refreshToken": "r-disk",
        "expiresAt": (Utc::now() + ChronoDuration::hours(1)).to_rfc3339(),
    });
    std::fs::write(&token_path, stored.to_string()).unwrap();

    let app = common::build(common::oauth_config(&server, &token_path)).await;
    assert_eq!(app.auth.state(), AuthState::Authenticated);
    assert!(app.auth.validate_credentials().await.unwrap());
    assert_eq!(
        app.auth.auth_headers().unwrap(),
        vec![("Authorization".to_string(), "Bearer from-disk".to_string())]
    );
}

#[tokio::test]
async fn test_bearer_credentials_never_refresh() {
    let server = MockServer::start().await;
    let app = common::build(common::bearer_config(&server)).await;

    assert!(!app.auth.is_token_expired());
    assert!(app.auth.validate_credentials().await.unwrap());
    let err = app.auth.refresh_credentials().await.unwrap_err();
    assert!(matches!(err, ProductboardError::Auth(AuthError::RefreshNotSupported)));
}
