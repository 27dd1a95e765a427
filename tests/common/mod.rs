//! Shared builders for integration tests

#![allow(dead_code)]

use productboard_mcp::config::AuthType;
use productboard_mcp::retry::RetryPolicy;
use productboard_mcp::startup::Application;
use productboard_mcp::Config;
use secrecy::Secret;
use std::path::Path;
use wiremock::MockServer;

/// Bearer config pointed at the mock server with millisecond retry delays
pub fn bearer_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.api.base_url = server.uri();
    config.api.timeout = 5;
    config.auth.token = Some(Secret::new("test-token".to_string()));
    config.retry = RetryPolicy::new(3, 10, 50);
    config
}

/// OAuth2 config whose token endpoint lives on the mock server
pub fn oauth_config(server: &MockServer, token_file: &Path) -> Config {
    let mut config = bearer_config(server);
    config.auth.r#type = AuthType::OAuth2;
    config.auth.token = None;
    config.auth.client_id = Some("client-1".to_string());
    config.auth.client_secret = Some(Secret::new("secret-1".to_string()));
    config.auth.token_url = format!("{}/oauth2/token", server.uri());
    config.auth.authorization_url = format!("{}/oauth2/authorize", server.uri());
    config.auth.token_file = Some(token_file.to_path_buf());
    config
}

pub async fn build(config: Config) -> Application {
    Application::build(config).await.expect("application should build")
}
