//! Request parsing, validation, dispatch and response formatting
//!
//! Nothing that goes wrong while answering a request escapes as a raw
//! error: every failure becomes an error envelope with a fixed code.

use crate::error::ProductboardError;
use crate::mcp::errors::ProtocolError;
use crate::mcp::types::{McpRequest, McpResponse, ServerInfo, ToolCallParams, ToolCallResult};
use crate::rate_limit::RateLimiter;
use crate::tools::{Tool, ToolRegistry};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Protocol revision reported by `initialize`
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Methods answered by the handler itself
pub const SYSTEM_METHODS: &[&str] = &["initialize", "tools/list", "tools/call", "ping", "shutdown"];

const NOTIFICATION_PREFIX: &str = "notifications/";

type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// Protocol front end over a tool registry
#[derive(Debug)]
pub struct ProtocolHandler {
    registry: Arc<ToolRegistry>,
    rate_limiter: Arc<RateLimiter>,
    server_info: ServerInfo,
    shutdown_requested: AtomicBool,
}

impl ProtocolHandler {
    pub fn new(registry: Arc<ToolRegistry>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            registry,
            rate_limiter,
            server_info: ServerInfo::default(),
            shutdown_requested: AtomicBool::new(false),
        }
    }

    pub fn with_server_info(mut self, server_info: ServerInfo) -> Self {
        self.server_info = server_info;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Set once a `shutdown` request has been answered
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Parse raw text into a structurally valid request
    pub fn parse_request(&self, raw: &str) -> ProtocolResult<McpRequest> {
        let value: Value = serde_json::from_str(raw).map_err(|e| ProtocolError::parse(e.to_string()))?;
        request_from_value(value)
    }

    /// Check that the method exists and, for tools, that the arguments fit the schema
    pub fn validate_request(&self, request: &McpRequest) -> ProtocolResult<()> {
        match request.method.as_str() {
            "tools/call" => {
                let call = tool_call_params(request)?;
                let tool = self.lookup_tool(&call.name)?;
                validate_arguments(tool.as_ref(), &call.arguments.unwrap_or_else(|| json!({})))
            }
            method if SYSTEM_METHODS.contains(&method) => Ok(()),
            method => match self.registry.get(method) {
                Some(tool) => validate_arguments(tool.as_ref(), &arguments_of(request)),
                None => Err(ProtocolError::MethodNotFound {
                    method: method.to_string(),
                }),
            },
        }
    }

    fn lookup_tool(&self, name: &str) -> ProtocolResult<Arc<dyn Tool>> {
        self.registry.get(name).ok_or_else(|| ProtocolError::ToolNotFound {
            name: name.to_string(),
        })
    }

    /// Run a tool and wrap its result in the `{content: [{type: "text", ...}]}` envelope
    pub async fn invoke_tool(&self, name: &str, arguments: Value) -> ProtocolResult<Value> {
        let tool = self.lookup_tool(name)?;

        if self.rate_limiter.has_override(name) {
            self.rate_limiter
                .wait_for_slot(name)
                .await
                .map_err(|source| ProtocolError::ToolExecution {
                    tool: name.to_string(),
                    source,
                })?;
        }

        let started = Instant::now();
        let result = tool.execute(arguments).await.map_err(|source| {
            error!(tool = name, error = %source, "Tool execution failed");
            ProtocolError::ToolExecution {
                tool: name.to_string(),
                source,
            }
        })?;
        debug!(
            tool = name,
            duration_ms = started.elapsed().as_millis() as u64,
            "Tool executed"
        );

        serde_json::to_value(ToolCallResult::from_value(&result)).map_err(|e| ProtocolError::ToolExecution {
            tool: name.to_string(),
            source: ProductboardError::from(e),
        })
    }

    /// Validate and dispatch one request; always yields a response
    pub async fn handle_request(&self, request: McpRequest) -> McpResponse {
        let id = request.id.clone();
        match self.dispatch(request).await {
            Ok(result) => McpResponse::success(id, result),
            Err(e) => Self::create_error_response(id, &e),
        }
    }

    async fn dispatch(&self, request: McpRequest) -> ProtocolResult<Value> {
        self.validate_request(&request)?;
        debug!(method = %request.method, "Dispatching request");

        match request.method.as_str() {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": { "listChanged": false } },
                "serverInfo": self.server_info,
            })),
            "tools/list" => Ok(json!({ "tools": self.registry.descriptors() })),
            "ping" => Ok(json!({})),
            "shutdown" => {
                info!("Shutdown requested by client");
                self.shutdown_requested.store(true, Ordering::SeqCst);
                Ok(json!({}))
            }
            "tools/call" => {
                let call = tool_call_params(&request)?;
                self.invoke_tool(&call.name, call.arguments.unwrap_or_else(|| json!({})))
                    .await
            }
            tool => self.invoke_tool(tool, arguments_of(&request)).await,
        }
    }

    /// Map a protocol error onto its error envelope
    pub fn create_error_response(id: Value, error: &ProtocolError) -> McpResponse {
        match error {
            ProtocolError::ToolExecution { .. } | ProtocolError::Internal { .. } => {
                error!(code = error.code().code(), "{}", error);
            }
            _ => warn!(code = error.code().code(), "{}", error),
        }
        McpResponse::error(id, error.to_mcp_error())
    }

    /// Full pipeline for one raw message; `None` for notifications
    pub async fn handle_message(&self, raw: &str) -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                let response = Self::create_error_response(Value::Null, &ProtocolError::parse(e.to_string()));
                return Some(render(&response));
            }
        };

        if is_notification(&value) {
            debug!(method = ?value.get("method"), "Notification received");
            return None;
        }

        let id_hint = value
            .get("id")
            .filter(|id| id.is_string() || id.is_number())
            .cloned()
            .unwrap_or(Value::Null);
        let response = match request_from_value(value) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => Self::create_error_response(id_hint, &e),
        };
        Some(render(&response))
    }
}

fn request_from_value(value: Value) -> ProtocolResult<McpRequest> {
    let Value::Object(mut object) = value else {
        return Err(ProtocolError::invalid_request("Request must be a JSON object"));
    };

    if let Some(version) = object.get("jsonrpc") {
        if version != "2.0" {
            return Err(ProtocolError::invalid_request("Unsupported jsonrpc version"));
        }
    }

    let id = match object.remove("id") {
        Some(id @ (Value::String(_) | Value::Number(_))) => id,
        Some(Value::Null) | None => return Err(ProtocolError::invalid_request("Missing request id")),
        Some(_) => return Err(ProtocolError::invalid_request("Request id must be a string or number")),
    };

    let method = match object.remove("method") {
        Some(Value::String(method)) if !method.is_empty() => method,
        Some(_) => return Err(ProtocolError::invalid_request("Method must be a non-empty string")),
        None => return Err(ProtocolError::invalid_request("Missing method")),
    };

    let params = object.remove("params").filter(|p| !p.is_null());
    Ok(McpRequest { id, method, params })
}

fn is_notification(value: &Value) -> bool {
    let has_id = value.get("id").map_or(false, |id| !id.is_null());
    let is_notification_method = value
        .get("method")
        .and_then(Value::as_str)
        .map_or(false, |m| m.starts_with(NOTIFICATION_PREFIX));
    !has_id && is_notification_method
}

fn tool_call_params(request: &McpRequest) -> ProtocolResult<ToolCallParams> {
    let params = request
        .params
        .clone()
        .ok_or_else(|| ProtocolError::invalid_params("tools/call requires params with a tool name"))?;
    serde_json::from_value(params).map_err(|e| ProtocolError::invalid_params(format!("Invalid tools/call params: {}", e)))
}

fn arguments_of(request: &McpRequest) -> Value {
    request.params.clone().unwrap_or_else(|| json!({}))
}

fn validate_arguments(tool: &dyn Tool, arguments: &Value) -> ProtocolResult<()> {
    tool.validate_arguments(arguments).map_err(|e| match e {
        ProductboardError::Validation { message, details } => ProtocolError::InvalidParams { message, details },
        other => ProtocolError::invalid_params(other.to_string()),
    })
}

fn render(response: &McpResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        error!("Failed to serialize response: {}", e);
        json!({
            "jsonrpc": "2.0",
            "id": response.id,
            "error": { "code": -32603, "message": format!("Failed to serialize response: {}", e) }
        })
        .to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::errors::McpErrorCode;
    use crate::rate_limit::RateLimitConfig;
    use crate::tools::{tool_success, Permission, ToolSchema};
    use async_trait::async_trait;

    struct StubTool {
        schema: ToolSchema,
    }

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &str {
            "pb_stub"
        }

        fn description(&self) -> &str {
            "Stub"
        }

        fn schema(&self) -> &ToolSchema {
            &self.schema
        }

        fn permission(&self) -> Permission {
            Permission::Read
        }

        async fn execute(&self, arguments: Value) -> crate::error::Result<Value> {
            if arguments.get("explode").is_some() {
                return Err(ProductboardError::internal("stub exploded"));
            }
            Ok(tool_success(arguments))
        }
    }

    fn handler() -> ProtocolHandler {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(StubTool {
                schema: ToolSchema::new(json!({
                    "type": "object",
                    "properties": { "id": { "type": "string" }, "explode": { "type": "boolean" } }
                })),
            }))
            .unwrap();
        ProtocolHandler::new(Arc::new(registry), Arc::new(RateLimiter::new(RateLimitConfig::default())))
    }

    #[test]
    fn test_parse_request_errors() {
        let handler = handler();
        let err = handler.parse_request("{invalid json").unwrap_err();
        assert_eq!(err.code(), McpErrorCode::ParseError);

        let err = handler.parse_request(r#"{"method":"x"}"#).unwrap_err();
        assert_eq!(err.code(), McpErrorCode::InvalidRequest);

        let err = handler.parse_request(r#"{"id":1}"#).unwrap_err();
        assert_eq!(err.code(), McpErrorCode::InvalidRequest);

        let err = handler.parse_request(r#"{"id":1,"method":7}"#).unwrap_err();
        assert_eq!(err.code(), McpErrorCode::InvalidRequest);
    }

    #[test]
    fn test_unknown_method_is_method_not_found() {
        let handler = handler();
        let request = handler.parse_request(r#"{"id":1,"method":"nope"}"#).unwrap();
        let err = handler.validate_request(&request).unwrap_err();
        assert_eq!(err.code(), McpErrorCode::MethodNotFound);
    }

    #[test]
    fn test_schema_violation_is_invalid_params() {
        let handler = handler();
        let request = handler
            .parse_request(r#"{"id":1,"method":"tools/call","params":{"name":"pb_stub","arguments":{"id":5}}}"#)
            .unwrap();
        let err = handler.validate_request(&request).unwrap_err();
        assert_eq!(err.code(), McpErrorCode::InvalidParams);
    }

    #[tokio::test]
    async fn test_invoke_tool_wraps_result_in_text_content() {
        let handler = handler();
        let result = handler.invoke_tool("pb_stub", json!({"id": "f1"})).await.unwrap();
        assert_eq!(result["content"][0]["type"], "text");
        let inner: Value = serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(inner, json!({"success": true, "data": {"id": "f1"}}));

        let err = handler.invoke_tool("missing", json!({})).await.unwrap_err();
        assert!(matches!(err, ProtocolError::ToolNotFound { .. }));

        let err = handler.invoke_tool("pb_stub", json!({"explode": true})).await.unwrap_err();
        assert!(matches!(err, ProtocolError::ToolExecution { .. }));
        assert_eq!(err.code(), McpErrorCode::InternalError);
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let handler = handler();
        assert!(handler
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .is_none());
        assert!(handler.handle_message("   ").await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_sets_flag() {
        let handler = handler();
        assert!(!handler.is_shutdown_requested());
        let reply = handler
            .handle_message(r#"{"jsonrpc":"2.0","id":"s","method":"shutdown"}"#)
            .await
            .unwrap();
        let value: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["id"], "s");
        assert!(value.get("result").is_some());
        assert!(handler.is_shutdown_requested());
    }
}
