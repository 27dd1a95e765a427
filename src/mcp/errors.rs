//! Protocol errors and their JSON-RPC 2.0 wire codes

use crate::error::ProductboardError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// JSON-RPC 2.0 error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
}

impl McpErrorCode {
    /// Get the error code as i32
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            McpErrorCode::ParseError => "Parse error",
            McpErrorCode::InvalidRequest => "Invalid request",
            McpErrorCode::MethodNotFound => "Method not found",
            McpErrorCode::InvalidParams => "Invalid params",
            McpErrorCode::InternalError => "Internal error",
        }
    }
}

/// Error object of a response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpError {
    pub fn new(code: McpErrorCode, message: String) -> Self {
        Self {
            code: code.code(),
            message,
            data: None,
        }
    }

    pub fn with_data(code: McpErrorCode, message: String, data: Value) -> Self {
        Self {
            code: code.code(),
            message,
            data: Some(data),
        }
    }
}

/// Everything that can go wrong between reading a request and answering it
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Method '{method}' not found")]
    MethodNotFound { method: String },

    #[error("Tool '{name}' not found")]
    ToolNotFound { name: String },

    #[error("Invalid params: {message}")]
    InvalidParams {
        message: String,
        details: Option<Value>,
    },

    /// A tool failed; the original error is kept as the source
    #[error("Tool '{tool}' failed: {source}")]
    ToolExecution {
        tool: String,
        #[source]
        source: ProductboardError,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ProtocolError {
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn invalid_params<S: Into<String>>(message: S) -> Self {
        Self::InvalidParams {
            message: message.into(),
            details: None,
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Fixed mapping onto the wire codes
    pub fn code(&self) -> McpErrorCode {
        match self {
            Self::Parse { .. } => McpErrorCode::ParseError,
            Self::InvalidRequest { .. } => McpErrorCode::InvalidRequest,
            Self::MethodNotFound { .. } | Self::ToolNotFound { .. } => McpErrorCode::MethodNotFound,
            Self::InvalidParams { .. } => McpErrorCode::InvalidParams,
            Self::ToolExecution { .. } | Self::Internal { .. } => McpErrorCode::InternalError,
        }
    }

    /// Error object for the response envelope
    pub fn to_mcp_error(&self) -> McpError {
        let code = self.code();
        let message = self.to_string();
        match self {
            Self::MethodNotFound { method } => McpError::with_data(code, message, json!({ "method": method })),
            Self::ToolNotFound { name } => McpError::with_data(code, message, json!({ "tool": name })),
            Self::InvalidParams {
                details: Some(details),
                ..
            } => McpError::with_data(code, message, details.clone()),
            Self::ToolExecution { tool, source } => {
                let mut data = json!({ "tool": tool, "category": source.category() });
                if let Some(status) = source.status() {
                    data["status"] = json!(status);
                }
                McpError::with_data(code, message, data)
            }
            _ => McpError::new(code, message),
        }
    }
}

impl From<ProtocolError> for McpError {
    fn from(error: ProtocolError) -> Self {
        error.to_mcp_error()
    }
}
