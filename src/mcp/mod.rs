//! MCP (Model Context Protocol) front end
//!
//! Parses JSON-RPC requests, dispatches them to the tool registry and
//! formats responses with the fixed JSON-RPC error codes.

pub mod errors;
mod handler;
mod stdio;
pub mod types;

pub use errors::{McpError, McpErrorCode, ProtocolError};
pub use handler::{ProtocolHandler, PROTOCOL_VERSION, SYSTEM_METHODS};
pub use stdio::{run_stdio, serve};
pub use types::{McpRequest, McpResponse, ServerInfo, ToolCallResult, ToolContent};
