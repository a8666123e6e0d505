//! Switchboard MCP Types - wire types for talking to tool servers.
//!
//! Tool servers speak JSON-RPC 2.0 over newline-delimited stdio. This crate
//! holds only the subset of the Model Context Protocol a tool-calling client
//! needs:
//! - JSON-RPC request/response/notification envelopes
//! - the `initialize` handshake
//! - `tools/list` (with pagination) and `tools/call`
//!
//! # Example
//! ```rust
//! use switchboard_mcp_types::{CallToolParams, JsonRpcRequest, methods};
//!
//! let params = CallToolParams::new("read_file")
//!     .with_arguments(serde_json::json!({"path": "a.txt"}));
//! let request = JsonRpcRequest::new(7, methods::TOOLS_CALL)
//!     .with_params(serde_json::to_value(params).unwrap());
//! assert_eq!(request.method, "tools/call");
//! ```

// ============================================================================
// Module declarations
// ============================================================================

mod capabilities;
mod content;
mod initialization;
mod jsonrpc;
mod tools;

/// Protocol method name constants.
pub mod methods;

// ============================================================================
// Protocol Version
// ============================================================================

/// Protocol version sent in the `initialize` request.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

// ============================================================================
// Re-exports
// ============================================================================

pub use jsonrpc::{
    ErrorCode, IncomingMessage, JSONRPC_VERSION, JsonRpcError, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, RequestId,
};

pub use initialization::{Implementation, InitializeParams, InitializeResult};

pub use capabilities::{ClientCapabilities, ServerCapabilities, ToolsCapability};

pub use tools::{CallToolParams, CallToolResult, ListToolsParams, ListToolsResult, Tool};

pub use content::Content;
