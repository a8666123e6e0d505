//! Transport error types.

use std::time::Duration;

use switchboard_mcp_types::JsonRpcError;
use thiserror::Error;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors raised while talking to a tool server.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The subprocess could not be started.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No response arrived within the request timeout.
    #[error("`{method}` timed out after {after:?}")]
    Timeout { method: String, after: Duration },

    /// The stream closed or the process exited.
    #[error("tool server disconnected")]
    Disconnected,

    /// The peer answered with a JSON-RPC error object.
    #[error("remote error {0}")]
    Rpc(JsonRpcError),

    /// The peer sent something that breaks the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Whether the connection can no longer be used.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}
