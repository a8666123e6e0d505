//! Error types for the switchboard engine.

use std::path::PathBuf;
use std::time::Duration;

use switchboard_mcp_client::TransportError;
use thiserror::Error;

/// Why a tool server could not join the registry.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The subprocess could not start.
    #[error("Failed to spawn tool server `{server}`: {source}")]
    Spawn {
        server: String,
        #[source]
        source: TransportError,
    },

    /// Initialize or discovery failed or timed out.
    #[error("Handshake with tool server `{server}` failed: {source}")]
    Handshake {
        server: String,
        #[source]
        source: TransportError,
    },

    #[error("Tool server `{server}` is already connected")]
    AlreadyConnected { server: String },

    #[error("Invalid server id `{server}`: {reason}")]
    InvalidServerId { server: String, reason: &'static str },
}

impl ConnectError {
    /// Id of the server the error concerns.
    pub fn server(&self) -> &str {
        match self {
            Self::Spawn { server, .. }
            | Self::Handshake { server, .. }
            | Self::AlreadyConnected { server }
            | Self::InvalidServerId { server, .. } => server,
        }
    }
}

/// Two canonical names sanitize to the same flat identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Flat name `{flat}` for `{rejected}` is already taken by `{existing}`")]
pub struct NameCollisionError {
    pub flat: String,
    pub existing: String,
    pub rejected: String,
}

/// Cause of a failed tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationFailure {
    /// No tool is registered under the name.
    #[error("tool not found")]
    NotFound,
    /// The owning connection has died.
    #[error("tool server disconnected")]
    Disconnected,
    /// The tool ran and reported an error.
    #[error("{detail}")]
    RemoteError { detail: String },
    /// No result within the tool timeout.
    #[error("timed out after {after:?}")]
    Timeout { after: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Tool `{tool}` failed: {reason}")]
pub struct ToolInvocationError {
    pub tool: String,
    pub reason: InvocationFailure,
}

impl ToolInvocationError {
    pub fn new(tool: impl Into<String>, reason: InvocationFailure) -> Self {
        Self {
            tool: tool.into(),
            reason,
        }
    }

    pub fn not_found(tool: impl Into<String>) -> Self {
        Self::new(tool, InvocationFailure::NotFound)
    }
}

/// The oracle call itself failed.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Oracle API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Oracle rate limit exceeded")]
    RateLimited,

    #[error("Unparseable oracle response: {0}")]
    Parse(String),

    #[error("Oracle did not answer within {after:?}")]
    Timeout { after: Duration },
}

/// Conversation store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A turn ended without an assistant message.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("Oracle kept requesting tools after {limit} rounds")]
    RoundLimitExceeded { limit: u32 },

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("Conversation store error: {0}")]
    Store(#[from] StoreError),

    #[error("Message is empty")]
    EmptyMessage,
}

/// Configuration loading failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {field} - {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}
