//! Tool-server client for switchboard.
//!
//! - [`transport`] - the [`Transport`] trait and the child-process
//!   [`StdioTransport`] speaking newline-delimited JSON-RPC
//! - [`client`] - [`McpClient`], the handshake/discovery/call wrapper
//! - [`discovery`] - input-schema normalization for function declarations

pub mod client;
pub mod discovery;
pub mod error;
pub mod transport;

pub use client::McpClient;
pub use discovery::{normalize_parameters, tool_description};
pub use error::{Result, TransportError};
pub use transport::{CloseOutcome, SpawnConfig, StdioTransport, Transport};
