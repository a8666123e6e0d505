//! Handshake, discovery and invocation on top of a [`Transport`].

use std::collections::HashSet;
use std::time::Duration;

use serde_json::Value;
use switchboard_mcp_types::{
    CallToolParams, CallToolResult, ClientCapabilities, Implementation, InitializeParams,
    InitializeResult, PROTOCOL_VERSION, Tool,
};
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::transport::{CloseOutcome, Transport};

/// Upper bound on `tools/list` pages followed for one discovery.
const MAX_DISCOVERY_PAGES: usize = 256;

/// A client session with one tool server.
pub struct McpClient {
    transport: Box<dyn Transport>,
}

impl McpClient {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Run the `initialize` / `notifications/initialized` handshake.
    pub async fn connect(&self) -> Result<InitializeResult> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation::default(),
        };

        let result = self.transport.initialize(params).await?;
        debug!(
            server_name = %result.server_info.name,
            server_version = %result.server_info.version,
            protocol = %result.protocol_version,
            "Handshake complete"
        );
        self.transport.send_initialized().await?;
        Ok(result)
    }

    /// List every tool, following `nextCursor` until exhausted.
    pub async fn discover_tools(&self) -> Result<Vec<Tool>> {
        let mut tools = Vec::new();
        let mut seen_cursors = HashSet::new();
        let mut cursor = None;

        for _ in 0..MAX_DISCOVERY_PAGES {
            let page = self.transport.list_tools(cursor.take()).await?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => {
                    if !seen_cursors.insert(next.clone()) {
                        return Err(TransportError::Protocol(format!(
                            "tools/list repeated cursor `{next}`"
                        )));
                    }
                    cursor = Some(next);
                }
                _ => return Ok(tools),
            }
        }

        Err(TransportError::Protocol(format!(
            "tools/list exceeded {MAX_DISCOVERY_PAGES} pages"
        )))
    }

    /// Invoke a tool. `Null` arguments are sent as absent.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let mut params = CallToolParams::new(name);
        if !arguments.is_null() {
            params = params.with_arguments(arguments);
        }
        self.transport.call_tool(params).await
    }

    pub async fn ping(&self) -> Result<()> {
        self.transport.ping().await
    }

    /// Close the session, killing the server if it outlives `grace`.
    pub async fn close(&self, grace: Duration) -> Result<CloseOutcome> {
        self.transport.close(grace).await
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }
}
