//! Tool-server registry.
//!
//! Owns every tool-server connection and the flattened catalogue built from
//! their discovery results, and routes invocations to the owning server.
//!
//! A server that fails to spawn or handshake is left out; the rest of the
//! fleet still connects. A connection found dead while invoking is removed
//! with its tools and is not retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use indexmap::IndexMap;
use serde_json::Value;
use switchboard_mcp_client::{
    CloseOutcome, McpClient, SpawnConfig, StdioTransport, Transport, TransportError,
    normalize_parameters, tool_description,
};
use switchboard_mcp_types::{CallToolResult, Tool};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::config::TimeoutConfig;
use crate::error::{ConnectError, InvocationFailure, NameCollisionError, ToolInvocationError};
use crate::naming::{self, NameTranslator};
use crate::oracle::ToolDeclaration;

// ============================================================================
// Launcher
// ============================================================================

/// Starts the transport for a configured server.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(
        &self,
        server_id: &str,
        config: &SpawnConfig,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

/// Spawns servers as child processes speaking stdio JSON-RPC.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    request_timeout: Duration,
}

impl ProcessLauncher {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self::new(switchboard_mcp_client::transport::DEFAULT_REQUEST_TIMEOUT)
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(
        &self,
        server_id: &str,
        config: &SpawnConfig,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let transport =
            StdioTransport::spawn(server_id, config)?.with_request_timeout(self.request_timeout);
        Ok(Box::new(transport))
    }
}

// ============================================================================
// Catalogue types
// ============================================================================

/// A discovered tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub server_id: String,
    pub tool_name: String,
    pub flat_name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn canonical_name(&self) -> String {
        naming::canonical_name(&self.server_id, &self.tool_name)
    }

    /// Function declaration under the flat name.
    pub fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: self.flat_name.clone(),
            description: self.description.clone(),
            parameters: normalize_parameters(&self.input_schema),
        }
    }
}

/// Result of connecting one server.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectSummary {
    pub server_id: String,
    /// Flat names registered for this server, in discovery order.
    pub tools: Vec<String>,
    /// Tools left out because their flat name was taken.
    pub rejected: Vec<NameCollisionError>,
}

/// Result of connecting a fleet.
#[derive(Debug, Default)]
pub struct FleetReport {
    pub connected: Vec<ConnectSummary>,
    pub failed: Vec<ConnectError>,
}

/// Health snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStatus {
    pub servers: Vec<String>,
    pub tool_count: usize,
}

/// Liveness of one connected server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerHealth {
    Healthy,
    /// Still connected, but the ping failed or went unanswered.
    Unresponsive(String),
    /// The connection is gone; the server and its tools were removed.
    Disconnected,
}

/// How each connection ended during shutdown.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub graceful: Vec<String>,
    pub killed: Vec<String>,
    /// Close errored; the process was still killed when its handle dropped.
    pub failed: Vec<(String, String)>,
}

struct Connection {
    server_id: String,
    client: McpClient,
}

#[derive(Default)]
struct Catalogue {
    connections: IndexMap<String, Arc<Connection>>,
    /// Canonical name to descriptor, in registration order.
    tools: IndexMap<String, ToolDescriptor>,
    names: NameTranslator,
}

impl Catalogue {
    /// Remove a connection and everything it registered.
    fn remove_server(&mut self, server_id: &str) -> Option<Arc<Connection>> {
        let connection = self.connections.shift_remove(server_id)?;
        let owned: Vec<String> = self
            .tools
            .iter()
            .filter(|(_, d)| d.server_id == server_id)
            .map(|(canonical, _)| canonical.clone())
            .collect();
        for canonical in owned {
            self.tools.shift_remove(&canonical);
            self.names.unregister(&canonical);
        }
        Some(connection)
    }
}

// ============================================================================
// Registry
// ============================================================================

pub struct ToolServerRegistry {
    launcher: Arc<dyn Launcher>,
    handshake_timeout: Duration,
    tool_timeout: Duration,
    shutdown_grace: Duration,
    state: RwLock<Catalogue>,
}

impl ToolServerRegistry {
    pub fn new(launcher: Arc<dyn Launcher>, timeouts: &TimeoutConfig) -> Self {
        Self {
            launcher,
            handshake_timeout: timeouts.handshake(),
            tool_timeout: timeouts.tool(),
            shutdown_grace: timeouts.shutdown_grace(),
            state: RwLock::new(Catalogue::default()),
        }
    }

    /// Registry spawning real child processes.
    pub fn with_processes(timeouts: &TimeoutConfig) -> Self {
        let request_timeout = timeouts.tool().max(timeouts.handshake());
        Self::new(Arc::new(ProcessLauncher::new(request_timeout)), timeouts)
    }

    /// Spawn a server, handshake, discover its tools and register them.
    #[instrument(skip(self, config), fields(command = %config.command))]
    pub async fn connect(
        &self,
        server_id: &str,
        config: &SpawnConfig,
    ) -> Result<ConnectSummary, ConnectError> {
        validate_server_id(server_id)?;
        if self.state.read().await.connections.contains_key(server_id) {
            return Err(ConnectError::AlreadyConnected {
                server: server_id.to_string(),
            });
        }

        let transport =
            self.launcher
                .launch(server_id, config)
                .await
                .map_err(|source| ConnectError::Spawn {
                    server: server_id.to_string(),
                    source,
                })?;
        let client = McpClient::new(transport);

        let tools = match self.handshake(&client).await {
            Ok(tools) => tools,
            Err(source) => {
                self.discard(server_id, &client).await;
                return Err(ConnectError::Handshake {
                    server: server_id.to_string(),
                    source,
                });
            }
        };

        let mut state = self.state.write().await;
        if state.connections.contains_key(server_id) {
            drop(state);
            self.discard(server_id, &client).await;
            return Err(ConnectError::AlreadyConnected {
                server: server_id.to_string(),
            });
        }

        let summary = register_tools(&mut state, server_id, tools);
        state.connections.insert(
            server_id.to_string(),
            Arc::new(Connection {
                server_id: server_id.to_string(),
                client,
            }),
        );
        drop(state);

        info!(
            server = %server_id,
            tools = summary.tools.len(),
            rejected = summary.rejected.len(),
            "Connected to tool server"
        );
        Ok(summary)
    }

    /// Connect every configured server in order. Failures are logged and
    /// reported, never fatal.
    pub async fn connect_all(&self, fleet: &IndexMap<String, SpawnConfig>) -> FleetReport {
        let mut report = FleetReport::default();
        for (server_id, config) in fleet {
            match self.connect(server_id, config).await {
                Ok(summary) => report.connected.push(summary),
                Err(e) => {
                    error!(server = %server_id, error = %e, "Tool server excluded");
                    report.failed.push(e);
                }
            }
        }
        info!(
            connected = report.connected.len(),
            failed = report.failed.len(),
            tools = self.tool_count().await,
            "Tool-server fleet ready"
        );
        report
    }

    /// Invoke a tool by canonical name.
    pub async fn invoke(
        &self,
        canonical: &str,
        arguments: Value,
    ) -> Result<CallToolResult, ToolInvocationError> {
        let (connection, tool_name) = {
            let state = self.state.read().await;
            let descriptor = state
                .tools
                .get(canonical)
                .ok_or_else(|| ToolInvocationError::not_found(canonical))?;
            let connection = state
                .connections
                .get(&descriptor.server_id)
                .cloned()
                .ok_or_else(|| {
                    ToolInvocationError::new(canonical, InvocationFailure::Disconnected)
                })?;
            (connection, descriptor.tool_name.clone())
        };

        let fail = |reason| ToolInvocationError::new(canonical, reason);

        if !connection.client.is_connected() {
            self.remove_dead(&connection).await;
            return Err(fail(InvocationFailure::Disconnected));
        }

        debug!(server = %connection.server_id, tool = %tool_name, "Invoking tool");

        let outcome =
            tokio::time::timeout(self.tool_timeout, connection.client.call_tool(&tool_name, arguments))
                .await;

        match outcome {
            Err(_) => Err(fail(InvocationFailure::Timeout {
                after: self.tool_timeout,
            })),
            Ok(Ok(result)) if result.is_error() => Err(fail(InvocationFailure::RemoteError {
                detail: remote_error_detail(&result),
            })),
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) if e.is_disconnect() => {
                self.remove_dead(&connection).await;
                Err(fail(InvocationFailure::Disconnected))
            }
            Ok(Err(TransportError::Timeout { after, .. })) => {
                Err(fail(InvocationFailure::Timeout { after }))
            }
            Ok(Err(TransportError::Rpc(e))) => Err(fail(InvocationFailure::RemoteError {
                detail: e.message,
            })),
            Ok(Err(e)) => Err(fail(InvocationFailure::RemoteError {
                detail: e.to_string(),
            })),
        }
    }

    /// Canonical name for a flat identifier.
    pub async fn resolve(&self, flat: &str) -> Option<String> {
        self.state.read().await.names.resolve(flat).map(str::to_string)
    }

    /// Connected server ids in connect order.
    pub async fn list_connected(&self) -> Vec<String> {
        self.state.read().await.connections.keys().cloned().collect()
    }

    pub async fn tool_count(&self) -> usize {
        self.state.read().await.tools.len()
    }

    pub async fn status(&self) -> RegistryStatus {
        let state = self.state.read().await;
        RegistryStatus {
            servers: state.connections.keys().cloned().collect(),
            tool_count: state.tools.len(),
        }
    }

    /// Catalogue snapshot in registration order.
    pub async fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.state.read().await.tools.values().cloned().collect()
    }

    /// Function declarations for every registered tool.
    pub async fn declarations(&self) -> Vec<ToolDeclaration> {
        self.state
            .read()
            .await
            .tools
            .values()
            .map(ToolDescriptor::declaration)
            .collect()
    }

    /// Ping every connected server concurrently, in connect order.
    ///
    /// A dead connection is removed with its tools, as when an invocation
    /// finds it dead.
    pub async fn check_health(&self) -> Vec<(String, ServerHealth)> {
        let connections: Vec<Arc<Connection>> =
            self.state.read().await.connections.values().cloned().collect();

        let timeout = self.tool_timeout;
        let outcomes = join_all(
            connections
                .iter()
                .map(|c| tokio::time::timeout(timeout, c.client.ping())),
        )
        .await;

        let mut report = Vec::with_capacity(connections.len());
        for (connection, outcome) in connections.iter().zip(outcomes) {
            let health = match outcome {
                Ok(Ok(())) => ServerHealth::Healthy,
                Ok(Err(e)) if e.is_disconnect() => {
                    self.remove_dead(connection).await;
                    ServerHealth::Disconnected
                }
                Ok(Err(e)) => ServerHealth::Unresponsive(e.to_string()),
                Err(_) => ServerHealth::Unresponsive(format!("no ping reply within {timeout:?}")),
            };
            if health != ServerHealth::Healthy {
                warn!(server = %connection.server_id, ?health, "Tool server unhealthy");
            }
            report.push((connection.server_id.clone(), health));
        }
        report
    }

    /// Close every connection and clear the catalogue.
    ///
    /// Connections close concurrently; each gets the grace period before
    /// being killed, and one failure does not affect the others.
    pub async fn shutdown(&self) -> ShutdownReport {
        let connections: Vec<Arc<Connection>> = {
            let mut state = self.state.write().await;
            let connections = state.connections.drain(..).map(|(_, c)| c).collect();
            state.tools.clear();
            state.names.clear();
            connections
        };

        if connections.is_empty() {
            return ShutdownReport::default();
        }

        info!(servers = connections.len(), "Shutting down tool servers");
        let grace = self.shutdown_grace;
        let outcomes = join_all(connections.iter().map(|c| c.client.close(grace))).await;

        let mut report = ShutdownReport::default();
        for (connection, outcome) in connections.iter().zip(outcomes) {
            let id = connection.server_id.clone();
            match outcome {
                Ok(CloseOutcome::Graceful) => report.graceful.push(id),
                Ok(CloseOutcome::Killed) => report.killed.push(id),
                Err(e) => {
                    warn!(server = %id, error = %e, "Tool server close failed");
                    report.failed.push((id, e.to_string()));
                }
            }
        }
        report
    }

    async fn handshake(&self, client: &McpClient) -> Result<Vec<Tool>, TransportError> {
        let exchange = async {
            client.connect().await?;
            client.discover_tools().await
        };
        tokio::time::timeout(self.handshake_timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout {
                method: "handshake".to_string(),
                after: self.handshake_timeout,
            })?
    }

    /// Close a client that never joined the registry.
    async fn discard(&self, server_id: &str, client: &McpClient) {
        if let Err(e) = client.close(Duration::ZERO).await {
            debug!(server = %server_id, error = %e, "Failed to close rejected tool server");
        }
    }

    async fn remove_dead(&self, connection: &Arc<Connection>) {
        let removed = {
            let mut state = self.state.write().await;
            match state.connections.get(&connection.server_id) {
                Some(current) if Arc::ptr_eq(current, connection) => {
                    state.remove_server(&connection.server_id)
                }
                _ => None,
            }
        };

        if let Some(connection) = removed {
            warn!(server = %connection.server_id, "Tool server died, removed from registry");
            let _ = connection.client.close(Duration::ZERO).await;
        }
    }
}

fn validate_server_id(server_id: &str) -> Result<(), ConnectError> {
    let reason = if server_id.trim().is_empty() {
        "must not be empty"
    } else if server_id.contains(naming::SEPARATOR) {
        "must not contain `::`"
    } else {
        return Ok(());
    };
    Err(ConnectError::InvalidServerId {
        server: server_id.to_string(),
        reason,
    })
}

fn register_tools(state: &mut Catalogue, server_id: &str, tools: Vec<Tool>) -> ConnectSummary {
    let mut summary = ConnectSummary {
        server_id: server_id.to_string(),
        tools: Vec::new(),
        rejected: Vec::new(),
    };

    for tool in tools {
        let canonical = naming::canonical_name(server_id, &tool.name);
        if state.tools.contains_key(&canonical) {
            debug!(server = %server_id, tool = %tool.name, "Skipping duplicate tool");
            continue;
        }

        match state.names.register(&canonical) {
            Ok(flat) => {
                let descriptor = ToolDescriptor {
                    server_id: server_id.to_string(),
                    description: tool_description(&tool, server_id),
                    tool_name: tool.name,
                    flat_name: flat.clone(),
                    input_schema: tool.input_schema,
                };
                state.tools.insert(canonical, descriptor);
                summary.tools.push(flat);
            }
            Err(collision) => {
                warn!(server = %server_id, error = %collision, "Tool rejected");
                summary.rejected.push(collision);
            }
        }
    }

    summary
}

/// Text of an error result, or a placeholder when it carries none.
fn remote_error_detail(result: &CallToolResult) -> String {
    let text = result.joined_text();
    if text.trim().is_empty() {
        "tool reported an error".to_string()
    } else {
        text
    }
}
