//! In-process tool servers and a scripted oracle.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use switchboard_engine::{
    EngineConfig, Launcher, Oracle, OracleError, OracleReply, OracleRequest, TimeoutConfig,
    ToolServerRegistry,
};
use switchboard_mcp_client::{CloseOutcome, SpawnConfig, Transport, TransportError};
use switchboard_mcp_types::{
    CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcError, ListToolsResult, ServerCapabilities, Tool,
};

/// What a fake tool does when called.
#[derive(Debug, Clone)]
pub enum Behavior {
    Text(String),
    /// Result exactly as a server would send it on the wire.
    Raw(Value),
    /// Result with `isError: true`.
    ToolError(String),
    /// JSON-RPC error response.
    Rpc(String),
    /// Answer after a delay.
    Delay(Duration, String),
    /// Never answer.
    Hang,
    /// The server dies mid-call.
    Disconnect,
}

/// How a launch attempt goes.
#[derive(Debug, Clone)]
pub enum Plan {
    Serve(FakeServer),
    SpawnFails,
    HandshakeFails,
}

#[derive(Debug, Clone, Default)]
pub struct FakeServer {
    pub tools: Vec<Tool>,
    pub behaviors: HashMap<String, Behavior>,
    /// Ignores the close request and must be killed.
    pub stubborn: bool,
    /// Never answers pings.
    pub silent: bool,
    /// Died after the handshake; pings find it gone.
    pub crashed: bool,
}

impl FakeServer {
    pub fn with_tools(names: &[&str]) -> Self {
        Self {
            tools: names
                .iter()
                .map(|n| Tool::new(*n, format!("{n} tool")))
                .collect(),
            ..Default::default()
        }
    }

    pub fn behave(mut self, tool: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(tool.to_string(), behavior);
        self
    }

    pub fn stubborn(mut self) -> Self {
        self.stubborn = true;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn crashed(mut self) -> Self {
        self.crashed = true;
        self
    }
}

/// Shared record of what the fakes saw.
#[derive(Debug, Default)]
pub struct Journal {
    /// `(server, tool, arguments)` in call-start order.
    pub calls: Mutex<Vec<(String, String, Value)>>,
    /// `server::tool` in completion order.
    pub finished: Mutex<Vec<String>>,
    pub closed: Mutex<Vec<String>>,
}

#[derive(Default)]
pub struct FakeLauncher {
    plans: HashMap<String, Plan>,
    pub journal: Arc<Journal>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(mut self, server_id: &str, plan: Plan) -> Self {
        self.plans.insert(server_id.to_string(), plan);
        self
    }

    pub fn serve(self, server_id: &str, server: FakeServer) -> Self {
        self.plan(server_id, Plan::Serve(server))
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(
        &self,
        server_id: &str,
        _config: &SpawnConfig,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let spawn_error = || TransportError::Spawn {
            command: server_id.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such binary"),
        };
        let (server, handshake_ok) = match self.plans.get(server_id) {
            None | Some(Plan::SpawnFails) => return Err(spawn_error()),
            Some(Plan::HandshakeFails) => (FakeServer::default(), false),
            Some(Plan::Serve(server)) => (server.clone(), true),
        };
        Ok(Box::new(FakeTransport {
            server_id: server_id.to_string(),
            server,
            handshake_ok,
            connected: AtomicBool::new(true),
            journal: self.journal.clone(),
        }))
    }
}

struct FakeTransport {
    server_id: String,
    server: FakeServer,
    handshake_ok: bool,
    connected: AtomicBool,
    journal: Arc<Journal>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn initialize(
        &self,
        _params: InitializeParams,
    ) -> switchboard_mcp_client::Result<InitializeResult> {
        if !self.handshake_ok {
            self.connected.store(false, Ordering::SeqCst);
            return Err(TransportError::Disconnected);
        }
        Ok(InitializeResult::new(
            Implementation::new(self.server_id.clone(), "1.0.0"),
            ServerCapabilities::default().with_tools(),
        ))
    }

    async fn send_initialized(&self) -> switchboard_mcp_client::Result<()> {
        Ok(())
    }

    async fn list_tools(
        &self,
        _cursor: Option<String>,
    ) -> switchboard_mcp_client::Result<ListToolsResult> {
        Ok(ListToolsResult::new(self.server.tools.clone()))
    }

    async fn call_tool(
        &self,
        params: CallToolParams,
    ) -> switchboard_mcp_client::Result<CallToolResult> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        self.journal.calls.lock().push((
            self.server_id.clone(),
            params.name.clone(),
            params.arguments.clone().unwrap_or(Value::Null),
        ));

        let behavior = self
            .server
            .behaviors
            .get(&params.name)
            .cloned()
            .unwrap_or_else(|| Behavior::Text(format!("{} ok", params.name)));

        let outcome = match behavior {
            Behavior::Text(text) => Ok(CallToolResult::text(text)),
            Behavior::Raw(raw) => serde_json::from_value(raw).map_err(TransportError::from),
            Behavior::ToolError(message) => Ok(CallToolResult::error(message)),
            Behavior::Rpc(message) => Err(TransportError::Rpc(JsonRpcError::internal_error(message))),
            Behavior::Delay(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(CallToolResult::text(text))
            }
            Behavior::Hang => std::future::pending().await,
            Behavior::Disconnect => {
                self.connected.store(false, Ordering::SeqCst);
                Err(TransportError::Disconnected)
            }
        };

        self.journal
            .finished
            .lock()
            .push(format!("{}::{}", self.server_id, params.name));
        outcome
    }

    async fn ping(&self) -> switchboard_mcp_client::Result<()> {
        if self.server.crashed {
            self.connected.store(false, Ordering::SeqCst);
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        if self.server.silent {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn close(&self, _grace: Duration) -> switchboard_mcp_client::Result<CloseOutcome> {
        self.connected.store(false, Ordering::SeqCst);
        self.journal.closed.lock().push(self.server_id.clone());
        Ok(if self.server.stubborn {
            CloseOutcome::Killed
        } else {
            CloseOutcome::Graceful
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

pub fn test_timeouts() -> TimeoutConfig {
    TimeoutConfig {
        oracle_secs: 5,
        tool_secs: 2,
        handshake_secs: 2,
        shutdown_grace_secs: 1,
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        timeouts: test_timeouts(),
        system_instruction: "test instruction".to_string(),
        ..Default::default()
    }
}

/// Registry over `launcher`, with every planned server connected in the
/// order given.
pub async fn connected_registry(
    launcher: FakeLauncher,
    order: &[&str],
) -> (Arc<ToolServerRegistry>, Arc<Journal>) {
    let journal = launcher.journal.clone();
    let registry = Arc::new(ToolServerRegistry::new(Arc::new(launcher), &test_timeouts()));
    for id in order {
        let _ = registry.connect(id, &SpawnConfig::new(*id)).await;
    }
    (registry, journal)
}

/// Oracle replaying a fixed script, then a fallback reply if any.
#[derive(Default)]
pub struct ScriptedOracle {
    script: Mutex<VecDeque<Result<OracleReply, OracleError>>>,
    fallback: Option<OracleReply>,
    pub requests: Mutex<Vec<OracleRequest>>,
}

impl ScriptedOracle {
    pub fn new(script: Vec<Result<OracleReply, OracleError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    pub fn replies(replies: Vec<OracleReply>) -> Self {
        Self::new(replies.into_iter().map(Ok).collect())
    }

    /// Answer with `reply` forever.
    pub fn always(reply: OracleReply) -> Self {
        Self {
            fallback: Some(reply),
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn request(&self, index: usize) -> OracleRequest {
        self.requests.lock()[index].clone()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn respond(&self, request: &OracleRequest) -> Result<OracleReply, OracleError> {
        self.requests.lock().push(request.clone());
        let next = self.script.lock().pop_front();
        match next {
            Some(reply) => reply,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| OracleError::Parse("script exhausted".to_string())),
        }
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Oracle that never answers.
pub struct SilentOracle;

#[async_trait]
impl Oracle for SilentOracle {
    async fn respond(&self, _request: &OracleRequest) -> Result<OracleReply, OracleError> {
        std::future::pending().await
    }
}
