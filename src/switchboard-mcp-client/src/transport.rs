//! Tool-server transport layer.
//!
//! Tool servers are child processes speaking newline-delimited JSON-RPC on
//! stdin/stdout. Stderr is forwarded to the log.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use switchboard_mcp_types::{
    CallToolParams, CallToolResult, IncomingMessage, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsParams,
    ListToolsResult, RequestId, methods,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type Writer = Box<dyn AsyncWrite + Send + Unpin>;
type SharedWriter = Arc<Mutex<Option<Writer>>>;
type PendingResponses = Arc<SyncMutex<HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>>;

// ============================================================================
// Transport Trait
// ============================================================================

/// Transport layer for tool-server communication.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the `initialize` request.
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult>;

    /// Send the initialized notification.
    async fn send_initialized(&self) -> Result<()>;

    /// Fetch one page of tools.
    async fn list_tools(&self, cursor: Option<String>) -> Result<ListToolsResult>;

    /// Execute a tool.
    async fn call_tool(&self, params: CallToolParams) -> Result<CallToolResult>;

    /// Send a ping.
    async fn ping(&self) -> Result<()>;

    /// Close the connection, force-terminating the peer if it does not exit
    /// within `grace`.
    async fn close(&self, grace: Duration) -> Result<CloseOutcome>;

    /// Check if the transport is connected.
    fn is_connected(&self) -> bool;
}

/// How a close completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The peer exited on its own after its input was closed.
    Graceful,
    /// The peer had to be killed.
    Killed,
}

// ============================================================================
// Spawn Configuration
// ============================================================================

/// How to start a tool server process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnConfig {
    /// Program to execute.
    pub command: String,
    /// Ordered program arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Variables overlaid on the inherited environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

impl SpawnConfig {
    /// Create a config for `command` with no arguments.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// Add arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Stdio Transport
// ============================================================================

/// Newline-delimited JSON-RPC over a byte stream pair, usually a child's
/// stdout/stdin.
pub struct StdioTransport {
    /// Name used in log events.
    label: String,
    /// Child process, when the streams belong to one.
    child: Mutex<Option<Child>>,
    /// Outgoing half. `None` once closed.
    writer: SharedWriter,
    /// Waiters keyed by request id.
    pending: PendingResponses,
    /// Cleared by the reader task on EOF.
    connected: Arc<AtomicBool>,
    /// Request ID counter.
    request_id: AtomicI64,
    request_timeout: Duration,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl StdioTransport {
    /// Spawn the configured process and attach to its stdio.
    pub fn spawn(label: impl Into<String>, config: &SpawnConfig) -> Result<Self> {
        let label = label.into();
        debug!(server = %label, command = %config.command, args = ?config.args, "Starting tool server");

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref cwd) = config.cwd {
            cmd.current_dir(cwd);
        }

        // The parent environment is inherited; configured entries overlay it.
        cmd.envs(&config.env);

        let mut child = cmd.spawn().map_err(|source| TransportError::Spawn {
            command: config.command.clone(),
            source,
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Protocol("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Protocol("child stdout unavailable".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            let label = label.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(server = %label, stderr = %line, "Tool server stderr");
                }
            });
        }

        let transport = Self::from_streams(label, stdout, stdin);
        Ok(Self {
            child: Mutex::new(Some(child)),
            ..transport
        })
    }

    /// Attach to an already-open stream pair. Must be called inside a tokio
    /// runtime.
    pub fn from_streams<R, W>(label: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let label = label.into();
        let writer: SharedWriter = Arc::new(Mutex::new(Some(Box::new(writer) as Writer)));
        let pending: PendingResponses = Arc::new(SyncMutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));

        let reader = tokio::spawn(read_loop(
            label.clone(),
            reader,
            writer.clone(),
            pending.clone(),
            connected.clone(),
        ));

        Self {
            label,
            child: Mutex::new(None),
            writer,
            pending,
            connected,
            request_id: AtomicI64::new(1),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reader: Mutex::new(Some(reader)),
        }
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Name used in log events.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Send a request and wait for the matching response.
    async fn request<T: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<T> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }

        let id = RequestId::Number(self.request_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id.clone(), tx);
        let _waiter = PendingGuard {
            pending: &self.pending,
            id: id.clone(),
        };

        // The reader may have drained the waiters between the first check
        // and the insert.
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }

        let mut request = JsonRpcRequest::new(id, method);
        if let Some(params) = params {
            request = request.with_params(params);
        }

        write_frame(&self.writer, &request).await?;

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => {
                let value = response.into_result().map_err(TransportError::Rpc)?;
                Ok(serde_json::from_value(value)?)
            }
            Ok(Err(_)) => Err(TransportError::Disconnected),
            Err(_) => Err(TransportError::Timeout {
                method: method.to_string(),
                after: self.request_timeout,
            }),
        }
    }

    async fn notify(&self, method: &str) -> Result<()> {
        write_frame(&self.writer, &JsonRpcNotification::new(method)).await
    }
}

/// Removes a request's waiter when the request ends, including when the
/// caller drops the request future.
struct PendingGuard<'a> {
    pending: &'a PendingResponses,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        self.request(methods::INITIALIZE, Some(serde_json::to_value(params)?))
            .await
    }

    async fn send_initialized(&self) -> Result<()> {
        self.notify(methods::INITIALIZED).await
    }

    async fn list_tools(&self, cursor: Option<String>) -> Result<ListToolsResult> {
        let params = ListToolsParams { cursor };
        self.request(methods::TOOLS_LIST, Some(serde_json::to_value(params)?))
            .await
    }

    async fn call_tool(&self, params: CallToolParams) -> Result<CallToolResult> {
        self.request(methods::TOOLS_CALL, Some(serde_json::to_value(params)?))
            .await
    }

    async fn ping(&self) -> Result<()> {
        let _: Value = self.request(methods::PING, None).await?;
        Ok(())
    }

    async fn close(&self, grace: Duration) -> Result<CloseOutcome> {
        self.connected.store(false, Ordering::SeqCst);

        // Closing stdin is the shutdown signal for stdio servers.
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }

        let outcome = match self.child.lock().await.take() {
            None => CloseOutcome::Graceful,
            Some(mut child) => match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(server = %self.label, %status, "Tool server exited");
                    CloseOutcome::Graceful
                }
                Ok(Err(e)) => {
                    warn!(server = %self.label, error = %e, "Waiting on tool server failed, killing");
                    child.kill().await?;
                    CloseOutcome::Killed
                }
                Err(_) => {
                    warn!(server = %self.label, ?grace, "Tool server did not exit, killing");
                    child.kill().await?;
                    CloseOutcome::Killed
                }
            },
        };

        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
        }
        self.pending.lock().clear();

        info!(server = %self.label, ?outcome, "Tool server closed");
        Ok(outcome)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Drains incoming frames until EOF, routing responses to their waiters.
async fn read_loop<R>(
    label: String,
    reader: R,
    writer: SharedWriter,
    pending: PendingResponses,
    connected: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                match IncomingMessage::parse(trimmed) {
                    Ok(IncomingMessage::Response(response)) => {
                        let waiter = pending.lock().remove(&response.id);
                        match waiter {
                            Some(sender) => {
                                let _ = sender.send(response);
                            }
                            None => {
                                debug!(server = %label, id = %response.id, "Dropping response with no waiter");
                            }
                        }
                    }
                    Ok(IncomingMessage::Request(request)) => {
                        answer_peer_request(&label, &writer, request).await;
                    }
                    Ok(IncomingMessage::Notification(notification)) => {
                        debug!(server = %label, method = %notification.method, "Received notification");
                    }
                    Err(e) => {
                        warn!(server = %label, error = %e, "Ignoring malformed frame");
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(server = %label, error = %e, "Tool server stream read failed");
                break;
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    // Dropping the senders wakes every waiter with a closed channel.
    pending.lock().clear();
    debug!(server = %label, "Tool server stream closed");
}

/// Servers may ping the client; anything else is unsupported.
async fn answer_peer_request(label: &str, writer: &SharedWriter, request: JsonRpcRequest) {
    let response = if request.method == methods::PING {
        JsonRpcResponse::success(request.id, json!({}))
    } else {
        JsonRpcResponse::error(request.id, JsonRpcError::method_not_found(&request.method))
    };

    if let Err(e) = write_frame(writer, &response).await {
        debug!(server = %label, error = %e, "Could not answer peer request");
    }
}

async fn write_frame<T: Serialize>(writer: &SharedWriter, frame: &T) -> Result<()> {
    let mut line = serde_json::to_string(frame)?;
    line.push('\n');

    let mut guard = writer.lock().await;
    let stream = guard.as_mut().ok_or(TransportError::Disconnected)?;
    stream.write_all(line.as_bytes()).await.map_err(map_write_error)?;
    stream.flush().await.map_err(map_write_error)?;
    Ok(())
}

fn map_write_error(e: std::io::Error) -> TransportError {
    if e.kind() == std::io::ErrorKind::BrokenPipe {
        TransportError::Disconnected
    } else {
        TransportError::Io(e)
    }
}

// ============================================================================
// Tests
// ============================================================================
