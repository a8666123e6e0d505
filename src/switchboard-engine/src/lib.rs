//! Switchboard engine - tool orchestration for a function-calling model.
//!
//! - [`registry`] - tool-server connections and the tool catalogue
//! - [`naming`] - canonical `server::tool` names and their flat forms
//! - [`session`] - bounded per-conversation history
//! - [`orchestrator`] - the call/execute/respond loop for one turn
//! - [`oracle`] / [`gemini`] - the model boundary and its Gemini client
//! - [`store`] - persistence of conversation messages
//! - [`service`] - the turn-submission boundary
//!
//! ```no_run
//! use std::sync::Arc;
//! use switchboard_engine::{
//!     ConversationSession, EngineConfig, FleetConfig, GeminiOracle, MemoryStore,
//!     OrchestrationLoop, ToolServerRegistry, TurnRequest, TurnService,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::default();
//! let fleet = FleetConfig::load("mcp-config.json".as_ref())?;
//!
//! let registry = Arc::new(ToolServerRegistry::with_processes(&config.timeouts));
//! registry.connect_all(&fleet.servers).await;
//!
//! let oracle = GeminiOracle::from_env(&config.oracle).ok_or("GEMINI_API_KEY not set")?;
//! let service = TurnService::new(
//!     OrchestrationLoop::new(registry.clone(), Arc::new(oracle), &config),
//!     Arc::new(ConversationSession::new(&config.history)),
//!     Arc::new(MemoryStore::new()),
//! );
//!
//! let reply = service.submit(TurnRequest::new("List my files", "me")).await?;
//! println!("{}", reply.response);
//! registry.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod gemini;
pub mod message;
pub mod naming;
pub mod oracle;
pub mod orchestrator;
pub mod prompt;
pub mod registry;
pub mod service;
pub mod session;
pub mod store;

pub use config::{EngineConfig, FleetConfig, HistoryConfig, OracleConfig, TimeoutConfig};
pub use error::{
    ConfigError, ConnectError, InvocationFailure, NameCollisionError, OracleError, StoreError,
    ToolInvocationError, TurnError,
};
pub use gemini::GeminiOracle;
pub use message::{FunctionCall, FunctionResult, Message, Payload, Role};
pub use naming::{NameTranslator, canonical_name, sanitize};
pub use oracle::{Oracle, OracleReply, OracleRequest, ToolDeclaration};
pub use orchestrator::{OrchestrationLoop, TurnState};
pub use registry::{
    ConnectSummary, FleetReport, Launcher, ProcessLauncher, RegistryStatus, ServerHealth,
    ShutdownReport, ToolDescriptor, ToolServerRegistry,
};
pub use service::{TurnRequest, TurnResponse, TurnService};
pub use session::ConversationSession;
pub use store::{ConversationStore, JsonlStore, MemoryStore, StoredMessage};
