//! The language-model boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OracleError;
use crate::message::{FunctionCall, Message};

/// A callable tool as presented to the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Flat name.
    pub name: String,
    pub description: String,
    /// `{type: "object", properties, required}`.
    pub parameters: Value,
}

/// Everything the oracle sees for one round.
#[derive(Debug, Clone, Default)]
pub struct OracleRequest {
    pub system_instruction: String,
    pub tools: Vec<ToolDeclaration>,
    /// History, the new user message, then this turn's calls and results.
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OracleReply {
    /// Terminal assistant text.
    Text(String),
    /// Calls to execute before asking again, in order.
    Calls(Vec<FunctionCall>),
}

/// Opaque request/response function-calling model.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn respond(&self, request: &OracleRequest) -> Result<OracleReply, OracleError>;

    /// Model identifier for logs.
    fn model(&self) -> &str {
        "unknown"
    }
}
