//! Conversation messages and function-call payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use switchboard_mcp_types::CallToolResult;

use crate::error::ToolInvocationError;

/// Message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call requested by the oracle, addressed by flat name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Outcome of one call, paired with the call by position and name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResult {
    pub name: String,
    /// `{"result": ...}` on success, `{"error": {...}}` on failure.
    pub response: Value,
}

impl FunctionResult {
    pub fn success(name: impl Into<String>, result: &CallToolResult) -> Self {
        Self {
            name: name.into(),
            response: json!({ "result": result }),
        }
    }

    pub fn failure(name: impl Into<String>, error: &ToolInvocationError) -> Self {
        Self {
            name: name.into(),
            response: json!({
                "error": {
                    "tool": error.tool,
                    "detail": error.reason.to_string(),
                }
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.response.get("error").is_some()
    }
}

/// Structured part of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum Payload {
    Calls(Vec<FunctionCall>),
    Results(Vec<FunctionResult>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            payload: None,
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
            payload: None,
        }
    }

    /// The oracle's call batch.
    pub fn calls(calls: Vec<FunctionCall>) -> Self {
        Self {
            role: Role::Model,
            content: String::new(),
            payload: Some(Payload::Calls(calls)),
        }
    }

    /// Results answering a call batch.
    pub fn results(results: Vec<FunctionResult>) -> Self {
        Self {
            role: Role::User,
            content: String::new(),
            payload: Some(Payload::Results(results)),
        }
    }
}
