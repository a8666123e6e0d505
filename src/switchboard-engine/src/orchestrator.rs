//! Orchestration loop - drives one user turn to a terminal reply.
//!
//! Each turn is an explicit state machine:
//!
//! ```text
//! AwaitingModel --text--> Done
//! AwaitingModel --calls--> ExecutingTools --results--> AwaitingModel
//! AwaitingModel --error / round cap--> Failed
//! ```
//!
//! Calls and results exchanged during the turn live in a turn-local
//! transcript. Only the user message and the final reply reach the session.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::{OracleError, ToolInvocationError, TurnError};
use crate::message::{FunctionCall, FunctionResult, Message};
use crate::oracle::{Oracle, OracleReply, OracleRequest};
use crate::registry::ToolServerRegistry;
use crate::session::ConversationSession;

/// Turn state.
#[derive(Debug)]
pub enum TurnState {
    AwaitingModel,
    ExecutingTools(Vec<FunctionCall>),
    Done(String),
    Failed(TurnError),
}

pub struct OrchestrationLoop {
    registry: Arc<ToolServerRegistry>,
    oracle: Arc<dyn Oracle>,
    system_instruction: String,
    max_rounds: u32,
    oracle_timeout: Duration,
    parallel_tool_calls: bool,
}

impl OrchestrationLoop {
    pub fn new(
        registry: Arc<ToolServerRegistry>,
        oracle: Arc<dyn Oracle>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            registry,
            oracle,
            system_instruction: config.system_instruction.clone(),
            max_rounds: config.max_rounds,
            oracle_timeout: config.timeouts.oracle(),
            parallel_tool_calls: config.parallel_tool_calls,
        }
    }

    pub fn registry(&self) -> &Arc<ToolServerRegistry> {
        &self.registry
    }

    /// Run one turn and return the assistant's reply.
    ///
    /// The user message is recorded whatever the outcome; the reply is
    /// recorded only on success. Callers must not run two turns of the same
    /// conversation at once.
    #[instrument(skip(self, session, message))]
    pub async fn run_turn(
        &self,
        session: &ConversationSession,
        conversation_id: &str,
        message: &str,
    ) -> Result<String, TurnError> {
        let mut transcript = session.get(conversation_id);
        transcript.push(Message::user(message));
        session.append(conversation_id, Message::user(message));

        let tools = self.registry.declarations().await;
        let mut rounds: u32 = 0;
        let mut state = TurnState::AwaitingModel;

        loop {
            state = match state {
                TurnState::AwaitingModel => {
                    let request = OracleRequest {
                        system_instruction: self.system_instruction.clone(),
                        tools: tools.clone(),
                        messages: transcript.clone(),
                    };
                    match self.ask_oracle(&request).await {
                        Ok(OracleReply::Text(text)) => TurnState::Done(text),
                        Ok(OracleReply::Calls(calls)) if calls.is_empty() => TurnState::Failed(
                            OracleError::Parse("empty call batch".to_string()).into(),
                        ),
                        Ok(OracleReply::Calls(calls)) => {
                            if rounds >= self.max_rounds {
                                warn!(limit = self.max_rounds, "Round limit exceeded");
                                TurnState::Failed(TurnError::RoundLimitExceeded {
                                    limit: self.max_rounds,
                                })
                            } else {
                                rounds += 1;
                                TurnState::ExecutingTools(calls)
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, round = rounds, "Oracle call failed");
                            TurnState::Failed(e.into())
                        }
                    }
                }
                TurnState::ExecutingTools(calls) => {
                    debug!(round = rounds, calls = calls.len(), "Executing tool batch");
                    let results = self.execute_batch(&calls).await;
                    transcript.push(Message::calls(calls));
                    transcript.push(Message::results(results));
                    TurnState::AwaitingModel
                }
                TurnState::Done(text) => {
                    session.append(conversation_id, Message::model(text.clone()));
                    info!(rounds, model = %self.oracle.model(), "Turn complete");
                    return Ok(text);
                }
                TurnState::Failed(e) => return Err(e),
            };
        }
    }

    async fn ask_oracle(&self, request: &OracleRequest) -> Result<OracleReply, OracleError> {
        tokio::time::timeout(self.oracle_timeout, self.oracle.respond(request))
            .await
            .map_err(|_| OracleError::Timeout {
                after: self.oracle_timeout,
            })?
    }

    /// Results come back in call order whichever way the batch runs.
    async fn execute_batch(&self, calls: &[FunctionCall]) -> Vec<FunctionResult> {
        if self.parallel_tool_calls {
            join_all(calls.iter().map(|call| self.execute_call(call))).await
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.execute_call(call).await);
            }
            results
        }
    }

    /// Failures become in-band error results.
    async fn execute_call(&self, call: &FunctionCall) -> FunctionResult {
        let outcome = match self.registry.resolve(&call.name).await {
            Some(canonical) => self.registry.invoke(&canonical, call.arguments.clone()).await,
            None => Err(ToolInvocationError::not_found(&call.name)),
        };

        match outcome {
            Ok(result) => FunctionResult::success(&call.name, &result),
            Err(e) => {
                warn!(tool = %e.tool, error = %e.reason, "Tool call failed");
                FunctionResult::failure(&call.name, &e)
            }
        }
    }
}
