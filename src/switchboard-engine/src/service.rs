//! Turn-submission boundary.
//!
//! Accepts `{message, user_id, conversation_id?}` and answers with
//! `{response, conversation_id}`. Turns of one conversation are serialized
//! here; different conversations run concurrently.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{StoreError, TurnError};
use crate::message::{Message, Role};
use crate::orchestrator::OrchestrationLoop;
use crate::session::ConversationSession;
use crate::store::ConversationStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub message: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            user_id: user_id.into(),
            conversation_id: None,
        }
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    pub response: String,
    pub conversation_id: String,
}

pub struct TurnService {
    orchestrator: OrchestrationLoop,
    session: Arc<ConversationSession>,
    store: Arc<dyn ConversationStore>,
}

impl TurnService {
    pub fn new(
        orchestrator: OrchestrationLoop,
        session: Arc<ConversationSession>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            orchestrator,
            session,
            store,
        }
    }

    pub fn session(&self) -> &Arc<ConversationSession> {
        &self.session
    }

    pub fn orchestrator(&self) -> &OrchestrationLoop {
        &self.orchestrator
    }

    /// Run one turn. A missing conversation id starts a new conversation.
    #[instrument(skip_all, fields(user_id = %request.user_id))]
    pub async fn submit(&self, request: TurnRequest) -> Result<TurnResponse, TurnError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(TurnError::EmptyMessage);
        }

        let conversation_id = request
            .conversation_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let lock = self.session.turn_lock(&conversation_id);
        let _turn = lock.lock().await;

        if self.session.get(&conversation_id).is_empty() {
            let stored = self.store.load(&conversation_id).await?;
            if self
                .session
                .hydrate(&conversation_id, stored.into_iter().map(Message::from).collect())
            {
                debug!(conversation_id = %conversation_id, "Hydrated history from store");
            }
        }

        self.store
            .save(&conversation_id, Role::User, message)
            .await?;

        let response = self
            .orchestrator
            .run_turn(&self.session, &conversation_id, message)
            .await?;

        if let Err(e) = self
            .store
            .save(&conversation_id, Role::Model, &response)
            .await
        {
            warn!(conversation_id = %conversation_id, error = %e, "Failed to store reply");
        }

        Ok(TurnResponse {
            response,
            conversation_id,
        })
    }

    /// Forget a conversation in memory and in the store.
    pub async fn clear(&self, conversation_id: &str) -> Result<(), StoreError> {
        let lock = self.session.turn_lock(conversation_id);
        let _turn = lock.lock().await;
        self.session.clear(conversation_id);
        self.store.clear(conversation_id).await
    }

    /// Drop conversations idle for at least `ttl` from memory.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        self.session.evict_idle(ttl)
    }
}
