use async_trait::async_trait;
use serde::Serialize;
use session_flow::{
    ChatTurn, Context, FlowError, Handler, HandlerResult, Result as FlowResult, SessionRunner,
    SessionStorage, keys,
};
use std::sync::Arc;
use tracing::{error, info};

use super::PresenterError;
use crate::bridge::RequestBridge;

/// Handles one chat message.
///
/// Only the new message is sent to the model; the visible history is not
/// forwarded as conversation context.
pub struct ChatHandler {
    bridge: RequestBridge,
}

impl ChatHandler {
    pub fn new(bridge: RequestBridge) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Handler for ChatHandler {
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn handle(&self, context: Context) -> FlowResult<HandlerResult> {
        let message: String = context
            .get(keys::USER_INPUT)
            .await
            .ok_or_else(|| FlowError::ContextError("user_input not found".to_string()))?;

        let reply = self
            .bridge
            .respond(&message, None, None)
            .await
            .map_err(|e| {
                error!(error = %e, "Chat generation failed");
                FlowError::HandlerFailed(e.to_string())
            })?;

        // Appended only after a successful reply, so a failure leaves the history untouched.
        context.add_exchange(message, reply.clone()).await;

        Ok(HandlerResult::new(Some(reply)))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub session_id: String,
    pub reply: String,
    pub history: Vec<ChatTurn>,
}

/// Chat mode: explicit start / send / view / end actions over owned sessions.
#[derive(Clone)]
pub struct Chat {
    runner: SessionRunner,
}

impl Chat {
    pub fn new(bridge: RequestBridge, storage: Arc<dyn SessionStorage>) -> Self {
        let handler = Arc::new(ChatHandler::new(bridge));
        Self {
            runner: SessionRunner::new(handler, storage),
        }
    }

    /// Sessions left idle for longer than `timeout` are discarded.
    pub fn with_idle_timeout(mut self, timeout: chrono::Duration) -> Self {
        self.runner = self.runner.with_idle_timeout(timeout);
        self
    }

    /// Start a session with an empty history; returns its id.
    pub async fn start(&self) -> Result<String, PresenterError> {
        Ok(self.runner.start().await?.id)
    }

    pub async fn send(&self, session_id: &str, content: &str) -> Result<ChatReply, PresenterError> {
        if content.trim().is_empty() {
            return Err(PresenterError::EmptyMessage);
        }

        let run = self.runner.run(session_id, content).await?;
        let reply = run.result.response.unwrap_or_default();
        let history = run.history.turns().to_vec();

        info!(
            session_id = %session_id,
            turns = history.len(),
            "Chat message answered"
        );

        Ok(ChatReply {
            session_id: session_id.to_string(),
            reply,
            history,
        })
    }

    /// All turns of the session, in send order.
    pub async fn history(&self, session_id: &str) -> Result<Vec<ChatTurn>, PresenterError> {
        let session = self.runner.get(session_id).await?;
        Ok(session.context.chat_history().await.turns().to_vec())
    }

    /// End the session, discarding its history.
    pub async fn end(&self, session_id: &str) -> Result<(), PresenterError> {
        Ok(self.runner.end(session_id).await?)
    }

    /// Discard every idle session; returns how many were removed.
    pub async fn sweep_idle(&self) -> Result<usize, PresenterError> {
        Ok(self.runner.sweep_idle().await?)
    }
}
