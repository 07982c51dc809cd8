use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    chat::{ChatHistory, ChatTurn},
    error::{FlowError, Result},
};

/// Well-known context keys.
pub mod keys {
    /// The raw input of the interaction currently being handled.
    pub const USER_INPUT: &str = "user_input";
}

/// Per-session state shared between the runner and its handler.
///
/// Clones share the same underlying data.
#[derive(Clone, Debug)]
pub struct Context {
    data: Arc<DashMap<String, Value>>,
    chat_history: Arc<RwLock<ChatHistory>>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            chat_history: Arc::new(RwLock::new(ChatHistory::new())),
        }
    }

    pub async fn set(&self, key: impl Into<String>, value: impl serde::Serialize) -> Result<()> {
        let key = key.into();
        let value = serde_json::to_value(value)
            .map_err(|e| FlowError::ContextError(format!("failed to serialize '{key}': {e}")))?;
        self.data.insert(key, value);
        Ok(())
    }

    pub async fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Append a completed user/assistant exchange.
    ///
    /// Both turns are written under one lock so readers never observe a
    /// dangling user turn.
    pub async fn add_exchange(&self, user: impl Into<String>, assistant: impl Into<String>) {
        let mut history = self.chat_history.write().await;
        history.push(ChatTurn::user(user));
        history.push(ChatTurn::assistant(assistant));
    }

    /// Snapshot of the chat history.
    pub async fn chat_history(&self) -> ChatHistory {
        self.chat_history.read().await.clone()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
