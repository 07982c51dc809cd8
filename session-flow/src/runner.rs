//! SessionRunner – owns the lifecycle of sessions served by one [`Handler`].
//!
//! Every user action maps to exactly one runner call:
//! * [`SessionRunner::start`] creates an empty session and persists it.
//! * [`SessionRunner::run`] loads the session, hands the new input to the handler and saves the
//!   session back (_load → handle → save_).
//! * [`SessionRunner::end`] discards the session and everything it holds.
//!
//! Interactions on a single session are serialised: while one `run` is in flight, a second
//! `run` or an `end` for the same id fails fast with [`FlowError::SessionBusy`] instead of
//! interleaving writes to the chat history. Different sessions never block each other.
//!
//! With an idle timeout configured, a session that has not been active for longer than the
//! timeout is treated as ended: lookups fail with [`FlowError::SessionNotFound`] and
//! [`SessionRunner::sweep_idle`] deletes it from storage.

use chrono::{Duration, Utc};
use dashmap::DashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    chat::ChatHistory,
    context::keys,
    error::{FlowError, Result},
    handler::{Handler, HandlerResult},
    storage::{Session, SessionStorage},
};

/// Marks a session as in flight and clears the mark on drop, including on early return.
struct InFlightGuard {
    sessions: Arc<DashSet<String>>,
    id: String,
}

impl InFlightGuard {
    fn acquire(sessions: &Arc<DashSet<String>>, id: &str) -> Result<Self> {
        if !sessions.insert(id.to_string()) {
            return Err(FlowError::SessionBusy(id.to_string()));
        }
        Ok(Self {
            sessions: sessions.clone(),
            id: id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.sessions.remove(&self.id);
    }
}

/// Outcome of one interaction, with the history as it stood when the interaction finished.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub result: HandlerResult,
    pub history: ChatHistory,
}

/// High-level helper that orchestrates the start / load → handle → save / end pattern.
#[derive(Clone)]
pub struct SessionRunner {
    handler: Arc<dyn Handler>,
    storage: Arc<dyn SessionStorage>,
    in_flight: Arc<DashSet<String>>,
    idle_timeout: Option<Duration>,
}

impl SessionRunner {
    pub fn new(handler: Arc<dyn Handler>, storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            handler,
            storage,
            in_flight: Arc::new(DashSet::new()),
            idle_timeout: None,
        }
    }

    /// Expire sessions that stay inactive for longer than `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Create a fresh session with an empty context and persist it.
    pub async fn start(&self) -> Result<Session> {
        let session = Session::new_for_handler(Uuid::new_v4().to_string(), self.handler.id());
        self.storage.save(session.clone()).await?;
        info!(session_id = %session.id, handler = %session.handler_id, "Session started");
        Ok(session)
    }

    /// Handle one user input for `session_id` and persist the updated session.
    pub async fn run(&self, session_id: &str, input: impl Into<String>) -> Result<RunResult> {
        let _guard = InFlightGuard::acquire(&self.in_flight, session_id)?;

        let mut session = self.load(session_id).await?;
        // Marked active before handling so a sweep never collects the session mid-run.
        session.touch();
        self.storage.save(session.clone()).await?;

        session.context.set(keys::USER_INPUT, input.into()).await?;

        debug!(session_id = %session_id, handler = %self.handler.id(), "Running handler");
        let result = self.handler.handle(session.context.clone()).await?;
        let history = session.context.chat_history().await;

        session.touch();
        self.storage.save(session).await?;

        Ok(RunResult { result, history })
    }

    pub async fn get(&self, session_id: &str) -> Result<Session> {
        self.load(session_id).await
    }

    /// Discard the session. Fails with `SessionNotFound` for unknown ids and with
    /// `SessionBusy` while an interaction on it is still running.
    pub async fn end(&self, session_id: &str) -> Result<()> {
        let _guard = InFlightGuard::acquire(&self.in_flight, session_id)?;
        self.load(session_id).await?;
        self.storage.delete(session_id).await?;
        info!(session_id = %session_id, "Session ended");
        Ok(())
    }

    /// Delete every session idle for longer than the timeout. Without a timeout this is a no-op.
    pub async fn sweep_idle(&self) -> Result<usize> {
        let Some(timeout) = self.idle_timeout else {
            return Ok(0);
        };
        let removed = self.storage.delete_idle(Utc::now() - timeout).await?;
        if removed > 0 {
            info!(removed, "Expired idle sessions");
        }
        Ok(removed)
    }

    async fn load(&self, session_id: &str) -> Result<Session> {
        let session = self
            .storage
            .get(session_id)
            .await?
            .ok_or_else(|| FlowError::SessionNotFound(session_id.to_string()))?;

        if self.is_expired(&session) {
            debug!(session_id = %session_id, "Session expired");
            self.storage.delete(session_id).await?;
            return Err(FlowError::SessionNotFound(session_id.to_string()));
        }

        Ok(session)
    }

    fn is_expired(&self, session: &Session) -> bool {
        self.idle_timeout
            .is_some_and(|timeout| Utc::now() - session.last_active > timeout)
    }
}
