use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{Context, error::Result};

/// Session information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub handler_id: String,
    pub created_at: DateTime<Utc>,
    /// Last time the session was started or handled an interaction.
    pub last_active: DateTime<Utc>,
    #[serde(skip)]
    pub context: Context,
}

impl Session {
    pub fn new_for_handler(sid: String, handler_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: sid,
            handler_id: handler_id.to_string(),
            created_at: now,
            last_active: now,
            context: Context::new(),
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }
}

/// Trait for storing and retrieving sessions
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn save(&self, session: Session) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Session>>;
    async fn delete(&self, id: &str) -> Result<()>;
    /// Delete every session last active before `cutoff`, returning how many were removed.
    async fn delete_idle(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// In-memory implementation of SessionStorage
pub struct InMemorySessionStorage {
    sessions: Arc<DashMap<String, Session>>,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }
}

impl Default for InMemorySessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn save(&self, session: Session) -> Result<()> {
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.get(id).map(|entry| entry.clone()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.sessions.remove(id);
        Ok(())
    }

    async fn delete_idle(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.last_active >= cutoff);
        Ok(before.saturating_sub(self.sessions.len()))
    }
}
