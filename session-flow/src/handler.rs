use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{context::Context, error::Result};

/// Result of handling one interaction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandlerResult {
    /// Response to send to the user
    pub response: Option<String>,
}

impl HandlerResult {
    pub fn new(response: Option<String>) -> Self {
        Self { response }
    }
}

/// Event handler for one kind of user action on a session
#[async_trait]
pub trait Handler: Send + Sync {
    /// Unique identifier for this handler
    fn id(&self) -> &str;

    /// Handle the interaction whose input is stored in `context`
    async fn handle(&self, context: Context) -> Result<HandlerResult>;
}
