use thiserror::Error;

/// Errors raised while loading, running or storing a session.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session is busy with another request: {0}")]
    SessionBusy(String),

    #[error("Handler execution failed: {0}")]
    HandlerFailed(String),

    #[error("Context error: {0}")]
    ContextError(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

pub type Result<T> = std::result::Result<T, FlowError>;
