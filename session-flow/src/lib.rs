pub mod chat;
pub mod context;
pub mod error;
pub mod handler;
pub mod runner;
pub mod storage;

// Re-export commonly used types
pub use chat::{ChatHistory, ChatRole, ChatTurn};
pub use context::{Context, keys};
pub use error::{FlowError, Result};
pub use handler::{Handler, HandlerResult};
pub use runner::{RunResult, SessionRunner};
pub use storage::{InMemorySessionStorage, Session, SessionStorage};
