pub mod bridge;
pub mod cli;
pub mod config;
pub mod models;
pub mod presenter;
pub mod service;
pub mod telemetry;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ServiceConfig;
pub use presenter::{Mode, Presenter, PresenterError};
pub use service::{AppState, build_router, create_app};
