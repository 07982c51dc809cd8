//! Session Presenter: the two mutually exclusive interaction modes and the
//! explicit handlers behind every user action.

pub mod chat;
pub mod report;

use serde::{Deserialize, Serialize};
use session_flow::{FlowError, SessionStorage};
use std::str::FromStr;
use std::sync::Arc;

use crate::bridge::{BridgeError, RequestBridge};
use crate::upload::{ACCEPTED_EXTENSIONS, UploadError};

pub use chat::{Chat, ChatHandler, ChatReply};
pub use report::{ANALYSIS_INSTRUCTION, AnalysisOutcome, ReportAnalysis};

pub const APP_TITLE: &str = "🩺 HealthSphere - Your Medical Companion";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    ReportAnalysis,
    Chat,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::ReportAnalysis, Mode::Chat];

    pub fn slug(self) -> &'static str {
        match self {
            Mode::ReportAnalysis => "report-analysis",
            Mode::Chat => "chat",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Mode::ReportAnalysis => "📄 Medical Report Analysis",
            Mode::Chat => "💬 Mental Health Chatbot",
        }
    }

    pub fn subheader(self) -> &'static str {
        match self {
            Mode::ReportAnalysis => "Upload and Analyze Medical Reports",
            Mode::Chat => "Mental Health Chatbot - Chat Freely",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Mode::ReportAnalysis => {
                "Enter your query about the report and upload the medical report (JPG, PNG)."
            }
            Mode::Chat => {
                "Ask any mental health-related questions, and I'll respond empathetically."
            }
        }
    }

    /// Everything a client needs to render the selected mode.
    pub fn view(self) -> ModeView {
        ModeView {
            mode: self,
            label: self.label(),
            subheader: self.subheader(),
            description: self.description(),
            accepted_formats: match self {
                Mode::ReportAnalysis => ACCEPTED_EXTENSIONS.to_vec(),
                Mode::Chat => Vec::new(),
            },
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|mode| mode.slug() == s)
            .ok_or_else(|| format!("unknown mode '{}'", s))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModeView {
    pub mode: Mode,
    pub label: &'static str,
    pub subheader: &'static str,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub accepted_formats: Vec<&'static str>,
}

#[derive(Debug, thiserror::Error)]
pub enum PresenterError {
    #[error("No file uploaded")]
    MissingUpload,
    #[error("Chat message cannot be empty")]
    EmptyMessage,
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    Session(#[from] FlowError),
}

impl PresenterError {
    /// Failures outside the user's control, shown without classification.
    pub fn is_generic(&self) -> bool {
        !matches!(
            self,
            PresenterError::MissingUpload
                | PresenterError::EmptyMessage
                | PresenterError::Upload(UploadError::UnsupportedFormat(_))
                | PresenterError::Session(FlowError::SessionNotFound(_) | FlowError::SessionBusy(_))
        )
    }

    /// The one message shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            PresenterError::MissingUpload => format!("Error: {}", self),
            _ if self.is_generic() => "An unexpected error occurred".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Both modes, wired to one Request Bridge.
#[derive(Clone)]
pub struct Presenter {
    pub report: ReportAnalysis,
    pub chat: Chat,
}

impl Presenter {
    pub fn new(bridge: RequestBridge, session_storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            report: ReportAnalysis::new(bridge.clone()),
            chat: Chat::new(bridge, session_storage),
        }
    }

    pub fn with_session_idle_timeout(mut self, timeout: chrono::Duration) -> Self {
        self.chat = self.chat.with_idle_timeout(timeout);
        self
    }
}
