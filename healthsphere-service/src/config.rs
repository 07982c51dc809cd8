//! Service configuration, read from the environment at start-up.

use crate::bridge::gemini::{DEFAULT_API_BASE, DEFAULT_MODEL, GeminiConfig};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 10;
pub const DEFAULT_SESSION_IDLE_MINUTES: i64 = 30;
const MAX_SESSION_IDLE_MINUTES: i64 = 7 * 24 * 60;

#[derive(Clone)]
pub struct ServiceConfig {
    /// Credential for the generation API. A missing key is not fatal here;
    /// every request fails at call time instead.
    pub google_api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    /// Chat sessions inactive for longer than this are discarded.
    pub session_idle_minutes: i64,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field(
                "google_api_key",
                &self.google_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("port", &self.port)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("session_idle_minutes", &self.session_idle_minutes)
            .finish()
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            google_api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            port: DEFAULT_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            session_idle_minutes: DEFAULT_SESSION_IDLE_MINUTES,
        }
    }
}

impl ServiceConfig {
    /// Load a `.env` file if one exists (real environment variables take
    /// precedence), then read the configuration from the environment.
    pub fn load() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let google_api_key = lookup("GOOGLE_API_KEY").filter(|k| !k.trim().is_empty());
        let model = lookup("GEMINI_MODEL")
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(defaults.model);
        let api_base = lookup("GEMINI_API_BASE")
            .filter(|b| !b.trim().is_empty())
            .map(|b| b.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base);
        let port = lookup("PORT")
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(defaults.port);
        let max_upload_bytes = lookup("MAX_UPLOAD_MB")
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|mb| *mb > 0)
            .map(|mb| mb * 1024 * 1024)
            .unwrap_or(defaults.max_upload_bytes);
        let session_idle_minutes = lookup("SESSION_IDLE_MINUTES")
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|minutes| (1..=MAX_SESSION_IDLE_MINUTES).contains(minutes))
            .unwrap_or(defaults.session_idle_minutes);

        Self {
            google_api_key,
            model,
            api_base,
            port,
            max_upload_bytes,
            session_idle_minutes,
        }
    }

    pub fn session_idle_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session_idle_minutes)
    }

    pub fn gemini_config(&self) -> GeminiConfig {
        GeminiConfig::new(self.google_api_key.clone())
            .with_model(self.model.clone())
            .with_api_base(self.api_base.clone())
    }
}
