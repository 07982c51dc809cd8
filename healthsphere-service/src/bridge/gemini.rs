//! Google Gemini client for the Generative Language REST API.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{BridgeError, GenerativeModel, Part};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl GeminiConfig {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

pub struct GeminiClient {
    config: GeminiConfig,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn api_url(&self) -> String {
        format!("{}/{}:generateContent", self.config.api_base, self.config.model)
    }

    /// Build the JSON request body. Empty text parts are dropped because the
    /// API rejects them.
    pub(crate) fn build_request_body(parts: &[Part]) -> Value {
        let wire_parts: Vec<Value> = parts
            .iter()
            .filter_map(|part| match part {
                Part::Text(text) if text.is_empty() => None,
                Part::Text(text) => Some(json!({ "text": text })),
                Part::Image(image) => Some(json!({
                    "inlineData": {
                        "mimeType": image.mime_type,
                        "data": STANDARD.encode(&image.bytes),
                    }
                })),
            })
            .collect();

        json!({
            "contents": [{
                "role": "user",
                "parts": wire_parts,
            }]
        })
    }

    /// Concatenate the text parts of the first candidate.
    pub(crate) fn parse_response(json: &Value) -> Result<String, BridgeError> {
        let first = json["candidates"]
            .as_array()
            .and_then(|candidates| candidates.first())
            .ok_or_else(|| {
                let reason = json["promptFeedback"]["blockReason"]
                    .as_str()
                    .unwrap_or("no candidates in response");
                BridgeError::Parse(reason.to_string())
            })?;

        let parts = first["content"]["parts"]
            .as_array()
            .ok_or_else(|| BridgeError::Parse("candidate has no content parts".to_string()))?;

        Ok(parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect::<String>())
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, parts: Vec<Part>) -> Result<String, BridgeError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(BridgeError::MissingApiKey)?;

        let body = Self::build_request_body(&parts);
        debug!(model = %self.config.model, parts = parts.len(), "Gemini API request");

        let response = self
            .http
            .post(self.api_url())
            .header("content-type", "application/json")
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BridgeError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!(model = %self.config.model, "Gemini API rate limited");
            return Err(BridgeError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| BridgeError::Parse(e.to_string()))?;

        Self::parse_response(&json)
    }
}
