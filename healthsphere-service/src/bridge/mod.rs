//! Request Bridge: formats a user query (plus optional image and instruction)
//! into a single generation request and returns the model's text unmodified.

pub mod gemini;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub use gemini::{GeminiClient, GeminiConfig};

/// Raw image bytes with their declared mime type, sent inline with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// One element of a multi-part generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    Image(ImagePayload),
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("GOOGLE_API_KEY is not configured")]
    MissingApiKey,
    #[error("Network error: {0}")]
    Network(String),
    #[error("Rate limited by the generation service")]
    RateLimited,
    #[error("API error: HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Parse error: {0}")]
    Parse(String),
}

/// The external generation contract: `generate(parts) -> text`.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, parts: Vec<Part>) -> Result<String, BridgeError>;
}

#[derive(Clone)]
pub struct RequestBridge {
    model: Arc<dyn GenerativeModel>,
}

impl RequestBridge {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    /// Lay out the request parts.
    ///
    /// Image and instruction are only sent together; with either one missing the
    /// request degrades to the plain query.
    pub fn build_parts(
        query: &str,
        image: Option<&ImagePayload>,
        instruction: Option<&str>,
    ) -> Vec<Part> {
        match (image, instruction) {
            (Some(image), Some(instruction)) => vec![
                Part::Text(query.to_string()),
                Part::Image(image.clone()),
                Part::Text(instruction.to_string()),
            ],
            _ => vec![Part::Text(query.to_string())],
        }
    }

    /// Send one request and return the service's text as-is. No retries.
    pub async fn respond(
        &self,
        query: &str,
        image: Option<&ImagePayload>,
        instruction: Option<&str>,
    ) -> Result<String, BridgeError> {
        let parts = Self::build_parts(query, image, instruction);
        debug!(
            parts = parts.len(),
            with_image = image.is_some() && instruction.is_some(),
            "Dispatching generation request"
        );
        self.model.generate(parts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockModel;

    fn jpeg_payload() -> ImagePayload {
        ImagePayload {
            mime_type: "image/jpeg".to_string(),
            bytes: vec![0xFF, 0xD8, 0xFF],
        }
    }

    #[test]
    fn test_image_and_instruction_form_one_multipart_request() {
        let image = jpeg_payload();
        let parts = RequestBridge::build_parts("What does high ALT mean?", Some(&image), Some("Analyze"));

        assert_eq!(
            parts,
            vec![
                Part::Text("What does high ALT mean?".to_string()),
                Part::Image(image),
                Part::Text("Analyze".to_string()),
            ]
        );
    }

    #[test]
    fn test_incomplete_inputs_collapse_to_plain_text() {
        let image = jpeg_payload();
        let expected = vec![Part::Text("hello".to_string())];

        assert_eq!(RequestBridge::build_parts("hello", None, None), expected);
        assert_eq!(RequestBridge::build_parts("hello", Some(&image), None), expected);
        assert_eq!(RequestBridge::build_parts("hello", None, Some("Analyze")), expected);
    }

    #[tokio::test]
    async fn test_respond_returns_service_text_unmodified() {
        let model = Arc::new(MockModel::replying("  *Elevated* ALT\n"));
        let bridge = RequestBridge::new(model.clone());

        let reply = bridge.respond("q", None, None).await.unwrap();
        assert_eq!(reply, "  *Elevated* ALT\n");
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_respond_propagates_failure_without_retry() {
        let model = Arc::new(MockModel::failing());
        let bridge = RequestBridge::new(model.clone());

        let err = bridge.respond("q", None, None).await.unwrap_err();
        assert!(matches!(err, BridgeError::Api { status: 503, .. }));
        assert_eq!(model.call_count(), 1);
    }
}
