//! Test doubles shared by the unit tests of this crate.

use async_trait::async_trait;
use std::io::Cursor;
use std::sync::Mutex;

use crate::bridge::{BridgeError, GenerativeModel, Part};

/// Records every request and answers with a fixed reply or a fixed failure.
pub struct MockModel {
    reply: Option<String>,
    calls: Mutex<Vec<Vec<Part>>>,
}

impl MockModel {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<Part>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerativeModel for MockModel {
    async fn generate(&self, parts: Vec<Part>) -> Result<String, BridgeError> {
        self.calls.lock().unwrap().push(parts);
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => Err(BridgeError::Api {
                status: 503,
                body: "model overloaded".to_string(),
            }),
        }
    }
}

/// A small, valid image encoded in `format`.
pub fn encoded_image(format: image::ImageFormat) -> Vec<u8> {
    let image = image::DynamicImage::new_rgb8(4, 3);
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), format)
        .unwrap();
    buffer
}
