//! Medical report uploads: format checks, decoding and conversion to an
//! inline [`ImagePayload`].

use serde::Serialize;
use std::path::Path;

use crate::bridge::ImagePayload;

/// Declared content types accepted for report uploads (JPG, JPEG, PNG).
pub const ACCEPTED_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/jpg", "image/png"];

/// File extensions offered to the user.
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub const IMAGE_CAPTION: &str = "Uploaded Medical Report";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Unsupported file type '{0}'; expected JPG, JPEG or PNG")]
    UnsupportedFormat(String),
    #[error("Failed to decode image: {0}")]
    Decode(String),
}

/// A file as received from the user.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// What is rendered back about the uploaded image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageInfo {
    pub file_name: String,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub caption: String,
}

pub fn is_accepted_mime(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    ACCEPTED_MIME_TYPES.contains(&essence.as_str())
}

/// Mime type for a local file, judged by its extension.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        _ => None,
    }
}

impl UploadedFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Validate and decode the upload, yielding the request payload and the
    /// rendered image details. Decoding is blocking work.
    pub fn into_payload(self) -> Result<(ImagePayload, ImageInfo), UploadError> {
        if !is_accepted_mime(&self.content_type) {
            return Err(UploadError::UnsupportedFormat(self.content_type));
        }

        let decoded =
            image::load_from_memory(&self.bytes).map_err(|e| UploadError::Decode(e.to_string()))?;

        let info = ImageInfo {
            file_name: self.file_name,
            mime_type: self.content_type.clone(),
            width: decoded.width(),
            height: decoded.height(),
            caption: IMAGE_CAPTION.to_string(),
        };
        let payload = ImagePayload {
            mime_type: self.content_type,
            bytes: self.bytes,
        };

        Ok((payload, info))
    }
}
