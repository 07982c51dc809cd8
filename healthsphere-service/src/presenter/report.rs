use serde::Serialize;
use tracing::info;

use super::PresenterError;
use crate::bridge::RequestBridge;
use crate::upload::{ImageInfo, UploadError, UploadedFile};

/// Fixed instruction sent alongside every report image.
pub const ANALYSIS_INSTRUCTION: &str = "Analyze the attached image of the medical report/blood test report.
Give me correct answers based on my questions from the image. Provide health advice if asked.";

pub const RESULT_SUBHEADER: &str = "Analysis Result";

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub subheader: &'static str,
    pub response: String,
    pub image: ImageInfo,
}

/// Stateless report analysis: every call is an independent request.
#[derive(Clone)]
pub struct ReportAnalysis {
    bridge: RequestBridge,
}

impl ReportAnalysis {
    pub fn new(bridge: RequestBridge) -> Self {
        Self { bridge }
    }

    /// Handle one "Analyze" action.
    pub async fn analyze(
        &self,
        query: &str,
        upload: Option<UploadedFile>,
    ) -> Result<AnalysisOutcome, PresenterError> {
        let upload = upload.ok_or(PresenterError::MissingUpload)?;
        info!(
            file_name = %upload.file_name,
            content_type = %upload.content_type,
            size = upload.bytes.len(),
            "Analyzing medical report"
        );

        let (payload, image) = tokio::task::spawn_blocking(move || upload.into_payload())
            .await
            .map_err(|e| UploadError::Decode(e.to_string()))??;

        let response = self
            .bridge
            .respond(query, Some(&payload), Some(ANALYSIS_INSTRUCTION))
            .await?;

        info!(response_length = response.len(), "Report analysis completed");

        Ok(AnalysisOutcome {
            subheader: RESULT_SUBHEADER,
            response,
            image,
        })
    }
}
