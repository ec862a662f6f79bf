//! Analysis dispatch: prompt selection and result shaping.
//!
//! The dispatcher owns the mapping from an analysis-type label to the
//! beekeeping prompt sent to the vision collaborator, and wraps the
//! collaborator's free-text reply into the response envelope. It never
//! retries; a collaborator failure surfaces upward once.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::media::MediaType;
use crate::vision::VisionModel;

/// Interpretation lens applied to a media payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    /// Overall scene assessment.
    #[default]
    General,
    /// Foraging activity and food sources.
    Foraging,
    /// Disease, pests and hive condition.
    Health,
    /// Hive strength and honey production.
    Productivity,
}

impl AnalysisType {
    /// Wire name, as it appears in requests and the result envelope.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Foraging => "foraging",
            Self::Health => "health",
            Self::Productivity => "productivity",
        }
    }

    /// Build the collaborator prompt for this lens and media type.
    #[must_use]
    pub fn prompt(self, media_type: MediaType) -> String {
        let context = match media_type {
            MediaType::Image => "In this image",
            MediaType::Video => "In this video",
        };

        match self {
            Self::General => format!(
                "{context}, analyze the beekeeping scene and provide:\n\
                 1. Overall assessment of visible conditions\n\
                 2. Identification of any issues or concerns\n\
                 3. Recommendations for improvement\n\
                 4. Potential impact on hive productivity"
            ),
            Self::Foraging => format!(
                "{context}, analyze bee foraging activity:\n\
                 1. Assess visible foraging patterns\n\
                 2. Evaluate available food sources\n\
                 3. Identify potential foraging obstacles\n\
                 4. Suggest improvements for foraging efficiency"
            ),
            Self::Health => format!(
                "{context}, examine bee and hive health:\n\
                 1. Look for signs of disease or pests\n\
                 2. Assess hive condition\n\
                 3. Evaluate bee activity and behavior\n\
                 4. Recommend health management actions"
            ),
            Self::Productivity => format!(
                "{context}, evaluate productivity factors:\n\
                 1. Assess hive strength and activity\n\
                 2. Examine visible honey production signs\n\
                 3. Identify productivity limiters\n\
                 4. Suggest productivity improvements"
            ),
        }
    }
}

impl FromStr for AnalysisType {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(Self::General),
            "foraging" => Ok(Self::Foraging),
            "health" => Ok(Self::Health),
            "productivity" => Ok(Self::Productivity),
            other => Err(ApiError::Validation(format!(
                "Invalid analysis type: {other}"
            ))),
        }
    }
}

/// Result envelope for one analysis.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    /// Always true on the success path; failures travel as errors.
    pub success: bool,
    /// Free-text analysis from the collaborator.
    pub analysis: String,
    /// RFC 3339 completion time.
    pub timestamp: String,
    /// Echo of the requested lens.
    #[serde(rename = "type")]
    pub analysis_type: AnalysisType,
}

/// Dispatches payloads to the vision collaborator and shapes results.
#[derive(Debug, Clone)]
pub struct AnalysisDispatcher {
    vision: Arc<dyn VisionModel>,
}

impl AnalysisDispatcher {
    /// Create a dispatcher over the given collaborator.
    #[must_use]
    pub fn new(vision: Arc<dyn VisionModel>) -> Self {
        Self { vision }
    }

    /// Analyze a complete media payload under the requested lens.
    pub async fn analyze(
        &self,
        media_type: MediaType,
        analysis_type: AnalysisType,
        content_type: &str,
        payload: &[u8],
    ) -> Result<AnalysisResult, ApiError> {
        let prompt = analysis_type.prompt(media_type);

        tracing::debug!(
            media_type = media_type.as_str(),
            analysis_type = analysis_type.as_str(),
            payload_bytes = payload.len(),
            "Dispatching analysis to vision collaborator"
        );

        let analysis = self
            .vision
            .describe(payload, content_type, &prompt)
            .await
            .map_err(|e| ApiError::Analysis(format!("Analysis failed: {e}")))?;

        if analysis.trim().is_empty() {
            return Err(ApiError::Analysis(
                "Analysis failed: collaborator returned empty output".to_string(),
            ));
        }

        Ok(AnalysisResult {
            success: true,
            analysis,
            timestamp: Utc::now().to_rfc3339(),
            analysis_type,
        })
    }

    /// Relay a plain chat message to the collaborator.
    pub async fn relay_chat(&self, message: &str) -> Result<String, ApiError> {
        let reply = self
            .vision
            .respond(message)
            .await
            .map_err(|e| ApiError::Analysis(format!("Chat relay failed: {e}")))?;

        if reply.trim().is_empty() {
            return Err(ApiError::Analysis(
                "Chat relay failed: collaborator returned empty output".to_string(),
            ));
        }

        Ok(reply)
    }
}
