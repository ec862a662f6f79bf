//! External AI vision collaborator.
//!
//! The [`VisionModel`] trait is the seam between this service and the
//! hosted multimodal model that actually reads hive imagery. The shipped
//! implementation is [`GeminiVision`]; tests substitute their own.

pub mod gemini;

pub use gemini::GeminiVision;

use async_trait::async_trait;

/// Errors raised by a vision collaborator.
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    /// The collaborator is not properly configured.
    #[error("Vision model not configured: {0}")]
    NotConfigured(String),

    /// Transport-level failure reaching the collaborator.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The collaborator answered with an error or an unusable body.
    #[error("Provider error: {0}")]
    Provider(String),
}

/// A hosted multimodal model that can describe media and answer text.
#[async_trait]
pub trait VisionModel: Send + Sync + std::fmt::Debug {
    /// Describe a media payload under the given prompt.
    ///
    /// # Arguments
    ///
    /// * `media` - Raw media bytes (already reassembled/decoded)
    /// * `mime_type` - Content type of `media` (e.g., "image/jpeg")
    /// * `prompt` - Analysis instructions for the model
    async fn describe(
        &self,
        media: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, VisionError>;

    /// Answer a plain-text prompt with no media attached.
    async fn respond(&self, prompt: &str) -> Result<String, VisionError>;
}

/// Vision collaborator connection settings.
#[derive(Debug, Clone)]
pub struct VisionSettings {
    /// Base URL for the vision API.
    pub base_url: String,
    /// API key for authentication.
    pub api_key: String,
    /// Model identifier (e.g., `gemini-pro-vision`).
    pub model: String,
}

/// Load vision settings from the environment.
///
/// `VISION_API_KEY` is required; `VISION_BASE_URL` and `VISION_MODEL`
/// fall back to the hosted Gemini defaults.
pub fn load_vision_settings() -> Result<VisionSettings, String> {
    let api_key = std::env::var("VISION_API_KEY")
        .map_err(|_| "Missing required env var: VISION_API_KEY".to_string())?;
    if api_key.trim().is_empty() {
        return Err("VISION_API_KEY cannot be empty".to_string());
    }

    let base_url = std::env::var("VISION_BASE_URL")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string());

    let model = std::env::var("VISION_MODEL")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "gemini-pro-vision".to_string());

    Ok(VisionSettings {
        base_url,
        api_key,
        model,
    })
}
