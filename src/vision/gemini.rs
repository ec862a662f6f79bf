//! Gemini `generateContent` vision collaborator.
//!
//! Posts the prompt plus base64 `inline_data` media to the Gemini API and
//! extracts the candidate text. No retries happen here; a failed call
//! surfaces upward once.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::json;

use super::{VisionError, VisionModel, VisionSettings};

/// Vision collaborator backed by the Gemini `generateContent` API.
#[derive(Clone)]
pub struct GeminiVision {
    http: reqwest::Client,
    settings: VisionSettings,
}

impl std::fmt::Debug for GeminiVision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiVision")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .finish()
    }
}

impl GeminiVision {
    /// Create a new Gemini collaborator with the given settings.
    #[must_use]
    pub fn new(settings: VisionSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model
        )
    }

    async fn generate(&self, parts: serde_json::Value) -> Result<String, VisionError> {
        if self.settings.api_key.trim().is_empty() {
            return Err(VisionError::NotConfigured(
                "Vision API key not configured".to_string(),
            ));
        }

        let body = json!({
            "contents": [{ "parts": parts }]
        });

        let response = self
            .http
            .post(self.generate_url())
            .header("x-goog-api-key", &self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| VisionError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(VisionError::Provider(format!(
                "Vision API error ({status}): {error_text}"
            )));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| VisionError::Provider(e.to_string()))?;

        // Join the text parts of the first candidate.
        let text = result
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.pointer("/content/parts"))
            .and_then(|p| p.as_array())
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(VisionError::Provider(
                "Vision API returned no candidate text".to_string(),
            ));
        }

        Ok(text)
    }
}

#[async_trait]
impl VisionModel for GeminiVision {
    async fn describe(
        &self,
        media: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, VisionError> {
        let encoded = STANDARD.encode(media);
        let parts = json!([
            { "text": prompt },
            { "inline_data": { "mime_type": mime_type, "data": encoded } }
        ]);
        self.generate(parts).await
    }

    async fn respond(&self, prompt: &str) -> Result<String, VisionError> {
        let parts = json!([{ "text": prompt }]);
        self.generate(parts).await
    }
}
