//! Media types and the stateless validation rules around them.
//!
//! The validator is pure: it reads nothing but its arguments and never
//! touches counters. Rate accounting lives in [`crate::ratelimit`].

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ApiError;

/// Maximum image payload (10 MiB).
pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum video payload (50 MiB).
pub const MAX_VIDEO_BYTES: u64 = 50 * 1024 * 1024;

/// Maximum declared video duration in seconds.
pub const MAX_VIDEO_SECONDS: f64 = 120.0;

/// Allowed image content types.
const IMAGE_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png"];

/// Allowed video content types.
const VIDEO_CONTENT_TYPES: &[&str] = &["video/mp4", "video/quicktime"];

/// Kind of media submitted for analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Still image (JPEG or PNG).
    Image,
    /// Video clip (MP4 or QuickTime).
    Video,
}

impl MediaType {
    /// Size ceiling in bytes for this media type.
    #[must_use]
    pub fn max_bytes(self) -> u64 {
        match self {
            Self::Image => MAX_IMAGE_BYTES,
            Self::Video => MAX_VIDEO_BYTES,
        }
    }

    /// Content types the server accepts for this media type.
    #[must_use]
    pub fn allowed_content_types(self) -> &'static [&'static str] {
        match self {
            Self::Image => IMAGE_CONTENT_TYPES,
            Self::Video => VIDEO_CONTENT_TYPES,
        }
    }

    /// Content type assumed when the client declares none.
    #[must_use]
    pub fn default_content_type(self) -> &'static str {
        match self {
            Self::Image => "image/jpeg",
            Self::Video => "video/mp4",
        }
    }

    /// `message_type` label used in the response envelope.
    #[must_use]
    pub fn message_type(self) -> &'static str {
        match self {
            Self::Image => "image_analysis",
            Self::Video => "video_analysis",
        }
    }

    /// Wire name, as it appears in requests.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl FromStr for MediaType {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            other => Err(ApiError::Validation(format!(
                "Invalid media type: {other}"
            ))),
        }
    }
}

/// Check a payload (or declared) size against the type's ceiling.
pub fn validate_size(media_type: MediaType, size: u64) -> Result<(), ApiError> {
    let limit = media_type.max_bytes();
    if size > limit {
        return Err(ApiError::Validation(format!(
            "File too large. Maximum size for {} is {}MB",
            media_type.as_str(),
            limit / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Check a declared content type against the allow-list for the media type.
pub fn validate_content_type(media_type: MediaType, content_type: &str) -> Result<(), ApiError> {
    if media_type
        .allowed_content_types()
        .contains(&content_type.to_ascii_lowercase().as_str())
    {
        Ok(())
    } else {
        Err(ApiError::Validation(format!(
            "Unsupported content type for {}: {content_type}",
            media_type.as_str()
        )))
    }
}

/// Best-effort duration check, applied only when metadata is available.
pub fn validate_duration(
    media_type: MediaType,
    duration_seconds: Option<f64>,
) -> Result<(), ApiError> {
    if media_type == MediaType::Video {
        if let Some(seconds) = duration_seconds {
            if seconds > MAX_VIDEO_SECONDS {
                return Err(ApiError::Validation(format!(
                    "Video too long. Maximum duration is {MAX_VIDEO_SECONDS} seconds"
                )));
            }
        }
    }
    Ok(())
}

/// Resolve the effective content type for a request: an explicit declaration
/// wins, then a filename guess, then the type's default.
#[must_use]
pub fn resolve_content_type(
    media_type: MediaType,
    declared: Option<&str>,
    filename: Option<&str>,
) -> String {
    if let Some(ct) = declared {
        return ct.to_ascii_lowercase();
    }
    if let Some(name) = filename {
        if let Some(guess) = mime_guess::from_path(name).first() {
            return guess.essence_str().to_ascii_lowercase();
        }
    }
    media_type.default_content_type().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_ceilings_exact() {
        assert!(validate_size(MediaType::Image, MAX_IMAGE_BYTES).is_ok());
        assert!(validate_size(MediaType::Image, MAX_IMAGE_BYTES + 1).is_err());
        assert!(validate_size(MediaType::Video, MAX_VIDEO_BYTES).is_ok());
        assert!(validate_size(MediaType::Video, MAX_VIDEO_BYTES + 1).is_err());
        // A video-sized payload is over the image ceiling.
        assert!(validate_size(MediaType::Image, MAX_VIDEO_BYTES).is_err());
    }

    #[test]
    fn test_content_type_allow_list() {
        assert!(validate_content_type(MediaType::Image, "image/jpeg").is_ok());
        assert!(validate_content_type(MediaType::Image, "image/png").is_ok());
        assert!(validate_content_type(MediaType::Image, "IMAGE/PNG").is_ok());
        assert!(validate_content_type(MediaType::Image, "image/gif").is_err());
        assert!(validate_content_type(MediaType::Video, "video/mp4").is_ok());
        assert!(validate_content_type(MediaType::Video, "video/quicktime").is_ok());
        assert!(validate_content_type(MediaType::Video, "video/webm").is_err());
        // Cross-type declarations are rejected.
        assert!(validate_content_type(MediaType::Video, "image/png").is_err());
    }

    #[test]
    fn test_duration_gate() {
        assert!(validate_duration(MediaType::Video, None).is_ok());
        assert!(validate_duration(MediaType::Video, Some(120.0)).is_ok());
        assert!(validate_duration(MediaType::Video, Some(120.5)).is_err());
        // Duration never applies to images.
        assert!(validate_duration(MediaType::Image, Some(999.0)).is_ok());
    }

    #[test]
    fn test_media_type_parsing() {
        assert_eq!("image".parse::<MediaType>().unwrap(), MediaType::Image);
        assert_eq!("video".parse::<MediaType>().unwrap(), MediaType::Video);
        let err = "audio".parse::<MediaType>().unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[test]
    fn test_resolve_content_type() {
        assert_eq!(
            resolve_content_type(MediaType::Image, Some("image/PNG"), None),
            "image/png"
        );
        assert_eq!(
            resolve_content_type(MediaType::Image, None, Some("hive.png")),
            "image/png"
        );
        assert_eq!(
            resolve_content_type(MediaType::Video, None, None),
            "video/mp4"
        );
    }
}
