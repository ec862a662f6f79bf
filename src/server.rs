//! HTTP transport boundary.
//!
//! Decodes inbound JSON, runs validation and rate checks, drives the upload
//! store and the analysis dispatcher, and translates typed failures into the
//! wire error envelope. This is the only place wire shapes are known.

use axum::{
    Extension, Json, Router,
    extract::{DefaultBodyLimit, Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use tracing::info;

use crate::AppState;
use crate::analysis::{AnalysisResult, AnalysisType};
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::media::{self, MediaType};
use crate::security::{self, claims::MaybeUser};
use crate::upload::ChunkOutcome;
use crate::vision::VisionModel;

/// Request body ceiling: a 50 MiB video grows ~4/3 under base64, plus JSON
/// framing slack.
const MAX_BODY_BYTES: usize = 80 * 1024 * 1024;

/// Start the Axum server with the provided configuration and collaborator.
pub async fn start_server(
    config: Arc<AppConfig>,
    vision: Arc<dyn VisionModel>,
) -> anyhow::Result<()> {
    let state = AppState::new(Arc::clone(&config), vision);

    // Background expiry sweep; stale sessions are also reclaimed lazily on
    // each start_session call.
    let sweep_store = state.uploads.clone();
    let sweep_interval = Duration::from_secs(config.upload.sweep_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            let removed = sweep_store.sweep();
            if removed > 0 {
                info!(
                    name: "upload.sessions.expired",
                    removed = removed,
                    "Expired stale upload sessions"
                );
            }
        }
    });

    let timeout = if config.resilience.timeout_disabled {
        Duration::from_secs(365 * 24 * 60 * 60) // 1 year
    } else {
        Duration::from_secs(60)
    };

    let app = build_router(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(timeout));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

/// Build the API router over the given state.
///
/// Exposed separately so tests can mount the full middleware stack against
/// a stub collaborator.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(api_chat))
        .route("/api/analyze", post(api_analyze_media))
        .route("/api/uploads", post(api_upload_start))
        .route("/api/uploads/{session_id}/chunks", post(api_upload_chunk))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            security::auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for direct media analysis.
#[derive(Debug, Deserialize)]
struct AnalyzeMediaRequest {
    /// Requesting user.
    user_id: String,
    /// "image" or "video".
    media_type: String,
    /// Analysis lens; defaults to "general".
    #[serde(default)]
    analysis_type: Option<String>,
    /// Base64 payload, optionally a `data:` URL.
    media_data: String,
    /// Declared content type (e.g., "image/png").
    #[serde(default)]
    content_type: Option<String>,
    /// Original filename, used as a content-type fallback.
    #[serde(default)]
    filename: Option<String>,
    /// Declared video duration, when the client knows it.
    #[serde(default)]
    duration_seconds: Option<f64>,
}

/// Success envelope for analysis responses.
#[derive(Debug, Serialize)]
struct AnalyzeMediaResponse {
    status: u16,
    user_id: String,
    data: AnalysisResult,
    message_type: &'static str,
}

/// Request body for opening an upload session.
#[derive(Debug, Deserialize)]
struct UploadStartRequest {
    user_id: String,
    media_type: String,
    /// Declared total upload size in bytes.
    file_size: u64,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    /// Lens applied once the upload completes; defaults to "general".
    #[serde(default)]
    analysis_type: Option<String>,
    #[serde(default)]
    duration_seconds: Option<f64>,
}

#[derive(Debug, Serialize)]
struct UploadStartResponse {
    status: u16,
    session_id: String,
    max_chunk_size: usize,
}

/// Request body for one chunk message.
#[derive(Debug, Deserialize)]
struct UploadChunkRequest {
    /// 0-based chunk index.
    chunk_number: u32,
    total_chunks: u32,
    /// Base64 chunk bytes.
    chunk_data: String,
}

#[derive(Debug, Serialize)]
struct UploadChunkResponse {
    status: u16,
    session_id: String,
    chunk_number: u32,
}

/// Request body for the chat relay.
#[derive(Debug, Deserialize)]
struct ChatRequest {
    user_id: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    status: u16,
    user_id: String,
    data: String,
    message_type: &'static str,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /health - liveness probe.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// POST /api/analyze - single-shot media analysis.
async fn api_analyze_media(
    State(state): State<AppState>,
    Extension(MaybeUser(auth)): Extension<MaybeUser>,
    Json(req): Json<AnalyzeMediaRequest>,
) -> Result<Json<AnalyzeMediaResponse>, ApiError> {
    if req.user_id.is_empty() || req.media_data.is_empty() {
        return Err(ApiError::Validation(
            "Missing required parameters".to_string(),
        ));
    }
    require_user(auth.as_ref(), &req.user_id)?;

    // The call budget gates the request before any payload inspection, so
    // an exhausted user sees RateLimitExceeded regardless of payload
    // validity.
    if state.config.limits.rate_limit_enabled {
        state.limiter.check_call(&req.user_id)?;
    }

    let media_type: MediaType = req.media_type.parse()?;
    let analysis_type = parse_analysis_type(req.analysis_type.as_deref())?;
    let payload = decode_media_payload(&req.media_data)?;

    let content_type = media::resolve_content_type(
        media_type,
        req.content_type.as_deref(),
        req.filename.as_deref(),
    );
    media::validate_content_type(media_type, &content_type)?;
    media::validate_size(media_type, payload.len() as u64)?;
    media::validate_duration(media_type, req.duration_seconds)?;

    if state.config.limits.rate_limit_enabled {
        state.limiter.check_upload(&req.user_id, payload.len() as u64)?;
    }
    // Admitted: the request now counts against both budgets.
    state.limiter.record_call(&req.user_id);
    state.limiter.record_upload(&req.user_id, payload.len() as u64);

    info!(
        name: "analysis.requested",
        user_id = %req.user_id,
        media_type = media_type.as_str(),
        analysis_type = analysis_type.as_str(),
        payload_bytes = payload.len(),
        "Media analysis requested"
    );

    let data = state
        .dispatcher
        .analyze(media_type, analysis_type, &content_type, &payload)
        .await?;

    Ok(Json(AnalyzeMediaResponse {
        status: 200,
        user_id: req.user_id,
        data,
        message_type: media_type.message_type(),
    }))
}

/// POST /api/uploads - open a chunked upload session.
async fn api_upload_start(
    State(state): State<AppState>,
    Extension(MaybeUser(auth)): Extension<MaybeUser>,
    Json(req): Json<UploadStartRequest>,
) -> Result<Json<UploadStartResponse>, ApiError> {
    if req.user_id.is_empty() {
        return Err(ApiError::Validation(
            "Missing required parameters".to_string(),
        ));
    }
    require_user(auth.as_ref(), &req.user_id)?;

    let media_type: MediaType = req.media_type.parse()?;
    let analysis_type = parse_analysis_type(req.analysis_type.as_deref())?;

    let content_type = media::resolve_content_type(
        media_type,
        req.content_type.as_deref(),
        req.filename.as_deref(),
    );
    media::validate_content_type(media_type, &content_type)?;
    media::validate_size(media_type, req.file_size)?;
    media::validate_duration(media_type, req.duration_seconds)?;

    if state.config.limits.rate_limit_enabled {
        state.limiter.check_upload(&req.user_id, req.file_size)?;
    }

    let started = state.uploads.start_session(
        &req.user_id,
        media_type,
        &content_type,
        analysis_type,
        req.file_size,
    )?;
    // Volume is charged on the declared size once the session is admitted.
    state.limiter.record_upload(&req.user_id, req.file_size);

    info!(
        name: "upload.session.started",
        user_id = %req.user_id,
        session_id = %started.session_id,
        media_type = media_type.as_str(),
        file_size = req.file_size,
        "Upload session started"
    );

    Ok(Json(UploadStartResponse {
        status: 200,
        session_id: started.session_id,
        max_chunk_size: started.max_chunk_size,
    }))
}

/// POST /api/uploads/{session_id}/chunks - submit one chunk.
///
/// The ack for an ordinary chunk is `{status, session_id, chunk_number}`;
/// the chunk that completes the session triggers analysis of the
/// reassembled payload and answers with the analysis envelope instead.
async fn api_upload_chunk(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<UploadChunkRequest>,
) -> Result<Response, ApiError> {
    let bytes = decode_media_payload(&req.chunk_data)?;

    let outcome =
        state
            .uploads
            .submit_chunk(&session_id, req.chunk_number, req.total_chunks, bytes)?;

    match outcome {
        ChunkOutcome::Accepted { received, total } => {
            tracing::debug!(
                session_id = %session_id,
                chunk_number = req.chunk_number,
                received = received,
                total = total,
                "Chunk received"
            );
            Ok(Json(UploadChunkResponse {
                status: 200,
                session_id,
                chunk_number: req.chunk_number,
            })
            .into_response())
        }
        ChunkOutcome::Complete => {
            // Hand-off: the store lock is released before the vision call.
            let completed = state.uploads.take_completed_payload(&session_id)?;

            if state.config.limits.rate_limit_enabled {
                state.limiter.check_call(&completed.user_id)?;
            }
            state.limiter.record_call(&completed.user_id);

            info!(
                name: "upload.session.complete",
                session_id = %session_id,
                user_id = %completed.user_id,
                payload_bytes = completed.payload.len(),
                "Upload complete, dispatching analysis"
            );

            let data = state
                .dispatcher
                .analyze(
                    completed.media_type,
                    completed.analysis_type,
                    &completed.content_type,
                    &completed.payload,
                )
                .await?;

            Ok(Json(AnalyzeMediaResponse {
                status: 200,
                user_id: completed.user_id,
                data,
                message_type: completed.media_type.message_type(),
            })
            .into_response())
        }
    }
}

/// POST /api/chat - relay a text query to the collaborator.
async fn api_chat(
    State(state): State<AppState>,
    Extension(MaybeUser(auth)): Extension<MaybeUser>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if req.user_id.is_empty() || req.message.is_empty() {
        return Err(ApiError::Validation(
            "Both user_id and message are required".to_string(),
        ));
    }
    require_user(auth.as_ref(), &req.user_id)?;

    // Chat draws from the same call budget as analysis.
    if state.config.limits.rate_limit_enabled {
        state.limiter.check_call(&req.user_id)?;
    }
    state.limiter.record_call(&req.user_id);

    let data = state.dispatcher.relay_chat(&req.message).await?;

    Ok(Json(ChatResponse {
        status: 200,
        user_id: req.user_id,
        data,
        message_type: "text_response",
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Reject requests whose authenticated identity differs from `user_id`.
fn require_user(
    auth: Option<&security::UserContext>,
    user_id: &str,
) -> Result<(), ApiError> {
    match auth {
        Some(ctx) if ctx.user_id != user_id => {
            Err(ApiError::Authorization("User ID mismatch".to_string()))
        }
        _ => Ok(()),
    }
}

/// Parse an optional analysis-type label, defaulting to "general".
fn parse_analysis_type(label: Option<&str>) -> Result<AnalysisType, ApiError> {
    match label {
        Some(s) if !s.is_empty() => s.parse(),
        _ => Ok(AnalysisType::default()),
    }
}

/// Decode a base64 payload, tolerating a `data:` URL prefix.
fn decode_media_payload(data: &str) -> Result<Vec<u8>, ApiError> {
    let encoded = match data.split_once(',') {
        Some((head, tail)) if head.starts_with("data:") => tail,
        _ => data,
    };
    STANDARD
        .decode(encoded.trim())
        .map_err(|_| ApiError::Validation("Invalid media data format".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{UserClaims, UserContext};

    #[test]
    fn test_decode_plain_base64() {
        let encoded = STANDARD.encode(b"hive");
        assert_eq!(decode_media_payload(&encoded).unwrap(), b"hive");
    }

    #[test]
    fn test_decode_data_url() {
        let encoded = format!("data:image/png;base64,{}", STANDARD.encode(b"hive"));
        assert_eq!(decode_media_payload(&encoded).unwrap(), b"hive");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_media_payload("not base64!!!").unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[test]
    fn test_require_user_mismatch() {
        let ctx = UserContext {
            user_id: "beekeeper-1".to_string(),
            claims: UserClaims {
                sub: "beekeeper-1".to_string(),
                exp: 0,
            },
        };
        assert!(require_user(Some(&ctx), "beekeeper-1").is_ok());
        let err = require_user(Some(&ctx), "beekeeper-2").unwrap_err();
        assert_eq!(err.kind(), "AuthorizationError");
        // Anonymous requests skip the match.
        assert!(require_user(None, "anyone").is_ok());
    }

    #[test]
    fn test_parse_analysis_type_default() {
        assert_eq!(
            parse_analysis_type(None).unwrap(),
            AnalysisType::General
        );
        assert_eq!(
            parse_analysis_type(Some("")).unwrap(),
            AnalysisType::General
        );
        assert_eq!(
            parse_analysis_type(Some("health")).unwrap(),
            AnalysisType::Health
        );
        assert!(parse_analysis_type(Some("swarming")).is_err());
    }
}
