//! End-to-end API tests over the full middleware stack with a stub
//! vision collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Value, json};

use hive_analysis::AppState;
use hive_analysis::config::{
    AppConfig, LimitsConfig, ResilienceConfig, SecurityConfig, ServerConfig, UploadConfig,
};
use hive_analysis::security::UserClaims;
use hive_analysis::server::build_router;
use hive_analysis::vision::{VisionError, VisionModel};

/// Collaborator stub that echoes payload facts back as "analysis".
#[derive(Debug)]
struct StubVision;

#[async_trait]
impl VisionModel for StubVision {
    async fn describe(
        &self,
        media: &[u8],
        mime_type: &str,
        _prompt: &str,
    ) -> Result<String, VisionError> {
        Ok(format!("analyzed {} bytes of {mime_type}", media.len()))
    }

    async fn respond(&self, prompt: &str) -> Result<String, VisionError> {
        Ok(format!("echo: {prompt}"))
    }
}

/// Collaborator stub that always fails.
#[derive(Debug)]
struct BrokenVision;

#[async_trait]
impl VisionModel for BrokenVision {
    async fn describe(
        &self,
        _media: &[u8],
        _mime_type: &str,
        _prompt: &str,
    ) -> Result<String, VisionError> {
        Err(VisionError::Provider("model offline".to_string()))
    }

    async fn respond(&self, _prompt: &str) -> Result<String, VisionError> {
        Err(VisionError::Provider("model offline".to_string()))
    }
}

fn test_config(jwt_required: bool) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
        },
        security: SecurityConfig {
            jwt_required,
            jwt_secret: "test-secret".to_string(),
        },
        limits: LimitsConfig {
            rate_limit_enabled: true,
            max_analysis_calls: 10,
            call_window_secs: 60 * 60,
            max_upload_mib: 100,
            volume_window_secs: 24 * 60 * 60,
        },
        upload: UploadConfig {
            max_chunk_size: 1024 * 1024,
            session_ttl_secs: 600,
            sweep_interval_secs: 60,
        },
        resilience: ResilienceConfig {
            timeout_disabled: true,
        },
    }
}

fn server_with(vision: Arc<dyn VisionModel>, jwt_required: bool) -> TestServer {
    let state = AppState::new(Arc::new(test_config(jwt_required)), vision);
    TestServer::new(build_router(state)).expect("failed to start test server")
}

fn server() -> TestServer {
    server_with(Arc::new(StubVision), false)
}

fn bearer_token(user_id: &str) -> String {
    let claims = UserClaims {
        sub: user_id.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(b"test-secret"),
    )
    .unwrap()
}

fn b64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

#[tokio::test]
async fn test_health() {
    let server = server();
    let response = server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["status"], "ok");
}

#[tokio::test]
async fn test_analyze_image() {
    let server = server();
    let response = server
        .post("/api/analyze")
        .json(&json!({
            "user_id": "beekeeper-1",
            "media_type": "image",
            "analysis_type": "health",
            "media_data": b64(b"jpeg-bytes"),
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body = response.json::<Value>();
    assert_eq!(body["status"], 200);
    assert_eq!(body["user_id"], "beekeeper-1");
    assert_eq!(body["message_type"], "image_analysis");
    assert_eq!(body["data"]["success"], true);
    assert_eq!(body["data"]["type"], "health");
    assert_eq!(body["data"]["analysis"], "analyzed 10 bytes of image/jpeg");
}

#[tokio::test]
async fn test_analyze_accepts_data_url() {
    let server = server();
    let response = server
        .post("/api/analyze")
        .json(&json!({
            "user_id": "beekeeper-1",
            "media_type": "image",
            "content_type": "image/png",
            "media_data": format!("data:image/png;base64,{}", b64(b"png-bytes")),
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body = response.json::<Value>();
    assert_eq!(body["data"]["analysis"], "analyzed 9 bytes of image/png");
    // Unspecified analysis_type defaults to general.
    assert_eq!(body["data"]["type"], "general");
}

#[tokio::test]
async fn test_analyze_rejects_bad_media_type() {
    let server = server();
    let response = server
        .post("/api/analyze")
        .json(&json!({
            "user_id": "beekeeper-1",
            "media_type": "audio",
            "media_data": b64(b"x"),
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body = response.json::<Value>();
    assert_eq!(body["status"], 400);
    assert_eq!(body["type"], "ValidationError");
}

#[tokio::test]
async fn test_analyze_rejects_unknown_analysis_type() {
    let server = server();
    let response = server
        .post("/api/analyze")
        .json(&json!({
            "user_id": "beekeeper-1",
            "media_type": "image",
            "analysis_type": "swarming",
            "media_data": b64(b"x"),
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["type"], "ValidationError");
}

#[tokio::test]
async fn test_analyze_rejects_bad_base64() {
    let server = server();
    let response = server
        .post("/api/analyze")
        .json(&json!({
            "user_id": "beekeeper-1",
            "media_type": "image",
            "media_data": "!!! not base64 !!!",
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["type"], "ValidationError");
}

#[tokio::test]
async fn test_analyze_rejects_long_video() {
    let server = server();
    let response = server
        .post("/api/analyze")
        .json(&json!({
            "user_id": "beekeeper-1",
            "media_type": "video",
            "media_data": b64(b"mp4-bytes"),
            "duration_seconds": 121.0,
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["type"], "ValidationError");
}

#[tokio::test]
async fn test_analyze_collaborator_failure() {
    let server = server_with(Arc::new(BrokenVision), false);
    let response = server
        .post("/api/analyze")
        .json(&json!({
            "user_id": "beekeeper-1",
            "media_type": "image",
            "media_data": b64(b"x"),
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.json::<Value>();
    assert_eq!(body["status"], 500);
    assert_eq!(body["type"], "AnalysisError");
}

#[tokio::test]
async fn test_eleventh_call_rate_limited() {
    let server = server();
    for _ in 0..10 {
        let response = server
            .post("/api/analyze")
            .json(&json!({
                "user_id": "beekeeper-1",
                "media_type": "image",
                "media_data": b64(b"x"),
            }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    let response = server
        .post("/api/analyze")
        .json(&json!({
            "user_id": "beekeeper-1",
            "media_type": "image",
            "media_data": b64(b"x"),
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.json::<Value>()["type"], "RateLimitExceeded");

    // The quota answer wins even when the payload itself is invalid.
    let response = server
        .post("/api/analyze")
        .json(&json!({
            "user_id": "beekeeper-1",
            "media_type": "audio",
            "media_data": "!!! not base64 !!!",
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::TOO_MANY_REQUESTS);

    // Another user is unaffected.
    let response = server
        .post("/api/analyze")
        .json(&json!({
            "user_id": "beekeeper-2",
            "media_type": "image",
            "media_data": b64(b"x"),
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_chat_shares_call_budget() {
    let server = server();
    for _ in 0..10 {
        let response = server
            .post("/api/chat")
            .json(&json!({ "user_id": "beekeeper-1", "message": "hello" }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.json::<Value>()["data"], "echo: hello");
    }

    // The chat calls consumed the analysis budget too.
    let response = server
        .post("/api/analyze")
        .json(&json!({
            "user_id": "beekeeper-1",
            "media_type": "image",
            "media_data": b64(b"x"),
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_chunked_upload_end_to_end() {
    let server = server();

    let response = server
        .post("/api/uploads")
        .json(&json!({
            "user_id": "beekeeper-1",
            "media_type": "image",
            "file_size": 2_000_000,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body = response.json::<Value>();
    assert_eq!(body["status"], 200);
    assert_eq!(body["max_chunk_size"], 1024 * 1024);
    let session_id = body["session_id"].as_str().unwrap().to_string();

    // Second chunk arrives first.
    let response = server
        .post(&format!("/api/uploads/{session_id}/chunks"))
        .json(&json!({
            "chunk_number": 1,
            "total_chunks": 2,
            "chunk_data": b64(b"bbbb"),
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body = response.json::<Value>();
    assert_eq!(body["session_id"], session_id);
    assert_eq!(body["chunk_number"], 1);

    // The final chunk completes the session and triggers analysis of the
    // reassembled payload (4 + 4 bytes, index order).
    let response = server
        .post(&format!("/api/uploads/{session_id}/chunks"))
        .json(&json!({
            "chunk_number": 0,
            "total_chunks": 2,
            "chunk_data": b64(b"aaaa"),
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body = response.json::<Value>();
    assert_eq!(body["message_type"], "image_analysis");
    assert_eq!(body["user_id"], "beekeeper-1");
    assert_eq!(body["data"]["analysis"], "analyzed 8 bytes of image/jpeg");

    // The session was consumed by the hand-off.
    let response = server
        .post(&format!("/api/uploads/{session_id}/chunks"))
        .json(&json!({
            "chunk_number": 0,
            "total_chunks": 2,
            "chunk_data": b64(b"aaaa"),
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["type"], "NotFoundError");
}

#[tokio::test]
async fn test_upload_start_rejects_oversized_declaration() {
    let server = server();
    let response = server
        .post("/api/uploads")
        .json(&json!({
            "user_id": "beekeeper-1",
            "media_type": "image",
            "file_size": 11 * 1024 * 1024,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["type"], "ValidationError");
}

#[tokio::test]
async fn test_upload_volume_budget() {
    let server = server();
    for _ in 0..2 {
        let response = server
            .post("/api/uploads")
            .json(&json!({
                "user_id": "beekeeper-1",
                "media_type": "video",
                "file_size": 50 * 1024 * 1024,
            }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    // 100 MiB declared within the day; the next session breaches the budget.
    let response = server
        .post("/api/uploads")
        .json(&json!({
            "user_id": "beekeeper-1",
            "media_type": "video",
            "file_size": 1024,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.json::<Value>()["type"], "RateLimitExceeded");
}

#[tokio::test]
async fn test_chunk_for_unknown_session() {
    let server = server();
    let response = server
        .post("/api/uploads/no-such-session/chunks")
        .json(&json!({
            "chunk_number": 0,
            "total_chunks": 1,
            "chunk_data": b64(b"x"),
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["type"], "NotFoundError");
}

#[tokio::test]
async fn test_chunk_total_mismatch() {
    let server = server();
    let response = server
        .post("/api/uploads")
        .json(&json!({
            "user_id": "beekeeper-1",
            "media_type": "image",
            "file_size": 1024,
        }))
        .await;
    let session_id = response.json::<Value>()["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    server
        .post(&format!("/api/uploads/{session_id}/chunks"))
        .json(&json!({
            "chunk_number": 0,
            "total_chunks": 3,
            "chunk_data": b64(b"a"),
        }))
        .await;

    let response = server
        .post(&format!("/api/uploads/{session_id}/chunks"))
        .json(&json!({
            "chunk_number": 1,
            "total_chunks": 4,
            "chunk_data": b64(b"b"),
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["type"], "ValidationError");
}

#[tokio::test]
async fn test_auth_required() {
    let server = server_with(Arc::new(StubVision), true);

    // No token at all.
    let response = server
        .post("/api/chat")
        .json(&json!({ "user_id": "beekeeper-1", "message": "hi" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    // Token subject differs from the claimed user_id.
    let response = server
        .post("/api/chat")
        .authorization_bearer(bearer_token("beekeeper-1"))
        .json(&json!({ "user_id": "beekeeper-2", "message": "hi" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["type"], "AuthorizationError");

    // Matching token passes.
    let response = server
        .post("/api/chat")
        .authorization_bearer(bearer_token("beekeeper-1"))
        .json(&json!({ "user_id": "beekeeper-1", "message": "hi" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_chat_fields() {
    let server = server();
    let response = server
        .post("/api/chat")
        .json(&json!({ "user_id": "beekeeper-1", "message": "" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["type"], "ValidationError");
}
