//! Upload session state machine and store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::analysis::AnalysisType;
use crate::error::ApiError;
use crate::media::{self, MediaType};

/// Default per-chunk size ceiling (1 MiB).
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Default session TTL (10 minutes).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(10 * 60);

/// Store-wide upload policy.
#[derive(Debug, Clone, Copy)]
pub struct UploadPolicy {
    /// Largest chunk the server accepts in one message.
    pub max_chunk_size: usize,
    /// Age after which a pending session is reclaimed.
    pub session_ttl: Duration,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }
}

/// Lifecycle state of an upload session.
///
/// Transitions only move forward: pending sessions either complete, expire
/// or fail; terminal sessions never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Accepting chunks.
    Pending,
    /// Every chunk arrived; payload awaits hand-off.
    Complete,
    /// Reclaimed by the expiry sweep.
    Expired,
    /// Poisoned by a protocol violation.
    Failed,
}

/// Result of admitting one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Chunk stored; more are outstanding.
    Accepted {
        /// Chunks received so far.
        received: u32,
        /// Declared chunk count.
        total: u32,
    },
    /// This chunk completed the session.
    Complete,
}

/// Values returned from [`UploadStore::start_session`].
#[derive(Debug, Clone)]
pub struct StartedUpload {
    /// Opaque session token for subsequent chunk messages.
    pub session_id: String,
    /// Largest chunk the server will accept in one message.
    pub max_chunk_size: usize,
}

/// A reassembled payload together with the request context captured at
/// session start. Produced exactly once per session.
#[derive(Debug)]
pub struct CompletedUpload {
    /// User that opened the session.
    pub user_id: String,
    /// Media type fixed at creation.
    pub media_type: MediaType,
    /// Effective content type fixed at creation.
    pub content_type: String,
    /// Analysis requested for the finished payload.
    pub analysis_type: AnalysisType,
    /// Chunks concatenated in index order.
    pub payload: Vec<u8>,
}

/// One in-progress chunked upload.
#[derive(Debug, Clone)]
pub struct UploadSession {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    id: String,
    user_id: String,
    media_type: MediaType,
    content_type: String,
    analysis_type: AnalysisType,
    declared_size: u64,
    created_at: DateTime<Utc>,
    state: Mutex<ChunkState>,
}

#[derive(Debug)]
struct ChunkState {
    status: SessionStatus,
    total_chunks: Option<u32>,
    chunks: HashMap<u32, Vec<u8>>,
    received_bytes: u64,
    payload: Option<Vec<u8>>,
}

impl UploadSession {
    fn new(
        user_id: String,
        media_type: MediaType,
        content_type: String,
        analysis_type: AnalysisType,
        declared_size: u64,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4().to_string(),
                user_id,
                media_type,
                content_type,
                analysis_type,
                declared_size,
                created_at: Utc::now(),
                state: Mutex::new(ChunkState {
                    status: SessionStatus::Pending,
                    total_chunks: None,
                    chunks: HashMap::new(),
                    received_bytes: 0,
                    payload: None,
                }),
            }),
        }
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Byte count the client declared at start.
    #[must_use]
    pub fn declared_size(&self) -> u64 {
        self.inner.declared_size
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.lock_state().status
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ChunkState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Whether a pending session is older than `ttl` at instant `now`.
    fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match (now - self.inner.created_at).to_std() {
            Ok(age) => age > ttl,
            // created_at in the future means clock skew; never stale.
            Err(_) => false,
        }
    }

    /// Admit one chunk, serialized against other chunks for this session.
    fn admit_chunk(
        &self,
        chunk_index: u32,
        total_chunks: u32,
        bytes: Vec<u8>,
        max_chunk_size: usize,
    ) -> Result<ChunkOutcome, ApiError> {
        let mut state = self.lock_state();

        match state.status {
            SessionStatus::Pending => {}
            SessionStatus::Complete => {
                return Err(ApiError::State(format!(
                    "Upload session {} is already complete",
                    self.inner.id
                )));
            }
            SessionStatus::Expired | SessionStatus::Failed => {
                return Err(ApiError::NotFound(format!(
                    "Upload session not found: {}",
                    self.inner.id
                )));
            }
        }

        if bytes.len() > max_chunk_size {
            return Err(ApiError::Validation(format!(
                "Chunk exceeds maximum chunk size of {max_chunk_size} bytes"
            )));
        }

        // First chunk binds the declared chunk count for the whole session.
        let total = match state.total_chunks {
            None => {
                if total_chunks == 0 {
                    return Err(ApiError::Validation(
                        "total_chunks must be at least 1".to_string(),
                    ));
                }
                state.total_chunks = Some(total_chunks);
                total_chunks
            }
            Some(bound) => {
                if total_chunks != bound {
                    return Err(ApiError::Validation(format!(
                        "total_chunks mismatch: session declared {bound}, chunk declared {total_chunks}"
                    )));
                }
                bound
            }
        };

        if chunk_index >= total {
            return Err(ApiError::Validation(format!(
                "chunk_number {chunk_index} out of range for {total} chunks"
            )));
        }

        if let Some(existing) = state.chunks.get(&chunk_index) {
            // Duplicate delivery is idempotent-safe only for identical bytes.
            if *existing == bytes {
                return Ok(ChunkOutcome::Accepted {
                    received: state.chunks.len() as u32,
                    total,
                });
            }
            return Err(ApiError::Validation(format!(
                "chunk_number {chunk_index} already received with different content"
            )));
        }

        let incoming = bytes.len() as u64;
        if state.received_bytes + incoming > self.inner.media_type.max_bytes() {
            // The client lied about the size; the session is unrecoverable.
            state.status = SessionStatus::Failed;
            return Err(ApiError::Validation(format!(
                "Upload exceeds maximum size for {}",
                self.inner.media_type.as_str()
            )));
        }

        state.received_bytes += incoming;
        state.chunks.insert(chunk_index, bytes);

        if state.chunks.len() as u32 == total {
            state.payload = Some(Self::reassemble(&mut state.chunks, total));
            state.status = SessionStatus::Complete;
            return Ok(ChunkOutcome::Complete);
        }

        Ok(ChunkOutcome::Accepted {
            received: state.chunks.len() as u32,
            total,
        })
    }

    /// Concatenate chunks strictly in index order, draining the sparse map.
    fn reassemble(chunks: &mut HashMap<u32, Vec<u8>>, total: u32) -> Vec<u8> {
        let capacity: usize = chunks.values().map(Vec::len).sum();
        let mut payload = Vec::with_capacity(capacity);
        for index in 0..total {
            if let Some(chunk) = chunks.remove(&index) {
                payload.extend_from_slice(&chunk);
            }
        }
        payload
    }
}

/// Thread-safe store for upload sessions.
///
/// Concurrent chunks for different sessions proceed independently; chunks
/// for the same session serialize on that session's state mutex.
#[derive(Debug, Clone)]
pub struct UploadStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    sessions: RwLock<HashMap<String, UploadSession>>,
    policy: UploadPolicy,
}

impl Default for UploadStore {
    fn default() -> Self {
        Self::new(UploadPolicy::default())
    }
}

impl UploadStore {
    /// Create a store with the given policy.
    #[must_use]
    pub fn new(policy: UploadPolicy) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                sessions: RwLock::new(HashMap::new()),
                policy,
            }),
        }
    }

    /// Per-chunk size ceiling advertised to clients.
    #[must_use]
    pub fn max_chunk_size(&self) -> usize {
        self.inner.policy.max_chunk_size
    }

    /// Open a new pending session for a declared upload.
    ///
    /// Stale sessions are swept opportunistically so abandoned uploads do
    /// not outlive the TTL even without the background sweeper.
    pub fn start_session(
        &self,
        user_id: &str,
        media_type: MediaType,
        content_type: &str,
        analysis_type: AnalysisType,
        declared_size: u64,
    ) -> Result<StartedUpload, ApiError> {
        media::validate_size(media_type, declared_size)?;

        self.expire_stale(Utc::now(), self.inner.policy.session_ttl);

        let session = UploadSession::new(
            user_id.to_string(),
            media_type,
            content_type.to_string(),
            analysis_type,
            declared_size,
        );
        let session_id = session.id().to_string();

        let mut sessions = self.write_sessions();
        sessions.insert(session_id.clone(), session);

        Ok(StartedUpload {
            session_id,
            max_chunk_size: self.inner.policy.max_chunk_size,
        })
    }

    /// Admit one chunk for `session_id`.
    pub fn submit_chunk(
        &self,
        session_id: &str,
        chunk_index: u32,
        total_chunks: u32,
        bytes: Vec<u8>,
    ) -> Result<ChunkOutcome, ApiError> {
        let session = {
            let sessions = self.read_sessions();
            sessions.get(session_id).cloned()
        }
        .ok_or_else(|| {
            ApiError::NotFound(format!("Upload session not found: {session_id}"))
        })?;

        let outcome = session.admit_chunk(
            chunk_index,
            total_chunks,
            bytes,
            self.inner.policy.max_chunk_size,
        );

        // A poisoned session is removed so later chunks answer NotFound.
        if outcome.is_err() && session.status() == SessionStatus::Failed {
            self.write_sessions().remove(session_id);
        }

        outcome
    }

    /// Take the reassembled payload of a complete session, consuming it.
    ///
    /// At most one caller ever receives the payload; the session is removed
    /// from the store under the same write lock that validates its state.
    /// A session that is absent (including one already consumed) counts as
    /// non-complete and answers `StateError`.
    pub fn take_completed_payload(&self, session_id: &str) -> Result<CompletedUpload, ApiError> {
        let mut sessions = self.write_sessions();

        let Some(session) = sessions.get(session_id) else {
            return Err(ApiError::State(format!(
                "Upload session {session_id} is not complete"
            )));
        };

        if session.status() != SessionStatus::Complete {
            return Err(ApiError::State(format!(
                "Upload session {session_id} is not complete"
            )));
        }

        let session = sessions
            .remove(session_id)
            .expect("session present under write lock");
        let payload = session.lock_state().payload.take().unwrap_or_default();

        Ok(CompletedUpload {
            user_id: session.inner.user_id.clone(),
            media_type: session.inner.media_type,
            content_type: session.inner.content_type.clone(),
            analysis_type: session.inner.analysis_type,
            payload,
        })
    }

    /// Remove pending sessions older than `ttl` at instant `now`.
    ///
    /// Returns the number of sessions reclaimed.
    pub fn expire_stale(&self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let mut sessions = self.write_sessions();
        let before = sessions.len();
        sessions.retain(|_, session| {
            let mut state = session.lock_state();
            if state.status == SessionStatus::Pending && session.is_stale(now, ttl) {
                state.status = SessionStatus::Expired;
                false
            } else {
                true
            }
        });
        before - sessions.len()
    }

    /// Sweep with the configured TTL.
    pub fn sweep(&self) -> usize {
        self.expire_stale(Utc::now(), self.inner.policy.session_ttl)
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_sessions().len()
    }

    /// Whether the store holds no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_sessions(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, UploadSession>> {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_sessions(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, UploadSession>> {
        self.inner
            .sessions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
