//! Chunked upload session management.
//!
//! This module provides in-memory tracking for chunked media uploads.
//! A session is created with a declared size, fed indexed chunks in any
//! order, and reassembled into the original payload once every index in
//! `[0, total_chunks)` has arrived. Completed payloads are handed off to
//! exactly one consumer.
//!
//! # Architecture
//!
//! - [`UploadSession`]: one in-progress chunked upload
//! - [`UploadStore`]: thread-safe store for all live sessions
//!
//! # Example
//!
//! ```rust
//! use hive_analysis::analysis::AnalysisType;
//! use hive_analysis::media::MediaType;
//! use hive_analysis::upload::{ChunkOutcome, UploadPolicy, UploadStore};
//!
//! let store = UploadStore::new(UploadPolicy::default());
//! let started = store
//!     .start_session("beekeeper-1", MediaType::Image, "image/png", AnalysisType::General, 4)
//!     .unwrap();
//!
//! // Chunks may arrive in any order.
//! store.submit_chunk(&started.session_id, 1, 2, b"zz".to_vec()).unwrap();
//! let outcome = store.submit_chunk(&started.session_id, 0, 2, b"aa".to_vec()).unwrap();
//! assert_eq!(outcome, ChunkOutcome::Complete);
//!
//! let completed = store.take_completed_payload(&started.session_id).unwrap();
//! assert_eq!(completed.payload, b"aazz");
//! ```

mod session;

pub use session::{
    ChunkOutcome, CompletedUpload, SessionStatus, StartedUpload, UploadPolicy, UploadSession,
    UploadStore,
};
