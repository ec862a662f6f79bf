//! Hive media analysis backend.
//!
//! A beekeeping assistant service: chat messages and hive media
//! (images/video) go in, AI-generated analysis text comes out. Large media
//! travels over a chunked upload protocol whose sessions are tracked
//! in-process and handed to the vision collaborator on completion.
//!
//! # Architecture
//!
//! - **Server**: Axum-based HTTP transport translating typed failures into
//!   the wire error envelope
//! - **Upload sessions**: in-memory chunk reassembly with per-session
//!   serialization and TTL-based reclamation
//! - **Analysis dispatch**: prompt selection per analysis lens, result
//!   shaping, no retries
//! - **Vision collaborator**: Gemini `generateContent` driver behind an
//!   object-safe trait
//!
//! # Modules
//!
//! - [`upload`]: chunked upload session store
//! - [`analysis`]: analysis-type lenses and dispatch
//! - [`vision`]: external AI collaborator
//! - [`media`]: media types and validation rules
//! - [`ratelimit`]: per-user rolling-window budgets

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::default_trait_access)]
#![allow(clippy::unused_async)]

pub mod analysis;
pub mod config;
pub mod error;
pub mod media;
pub mod ratelimit;
pub mod security;
pub mod server;
pub mod upload;
pub mod vision;

use std::sync::Arc;

use crate::analysis::AnalysisDispatcher;
use crate::config::AppConfig;
use crate::ratelimit::UsageLimiter;
use crate::upload::UploadStore;
use crate::vision::VisionModel;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live chunked upload sessions.
    pub uploads: UploadStore,
    /// Per-user usage budgets.
    pub limiter: Arc<UsageLimiter>,
    /// Analysis dispatch over the vision collaborator.
    pub dispatcher: AnalysisDispatcher,
    /// Global configuration.
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Assemble state from configuration and a vision collaborator.
    #[must_use]
    pub fn new(config: Arc<AppConfig>, vision: Arc<dyn VisionModel>) -> Self {
        Self {
            uploads: UploadStore::new(config.upload.policy()),
            limiter: Arc::new(UsageLimiter::new(config.limits.policy())),
            dispatcher: AnalysisDispatcher::new(vision),
            config,
        }
    }
}
