//! Per-user rolling-window usage budgets.
//!
//! Two budgets per `user_id`: analysis calls per trailing window and upload
//! bytes per trailing window. Checks are read-only; admission is recorded
//! separately by the caller once the operation is accepted, so a rejected
//! request never consumes budget.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::ApiError;

/// Budget policy applied to every user.
#[derive(Debug, Clone, Copy)]
pub struct UsagePolicy {
    /// Maximum analysis calls inside `call_window`.
    pub max_calls: u32,
    /// Trailing window for the call budget.
    pub call_window: Duration,
    /// Maximum upload bytes inside `volume_window`.
    pub max_upload_bytes: u64,
    /// Trailing window for the volume budget.
    pub volume_window: Duration,
}

impl Default for UsagePolicy {
    fn default() -> Self {
        Self {
            max_calls: 10,
            call_window: Duration::from_secs(60 * 60),
            max_upload_bytes: 100 * 1024 * 1024,
            volume_window: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Default)]
struct UserUsage {
    calls: VecDeque<Instant>,
    uploads: VecDeque<(Instant, u64)>,
}

impl UserUsage {
    fn prune(&mut self, now: Instant, policy: &UsagePolicy) {
        while let Some(&front) = self.calls.front() {
            if now.duration_since(front) >= policy.call_window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
        while let Some(&(front, _)) = self.uploads.front() {
            if now.duration_since(front) >= policy.volume_window {
                self.uploads.pop_front();
            } else {
                break;
            }
        }
    }

    fn upload_total(&self) -> u64 {
        self.uploads.iter().map(|&(_, bytes)| bytes).sum()
    }
}

/// Tracks per-user budgets behind a single mutex.
#[derive(Debug)]
pub struct UsageLimiter {
    state: Mutex<HashMap<String, UserUsage>>,
    policy: UsagePolicy,
}

impl UsageLimiter {
    /// Create a limiter with the given policy.
    #[must_use]
    pub fn new(policy: UsagePolicy) -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
            policy,
        }
    }

    /// Check the call budget for `user_id` without consuming it.
    pub fn check_call(&self, user_id: &str) -> Result<(), ApiError> {
        self.check_call_at(user_id, Instant::now())
    }

    /// Record an admitted call for `user_id`.
    pub fn record_call(&self, user_id: &str) {
        self.record_call_at(user_id, Instant::now());
    }

    /// Check the upload-volume budget for `user_id` without consuming it.
    pub fn check_upload(&self, user_id: &str, bytes: u64) -> Result<(), ApiError> {
        self.check_upload_at(user_id, bytes, Instant::now())
    }

    /// Record admitted upload volume for `user_id`.
    pub fn record_upload(&self, user_id: &str, bytes: u64) {
        self.record_upload_at(user_id, bytes, Instant::now());
    }

    pub(crate) fn check_call_at(&self, user_id: &str, now: Instant) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let usage = state.entry(user_id.to_string()).or_default();
        usage.prune(now, &self.policy);
        if usage.calls.len() as u32 >= self.policy.max_calls {
            return Err(ApiError::RateLimited(
                "Rate limit exceeded. Please try again later.".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn record_call_at(&self, user_id: &str, now: Instant) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let usage = state.entry(user_id.to_string()).or_default();
        usage.prune(now, &self.policy);
        usage.calls.push_back(now);
    }

    pub(crate) fn check_upload_at(
        &self,
        user_id: &str,
        bytes: u64,
        now: Instant,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let usage = state.entry(user_id.to_string()).or_default();
        usage.prune(now, &self.policy);
        if usage.upload_total().saturating_add(bytes) > self.policy.max_upload_bytes {
            return Err(ApiError::RateLimited(
                "Upload volume limit exceeded. Please try again later.".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn record_upload_at(&self, user_id: &str, bytes: u64, now: Instant) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let usage = state.entry(user_id.to_string()).or_default();
        usage.prune(now, &self.policy);
        usage.uploads.push_back((now, bytes));
    }
}
