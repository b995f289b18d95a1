//! Typed error hierarchy for the Storytime core.
//!
//! Callers split failures into two groups:
//! - caller-recoverable: `Validation`, `ConcurrencyConflict`, `NotFound`
//! - operational: `Storage`, `AllocationExhausted`, `InvariantViolation`
//!
//! Only `Storage` is safe to retry blindly. A conflict means the caller's view
//! of the story is stale and must be re-fetched before anything is resubmitted.

use storytime_common::{AuthorNotFound, SanitizeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoryError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Story {story_id} has moved on since part {submitted} was issued")]
    ConcurrencyConflict { story_id: String, submitted: String },

    #[error("Story {story_id} not found")]
    NotFound { story_id: String },

    #[error("Storage error: {0}")]
    Storage(#[source] anyhow::Error),

    #[error("Could not allocate a {kind} key after {attempts} attempts: {last_cause}")]
    AllocationExhausted {
        kind: &'static str,
        attempts: usize,
        last_cause: String,
    },

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
}

impl StoryError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(anyhow::anyhow!(msg.into()))
    }

    /// Expected outcomes the caller can act on (fix input, re-fetch, 404).
    pub fn is_caller_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::ConcurrencyConflict { .. } | Self::NotFound { .. }
        )
    }

    /// Whether re-running the whole logical operation from scratch may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl From<rusqlite::Error> for StoryError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.into())
    }
}

impl From<serde_json::Error> for StoryError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(anyhow::Error::new(e).context("Failed to decode stored JSON"))
    }
}

impl From<SanitizeError> for StoryError {
    fn from(e: SanitizeError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<AuthorNotFound> for StoryError {
    fn from(e: AuthorNotFound) -> Self {
        Self::InvariantViolation(e.to_string())
    }
}

pub type StoryResult<T> = Result<T, StoryError>;
