//! Pipeline error taxonomy.
//!
//! Library code returns [`PipelineError`] so callers can tell retryable
//! failures apart from fatal ones; the CLI wraps everything in `anyhow`.
//! Extraction yielding no text is deliberately *not* an error; it is the
//! [`IngestOutcome::Empty`](crate::models::IngestOutcome) no-op path.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The embedding backend could not be reached or refused the call.
    /// Fatal for the current call; the orchestrator retries per segment.
    /// There is no fallback to a different model; mixed-dimensionality
    /// vectors in one index would corrupt similarity search.
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// A single record write failed. Retryable per segment with bounded
    /// attempts, after which the segment is marked failed.
    #[error("index write failed: {0}")]
    IndexWrite(#[source] sqlx::Error),

    /// The index store itself cannot be reached. Fatal for the current
    /// query or write batch; surfaced to the caller.
    #[error("index unavailable: {0}")]
    IndexUnavailable(#[source] sqlx::Error),
}

impl PipelineError {
    /// Whether the per-segment retry loop should attempt this error again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::ModelUnavailable(_) | PipelineError::IndexWrite(_)
        )
    }
}
