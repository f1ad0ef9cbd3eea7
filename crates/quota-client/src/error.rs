//! Client error types.

use quota_shared::QuotaProblem;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The local gauge predicts a rejection; nothing was sent.
    #[error("Throttled locally, retry in {cooldown_secs}s")]
    Throttled { cooldown_secs: u64 },

    /// The server refused the call with a quota problem document.
    #[error("Rejected by quota server: {}", .0.kind)]
    Rejected(QuotaProblem),

    /// Non-success response without quota members.
    #[error("Quota server returned {status}: {title}")]
    Status { status: u16, title: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// Seconds the caller should wait before trying again, when known.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ClientError::Throttled { cooldown_secs } => Some(*cooldown_secs),
            ClientError::Rejected(problem) => problem.retry_after_seconds,
            _ => None,
        }
    }
}
