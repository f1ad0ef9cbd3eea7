//! Quota enforcement error types.

use chrono::{DateTime, Duration, Timelike, Utc};
use thiserror::Error;

use crate::domain::WindowKind;

/// Structured enforcement failures, surfaced verbatim to the guarded-operation handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuotaError {
    /// The per-minute ceiling would be exceeded.
    #[error("Rate limited: {used}/{limit} calls used in the current {window}")]
    RateLimited {
        window: WindowKind,
        limit: u64,
        used: u64,
    },

    /// The per-day ceiling would be exceeded.
    #[error("Quota exceeded: {used}/{limit} calls used in the current {window}")]
    QuotaExceeded {
        window: WindowKind,
        limit: u64,
        used: u64,
    },

    /// The counter store could not complete the atomic increment.
    #[error("Quota store unavailable: {0}")]
    Unavailable(String),

    /// Malformed principal, role or scope.
    #[error("Invalid quota request: {0}")]
    InvalidRequest(String),
}

impl QuotaError {
    /// Stable identifier of the error kind on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            QuotaError::RateLimited { .. } => "RateLimited",
            QuotaError::QuotaExceeded { .. } => "QuotaExceeded",
            QuotaError::Unavailable(_) => "Unavailable",
            QuotaError::InvalidRequest(_) => "InvalidRequest",
        }
    }

    /// True for limit rejections, as opposed to infrastructure or caller errors.
    pub fn is_limit(&self) -> bool {
        matches!(
            self,
            QuotaError::RateLimited { .. } | QuotaError::QuotaExceeded { .. }
        )
    }

    /// Seconds until the rejecting window rolls over.
    ///
    /// `RateLimited` waits for the next UTC minute, `QuotaExceeded` for the next UTC day.
    pub fn retry_after(&self, now: DateTime<Utc>) -> Option<u64> {
        match self {
            QuotaError::RateLimited { .. } => Some(60 - u64::from(now.second())),
            QuotaError::QuotaExceeded { .. } => {
                let midnight = (now.date_naive() + Duration::days(1)).and_hms_opt(0, 0, 0)?;
                let secs = (midnight.and_utc() - now).num_seconds().max(1);
                u64::try_from(secs).ok()
            }
            QuotaError::Unavailable(_) | QuotaError::InvalidRequest(_) => None,
        }
    }
}
