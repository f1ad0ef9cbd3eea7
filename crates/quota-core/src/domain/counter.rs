use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Granularity of a quota bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    Day,
    Minute,
}

impl WindowKind {
    /// Stable short code used in storage keys and columns.
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowKind::Day => "day",
            WindowKind::Minute => "minute",
        }
    }

    /// Deterministic bucket key for the UTC instant `now`.
    ///
    /// `YYYYMMDD` for days, `YYYYMMDDHHmm` for minutes. The instant is always
    /// converted to UTC first, so the caller's timezone never leaks into a key.
    pub fn key_for<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> String {
        let utc = now.with_timezone(&Utc);
        match self {
            WindowKind::Day => utc.format("%Y%m%d").to_string(),
            WindowKind::Minute => utc.format("%Y%m%d%H%M").to_string(),
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WindowKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(WindowKind::Day),
            "minute" => Ok(WindowKind::Minute),
            other => Err(format!("unknown window kind: {other}")),
        }
    }
}

/// Day bucket key for `now`.
pub fn day_key<Tz: TimeZone>(now: &DateTime<Tz>) -> String {
    WindowKind::Day.key_for(now)
}

/// Minute bucket key for `now`.
pub fn minute_key<Tz: TimeZone>(now: &DateTime<Tz>) -> String {
    WindowKind::Minute.key_for(now)
}

/// Identity of a single bucket. At most one counter exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CounterKey {
    pub principal_id: String,
    pub scope: String,
    pub window_kind: WindowKind,
    pub window_key: String,
}

impl CounterKey {
    pub fn new(
        principal_id: impl Into<String>,
        scope: impl Into<String>,
        window_kind: WindowKind,
        window_key: impl Into<String>,
    ) -> Self {
        Self {
            principal_id: principal_id.into(),
            scope: scope.into(),
            window_kind,
            window_key: window_key.into(),
        }
    }
}

/// Usage recorded within one bucket for one principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaCounter {
    pub key: CounterKey,
    pub count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QuotaCounter {
    /// A fresh bucket as seen before its first write.
    pub fn empty(key: CounterKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Next state after one more recorded call. `created_at` is preserved.
    pub fn incremented(&self, now: DateTime<Utc>) -> Self {
        Self {
            key: self.key.clone(),
            count: self.count + 1,
            created_at: self.created_at,
            updated_at: now,
        }
    }
}

/// Usage of one window as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowUsage {
    pub used: u64,
    pub limit: u64,
    pub remaining: u64,
}

impl WindowUsage {
    pub fn new(used: u64, limit: u64) -> Self {
        Self {
            used,
            limit,
            remaining: limit.saturating_sub(used),
        }
    }
}

/// Both windows after an enforcement call (or a read-only peek).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub day: WindowUsage,
    pub minute: WindowUsage,
    pub day_key: String,
    pub minute_key: String,
}
