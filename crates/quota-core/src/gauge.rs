//! Client-side predictive rate gauge.
//!
//! Advisory only: the gauge smooths the UI by predicting when the server will
//! reject, without a round trip. The ledger stays authoritative, so every
//! storage failure here fails open.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ports::{LocalStore, LocalStoreExt};

/// Local ceiling, independent of the role-based server limit.
pub const MAX_CALLS_PER_MINUTE: usize = 15;
/// Width of the sliding window in milliseconds.
pub const WINDOW_MS: i64 = 60_000;
/// How long a server rejection suppresses further attempts.
pub const COOLDOWN_MS: i64 = 60_000;
/// Remaining capacity at or above which the gauge reports `High`.
pub const HIGH_WATERMARK: usize = 10;

const CALL_HISTORY_KEY: &str = "call_history";
const COOLDOWN_UNTIL_KEY: &str = "cooldown_until";

/// Coarse capacity level for UI affordances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GaugeStatus {
    High,
    Low,
    Cooldown,
    Empty,
}

/// Everything a caller needs to decide whether to offer the guarded action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advice {
    pub allowed: bool,
    pub remaining: usize,
    pub status: GaugeStatus,
    pub cooldown_secs: u64,
}

/// Persisted gauge state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientGaugeState {
    /// Call timestamps in epoch millis, oldest first.
    pub call_history: Vec<i64>,
    /// While `now < cooldown_until` the gauge reports no capacity.
    pub cooldown_until: Option<i64>,
}

impl ClientGaugeState {
    fn in_cooldown(&self, now_ms: i64) -> bool {
        self.cooldown_until.is_some_and(|until| now_ms < until)
    }

    /// Drop timestamps outside the window. Returns true if anything was removed.
    ///
    /// Entries more than a window in the future are dropped too. This is a
    /// deliberate clock-skew rule: after the clock jumps backwards, such
    /// entries would otherwise count against the budget until real time
    /// caught up with them.
    fn prune(&mut self, now_ms: i64) -> bool {
        let before = self.call_history.len();
        self.call_history.retain(|&ts| {
            let age = now_ms - ts;
            age < WINDOW_MS && age > -WINDOW_MS
        });
        self.call_history.len() != before
    }
}

/// Sliding-window call log plus an explicit cooldown deadline.
pub struct ClientRateGauge {
    store: Arc<dyn LocalStore>,
}

impl ClientRateGauge {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Predicted calls left in the current window.
    pub fn remaining_calls(&self, now_ms: i64) -> usize {
        let mut state = self.load();
        if state.in_cooldown(now_ms) {
            return 0;
        }
        if state.prune(now_ms) {
            self.persist_history(&state.call_history);
        }
        MAX_CALLS_PER_MINUTE.saturating_sub(state.call_history.len())
    }

    /// Log an attempted call.
    pub fn record_call(&self, now_ms: i64) {
        let mut history = self.load().call_history;
        history.push(now_ms);
        self.persist_history(&history);
    }

    /// Suppress attempts for a full window after a server rejection.
    pub fn trigger_cooldown(&self, now_ms: i64) {
        let until = now_ms + COOLDOWN_MS;
        if let Err(e) = self.store.set(COOLDOWN_UNTIL_KEY, &until) {
            tracing::debug!(error = %e, "Failed to persist gauge cooldown");
        }
    }

    pub fn status(&self, now_ms: i64) -> GaugeStatus {
        if self.load().in_cooldown(now_ms) {
            return GaugeStatus::Cooldown;
        }
        match self.remaining_calls(now_ms) {
            0 => GaugeStatus::Empty,
            n if n >= HIGH_WATERMARK => GaugeStatus::High,
            _ => GaugeStatus::Low,
        }
    }

    /// Whole seconds left in the cooldown, rounded up. Zero when not cooling down.
    pub fn cooldown_remaining_seconds(&self, now_ms: i64) -> u64 {
        match self.load().cooldown_until {
            Some(until) if now_ms < until => {
                let millis = u64::try_from(until - now_ms).unwrap_or(0);
                millis.div_ceil(1000)
            }
            _ => 0,
        }
    }

    /// Read-only advice for the current instant.
    pub fn check_and_advise(&self, now_ms: i64) -> Advice {
        let remaining = self.remaining_calls(now_ms);
        let status = self.status(now_ms);
        Advice {
            allowed: remaining > 0,
            remaining,
            status,
            cooldown_secs: self.cooldown_remaining_seconds(now_ms),
        }
    }

    /// Current persisted state. Missing or unreadable entries read as empty.
    pub fn load(&self) -> ClientGaugeState {
        let call_history = self
            .store
            .get::<Vec<i64>>(CALL_HISTORY_KEY)
            .unwrap_or_else(|e| {
                tracing::debug!(error = %e, "Discarding unreadable gauge history");
                None
            })
            .unwrap_or_default();
        let cooldown_until = self
            .store
            .get::<i64>(COOLDOWN_UNTIL_KEY)
            .unwrap_or_else(|e| {
                tracing::debug!(error = %e, "Discarding unreadable gauge cooldown");
                None
            });

        ClientGaugeState {
            call_history,
            cooldown_until,
        }
    }

    fn persist_history(&self, history: &[i64]) {
        if let Err(e) = self.store.set(CALL_HISTORY_KEY, &history) {
            tracing::debug!(error = %e, "Failed to persist gauge history");
        }
    }
}
