//! Server-authoritative quota ledger.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::domain::{
    CounterKey, QuotaConfig, QuotaCounter, QuotaSnapshot, Role, RoleLimitPolicy, RoleLimits,
    WindowKind, WindowUsage,
};
use crate::error::QuotaError;
use crate::ports::{CasOutcome, CounterStore, CounterStoreError, CounterWrite};

const MAX_SCOPE_LEN: usize = 128;

/// Short, non-reversible identifier of a principal for logs.
pub fn principal_fingerprint(principal_id: &str) -> String {
    let digest = Sha256::digest(principal_id.as_bytes());
    hex::encode(&digest[..8])
}

/// Records guarded calls against per-day and per-minute buckets.
///
/// Every call runs a load, check and compare-and-swap round against the store.
/// A lost race reloads and re-checks, so concurrent callers can never push a
/// bucket past its limit. A rejection writes nothing.
pub struct QuotaLedger {
    store: Arc<dyn CounterStore>,
    policy: RoleLimitPolicy,
}

/// Day and minute state read in one round.
struct Buckets {
    day: QuotaCounter,
    day_expected: Option<u64>,
    minute: QuotaCounter,
    minute_expected: Option<u64>,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn CounterStore>, config: QuotaConfig) -> Self {
        Self {
            store,
            policy: RoleLimitPolicy::new(config),
        }
    }

    pub fn policy(&self) -> &RoleLimitPolicy {
        &self.policy
    }

    /// Record one guarded call for `principal_id` in `scope`, or reject it.
    ///
    /// The day limit is checked before the minute limit, so a principal over
    /// both sees `QuotaExceeded`.
    #[tracing::instrument(
        name = "quota.enforce",
        skip_all,
        fields(principal = %principal_fingerprint(principal_id), scope = %scope, role = %role)
    )]
    pub async fn enforce_and_record(
        &self,
        principal_id: &str,
        role: Role,
        scope: &str,
        now: DateTime<Utc>,
    ) -> Result<QuotaSnapshot, QuotaError> {
        if let Err(err) = validate(principal_id, scope) {
            tracing::warn!(kind = err.kind(), error = %err, "Rejected malformed quota request");
            return Err(err);
        }
        let limits = self.policy.resolve(role);
        let max_attempts = self.policy.config().max_attempts;

        for attempt in 1..=max_attempts {
            let buckets = self.load(principal_id, scope, now).await?;

            if buckets.day.count + 1 > limits.per_day {
                let err = QuotaError::QuotaExceeded {
                    window: WindowKind::Day,
                    limit: limits.per_day,
                    used: buckets.day.count,
                };
                tracing::info!(
                    kind = err.kind(),
                    used = buckets.day.count,
                    limit = limits.per_day,
                    "Daily quota exhausted"
                );
                return Err(err);
            }

            if buckets.minute.count + 1 > limits.per_minute {
                let err = QuotaError::RateLimited {
                    window: WindowKind::Minute,
                    limit: limits.per_minute,
                    used: buckets.minute.count,
                };
                tracing::info!(
                    kind = err.kind(),
                    used = buckets.minute.count,
                    limit = limits.per_minute,
                    "Per-minute rate limit hit"
                );
                return Err(err);
            }

            let day = buckets.day.incremented(now);
            let minute = buckets.minute.incremented(now);
            let writes = [
                CounterWrite {
                    expected: buckets.day_expected,
                    counter: day.clone(),
                },
                CounterWrite {
                    expected: buckets.minute_expected,
                    counter: minute.clone(),
                },
            ];

            match self.store.compare_and_swap(&writes).await {
                Ok(CasOutcome::Committed) => {
                    tracing::debug!(
                        attempt,
                        used_day = day.count,
                        used_minute = minute.count,
                        "Quota recorded"
                    );
                    return Ok(snapshot(&day, &minute, limits));
                }
                Ok(CasOutcome::Conflict) => {
                    tracing::debug!(attempt, "Concurrent update on quota bucket, retrying");
                }
                Err(e) => return Err(unavailable(e)),
            }
        }

        tracing::warn!(
            max_attempts,
            kind = "Unavailable",
            "Quota update kept conflicting, rejecting call"
        );
        Err(QuotaError::Unavailable(format!(
            "counter update did not settle after {max_attempts} attempts"
        )))
    }

    /// Current usage without recording anything.
    pub async fn peek(
        &self,
        principal_id: &str,
        role: Role,
        scope: &str,
        now: DateTime<Utc>,
    ) -> Result<QuotaSnapshot, QuotaError> {
        validate(principal_id, scope)?;
        let limits = self.policy.resolve(role);
        let buckets = self.load(principal_id, scope, now).await?;
        Ok(snapshot(&buckets.day, &buckets.minute, limits))
    }

    async fn load(
        &self,
        principal_id: &str,
        scope: &str,
        now: DateTime<Utc>,
    ) -> Result<Buckets, QuotaError> {
        let keys = [
            CounterKey::new(principal_id, scope, WindowKind::Day, WindowKind::Day.key_for(&now)),
            CounterKey::new(
                principal_id,
                scope,
                WindowKind::Minute,
                WindowKind::Minute.key_for(&now),
            ),
        ];

        let mut loaded = self.store.load(&keys).await.map_err(unavailable)?;
        if loaded.len() != keys.len() {
            tracing::warn!(
                expected = keys.len(),
                got = loaded.len(),
                kind = "Unavailable",
                "Counter store returned wrong number of buckets"
            );
            return Err(QuotaError::Unavailable(
                "counter store returned an incomplete read".to_string(),
            ));
        }

        let [day_key, minute_key] = keys;
        let minute = loaded.pop().flatten();
        let day = loaded.pop().flatten();

        Ok(Buckets {
            day_expected: day.as_ref().map(|c| c.count),
            day: day.unwrap_or_else(|| QuotaCounter::empty(day_key, now)),
            minute_expected: minute.as_ref().map(|c| c.count),
            minute: minute.unwrap_or_else(|| QuotaCounter::empty(minute_key, now)),
        })
    }
}

fn validate(principal_id: &str, scope: &str) -> Result<(), QuotaError> {
    if principal_id.trim().is_empty() {
        return Err(QuotaError::InvalidRequest(
            "principal id must not be empty".to_string(),
        ));
    }
    if scope.is_empty() {
        return Err(QuotaError::InvalidRequest("scope must not be empty".to_string()));
    }
    if scope.chars().count() > MAX_SCOPE_LEN {
        return Err(QuotaError::InvalidRequest(format!(
            "scope must be at most {MAX_SCOPE_LEN} characters"
        )));
    }
    if scope
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, ':' | '{' | '}'))
    {
        return Err(QuotaError::InvalidRequest(
            "scope contains reserved characters".to_string(),
        ));
    }
    Ok(())
}

fn snapshot(day: &QuotaCounter, minute: &QuotaCounter, limits: RoleLimits) -> QuotaSnapshot {
    QuotaSnapshot {
        day: WindowUsage::new(day.count, limits.per_day),
        minute: WindowUsage::new(minute.count, limits.per_minute),
        day_key: day.key.window_key.clone(),
        minute_key: minute.key.window_key.clone(),
    }
}

fn unavailable(err: CounterStoreError) -> QuotaError {
    tracing::warn!(error = %err, kind = "Unavailable", "Counter store failure, rejecting call");
    QuotaError::Unavailable(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MockCounterStore;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Minimal CAS store so these tests do not depend on an infrastructure crate.
    #[derive(Default)]
    struct TestStore {
        counters: Mutex<HashMap<CounterKey, QuotaCounter>>,
    }

    #[async_trait]
    impl CounterStore for TestStore {
        async fn load(
            &self,
            keys: &[CounterKey],
        ) -> Result<Vec<Option<QuotaCounter>>, CounterStoreError> {
            let loaded = {
                let counters = self.counters.lock().unwrap();
                keys.iter().map(|k| counters.get(k).cloned()).collect()
            };
            // Widen the gap between read and write so racing tasks interleave.
            tokio::task::yield_now().await;
            Ok(loaded)
        }

        async fn compare_and_swap(
            &self,
            writes: &[CounterWrite],
        ) -> Result<CasOutcome, CounterStoreError> {
            let mut counters = self.counters.lock().unwrap();
            let clean = writes
                .iter()
                .all(|w| counters.get(&w.counter.key).map(|c| c.count) == w.expected);
            if !clean {
                return Ok(CasOutcome::Conflict);
            }
            for w in writes {
                counters.insert(w.counter.key.clone(), w.counter.clone());
            }
            Ok(CasOutcome::Committed)
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, 12, 30, 5).unwrap()
    }

    fn ledger_with(config: QuotaConfig) -> (QuotaLedger, Arc<TestStore>) {
        let store = Arc::new(TestStore::default());
        (QuotaLedger::new(store.clone(), config), store)
    }

    #[tokio::test]
    async fn test_minute_limit_rejects_without_writing() {
        let (ledger, _) = ledger_with(QuotaConfig::default());
        let now = t0();

        for i in 1..=6 {
            let snap = ledger
                .enforce_and_record("user-1", Role::User, "app", now)
                .await
                .unwrap();
            assert_eq!(snap.minute.used, i);
            assert_eq!(snap.minute.remaining, 6 - i);
        }

        for _ in 0..2 {
            let err = ledger
                .enforce_and_record("user-1", Role::User, "app", now)
                .await
                .unwrap_err();
            assert_eq!(
                err,
                QuotaError::RateLimited {
                    window: WindowKind::Minute,
                    limit: 6,
                    used: 6
                }
            );
        }

        let snap = ledger.peek("user-1", Role::User, "app", now).await.unwrap();
        assert_eq!(snap.minute.used, 6);
        assert_eq!(snap.day.used, 6);
    }

    #[tokio::test]
    async fn test_day_limit_wins_over_free_minute() {
        let config = QuotaConfig {
            per_day_override: Some(3),
            ..QuotaConfig::default()
        };
        let (ledger, _) = ledger_with(config);

        for minute in 0..3 {
            let now = t0() + Duration::minutes(minute);
            ledger
                .enforce_and_record("user-1", Role::User, "app", now)
                .await
                .unwrap();
        }

        let later = t0() + Duration::minutes(10);
        let err = ledger
            .enforce_and_record("user-1", Role::User, "app", later)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            QuotaError::QuotaExceeded {
                window: WindowKind::Day,
                limit: 3,
                used: 3
            }
        );

        let snap = ledger.peek("user-1", Role::User, "app", later).await.unwrap();
        assert_eq!(snap.minute.used, 0);
    }

    #[tokio::test]
    async fn test_quota_exceeded_reported_before_rate_limited() {
        let config = QuotaConfig {
            per_day_override: Some(2),
            per_minute_override: Some(2),
            ..QuotaConfig::default()
        };
        let (ledger, _) = ledger_with(config);
        let now = t0();

        for _ in 0..2 {
            ledger
                .enforce_and_record("user-1", Role::Admin, "app", now)
                .await
                .unwrap();
        }

        let err = ledger
            .enforce_and_record("user-1", Role::Admin, "app", now)
            .await
            .unwrap_err();
        assert!(matches!(err, QuotaError::QuotaExceeded { .. }));
    }

    #[tokio::test]
    async fn test_minute_rollover_keeps_day_count() {
        let (ledger, _) = ledger_with(QuotaConfig::default());

        for _ in 0..6 {
            ledger
                .enforce_and_record("user-1", Role::User, "app", t0())
                .await
                .unwrap();
        }
        assert!(
            ledger
                .enforce_and_record("user-1", Role::User, "app", t0())
                .await
                .is_err()
        );

        let next_minute = t0() + Duration::seconds(60);
        let snap = ledger
            .enforce_and_record("user-1", Role::User, "app", next_minute)
            .await
            .unwrap();
        assert_eq!(snap.minute.used, 1);
        assert_eq!(snap.day.used, 7);
        assert_eq!(snap.day_key, "20260615");
        assert_eq!(snap.minute_key, "202606151231");
    }

    #[tokio::test]
    async fn test_principals_and_scopes_are_independent() {
        let (ledger, _) = ledger_with(QuotaConfig::default());
        let now = t0();

        for _ in 0..6 {
            ledger
                .enforce_and_record("user-1", Role::User, "app", now)
                .await
                .unwrap();
        }

        assert!(
            ledger
                .enforce_and_record("user-2", Role::User, "app", now)
                .await
                .is_ok()
        );
        assert!(
            ledger
                .enforce_and_record("user-1", Role::User, "other-app", now)
                .await
                .is_ok()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_never_overgrant() {
        let (ledger, _) = ledger_with(QuotaConfig::default());
        let ledger = Arc::new(ledger);
        let now = t0();
        let per_minute = RoleLimitPolicy::USER.per_minute;

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..per_minute + 5 {
            let ledger = ledger.clone();
            tasks.spawn(async move {
                ledger
                    .enforce_and_record("user-1", Role::User, "app", now)
                    .await
            });
        }

        let mut granted = 0u64;
        let mut limited = 0u64;
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(_) => granted += 1,
                Err(QuotaError::RateLimited { .. }) => limited += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(granted, per_minute);
        assert_eq!(limited, 5);

        let snap = ledger.peek("user-1", Role::User, "app", now).await.unwrap();
        assert_eq!(snap.minute.used, per_minute);
        assert_eq!(snap.day.used, per_minute);
    }

    #[tokio::test]
    async fn test_invalid_requests_are_rejected() {
        let (ledger, store) = ledger_with(QuotaConfig::default());

        let cases = [("", "app"), ("  ", "app"), ("u", ""), ("u", "a b"), ("u", "a:b")];
        for (principal, scope) in cases {
            let err = ledger
                .enforce_and_record(principal, Role::User, scope, t0())
                .await
                .unwrap_err();
            assert!(matches!(err, QuotaError::InvalidRequest(_)));
        }
        assert!(store.counters.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persistent_conflicts_fail_closed() {
        let mut store = MockCounterStore::new();
        store.expect_load().returning(|_| Ok(vec![None, None]));
        store
            .expect_compare_and_swap()
            .times(4)
            .returning(|_| Ok(CasOutcome::Conflict));

        let config = QuotaConfig {
            max_attempts: 4,
            ..QuotaConfig::default()
        };
        let ledger = QuotaLedger::new(Arc::new(store), config);

        let err = ledger
            .enforce_and_record("user-1", Role::User, "app", t0())
            .await
            .unwrap_err();
        assert!(matches!(err, QuotaError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_store_failure_is_unavailable() {
        let mut store = MockCounterStore::new();
        store
            .expect_load()
            .returning(|_| Err(CounterStoreError::Connection("refused".to_string())));
        store.expect_compare_and_swap().never();

        let ledger = QuotaLedger::new(Arc::new(store), QuotaConfig::default());
        let err = ledger
            .enforce_and_record("user-1", Role::User, "app", t0())
            .await
            .unwrap_err();
        assert!(matches!(err, QuotaError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_first_write_expects_absent_buckets() {
        let mut store = MockCounterStore::new();
        store.expect_load().returning(|_| Ok(vec![None, None]));
        store
            .expect_compare_and_swap()
            .withf(|writes| {
                writes.len() == 2
                    && writes.iter().all(|w| w.expected.is_none() && w.counter.count == 1)
                    && writes[0].counter.key.window_kind == WindowKind::Day
                    && writes[1].counter.key.window_kind == WindowKind::Minute
            })
            .times(1)
            .returning(|_| Ok(CasOutcome::Committed));

        let ledger = QuotaLedger::new(Arc::new(store), QuotaConfig::default());
        let snap = ledger
            .enforce_and_record("user-1", Role::User, "app", t0())
            .await
            .unwrap();
        assert_eq!(snap.day.used, 1);
        assert_eq!(snap.minute.remaining, 5);
    }

    #[test]
    fn test_fingerprint_hides_principal() {
        let fp = principal_fingerprint("alice@example.com");
        assert_eq!(fp.len(), 16);
        assert!(!fp.contains("alice"));
        assert_eq!(fp, principal_fingerprint("alice@example.com"));
    }
}
