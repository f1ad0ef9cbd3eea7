//! Domain types - buckets, snapshots and role limits.

mod counter;
mod policy;

pub use counter::{
    CounterKey, QuotaCounter, QuotaSnapshot, WindowKind, WindowUsage, day_key, minute_key,
};
pub use policy::{QuotaConfig, Role, RoleLimitPolicy, RoleLimits};
