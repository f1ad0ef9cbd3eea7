//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod auth;
mod counter_store;
mod local_store;

pub use auth::{AuthError, TokenClaims, TokenService};
pub use counter_store::{CasOutcome, CounterStore, CounterStoreError, CounterWrite};
pub use local_store::{LocalStore, LocalStoreError, LocalStoreExt};

#[cfg(test)]
pub use counter_store::MockCounterStore;
