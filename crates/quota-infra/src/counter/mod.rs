//! Counter store implementations - in-memory, Redis and PostgreSQL.

mod memory;

pub use memory::InMemoryCounterStore;

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::{RedisConfig, RedisCounterStore, RedisCounterStoreConfig};

#[cfg(feature = "postgres")]
pub use crate::database::PostgresCounterStore;
