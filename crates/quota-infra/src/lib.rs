//! # Quota Infrastructure
//!
//! Concrete implementations of the ports defined in `quota-core`.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external dependencies, in-memory and file stores only
//! - `postgres` - PostgreSQL counter store via SeaORM
//! - `auth` - JWT token verification
//! - `redis` - Redis counter store

pub mod counter;
pub mod database;
pub mod local;

#[cfg(feature = "auth")]
pub mod auth;

// Re-exports - always available
pub use counter::InMemoryCounterStore;
pub use database::DatabaseConfig;
pub use local::{FileLocalStore, InMemoryLocalStore};

#[cfg(feature = "auth")]
pub use auth::{JwtConfig, JwtTokenService};

#[cfg(feature = "postgres")]
pub use counter::PostgresCounterStore;

#[cfg(feature = "redis")]
pub use counter::{RedisConfig, RedisCounterStore, RedisCounterStoreConfig};
