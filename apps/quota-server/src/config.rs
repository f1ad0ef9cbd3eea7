//! Application configuration loaded from environment variables.

use std::env;
use std::io;
use std::str::FromStr;

use quota_core::domain::QuotaConfig;
use quota_infra::DatabaseConfig;

/// Which counter store backs the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis,
    Postgres,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Redis => "redis",
            StoreBackend::Postgres => "postgres",
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            "redis" => Ok(StoreBackend::Redis),
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            other => Err(format!("unknown counter store: {other}")),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreBackend,
    pub quota: QuotaConfig,
    pub database: Option<DatabaseConfig>,
    /// Apply pending migrations before serving when using Postgres.
    pub auto_migrate: bool,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// An unrecognized `QUOTA_STORE` is an error rather than a silent switch to memory.
    pub fn from_env() -> io::Result<Self> {
        let store = store_backend(env::var("QUOTA_STORE").ok().as_deref())?;

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            store,
            quota: QuotaConfig::from_env(),
            database: DatabaseConfig::from_env(),
            auto_migrate: env::var("DB_AUTO_MIGRATE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }
}

/// Memory when unset, otherwise the named backend.
fn store_backend(value: Option<&str>) -> io::Result<StoreBackend> {
    match value {
        None => Ok(StoreBackend::Memory),
        Some(v) => v.parse().map_err(io::Error::other),
    }
}
