//! Role-derived limits and their global overrides.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QuotaError;

/// Roles that may call the guarded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// Most privileged recognized role in `roles`, if any.
    pub fn highest<S: AsRef<str>>(roles: &[S]) -> Option<Role> {
        roles.iter().filter_map(|r| r.as_ref().parse().ok()).max()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = QuotaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "superadmin" | "super_admin" | "owner" => Ok(Role::SuperAdmin),
            other => Err(QuotaError::InvalidRequest(format!("unknown role: {other}"))),
        }
    }
}

/// Per-day and per-minute ceilings for one principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleLimits {
    pub per_day: u64,
    pub per_minute: u64,
}

/// Quota settings, read once at startup and injected into the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaConfig {
    /// Replaces the per-day limit of every role when set.
    pub per_day_override: Option<u64>,
    /// Replaces the per-minute limit of every role when set.
    pub per_minute_override: Option<u64>,
    /// Upper bound on load/compare-and-swap rounds before giving up.
    pub max_attempts: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            per_day_override: None,
            per_minute_override: None,
            max_attempts: 32,
        }
    }
}

impl QuotaConfig {
    /// Load configuration from `QUOTA_PER_DAY`, `QUOTA_PER_MINUTE` and `QUOTA_MAX_ATTEMPTS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`QuotaConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let numeric = |name: &str| {
            let raw = lookup(name)?;
            match raw.trim().parse::<u64>() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(variable = name, value = %raw, "Ignoring non-numeric quota override");
                    None
                }
            }
        };

        let max_attempts = numeric("QUOTA_MAX_ATTEMPTS")
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(32);

        Self {
            per_day_override: numeric("QUOTA_PER_DAY"),
            per_minute_override: numeric("QUOTA_PER_MINUTE"),
            max_attempts,
        }
    }
}

/// Maps a role to its limits.
///
/// Defaults are per role, overrides are global: a configured per-day value
/// applies to every role alike, and likewise for per-minute.
#[derive(Debug, Clone, Default)]
pub struct RoleLimitPolicy {
    config: QuotaConfig,
}

impl RoleLimitPolicy {
    pub const USER: RoleLimits = RoleLimits {
        per_day: 60,
        per_minute: 6,
    };
    pub const ADMIN: RoleLimits = RoleLimits {
        per_day: 200,
        per_minute: 20,
    };
    pub const ELEVATED: RoleLimits = RoleLimits {
        per_day: 500,
        per_minute: 60,
    };

    pub fn new(config: QuotaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    /// Compiled-in limits for `role`, before overrides.
    pub fn defaults(role: Role) -> RoleLimits {
        match role {
            Role::User => Self::USER,
            Role::Admin => Self::ADMIN,
            Role::SuperAdmin => Self::ELEVATED,
        }
    }

    pub fn resolve(&self, role: Role) -> RoleLimits {
        let defaults = Self::defaults(role);
        RoleLimits {
            per_day: self.config.per_day_override.unwrap_or(defaults.per_day),
            per_minute: self
                .config
                .per_minute_override
                .unwrap_or(defaults.per_minute),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> QuotaConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        QuotaConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_role_defaults() {
        let policy = RoleLimitPolicy::default();
        assert_eq!(
            policy.resolve(Role::User),
            RoleLimits {
                per_day: 60,
                per_minute: 6
            }
        );
        assert_eq!(
            policy.resolve(Role::Admin),
            RoleLimits {
                per_day: 200,
                per_minute: 20
            }
        );
        assert_eq!(
            policy.resolve(Role::SuperAdmin),
            RoleLimits {
                per_day: 500,
                per_minute: 60
            }
        );
    }

    #[test]
    fn test_override_applies_to_every_role() {
        let policy = RoleLimitPolicy::new(config_from(&[("QUOTA_PER_DAY", "1000")]));

        for role in [Role::User, Role::Admin, Role::SuperAdmin] {
            let limits = policy.resolve(role);
            assert_eq!(limits.per_day, 1000);
            assert_eq!(limits.per_minute, RoleLimitPolicy::defaults(role).per_minute);
        }
    }

    #[test]
    fn test_non_numeric_override_is_ignored() {
        let config = config_from(&[("QUOTA_PER_DAY", "lots"), ("QUOTA_PER_MINUTE", "-3")]);
        assert_eq!(config.per_day_override, None);
        assert_eq!(config.per_minute_override, None);
        assert_eq!(config.max_attempts, 32);
    }

    #[test]
    fn test_parse_roles() {
        assert_eq!("User".parse::<Role>().unwrap(), Role::User);
        assert_eq!("owner".parse::<Role>().unwrap(), Role::SuperAdmin);
        assert!(matches!(
            "guest".parse::<Role>(),
            Err(QuotaError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_highest_role_wins() {
        let roles = vec!["user".to_string(), "editor".to_string(), "admin".to_string()];
        assert_eq!(Role::highest(&roles), Some(Role::Admin));
        assert_eq!(Role::highest(&["guest"]), None);
    }
}
