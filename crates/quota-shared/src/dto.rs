//! Data Transfer Objects - request/response types for the enforcement API.

use serde::{Deserialize, Serialize};

/// Request to record one guarded call.
///
/// Only the scope is caller-supplied; principal and role come from the bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnforceRequest {
    pub scope: String,
}

/// Query string of the read-only usage endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageQuery {
    pub scope: String,
}

/// Usage of both windows after a successful enforcement call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaUsageResponse {
    pub used_day: u64,
    pub limit_day: u64,
    pub remaining_day: u64,
    pub used_minute: u64,
    pub limit_minute: u64,
    pub remaining_minute: u64,
    pub day_key: String,
    pub minute_key: String,
}
