//! # Quota Client
//!
//! Calls the quota server on behalf of a guarded operation. A local
//! [`ClientRateGauge`](quota_core::ClientRateGauge) throttles obvious overruns
//! before any request is sent; the server stays authoritative.

mod client;
mod error;

pub use client::{QuotaClient, QuotaClientConfig};
pub use error::ClientError;
