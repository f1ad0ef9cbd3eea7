//! # Quota Core
//!
//! The domain layer of the quota service: role limits, window keys, the
//! server-authoritative [`QuotaLedger`] and the advisory [`ClientRateGauge`].
//! This crate performs no I/O; storage lives behind the traits in [`ports`].

pub mod domain;
pub mod error;
pub mod gauge;
pub mod ports;
pub mod services;

pub use error::QuotaError;
pub use gauge::{Advice, ClientRateGauge, GaugeStatus};
pub use services::QuotaLedger;
