//! Application services built on the ports.

mod ledger;

pub use ledger::{QuotaLedger, principal_fingerprint};
