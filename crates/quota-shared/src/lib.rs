//! # Quota Shared
//!
//! Wire types shared between the quota server and its clients.

pub mod dto;
pub mod response;

pub use response::{ErrorResponse, QuotaProblem};
