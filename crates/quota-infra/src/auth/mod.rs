//! Token verification for the enforcement API.

mod jwt;

pub use jwt::{JwtConfig, JwtTokenService};
