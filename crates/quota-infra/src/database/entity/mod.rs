//! SeaORM entities.

pub mod quota_counter;
