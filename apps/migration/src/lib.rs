//! Schema migrations for the quota database.

pub use sea_orm_migration::prelude::*;

mod m20260101_000001_create_quota_counters;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20260101_000001_create_quota_counters::Migration)]
    }
}
