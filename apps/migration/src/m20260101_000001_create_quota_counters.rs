use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(QuotaCounters::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(QuotaCounters::PrincipalId).string().not_null())
                    .col(ColumnDef::new(QuotaCounters::Scope).string_len(128).not_null())
                    .col(ColumnDef::new(QuotaCounters::WindowKind).string_len(16).not_null())
                    .col(ColumnDef::new(QuotaCounters::WindowKey).string_len(12).not_null())
                    .col(
                        ColumnDef::new(QuotaCounters::Count)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(QuotaCounters::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(QuotaCounters::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(QuotaCounters::PrincipalId)
                            .col(QuotaCounters::Scope)
                            .col(QuotaCounters::WindowKind)
                            .col(QuotaCounters::WindowKey),
                    )
                    .to_owned(),
            )
            .await?;

        // Supports sweeping stale buckets by age.
        manager
            .create_index(
                Index::create()
                    .name("idx_quota_counters_updated_at")
                    .table(QuotaCounters::Table)
                    .col(QuotaCounters::UpdatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(QuotaCounters::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum QuotaCounters {
    Table,
    PrincipalId,
    Scope,
    WindowKind,
    WindowKey,
    Count,
    CreatedAt,
    UpdatedAt,
}
