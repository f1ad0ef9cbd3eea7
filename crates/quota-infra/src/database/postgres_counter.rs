//! PostgreSQL counter store.

use async_trait::async_trait;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, Condition, DbConn, DbErr, EntityTrait, QueryFilter, TransactionTrait,
};

use quota_core::domain::{CounterKey, QuotaCounter};
use quota_core::ports::{CasOutcome, CounterStore, CounterStoreError, CounterWrite};

use super::entity::quota_counter::{self, Column, Entity as CounterEntity};

/// PostgreSQL counter store.
///
/// Compare-and-swap runs in one transaction: absent buckets are inserted with
/// `ON CONFLICT DO NOTHING`, present ones updated with `WHERE count = expected`.
/// A zero-row result anywhere rolls the whole batch back.
pub struct PostgresCounterStore {
    db: DbConn,
}

impl PostgresCounterStore {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }
}

fn key_condition(key: &CounterKey) -> Condition {
    Condition::all()
        .add(Column::PrincipalId.eq(key.principal_id.as_str()))
        .add(Column::Scope.eq(key.scope.as_str()))
        .add(Column::WindowKind.eq(key.window_kind.as_str()))
        .add(Column::WindowKey.eq(key.window_key.as_str()))
}

fn db_err(e: DbErr) -> CounterStoreError {
    match e {
        DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => CounterStoreError::Connection(e.to_string()),
        _ => CounterStoreError::Operation(e.to_string()),
    }
}

#[async_trait]
impl CounterStore for PostgresCounterStore {
    async fn load(
        &self,
        keys: &[CounterKey],
    ) -> Result<Vec<Option<QuotaCounter>>, CounterStoreError> {
        let condition = keys
            .iter()
            .fold(Condition::any(), |cond, key| cond.add(key_condition(key)));

        let rows = CounterEntity::find()
            .filter(condition)
            .all(&self.db)
            .await
            .map_err(db_err)?;

        let counters = rows
            .into_iter()
            .map(QuotaCounter::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(keys
            .iter()
            .map(|key| counters.iter().find(|c| &c.key == key).cloned())
            .collect())
    }

    async fn compare_and_swap(
        &self,
        writes: &[CounterWrite],
    ) -> Result<CasOutcome, CounterStoreError> {
        let txn = self.db.begin().await.map_err(db_err)?;

        for write in writes {
            let counter = &write.counter;
            let rows = match write.expected {
                None => {
                    let model: quota_counter::ActiveModel = counter.clone().into();
                    CounterEntity::insert(model)
                        .on_conflict(
                            OnConflict::columns([
                                Column::PrincipalId,
                                Column::Scope,
                                Column::WindowKind,
                                Column::WindowKey,
                            ])
                            .do_nothing()
                            .to_owned(),
                        )
                        .exec_without_returning(&txn)
                        .await
                        .map_err(db_err)?
                }
                Some(expected) => {
                    CounterEntity::update_many()
                        .col_expr(Column::Count, Expr::value(counter.count as i64))
                        .col_expr(
                            Column::UpdatedAt,
                            Expr::value(counter.updated_at.fixed_offset()),
                        )
                        .filter(key_condition(&counter.key))
                        .filter(Column::Count.eq(expected as i64))
                        .exec(&txn)
                        .await
                        .map_err(db_err)?
                        .rows_affected
                }
            };

            if rows == 0 {
                tracing::debug!(
                    window = %counter.key.window_kind,
                    window_key = %counter.key.window_key,
                    "Quota bucket changed underneath us, rolling back"
                );
                txn.rollback().await.map_err(db_err)?;
                return Ok(CasOutcome::Conflict);
            }
        }

        txn.commit().await.map_err(db_err)?;
        Ok(CasOutcome::Committed)
    }
}
