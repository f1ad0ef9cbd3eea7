//! Quota counter entity for SeaORM.

use sea_orm::Set;
use sea_orm::entity::prelude::*;

use quota_core::domain::{CounterKey, QuotaCounter, WindowKind};
use quota_core::ports::CounterStoreError;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "quota_counters")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub principal_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub scope: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub window_kind: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub window_key: String,
    pub count: i64,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Conversion from SeaORM Model to domain QuotaCounter.
impl TryFrom<Model> for QuotaCounter {
    type Error = CounterStoreError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let window_kind: WindowKind = model
            .window_kind
            .parse()
            .map_err(CounterStoreError::Serialization)?;
        let count = u64::try_from(model.count)
            .map_err(|e| CounterStoreError::Serialization(e.to_string()))?;

        Ok(Self {
            key: CounterKey {
                principal_id: model.principal_id,
                scope: model.scope,
                window_kind,
                window_key: model.window_key,
            },
            count,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        })
    }
}

/// Conversion from domain QuotaCounter to SeaORM ActiveModel.
impl From<QuotaCounter> for ActiveModel {
    fn from(counter: QuotaCounter) -> Self {
        Self {
            principal_id: Set(counter.key.principal_id),
            scope: Set(counter.key.scope),
            window_kind: Set(counter.key.window_kind.as_str().to_string()),
            window_key: Set(counter.key.window_key),
            count: Set(counter.count as i64),
            created_at: Set(counter.created_at.into()),
            updated_at: Set(counter.updated_at.into()),
        }
    }
}
