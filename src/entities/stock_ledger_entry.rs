//! Snapshot ledger.
//!
//! Every row stores the absolute balance of its (item, pool) pair after the
//! movement, not a delta. The current balance is the `resulting_balance` of the
//! newest active row ordered by `(created_at, id)`. `quantity` is kept for audit
//! readability only and the ledger cannot be replayed from it, because
//! `Adjustment` rows overwrite the balance without reconciling prior history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    #[sea_orm(string_value = "in")]
    In,
    #[sea_orm(string_value = "out")]
    Out,
    /// Manual correction: sets the balance verbatim
    #[sea_orm(string_value = "adjustment")]
    Adjustment,
}

impl AdjustmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentKind::In => "in",
            AdjustmentKind::Out => "out",
            AdjustmentKind::Adjustment => "adjustment",
        }
    }

    /// Balance after applying `quantity` to `current`, or `None` when it
    /// leaves the i64 range. May be negative; the caller rejects that before
    /// writing.
    pub fn apply(&self, current: i64, quantity: i64) -> Option<i64> {
        match self {
            AdjustmentKind::In => current.checked_add(quantity),
            AdjustmentKind::Out => current.checked_sub(quantity),
            AdjustmentKind::Adjustment => Some(quantity),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    #[sea_orm(string_value = "material")]
    Material,
    #[sea_orm(string_value = "product")]
    Product,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Material => "material",
            Partition::Product => "product",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_ledger_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub item_id: i64,
    /// `None` is the general pool
    pub site_id: Option<i64>,
    pub partition: Partition,
    pub kind: AdjustmentKind,
    pub quantity: i64,
    pub resulting_balance: i64,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub note: Option<String>,
    pub label: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::item::Entity",
        from = "Column::ItemId",
        to = "super::item::Column::Id"
    )]
    Item,
}

impl Related<super::item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Item.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}

impl Model {
    pub fn is_general_pool(&self) -> bool {
        self.site_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjustment_overwrites_instead_of_accumulating() {
        assert_eq!(AdjustmentKind::In.apply(10, 3), Some(13));
        assert_eq!(AdjustmentKind::Out.apply(10, 3), Some(7));
        assert_eq!(AdjustmentKind::Out.apply(2, 3), Some(-1));
        assert_eq!(AdjustmentKind::Adjustment.apply(10, 3), Some(3));
    }

    #[test]
    fn apply_reports_overflow() {
        assert_eq!(AdjustmentKind::In.apply(5, i64::MAX), None);
        assert_eq!(AdjustmentKind::Out.apply(i64::MIN + 1, 2), None);
        assert_eq!(AdjustmentKind::Adjustment.apply(5, i64::MAX), Some(i64::MAX));
    }
}
