//! Idempotency markers for order-driven stock movements.
//!
//! One row per `(order_id, item_id, channel_key, direction)`, enforced by a
//! unique index. `allocations` records every pool draw made for the item and
//! its bill of materials so a restore puts back exactly what was taken.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum DeductionDirection {
    #[sea_orm(string_value = "deduct")]
    Deduct,
    #[sea_orm(string_value = "restore")]
    Restore,
}

/// A single draw from (or return to) one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolAllocation {
    pub item_id: i64,
    pub site_id: Option<i64>,
    pub quantity: i64,
    /// Item whose bill of materials caused this draw
    pub bom_parent: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_deductions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub order_id: Uuid,
    pub item_id: i64,
    pub channel_key: String,
    pub direction: DeductionDirection,
    pub quantity: i64,
    pub site_id: Option<i64>,
    pub allocations: Json,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn allocations(&self) -> Result<Vec<PoolAllocation>, serde_json::Error> {
        serde_json::from_value(self.allocations.clone())
    }
}
