use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::stock_ledger_entry::Partition;

/// Whether an item is consumed as raw input, sold as a unit, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    #[sea_orm(string_value = "material")]
    Material,
    #[sea_orm(string_value = "product")]
    Product,
    #[sea_orm(string_value = "hybrid")]
    Hybrid,
}

impl ItemKind {
    /// Partition the item's ledger rows are recorded under.
    pub fn partition(self) -> Partition {
        match self {
            ItemKind::Material => Partition::Material,
            ItemKind::Product | ItemKind::Hybrid => Partition::Product,
        }
    }

    /// Hybrid items sit in both partitions.
    pub fn accepts(self, partition: Partition) -> bool {
        match self {
            ItemKind::Hybrid => true,
            kind => kind.partition() == partition,
        }
    }

    pub fn can_carry_bom(self) -> bool {
        matches!(self, ItemKind::Product | ItemKind::Hybrid)
    }

    pub fn can_be_bom_material(self) -> bool {
        matches!(self, ItemKind::Material | ItemKind::Hybrid)
    }
}

/// Fulfillment channel that consumes an item when it is ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum SupplyChannel {
    #[sea_orm(string_value = "hardware")]
    Hardware,
    #[sea_orm(string_value = "warehouse")]
    Warehouse,
    #[sea_orm(string_value = "lpo")]
    Lpo,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub sku: String,
    pub name: String,
    pub kind: ItemKind,
    pub channel: SupplyChannel,
    /// Balance used for the general pool before its first ledger row
    pub opening_balance: i64,
    /// Latest general-pool snapshot; maintained by the stock service only
    pub general_balance: i64,
    pub low_stock_threshold: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_stock_bearing(&self) -> bool {
        self.channel != SupplyChannel::Lpo
    }

    pub fn is_low(&self) -> bool {
        matches!(self.low_stock_threshold, Some(threshold) if self.general_balance <= threshold)
    }
}
