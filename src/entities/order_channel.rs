use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of one fulfillment channel; also used for the derived order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "out_for_delivery")]
    OutForDelivery,
    #[sea_orm(string_value = "in_transit")]
    InTransit,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "rejected")]
    Rejected,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl FulfillmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Pending => "pending",
            FulfillmentStatus::Approved => "approved",
            FulfillmentStatus::OutForDelivery => "out_for_delivery",
            FulfillmentStatus::InTransit => "in_transit",
            FulfillmentStatus::Delivered => "delivered",
            FulfillmentStatus::Rejected => "rejected",
            FulfillmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FulfillmentStatus::Delivered | FulfillmentStatus::Rejected | FulfillmentStatus::Cancelled
        )
    }

    /// Approved or any later non-terminal state: stock has left the ledger.
    pub fn is_committed(&self) -> bool {
        matches!(
            self,
            FulfillmentStatus::Approved
                | FulfillmentStatus::OutForDelivery
                | FulfillmentStatus::InTransit
        )
    }

    /// Position along the forward delivery path.
    pub(crate) fn progress(&self) -> u8 {
        match self {
            FulfillmentStatus::Pending => 0,
            FulfillmentStatus::Approved => 1,
            FulfillmentStatus::OutForDelivery => 2,
            FulfillmentStatus::InTransit => 3,
            FulfillmentStatus::Delivered => 4,
            FulfillmentStatus::Rejected | FulfillmentStatus::Cancelled => 5,
        }
    }
}

impl fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_channels")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub order_id: Uuid,
    /// `hardware`, `warehouse` or `lpo:<supplier id>`
    pub channel_key: String,
    pub status: FulfillmentStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
