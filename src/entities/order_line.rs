use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    #[sea_orm(string_value = "regular")]
    Regular,
    /// Custom fabrication; consumes its connected items through the warehouse channel
    #[sea_orm(string_value = "custom")]
    Custom,
}

/// Stock item consumed per unit of a custom line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedItem {
    pub item_id: i64,
    pub quantity: i64,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_lines")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub order_id: Uuid,
    pub kind: LineKind,
    pub item_id: Option<i64>,
    pub quantity: i64,
    pub supplier_id: Option<i64>,
    /// Resolved once when the order is created
    pub channel_key: String,
    pub definition: Option<Json>,
    pub connected_items: Option<Json>,
    pub created_at: DateTime<Utc>,
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

impl Model {
    pub fn connected(&self) -> Result<Vec<ConnectedItem>, serde_json::Error> {
        match &self.connected_items {
            Some(value) => serde_json::from_value(value.clone()),
            None => Ok(Vec::new()),
        }
    }
}
