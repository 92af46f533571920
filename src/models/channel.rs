use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{Display, EnumString};

use crate::entities::item::{self, SupplyChannel};
use crate::entities::order_channel::FulfillmentStatus;
use crate::errors::ServiceError;

/// One independent fulfillment track of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelKey {
    Hardware,
    Warehouse,
    /// Purchase order placed with one supplier
    Lpo(i64),
}

impl ChannelKey {
    pub fn is_lpo(&self) -> bool {
        matches!(self, ChannelKey::Lpo(_))
    }

    /// LPO channels are procured externally and never touch the ledger.
    pub fn is_stock_bearing(&self) -> bool {
        !self.is_lpo()
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKey::Hardware => f.write_str("hardware"),
            ChannelKey::Warehouse => f.write_str("warehouse"),
            ChannelKey::Lpo(supplier_id) => write!(f, "lpo:{}", supplier_id),
        }
    }
}

impl FromStr for ChannelKey {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hardware" => Ok(ChannelKey::Hardware),
            "warehouse" => Ok(ChannelKey::Warehouse),
            other => other
                .strip_prefix("lpo:")
                .and_then(|id| id.parse::<i64>().ok())
                .map(ChannelKey::Lpo)
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!("unknown channel '{}'", other))
                }),
        }
    }
}

impl Serialize for ChannelKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChannelKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Channel that consumes a regular order line for `item`.
pub fn resolve_channel(item: &item::Model, supplier_id: Option<i64>) -> Result<ChannelKey, ServiceError> {
    match item.channel {
        SupplyChannel::Hardware => Ok(ChannelKey::Hardware),
        SupplyChannel::Warehouse => Ok(ChannelKey::Warehouse),
        SupplyChannel::Lpo => supplier_id
            .map(ChannelKey::Lpo)
            .ok_or(ServiceError::SupplierRequired { item_id: item.id }),
    }
}

/// Action requested against one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentAction {
    Approve,
    Reject,
    Deliver,
    Cancel,
    OutForDelivery,
    InTransit,
    /// Supplier-side delivery confirmation
    Receive,
}

impl FulfillmentAction {
    pub fn target(&self) -> FulfillmentStatus {
        match self {
            FulfillmentAction::Approve => FulfillmentStatus::Approved,
            FulfillmentAction::Reject => FulfillmentStatus::Rejected,
            FulfillmentAction::Deliver | FulfillmentAction::Receive => FulfillmentStatus::Delivered,
            FulfillmentAction::Cancel => FulfillmentStatus::Cancelled,
            FulfillmentAction::OutForDelivery => FulfillmentStatus::OutForDelivery,
            FulfillmentAction::InTransit => FulfillmentStatus::InTransit,
        }
    }
}
