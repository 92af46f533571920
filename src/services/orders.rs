use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        item::Entity as Item,
        order::{self, Entity as Order},
        order_channel::{self, Entity as OrderChannel, FulfillmentStatus},
        order_line::{self, ConnectedItem, Entity as OrderLine, LineKind},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    models::{resolve_channel, ChannelKey},
};

/// An order with its lines and channel statuses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAggregate {
    pub order: order::Model,
    pub lines: Vec<order_line::Model>,
    pub channels: Vec<order_channel::Model>,
}

impl OrderAggregate {
    pub fn channel_status(&self, channel: ChannelKey) -> Option<FulfillmentStatus> {
        let key = channel.to_string();
        self.channels
            .iter()
            .find(|row| row.channel_key == key)
            .map(|row| row.status)
    }

    pub fn all_pending(&self) -> bool {
        self.channels
            .iter()
            .all(|row| row.status == FulfillmentStatus::Pending)
    }
}

/// A line on a new order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NewOrderLine {
    Regular {
        item_id: i64,
        quantity: i64,
        #[serde(default)]
        supplier_id: Option<i64>,
    },
    /// Fabricated to order; consumes `connected_items` per unit
    Custom {
        definition: serde_json::Value,
        quantity: i64,
        #[serde(default)]
        connected_items: Vec<ConnectedItem>,
    },
}

impl NewOrderLine {
    pub fn regular(item_id: i64, quantity: i64) -> Self {
        NewOrderLine::Regular {
            item_id,
            quantity,
            supplier_id: None,
        }
    }

    pub fn quantity(&self) -> i64 {
        match self {
            NewOrderLine::Regular { quantity, .. } | NewOrderLine::Custom { quantity, .. } => {
                *quantity
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub site_id: Option<i64>,
    pub lines: Vec<NewOrderLine>,
}

pub(crate) async fn load_aggregate<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<OrderAggregate, ServiceError> {
    let order = Order::find_by_id(order_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

    let lines = OrderLine::find()
        .filter(order_line::Column::OrderId.eq(order_id))
        .order_by_asc(order_line::Column::Id)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let channels = OrderChannel::find()
        .filter(order_channel::Column::OrderId.eq(order_id))
        .order_by_asc(order_channel::Column::Id)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(OrderAggregate {
        order,
        lines,
        channels,
    })
}

struct ResolvedLine {
    line: NewOrderLine,
    channel: ChannelKey,
}

#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates an order with every present channel pending. Each line's
    /// channel is resolved here and stored with the line.
    #[instrument(skip(self, new_order), fields(lines = new_order.lines.len()))]
    pub async fn create_order(&self, new_order: NewOrder) -> Result<OrderAggregate, ServiceError> {
        if new_order.lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "an order needs at least one line".to_string(),
            ));
        }

        let txn = self.db_pool.begin().await.map_err(ServiceError::db_error)?;
        let aggregate = match self.create_order_in(&txn, new_order).await {
            Ok(aggregate) => aggregate,
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!("Failed to roll back order creation: {}", rollback_err);
                }
                return Err(e);
            }
        };
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            order_id = %aggregate.order.id,
            channels = aggregate.channels.len(),
            "Order created"
        );
        self.event_sender
            .publish(Event::OrderCreated(aggregate.order.id));
        Ok(aggregate)
    }

    async fn create_order_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        new_order: NewOrder,
    ) -> Result<OrderAggregate, ServiceError> {
        let mut resolved = Vec::with_capacity(new_order.lines.len());
        for line in new_order.lines {
            if line.quantity() <= 0 {
                return Err(ServiceError::InvalidQuantity(line.quantity()));
            }
            let channel = match &line {
                NewOrderLine::Regular {
                    item_id,
                    supplier_id,
                    ..
                } => {
                    let item = Item::find_by_id(*item_id)
                        .one(conn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or(ServiceError::ItemNotFound(*item_id))?;
                    resolve_channel(&item, *supplier_id)?
                }
                NewOrderLine::Custom {
                    connected_items, ..
                } => {
                    for connected in connected_items {
                        if connected.quantity <= 0 {
                            return Err(ServiceError::InvalidQuantity(connected.quantity));
                        }
                        Item::find_by_id(connected.item_id)
                            .one(conn)
                            .await
                            .map_err(ServiceError::db_error)?
                            .ok_or(ServiceError::ItemNotFound(connected.item_id))?;
                    }
                    ChannelKey::Warehouse
                }
            };
            resolved.push(ResolvedLine { line, channel });
        }

        let channels: BTreeSet<ChannelKey> = resolved.iter().map(|line| line.channel).collect();
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        order::ActiveModel {
            id: Set(order_id),
            site_id: Set(new_order.site_id),
            overall_status: Set(FulfillmentStatus::Pending),
            is_lpo: Set(channels.iter().any(ChannelKey::is_lpo)),
            has_custom_items: Set(resolved
                .iter()
                .any(|line| matches!(line.line, NewOrderLine::Custom { .. }))),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;

        for ResolvedLine { line, channel } in resolved {
            let row = match line {
                NewOrderLine::Regular {
                    item_id,
                    quantity,
                    supplier_id,
                } => order_line::ActiveModel {
                    kind: Set(LineKind::Regular),
                    item_id: Set(Some(item_id)),
                    quantity: Set(quantity),
                    supplier_id: Set(supplier_id),
                    definition: Set(None),
                    connected_items: Set(None),
                    ..Default::default()
                },
                NewOrderLine::Custom {
                    definition,
                    quantity,
                    connected_items,
                } => order_line::ActiveModel {
                    kind: Set(LineKind::Custom),
                    item_id: Set(None),
                    quantity: Set(quantity),
                    supplier_id: Set(None),
                    definition: Set(Some(definition)),
                    connected_items: Set(Some(serde_json::to_value(connected_items)?)),
                    ..Default::default()
                },
            };
            order_line::ActiveModel {
                order_id: Set(order_id),
                channel_key: Set(channel.to_string()),
                created_at: Set(now),
                ..row
            }
            .insert(conn)
            .await
            .map_err(ServiceError::db_error)?;
        }

        for channel in &channels {
            order_channel::ActiveModel {
                order_id: Set(order_id),
                channel_key: Set(channel.to_string()),
                status: Set(FulfillmentStatus::Pending),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(conn)
            .await
            .map_err(ServiceError::db_error)?;
        }

        load_aggregate(conn, order_id).await
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderAggregate, ServiceError> {
        load_aggregate(self.db_pool.as_ref(), order_id).await
    }

    /// Deletes an order whose channels are all still pending. Ledger rows and
    /// deduction markers referencing it are kept.
    #[instrument(skip(self))]
    pub async fn delete_order(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db_pool.begin().await.map_err(ServiceError::db_error)?;
        if let Err(e) = self.delete_order_in(&txn, order_id).await {
            if let Err(rollback_err) = txn.rollback().await {
                error!("Failed to roll back order deletion: {}", rollback_err);
            }
            return Err(e);
        }
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(%order_id, "Order deleted");
        self.event_sender.publish(Event::OrderDeleted(order_id));
        Ok(())
    }

    async fn delete_order_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
    ) -> Result<(), ServiceError> {
        Order::find_by_id(order_id)
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let aggregate = load_aggregate(conn, order_id).await?;
        if !aggregate.all_pending() {
            return Err(ServiceError::OrderNotDeletable(order_id));
        }

        OrderChannel::delete_many()
            .filter(order_channel::Column::OrderId.eq(order_id))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
        OrderLine::delete_many()
            .filter(order_line::Column::OrderId.eq(order_id))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
        Order::delete_by_id(order_id)
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(())
    }
}
