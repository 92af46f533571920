//! Per-channel fulfillment state machine.
//!
//! Each channel of an order (hardware, warehouse, one per LPO supplier) moves
//! through `FulfillmentStatus` on its own. Approval deducts the channel's
//! stock, rejection or cancellation after approval restores it, and the
//! order's overall status is re-derived from every channel after each change.
//! The transition rules are pure functions so they can be tested without a
//! database.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::FulfillmentConfig,
    db::DbPool,
    entities::{
        order::{self, Entity as Order},
        order_channel::{self, Entity as OrderChannel, FulfillmentStatus},
        order_line::{self, Entity as OrderLine, LineKind},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    models::{ChannelKey, FulfillmentAction},
    services::{
        deduction::{DeductionEngine, DeductionLine, DeductionOutcome, DeductionScope},
        orders::{load_aggregate, OrderAggregate},
    },
};

/// Knobs for the transition rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionPolicy {
    /// Approved (or later) channels may only be cancelled, not rejected
    pub lock_approved_channels: bool,
}

impl From<&FulfillmentConfig> for TransitionPolicy {
    fn from(config: &FulfillmentConfig) -> Self {
        Self {
            lock_approved_channels: config.lock_approved_channels,
        }
    }
}

/// Stock movement a transition triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockEffect {
    None,
    Deduct,
    Restore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionPlan {
    pub from: FulfillmentStatus,
    pub to: FulfillmentStatus,
    pub effect: StockEffect,
    /// The channel is already in the target status
    pub duplicate: bool,
}

fn invalid(from: FulfillmentStatus, to: FulfillmentStatus) -> ServiceError {
    ServiceError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}

/// Refuses moves back to `Pending`, moves backwards along the delivery path,
/// and, when approved channels are locked, rejection after approval.
pub fn guard_regression(
    from: FulfillmentStatus,
    to: FulfillmentStatus,
    policy: &TransitionPolicy,
) -> Result<(), ServiceError> {
    if to == FulfillmentStatus::Pending && from != FulfillmentStatus::Pending {
        return Err(invalid(from, to));
    }
    if policy.lock_approved_channels && from.is_committed() && to == FulfillmentStatus::Rejected {
        return Err(invalid(from, to));
    }
    if !to.is_terminal() && to.progress() < from.progress() {
        return Err(invalid(from, to));
    }
    Ok(())
}

/// Decides whether `action` is allowed from `from` and what it does to stock.
pub fn plan_transition(
    from: FulfillmentStatus,
    action: FulfillmentAction,
    policy: &TransitionPolicy,
) -> Result<TransitionPlan, ServiceError> {
    use FulfillmentStatus::*;

    let to = action.target();
    if from == to {
        return Ok(TransitionPlan {
            from,
            to,
            effect: StockEffect::None,
            duplicate: true,
        });
    }
    if from.is_terminal() {
        return Err(invalid(from, to));
    }
    guard_regression(from, to, policy)?;

    let effect = match (from, to) {
        (Pending, Approved) => StockEffect::Deduct,
        (Pending, Rejected | Cancelled) => StockEffect::None,
        (Pending, _) => return Err(invalid(from, to)),
        (_, Rejected | Cancelled) => StockEffect::Restore,
        (_, _) if to.progress() > from.progress() => StockEffect::None,
        _ => return Err(invalid(from, to)),
    };

    Ok(TransitionPlan {
        from,
        to,
        effect,
        duplicate: false,
    })
}

/// Overall order status from its channel statuses.
pub fn derive_overall_status<I>(statuses: I) -> FulfillmentStatus
where
    I: IntoIterator<Item = FulfillmentStatus>,
{
    use FulfillmentStatus::*;

    let statuses: Vec<FulfillmentStatus> = statuses.into_iter().collect();
    if statuses.is_empty() {
        return Pending;
    }
    if statuses.contains(&Rejected) {
        return Rejected;
    }

    let live: Vec<FulfillmentStatus> = statuses
        .into_iter()
        .filter(|status| *status != Cancelled)
        .collect();
    if live.is_empty() {
        return Cancelled;
    }
    if live.iter().all(|status| *status == Delivered) {
        return Delivered;
    }

    [InTransit, OutForDelivery, Approved]
        .into_iter()
        .find(|candidate| live.contains(candidate))
        .unwrap_or(Pending)
}

/// Who asked for a transition and why.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionContext {
    pub actor: Option<String>,
    pub note: Option<String>,
}

#[derive(Clone)]
pub struct FulfillmentService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    engine: Arc<DeductionEngine>,
    policy: TransitionPolicy,
}

impl FulfillmentService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        engine: Arc<DeductionEngine>,
        policy: TransitionPolicy,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            engine,
            policy,
        }
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// Applies `action` to one channel of an order in a single transaction:
    /// status check, stock deduction or restore, channel update and overall
    /// status recomputation. Nothing is written when any step fails.
    #[instrument(skip(self, context), fields(order_id = %order_id, channel = %channel, action = %action))]
    pub async fn transition(
        &self,
        order_id: Uuid,
        channel: ChannelKey,
        action: FulfillmentAction,
        context: TransitionContext,
    ) -> Result<OrderAggregate, ServiceError> {
        let txn = self.db_pool.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::db_error(e)
        })?;

        let result = self
            .transition_in(&txn, order_id, channel, action)
            .await;
        let (aggregate, plan, outcome) = match result {
            Ok(applied) => applied,
            Err(e) => {
                warn!(error = %e, "Transition rolled back");
                counter!("sitestock.fulfillment.rollbacks", 1, "action" => action.to_string());
                if let Err(rollback_err) = txn.rollback().await {
                    error!("Failed to roll back transition: {}", rollback_err);
                }
                return Err(e);
            }
        };

        txn.commit().await.map_err(|e| {
            error!("Failed to commit transition for order {}: {}", order_id, e);
            ServiceError::db_error(e)
        })?;

        if plan.duplicate {
            info!(status = %plan.to, "Duplicate transition ignored");
            return Ok(aggregate);
        }

        counter!(
            "sitestock.fulfillment.transitions",
            1,
            "from" => plan.from.as_str(),
            "to" => plan.to.as_str()
        );
        info!(
            from = %plan.from,
            to = %plan.to,
            overall_status = %aggregate.order.overall_status,
            ledger_rows = outcome.adjustments.len(),
            actor = ?context.actor,
            note = ?context.note,
            "Channel transitioned"
        );

        self.event_sender.publish_all(outcome.events());
        self.event_sender.publish(Event::ChannelTransitioned {
            order_id,
            channel: channel.to_string(),
            from: plan.from.to_string(),
            to: plan.to.to_string(),
            overall_status: aggregate.order.overall_status.to_string(),
            actor: context.actor,
            note: context.note,
        });

        Ok(aggregate)
    }

    async fn transition_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        channel: ChannelKey,
        action: FulfillmentAction,
    ) -> Result<(OrderAggregate, TransitionPlan, DeductionOutcome), ServiceError> {
        // Order row first, item rows after; every writer takes locks in this order.
        let order = Order::find_by_id(order_id)
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let channel_row = OrderChannel::find()
            .filter(order_channel::Column::OrderId.eq(order_id))
            .filter(order_channel::Column::ChannelKey.eq(channel.to_string()))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Channel {} is not present on order {}",
                    channel, order_id
                ))
            })?;

        let plan = plan_transition(channel_row.status, action, &self.policy)?;
        if plan.duplicate {
            let aggregate = load_aggregate(conn, order_id).await?;
            return Ok((aggregate, plan, DeductionOutcome::default()));
        }

        let outcome = match plan.effect {
            StockEffect::None => DeductionOutcome::default(),
            StockEffect::Deduct => {
                let lines = channel_lines(conn, order_id, channel).await?;
                let scope = DeductionScope {
                    order_id,
                    channel,
                    site_id: order.site_id,
                };
                self.engine.deduct_batch(conn, scope, &lines).await?
            }
            StockEffect::Restore => self.engine.restore_channel(conn, order_id, channel).await?,
        };

        let now = Utc::now();
        let mut active_channel: order_channel::ActiveModel = channel_row.into();
        active_channel.status = Set(plan.to);
        active_channel.updated_at = Set(now);
        active_channel
            .update(conn)
            .await
            .map_err(ServiceError::db_error)?;

        let statuses = OrderChannel::find()
            .filter(order_channel::Column::OrderId.eq(order_id))
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|row| row.status);
        let overall = derive_overall_status(statuses);

        let version = order.version;
        let mut active_order: order::ActiveModel = order.into();
        active_order.overall_status = Set(overall);
        active_order.version = Set(version + 1);
        active_order.updated_at = Set(now);
        active_order
            .update(conn)
            .await
            .map_err(ServiceError::db_error)?;

        let aggregate = load_aggregate(conn, order_id).await?;
        Ok((aggregate, plan, outcome))
    }
}

/// Stock-bearing quantities a channel consumes: regular lines routed to it,
/// plus the connected items of custom lines on the warehouse channel.
async fn channel_lines<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    channel: ChannelKey,
) -> Result<Vec<DeductionLine>, ServiceError> {
    let rows = OrderLine::find()
        .filter(order_line::Column::OrderId.eq(order_id))
        .filter(order_line::Column::ChannelKey.eq(channel.to_string()))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let mut lines = Vec::new();
    for row in rows {
        match row.kind {
            LineKind::Regular => {
                if let Some(item_id) = row.item_id {
                    lines.push(DeductionLine::new(item_id, row.quantity));
                }
            }
            LineKind::Custom => {
                for connected in row.connected()? {
                    let quantity = connected.quantity.checked_mul(row.quantity).ok_or_else(|| {
                        ServiceError::quantity_overflow(format!(
                            "item {} quantity {} x {}",
                            connected.item_id, connected.quantity, row.quantity
                        ))
                    })?;
                    lines.push(DeductionLine::new(connected.item_id, quantity));
                }
            }
        }
    }
    Ok(lines)
}
