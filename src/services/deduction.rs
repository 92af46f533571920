//! Order-driven stock deduction and restoration.
//!
//! Deductions drain the order's site pool before the general pool and cascade
//! into every bill-of-materials line of the deducted item. Each deducted item
//! gets a marker in `stock_deductions` recording the exact pool allocations,
//! so a second approval is skipped and a restore returns stock to the pools it
//! came from.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    entities::{
        bom_line::{self, Entity as BomLine},
        stock_deduction::{self, DeductionDirection, Entity as StockDeduction, PoolAllocation},
        AdjustmentKind,
    },
    errors::{ServiceError, StockShortage},
    events::Event,
    models::ChannelKey,
    services::stock::{AdjustStock, StockAdjustment, StockReference, StockService},
};

/// Units of one item an order channel consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeductionLine {
    pub item_id: i64,
    pub quantity: i64,
}

impl DeductionLine {
    pub fn new(item_id: i64, quantity: i64) -> Self {
        Self { item_id, quantity }
    }
}

/// Order and channel a deduction is applied for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeductionScope {
    pub order_id: Uuid,
    pub channel: ChannelKey,
    /// Site pool drained first
    pub site_id: Option<i64>,
}

/// Ledger writes and markers produced inside the caller's transaction.
#[derive(Debug, Clone, Default)]
pub struct DeductionOutcome {
    pub markers: Vec<stock_deduction::Model>,
    pub adjustments: Vec<StockAdjustment>,
}

impl DeductionOutcome {
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty() && self.adjustments.is_empty()
    }

    pub fn events(&self) -> Vec<Event> {
        self.adjustments
            .iter()
            .flat_map(StockAdjustment::events)
            .collect()
    }
}

/// `floor(quantity_per_unit * quantity)` as whole units.
pub fn material_quantity(quantity_per_unit: Decimal, quantity: i64) -> Result<i64, ServiceError> {
    quantity_per_unit
        .checked_mul(Decimal::from(quantity))
        .and_then(|total| total.floor().to_i64())
        .ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "bill of materials quantity {} x {} is out of range",
                quantity_per_unit, quantity
            ))
        })
}

fn add_quantity(
    totals: &mut BTreeMap<i64, i64>,
    item_id: i64,
    quantity: i64,
) -> Result<(), ServiceError> {
    let total = totals.entry(item_id).or_insert(0);
    let current = *total;
    *total = current.checked_add(quantity).ok_or_else(|| {
        ServiceError::quantity_overflow(format!("item {} total {} + {}", item_id, current, quantity))
    })?;
    Ok(())
}

struct PlannedDeduction {
    item_id: i64,
    quantity: i64,
    materials: Vec<(i64, i64)>,
}

#[derive(Clone)]
pub struct DeductionEngine {
    stock: Arc<StockService>,
}

impl DeductionEngine {
    pub fn new(stock: Arc<StockService>) -> Self {
        Self { stock }
    }

    /// Deducts a single item and its materials.
    pub async fn deduct<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: DeductionScope,
        item_id: i64,
        quantity: i64,
    ) -> Result<DeductionOutcome, ServiceError> {
        self.deduct_batch(conn, scope, &[DeductionLine::new(item_id, quantity)])
            .await
    }

    /// Deducts every line or none of them. Quantities are summed per item,
    /// items already deducted for this order and channel are skipped, and the
    /// combined requirement of items and materials is checked against site
    /// plus general stock before the first write.
    pub async fn deduct_batch<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: DeductionScope,
        lines: &[DeductionLine],
    ) -> Result<DeductionOutcome, ServiceError> {
        if !scope.channel.is_stock_bearing() {
            return Ok(DeductionOutcome::default());
        }

        let mut wanted: BTreeMap<i64, i64> = BTreeMap::new();
        for line in lines {
            if line.quantity <= 0 {
                return Err(ServiceError::InvalidQuantity(line.quantity));
            }
            add_quantity(&mut wanted, line.item_id, line.quantity)?;
        }

        let already_deducted: HashSet<i64> = self
            .markers(conn, scope.order_id, scope.channel, None)
            .await?
            .into_iter()
            .filter(|marker| marker.direction == DeductionDirection::Deduct)
            .map(|marker| marker.item_id)
            .collect();
        wanted.retain(|item_id, _| !already_deducted.contains(item_id));
        if wanted.is_empty() {
            debug!(order_id = %scope.order_id, channel = %scope.channel, "Nothing left to deduct");
            return Ok(DeductionOutcome::default());
        }

        let bom = BomLine::find()
            .filter(bom_line::Column::ProductItemId.is_in(wanted.keys().copied()))
            .order_by_asc(bom_line::Column::Id)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;

        let lock_ids: Vec<i64> = wanted
            .keys()
            .copied()
            .chain(bom.iter().map(|line| line.material_item_id))
            .collect();
        let items = self.stock.lock_items(conn, lock_ids).await?;

        let mut plan = Vec::with_capacity(wanted.len());
        let mut totals: BTreeMap<i64, i64> = BTreeMap::new();
        for (&item_id, &quantity) in &wanted {
            let item = items
                .get(&item_id)
                .ok_or(ServiceError::ItemNotFound(item_id))?;
            if !item.is_stock_bearing() {
                debug!(item_id, "Skipping purchase-order item");
                continue;
            }

            let mut materials = Vec::new();
            for line in bom.iter().filter(|line| line.product_item_id == item_id) {
                let material = items
                    .get(&line.material_item_id)
                    .ok_or(ServiceError::ItemNotFound(line.material_item_id))?;
                if !material.is_stock_bearing() {
                    continue;
                }
                let material_qty = material_quantity(line.quantity_per_unit, quantity)?;
                if material_qty == 0 {
                    continue;
                }
                materials.push((material.id, material_qty));
                add_quantity(&mut totals, material.id, material_qty)?;
            }

            add_quantity(&mut totals, item_id, quantity)?;
            plan.push(PlannedDeduction {
                item_id,
                quantity,
                materials,
            });
        }

        let mut shortages = Vec::new();
        for (&item_id, &requested) in &totals {
            let available = self
                .stock
                .available_in(conn, item_id, scope.site_id)
                .await?;
            if available < requested {
                shortages.push(StockShortage {
                    item_id,
                    site_id: scope.site_id,
                    available,
                    requested,
                });
            }
        }
        if !shortages.is_empty() {
            warn!(
                order_id = %scope.order_id,
                channel = %scope.channel,
                short_items = shortages.len(),
                "Deduction preflight failed"
            );
            return Err(ServiceError::InsufficientStock(shortages));
        }

        let mut outcome = DeductionOutcome::default();
        for planned in plan {
            let mut allocations = self
                .draw(conn, &scope, planned.item_id, planned.quantity, None, &mut outcome)
                .await?;
            for (material_id, material_qty) in planned.materials {
                let drawn = self
                    .draw(
                        conn,
                        &scope,
                        material_id,
                        material_qty,
                        Some(planned.item_id),
                        &mut outcome,
                    )
                    .await?;
                allocations.extend(drawn);
            }

            let marker = self
                .insert_marker(
                    conn,
                    &scope,
                    planned.item_id,
                    planned.quantity,
                    DeductionDirection::Deduct,
                    &allocations,
                )
                .await?;
            outcome.markers.push(marker);
        }

        info!(
            order_id = %scope.order_id,
            channel = %scope.channel,
            items = outcome.markers.len(),
            ledger_rows = outcome.adjustments.len(),
            "Stock deducted"
        );
        Ok(outcome)
    }

    /// Restores one previously deducted item and its materials.
    pub async fn restore<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        channel: ChannelKey,
        item_id: i64,
    ) -> Result<DeductionOutcome, ServiceError> {
        self.restore_markers(conn, order_id, channel, Some(item_id))
            .await
    }

    /// Restores everything deducted for the channel that has not been
    /// restored yet.
    pub async fn restore_channel<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        channel: ChannelKey,
    ) -> Result<DeductionOutcome, ServiceError> {
        self.restore_markers(conn, order_id, channel, None).await
    }

    async fn restore_markers<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        channel: ChannelKey,
        item_id: Option<i64>,
    ) -> Result<DeductionOutcome, ServiceError> {
        let markers = self.markers(conn, order_id, channel, item_id).await?;
        let restored: HashSet<i64> = markers
            .iter()
            .filter(|marker| marker.direction == DeductionDirection::Restore)
            .map(|marker| marker.item_id)
            .collect();

        let mut pending = Vec::new();
        for marker in markers {
            if marker.direction == DeductionDirection::Deduct && !restored.contains(&marker.item_id)
            {
                let allocations = marker.allocations()?;
                pending.push((marker, allocations));
            }
        }
        if pending.is_empty() {
            return Ok(DeductionOutcome::default());
        }

        let lock_ids: Vec<i64> = pending
            .iter()
            .flat_map(|(_, allocations)| allocations.iter().map(|a| a.item_id))
            .collect();
        self.stock.lock_items(conn, lock_ids).await?;

        let scope_reference = StockReference::new("order", order_id);
        let mut outcome = DeductionOutcome::default();
        for (marker, allocations) in pending.iter().rev() {
            for allocation in allocations.iter().rev() {
                let mut request =
                    AdjustStock::new(allocation.item_id, allocation.quantity, AdjustmentKind::In)
                        .at_site(allocation.site_id)
                        .with_reference(scope_reference.clone())
                        .with_note(format!("Restored for order {} ({})", order_id, channel));
                if let Some(parent) = allocation.bom_parent {
                    request = request.with_label(format!("bom:{}", parent));
                }
                let adjustment = self.stock.adjust_in(conn, &request).await?;
                outcome.adjustments.push(adjustment);
            }

            let scope = DeductionScope {
                order_id,
                channel,
                site_id: marker.site_id,
            };
            let restore_marker = self
                .insert_marker(
                    conn,
                    &scope,
                    marker.item_id,
                    marker.quantity,
                    DeductionDirection::Restore,
                    allocations,
                )
                .await?;
            outcome.markers.push(restore_marker);
        }

        info!(
            order_id = %order_id,
            channel = %channel,
            items = outcome.markers.len(),
            ledger_rows = outcome.adjustments.len(),
            "Stock restored"
        );
        Ok(outcome)
    }

    /// Takes `quantity` from the site pool first and the general pool for the rest.
    async fn draw<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &DeductionScope,
        item_id: i64,
        quantity: i64,
        bom_parent: Option<i64>,
        outcome: &mut DeductionOutcome,
    ) -> Result<Vec<PoolAllocation>, ServiceError> {
        let base = AdjustStock::new(item_id, quantity, AdjustmentKind::Out)
            .with_reference(StockReference::new("order", scope.order_id))
            .with_note(format!(
                "Deducted for order {} ({})",
                scope.order_id, scope.channel
            ));
        let base = match bom_parent {
            Some(parent) => base.with_label(format!("bom:{}", parent)),
            None => base,
        };

        let mut allocations = Vec::new();
        let mut remaining = quantity;

        if let Some(site_id) = scope.site_id {
            let on_site = self
                .stock
                .current_balance_in(conn, item_id, Some(site_id), None)
                .await?;
            let take = on_site.clamp(0, remaining);
            if take > 0 {
                let request = AdjustStock {
                    quantity: take,
                    site_id: Some(site_id),
                    ..base.clone()
                };
                outcome
                    .adjustments
                    .push(self.stock.adjust_in(conn, &request).await?);
                allocations.push(PoolAllocation {
                    item_id,
                    site_id: Some(site_id),
                    quantity: take,
                    bom_parent,
                });
                remaining -= take;
            }
        }

        if remaining > 0 {
            let request = AdjustStock {
                quantity: remaining,
                site_id: None,
                ..base
            };
            outcome
                .adjustments
                .push(self.stock.adjust_in(conn, &request).await?);
            allocations.push(PoolAllocation {
                item_id,
                site_id: None,
                quantity: remaining,
                bom_parent,
            });
        }

        Ok(allocations)
    }

    async fn markers<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        channel: ChannelKey,
        item_id: Option<i64>,
    ) -> Result<Vec<stock_deduction::Model>, ServiceError> {
        let mut query = StockDeduction::find()
            .filter(stock_deduction::Column::OrderId.eq(order_id))
            .filter(stock_deduction::Column::ChannelKey.eq(channel.to_string()));
        if let Some(item_id) = item_id {
            query = query.filter(stock_deduction::Column::ItemId.eq(item_id));
        }

        query
            .order_by_asc(stock_deduction::Column::Id)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn insert_marker<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope: &DeductionScope,
        item_id: i64,
        quantity: i64,
        direction: DeductionDirection,
        allocations: &[PoolAllocation],
    ) -> Result<stock_deduction::Model, ServiceError> {
        stock_deduction::ActiveModel {
            order_id: Set(scope.order_id),
            item_id: Set(item_id),
            channel_key: Set(scope.channel.to_string()),
            direction: Set(direction),
            quantity: Set(quantity),
            site_id: Set(scope.site_id),
            allocations: Set(serde_json::to_value(allocations)?),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn material_quantity_floors_fractional_usage() {
        assert_eq!(material_quantity(dec!(2), 3).unwrap(), 6);
        assert_eq!(material_quantity(dec!(0.5), 3).unwrap(), 1);
        assert_eq!(material_quantity(dec!(0.25), 3).unwrap(), 0);
        assert_eq!(material_quantity(dec!(1.75), 4).unwrap(), 7);
    }

    #[test]
    fn outcome_events_follow_adjustments() {
        let outcome = DeductionOutcome::default();
        assert!(outcome.is_empty());
        assert!(outcome.events().is_empty());
    }
}
