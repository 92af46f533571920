//! Stock ledger service.
//!
//! The only component that reads or writes `stock_ledger_entries`. Every write
//! appends a snapshot row holding the absolute balance of its (item, pool) pair;
//! general-pool writes also refresh `items.general_balance` in the same
//! transaction.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::SimpleExpr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::{
    db::DbPool,
    entities::{
        item::{self, Entity as Item},
        stock_ledger_entry::{self, AdjustmentKind, Entity as StockLedgerEntry, Partition},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Business object that caused a ledger movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReference {
    pub reference_type: String,
    pub reference_id: String,
}

impl StockReference {
    pub fn new(reference_type: impl Into<String>, reference_id: impl ToString) -> Self {
        Self {
            reference_type: reference_type.into(),
            reference_id: reference_id.to_string(),
        }
    }
}

/// A single ledger movement request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustStock {
    pub item_id: i64,
    pub quantity: i64,
    pub kind: AdjustmentKind,
    /// `None` targets the general pool
    pub site_id: Option<i64>,
    /// Explicit partition; defaults to the item's own
    pub partition: Option<Partition>,
    pub note: Option<String>,
    pub label: Option<String>,
    pub reference: Option<StockReference>,
}

impl AdjustStock {
    pub fn new(item_id: i64, quantity: i64, kind: AdjustmentKind) -> Self {
        Self {
            item_id,
            quantity,
            kind,
            site_id: None,
            partition: None,
            note: None,
            label: None,
            reference: None,
        }
    }

    pub fn at_site(mut self, site_id: Option<i64>) -> Self {
        self.site_id = site_id;
        self
    }

    pub fn in_partition(mut self, partition: Partition) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_reference(mut self, reference: StockReference) -> Self {
        self.reference = Some(reference);
        self
    }
}

/// Result of a committed (or pending, inside a caller's transaction) ledger write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockAdjustment {
    pub entry: stock_ledger_entry::Model,
    pub previous_balance: i64,
    /// Threshold crossed by a general-pool write, if any
    pub low_stock_threshold: Option<i64>,
}

impl StockAdjustment {
    /// Events to publish once the owning transaction commits.
    pub fn events(&self) -> Vec<Event> {
        let mut events = vec![Event::StockAdjusted {
            entry_id: self.entry.id,
            item_id: self.entry.item_id,
            site_id: self.entry.site_id,
            kind: self.entry.kind.as_str().to_string(),
            previous_balance: self.previous_balance,
            resulting_balance: self.entry.resulting_balance,
        }];
        if let Some(threshold) = self.low_stock_threshold {
            events.push(Event::LowStock {
                item_id: self.entry.item_id,
                balance: self.entry.resulting_balance,
                threshold,
            });
        }
        events
    }
}

fn pool_filter(site_id: Option<i64>) -> SimpleExpr {
    match site_id {
        Some(site) => stock_ledger_entry::Column::SiteId.eq(site),
        None => stock_ledger_entry::Column::SiteId.is_null(),
    }
}

/// Newest active row for an (item, pool) pair, optionally restricted to a partition.
async fn latest_entry<C: ConnectionTrait>(
    conn: &C,
    item_id: i64,
    site_id: Option<i64>,
    partition: Option<Partition>,
) -> Result<Option<stock_ledger_entry::Model>, ServiceError> {
    let mut query = StockLedgerEntry::find()
        .filter(stock_ledger_entry::Column::ItemId.eq(item_id))
        .filter(pool_filter(site_id))
        .filter(stock_ledger_entry::Column::Active.eq(true));
    if let Some(partition) = partition {
        query = query.filter(stock_ledger_entry::Column::Partition.eq(partition));
    }

    query
        .order_by_desc(stock_ledger_entry::Column::CreatedAt)
        .order_by_desc(stock_ledger_entry::Column::Id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

#[derive(Clone)]
pub struct StockService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    enforce_partition: bool,
}

impl StockService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
            enforce_partition: true,
        }
    }

    pub fn with_partition_enforcement(mut self, enforce: bool) -> Self {
        self.enforce_partition = enforce;
        self
    }

    /// Appends one ledger row in its own transaction and publishes the
    /// resulting events after commit.
    #[instrument(skip(self, request), fields(item_id = request.item_id, kind = request.kind.as_str()))]
    pub async fn adjust(&self, request: AdjustStock) -> Result<StockAdjustment, ServiceError> {
        let txn = self.db_pool.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::db_error(e)
        })?;

        let adjustment = match self.adjust_in(&txn, &request).await {
            Ok(adjustment) => adjustment,
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!("Failed to roll back stock adjustment: {}", rollback_err);
                }
                return Err(e);
            }
        };

        txn.commit().await.map_err(|e| {
            error!("Failed to commit stock adjustment for item {}: {}", request.item_id, e);
            ServiceError::db_error(e)
        })?;

        self.event_sender.publish_all(adjustment.events());
        Ok(adjustment)
    }

    /// `adjust` locked to the material partition.
    pub async fn adjust_for_material(
        &self,
        request: AdjustStock,
    ) -> Result<StockAdjustment, ServiceError> {
        self.adjust(request.in_partition(Partition::Material)).await
    }

    /// `adjust` locked to the product partition.
    pub async fn adjust_for_product(
        &self,
        request: AdjustStock,
    ) -> Result<StockAdjustment, ServiceError> {
        self.adjust(request.in_partition(Partition::Product)).await
    }

    /// Ledger write inside a caller-owned transaction. Locks the item row,
    /// validates the request and appends the snapshot row. Publishing the
    /// returned adjustment's events is left to the caller.
    pub async fn adjust_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        request: &AdjustStock,
    ) -> Result<StockAdjustment, ServiceError> {
        if request.quantity <= 0 {
            return Err(ServiceError::InvalidQuantity(request.quantity));
        }

        let item = Item::find_by_id(request.item_id)
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or(ServiceError::ItemNotFound(request.item_id))?;

        let partition = self
            .resolve_partition(conn, &item, request.site_id, request.partition)
            .await?;

        let previous_balance = self
            .balance_for(conn, &item, request.site_id, None)
            .await?;
        let resulting_balance = request
            .kind
            .apply(previous_balance, request.quantity)
            .ok_or_else(|| {
                ServiceError::quantity_overflow(format!(
                    "item {} balance {} {} {}",
                    item.id,
                    previous_balance,
                    request.kind.as_str(),
                    request.quantity
                ))
            })?;
        if resulting_balance < 0 {
            warn!(
                item_id = item.id,
                site_id = ?request.site_id,
                available = previous_balance,
                requested = request.quantity,
                "Rejected stock movement below zero"
            );
            return Err(ServiceError::insufficient(
                item.id,
                request.site_id,
                previous_balance,
                request.quantity,
            ));
        }

        let (reference_type, reference_id) = match &request.reference {
            Some(reference) => (
                Some(reference.reference_type.clone()),
                Some(reference.reference_id.clone()),
            ),
            None => (None, None),
        };

        let entry = stock_ledger_entry::ActiveModel {
            item_id: Set(item.id),
            site_id: Set(request.site_id),
            partition: Set(partition),
            kind: Set(request.kind),
            quantity: Set(request.quantity),
            resulting_balance: Set(resulting_balance),
            reference_type: Set(reference_type),
            reference_id: Set(reference_id),
            note: Set(request.note.clone()),
            label: Set(request.label.clone()),
            active: Set(true),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;

        let mut low_stock_threshold = None;
        if request.site_id.is_none() {
            let updated = self
                .store_general_balance(conn, item, resulting_balance)
                .await?;
            if updated.is_low() {
                low_stock_threshold = updated.low_stock_threshold;
            }
        }

        counter!("sitestock.stock.adjustments", 1, "kind" => request.kind.as_str());
        info!(
            entry_id = entry.id,
            item_id = entry.item_id,
            site_id = ?entry.site_id,
            previous_balance,
            resulting_balance,
            "Stock {} recorded",
            request.kind.as_str()
        );

        Ok(StockAdjustment {
            entry,
            previous_balance,
            low_stock_threshold,
        })
    }

    /// Current balance of an (item, pool) pair. Unknown items read as 0.
    pub async fn current_balance(
        &self,
        item_id: i64,
        site_id: Option<i64>,
        partition: Option<Partition>,
    ) -> Result<i64, ServiceError> {
        self.current_balance_in(self.db_pool.as_ref(), item_id, site_id, partition)
            .await
    }

    pub async fn current_balance_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        item_id: i64,
        site_id: Option<i64>,
        partition: Option<Partition>,
    ) -> Result<i64, ServiceError> {
        match Item::find_by_id(item_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
        {
            Some(item) => self.balance_for(conn, &item, site_id, partition).await,
            None => Ok(0),
        }
    }

    /// Site pool plus general pool, or the general pool alone without a site.
    pub async fn available(&self, item_id: i64, site_id: Option<i64>) -> Result<i64, ServiceError> {
        self.available_in(self.db_pool.as_ref(), item_id, site_id)
            .await
    }

    pub async fn available_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        item_id: i64,
        site_id: Option<i64>,
    ) -> Result<i64, ServiceError> {
        let general = self.current_balance_in(conn, item_id, None, None).await?;
        let site = match site_id {
            Some(site) => self
                .current_balance_in(conn, item_id, Some(site), None)
                .await?
                .max(0),
            None => 0,
        };
        Ok(general.saturating_add(site))
    }

    /// Soft-deletes a ledger row. The pool's balance falls back to the
    /// previous active row. Voiding an already voided row is a no-op.
    #[instrument(skip(self))]
    pub async fn void_entry(&self, entry_id: i64) -> Result<stock_ledger_entry::Model, ServiceError> {
        let txn = self.db_pool.begin().await.map_err(ServiceError::db_error)?;

        let (entry, changed) = match self.void_entry_in(&txn, entry_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!("Failed to roll back ledger void: {}", rollback_err);
                }
                return Err(e);
            }
        };

        txn.commit().await.map_err(ServiceError::db_error)?;

        if changed {
            info!(entry_id, item_id = entry.item_id, "Ledger entry voided");
            self.event_sender.publish(Event::LedgerEntryVoided {
                entry_id,
                item_id: entry.item_id,
            });
        }
        Ok(entry)
    }

    async fn void_entry_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        entry_id: i64,
    ) -> Result<(stock_ledger_entry::Model, bool), ServiceError> {
        let entry = StockLedgerEntry::find_by_id(entry_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Ledger entry {} not found", entry_id)))?;

        if !entry.active {
            return Ok((entry, false));
        }

        let item = Item::find_by_id(entry.item_id)
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or(ServiceError::ItemNotFound(entry.item_id))?;

        let mut active: stock_ledger_entry::ActiveModel = entry.into();
        active.active = Set(false);
        let voided = active.update(conn).await.map_err(ServiceError::db_error)?;

        if voided.is_general_pool() {
            let balance = self.balance_for(conn, &item, None, None).await?;
            self.store_general_balance(conn, item, balance).await?;
        }

        Ok((voided, true))
    }

    /// Ledger rows for an item, newest first, voided rows included. Without a
    /// site every pool is returned.
    pub async fn history(
        &self,
        item_id: i64,
        site_id: Option<i64>,
        limit: u64,
    ) -> Result<Vec<stock_ledger_entry::Model>, ServiceError> {
        let mut query =
            StockLedgerEntry::find().filter(stock_ledger_entry::Column::ItemId.eq(item_id));
        if let Some(site) = site_id {
            query = query.filter(stock_ledger_entry::Column::SiteId.eq(site));
        }

        query
            .order_by_desc(stock_ledger_entry::Column::CreatedAt)
            .order_by_desc(stock_ledger_entry::Column::Id)
            .limit(limit)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Locks item rows in ascending id order. Missing ids are absent from the map.
    pub async fn lock_items<C: ConnectionTrait>(
        &self,
        conn: &C,
        mut ids: Vec<i64>,
    ) -> Result<BTreeMap<i64, item::Model>, ServiceError> {
        ids.sort_unstable();
        ids.dedup();

        let mut locked = BTreeMap::new();
        for id in ids {
            if let Some(item) = Item::find_by_id(id)
                .lock_exclusive()
                .one(conn)
                .await
                .map_err(ServiceError::db_error)?
            {
                locked.insert(id, item);
            }
        }
        Ok(locked)
    }

    async fn balance_for<C: ConnectionTrait>(
        &self,
        conn: &C,
        item: &item::Model,
        site_id: Option<i64>,
        partition: Option<Partition>,
    ) -> Result<i64, ServiceError> {
        if let Some(partition) = partition {
            if !item.kind.accepts(partition) {
                return Ok(0);
            }
        }

        let latest = latest_entry(conn, item.id, site_id, Some(item.kind.partition())).await?;
        Ok(match (latest, site_id) {
            (Some(entry), _) => entry.resulting_balance,
            (None, None) => item.opening_balance,
            (None, Some(_)) => 0,
        })
    }

    async fn resolve_partition<C: ConnectionTrait>(
        &self,
        conn: &C,
        item: &item::Model,
        site_id: Option<i64>,
        requested: Option<Partition>,
    ) -> Result<Partition, ServiceError> {
        let canonical = item.kind.partition();
        if !self.enforce_partition {
            return Ok(canonical);
        }

        if let Some(requested) = requested {
            if !item.kind.accepts(requested) {
                return Err(ServiceError::PartitionMismatch {
                    item_id: item.id,
                    expected: canonical.as_str().to_string(),
                    found: requested.as_str().to_string(),
                });
            }
        }

        // Rows written before a reclassification must not be continued under
        // the new partition.
        if let Some(latest) = latest_entry(conn, item.id, site_id, None).await? {
            if latest.partition != canonical {
                return Err(ServiceError::PartitionMismatch {
                    item_id: item.id,
                    expected: canonical.as_str().to_string(),
                    found: latest.partition.as_str().to_string(),
                });
            }
        }

        Ok(canonical)
    }

    async fn store_general_balance<C: ConnectionTrait>(
        &self,
        conn: &C,
        item: item::Model,
        balance: i64,
    ) -> Result<item::Model, ServiceError> {
        let mut active: item::ActiveModel = item.into();
        active.general_balance = Set(balance);
        active.updated_at = Set(Utc::now());
        active.update(conn).await.map_err(ServiceError::db_error)
    }
}
