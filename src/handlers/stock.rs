use axum::{
    extract::{Path, Query, State},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::common::{created_response, success_response, validate_input, PoolParams};
use crate::{
    entities::{AdjustmentKind, Partition},
    errors::ServiceError,
    services::stock::{AdjustStock, StockReference},
    AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct AdjustStockRequest {
    pub item_id: i64,
    #[validate(range(min = 1))]
    pub quantity: i64,
    pub kind: AdjustmentKind,
    pub site_id: Option<i64>,
    pub partition: Option<Partition>,
    #[validate(length(max = 1000))]
    pub note: Option<String>,
    #[validate(length(max = 255))]
    pub label: Option<String>,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
}

impl From<AdjustStockRequest> for AdjustStock {
    fn from(request: AdjustStockRequest) -> Self {
        let mut adjust = AdjustStock::new(request.item_id, request.quantity, request.kind)
            .at_site(request.site_id);
        adjust.partition = request.partition;
        adjust.note = request.note;
        adjust.label = request.label;
        if let (Some(reference_type), Some(reference_id)) =
            (request.reference_type, request.reference_id)
        {
            adjust.reference = Some(StockReference::new(reference_type, reference_id));
        }
        adjust
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub item_id: i64,
    pub site_id: Option<i64>,
    pub balance: i64,
    /// Site plus general pool
    pub available: i64,
}

/// POST /api/v1/stock/adjustments
pub async fn adjust_stock(
    State(state): State<AppState>,
    Json(request): Json<AdjustStockRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&request)?;

    let adjustment = state.services.stock.adjust(request.into()).await?;
    Ok(created_response(adjustment.entry))
}

/// GET /api/v1/stock/items/:id/balance
pub async fn get_balance(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
    Query(params): Query<PoolParams>,
) -> Result<Response, ServiceError> {
    let stock = &state.services.stock;
    let balance = stock
        .current_balance(item_id, params.site_id, None)
        .await?;
    let available = stock.available(item_id, params.site_id).await?;

    Ok(success_response(BalanceResponse {
        item_id,
        site_id: params.site_id,
        balance,
        available,
    }))
}

/// GET /api/v1/stock/items/:id/ledger
pub async fn get_ledger(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
    Query(params): Query<PoolParams>,
) -> Result<Response, ServiceError> {
    let entries = state
        .services
        .stock
        .history(item_id, params.site_id, params.limit())
        .await?;
    Ok(success_response(entries))
}

/// POST /api/v1/stock/entries/:id/void
pub async fn void_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<i64>,
) -> Result<Response, ServiceError> {
    let entry = state.services.stock.void_entry(entry_id).await?;
    Ok(success_response(entry))
}
