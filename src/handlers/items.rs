use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};

use super::common::{created_response, success_response};
use crate::{
    errors::ServiceError,
    services::items::{BomComponent, NewItem},
    AppState,
};

#[derive(Debug, Deserialize, Serialize)]
pub struct SetBomRequest {
    pub components: Vec<BomComponent>,
}

/// POST /api/v1/items
pub async fn create_item(
    State(state): State<AppState>,
    Json(request): Json<NewItem>,
) -> Result<Response, ServiceError> {
    let item = state.services.items.create_item(request).await?;
    Ok(created_response(item))
}

/// GET /api/v1/items/:id
pub async fn get_item(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
) -> Result<Response, ServiceError> {
    let item = state.services.items.get_item(item_id).await?;
    Ok(success_response(item))
}

/// PUT /api/v1/items/:id/bom
pub async fn set_bom(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
    Json(request): Json<SetBomRequest>,
) -> Result<Response, ServiceError> {
    let lines = state
        .services
        .items
        .set_bom(item_id, request.components)
        .await?;
    Ok(success_response(lines))
}

/// GET /api/v1/items/:id/bom
pub async fn get_bom(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
) -> Result<Response, ServiceError> {
    state.services.items.get_item(item_id).await?;
    let lines = state.services.items.get_bom(item_id).await?;
    Ok(success_response(lines))
}
