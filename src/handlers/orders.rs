use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::common::{created_response, no_content_response, success_response, validate_input};
use crate::{
    errors::ServiceError,
    models::{ChannelKey, FulfillmentAction},
    services::{
        fulfillment::TransitionContext,
        orders::{NewOrder, NewOrderLine},
    },
    AppState,
};

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreateOrderRequest {
    pub site_id: Option<i64>,
    #[validate(length(min = 1, message = "an order needs at least one line"))]
    pub lines: Vec<NewOrderLine>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct TransitionRequest {
    pub channel: ChannelKey,
    pub action: FulfillmentAction,
    #[validate(length(max = 1000))]
    pub note: Option<String>,
    #[validate(length(max = 255))]
    pub actor: Option<String>,
}

/// POST /api/v1/orders
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&request)?;

    let aggregate = state
        .services
        .orders
        .create_order(NewOrder {
            site_id: request.site_id,
            lines: request.lines,
        })
        .await?;
    Ok(created_response(aggregate))
}

/// GET /api/v1/orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let aggregate = state.services.orders.get_order(order_id).await?;
    Ok(success_response(aggregate))
}

/// DELETE /api/v1/orders/:id
pub async fn delete_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.orders.delete_order(order_id).await?;
    Ok(no_content_response())
}

/// POST /api/v1/orders/:id/transitions
pub async fn transition_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&request)?;

    let aggregate = state
        .services
        .fulfillment
        .transition(
            order_id,
            request.channel,
            request.action,
            TransitionContext {
                actor: request.actor,
                note: request.note,
            },
        )
        .await?;
    Ok(success_response(aggregate))
}
