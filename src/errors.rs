use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// Error body returned by every HTTP handler
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Unprocessable Entity")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Structured details, e.g. the list of short items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// ISO 8601 timestamp when error occurred
    pub timestamp: String,
}

/// One item that could not cover the requested quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockShortage {
    pub item_id: i64,
    pub site_id: Option<i64>,
    pub available: i64,
    pub requested: i64,
}

impl fmt::Display for StockShortage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.site_id {
            Some(site) => write!(
                f,
                "item {} (site {}): available {}, requested {}",
                self.item_id, site, self.available, self.requested
            ),
            None => write!(
                f,
                "item {}: available {}, requested {}",
                self.item_id, self.available, self.requested
            ),
        }
    }
}

fn describe_shortages(shortages: &[StockShortage]) -> String {
    shortages
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Item {0} not found")]
    ItemNotFound(i64),

    #[error("Invalid quantity {0}: quantity must be greater than zero")]
    InvalidQuantity(i64),

    #[error("Insufficient stock: {}", describe_shortages(.0))]
    InsufficientStock(Vec<StockShortage>),

    #[error("Partition mismatch for item {item_id}: expected {expected}, found {found}")]
    PartitionMismatch {
        item_id: i64,
        expected: String,
        found: String,
    },

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Order {0} can only be deleted while every channel is pending")]
    OrderNotDeletable(Uuid),

    #[error("Item {item_id} is procured by purchase order and needs a supplier")]
    SupplierRequired { item_id: i64 },

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::InternalError(format!("serialization failed: {}", err))
    }
}

impl ServiceError {
    pub fn db_error(error: DbErr) -> Self {
        ServiceError::DatabaseError(error)
    }

    /// Quantity arithmetic that left the i64 range.
    pub fn quantity_overflow(detail: impl fmt::Display) -> Self {
        ServiceError::ValidationError(format!("quantity out of range: {}", detail))
    }

    /// Shortcut for the single-item shortage case.
    pub fn insufficient(item_id: i64, site_id: Option<i64>, available: i64, requested: i64) -> Self {
        ServiceError::InsufficientStock(vec![StockShortage {
            item_id,
            site_id,
            available,
            requested,
        }])
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) | Self::ItemNotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidQuantity(_) | Self::SupplierRequired { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::InsufficientStock(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PartitionMismatch { .. }
            | Self::InvalidTransition { .. }
            | Self::OrderNotDeletable(_) => StatusCode::CONFLICT,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Storage failures return a generic message.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InsufficientStock(shortages) => Some(json!({ "shortages": shortages })),
            Self::InvalidTransition { from, to } => Some(json!({ "from": from, "to": to })),
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            message: self.response_message(),
            details: self.details(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}
