//! Unified error handling with Sentry integration.
//!
//! Every handler returns `Result<T, AppError>`. Errors become a JSON body
//! `{"error": "..."}`; server-side failures are captured to Sentry and their
//! details are kept out of the response.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use tienda_core::{CartError, CouponError};
use tienda_shipping::ShippingError;

use crate::db::RepositoryError;
use crate::services::realtime::RealtimeError;

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Carrier integration failed.
    #[error("Shipping error: {0}")]
    Shipping(#[from] ShippingError),

    /// Chat relay failed.
    #[error("Realtime error: {0}")]
    Realtime(#[from] RealtimeError),

    /// Coupon does not apply.
    #[error("{0}")]
    Coupon(#[from] CouponError),

    /// Cart arithmetic rejected the input.
    #[error("{0}")]
    Cart(#[from] CartError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The request conflicts with current state (stock, status, usage).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A feature is not configured on this deployment.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Database(RepositoryError::NotFound) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(RepositoryError::Conflict(_)) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Shipping(err) => match err {
                ShippingError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                ShippingError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
                err if err.is_client_error() => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Realtime(_) => StatusCode::BAD_GATEWAY,
            Self::Coupon(_) | Self::Cart(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Database(RepositoryError::NotFound) => "Not found".to_string(),
            Self::Database(RepositoryError::Conflict(msg)) => msg.clone(),
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Shipping(err) if err.is_client_error() => err.to_string(),
            Self::Shipping(ShippingError::RateLimited { .. } | ShippingError::NotConfigured(_)) => {
                self.to_string()
            }
            Self::Shipping(_) => "Shipping carrier unavailable, try again later".to_string(),
            Self::Realtime(_) => "Chat relay unavailable".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
