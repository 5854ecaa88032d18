//! Coupon validation for the checkout form.

use axum::{Json, Router, extract::State, routing::post};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tienda_core::CouponKind;

use crate::db::CouponRepository;
use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    #[serde(alias = "codigo")]
    pub code: String,
    pub subtotal: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub code: String,
    pub kind: CouponKind,
    pub value: Decimal,
    pub discount: Decimal,
    pub subtotal_after_discount: Decimal,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/validar", post(validate))
}

/// Whether a coupon applies to `subtotal`, and for how much.
pub async fn validate(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>> {
    if request.subtotal < Decimal::ZERO {
        return Err(AppError::BadRequest("subtotal cannot be negative".to_string()));
    }

    let coupon = CouponRepository::new(state.pool())
        .get_by_code(&request.code)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("coupon {}", request.code.trim())))?;

    let discount = coupon.rules.evaluate(request.subtotal, Utc::now())?;

    Ok(Json(ValidateResponse {
        code: coupon.code,
        kind: coupon.rules.kind,
        value: coupon.rules.value,
        discount,
        subtotal_after_discount: request.subtotal - discount,
    }))
}
