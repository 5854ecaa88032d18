//! Cart pricing preview.

use axum::{Json, Router, extract::State, routing::post};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::Result;
use crate::services::{CartItemInput, PricedCart, price_cart};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TotalsRequest {
    pub items: Vec<CartItemInput>,
    #[serde(default, alias = "cupon")]
    pub coupon: Option<String>,
    /// Shipping cost from a previous quote, shown in the preview only.
    #[serde(default, alias = "envio")]
    pub shipping_cost: Option<Decimal>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/totales", post(totals))
}

/// Price the cart from the catalog with stock checked.
pub async fn totals(
    State(state): State<AppState>,
    Json(request): Json<TotalsRequest>,
) -> Result<Json<PricedCart>> {
    let cart = price_cart(
        state.pool(),
        &request.items,
        request.coupon.as_deref(),
        request.shipping_cost.unwrap_or(Decimal::ZERO),
        Utc::now(),
    )
    .await?;
    Ok(Json(cart))
}
