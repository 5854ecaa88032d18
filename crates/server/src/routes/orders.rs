//! Online checkout and customer order lookup.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use tienda_core::{OrderChannel, OrderStatus, PaymentMethod};
use tienda_shipping::{AddressInput, ProviderKind};

use crate::db::OrderRepository;
use crate::db::orders::NewOrder;
use crate::error::{AppError, Result};
use crate::models::OrderWithItems;
use crate::routes::shipping::quote_cart_shipping;
use crate::services::{CartItemInput, price_cart};
use crate::state::AppState;

/// Who is buying.
#[derive(Debug, Deserialize)]
pub struct CustomerInput {
    #[serde(alias = "nombre")]
    pub name: String,
    #[serde(alias = "correo")]
    pub email: String,
    #[serde(default, alias = "telefono")]
    pub phone: Option<String>,
}

/// The carrier and service picked from a quote.
#[derive(Debug, Clone, Deserialize)]
pub struct ShippingChoice {
    pub provider: ProviderKind,
    pub carrier: String,
    pub service: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    #[serde(alias = "cliente")]
    pub customer: CustomerInput,
    pub items: Vec<CartItemInput>,
    #[serde(default, alias = "cupon")]
    pub coupon: Option<String>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default, alias = "direccion")]
    pub shipping_address: Option<AddressInput>,
    #[serde(default, alias = "envio")]
    pub shipping: Option<ShippingChoice>,
    #[serde(default, alias = "notas")]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub email: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(checkout))
        .route("/{number}", get(show))
}

/// Trimmed, required customer fields.
fn validate_customer(customer: &CustomerInput) -> Result<(String, String)> {
    let name = customer.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("customer name is required".to_string()));
    }
    let email = customer.email.trim();
    if !email.contains('@') || email.len() < 3 {
        return Err(AppError::BadRequest("a valid email is required".to_string()));
    }
    Ok((name.to_string(), email.to_lowercase()))
}

/// Place an online order.
///
/// Prices, the coupon and the shipping cost are all recomputed here; the
/// order is stored pending payment with its stock already taken.
#[instrument(skip(state, request), fields(items = request.items.len()))]
pub async fn checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderWithItems>)> {
    let (customer_name, customer_email) = validate_customer(&request.customer)?;
    if request.shipping.is_some() && request.shipping_address.is_none() {
        return Err(AppError::BadRequest(
            "a shipping address is required to ship an order".to_string(),
        ));
    }

    let mut cart = price_cart(
        state.pool(),
        &request.items,
        request.coupon.as_deref(),
        Decimal::ZERO,
        Utc::now(),
    )
    .await?;

    if let (Some(choice), Some(address)) = (&request.shipping, &request.shipping_address) {
        let cost = quote_cart_shipping(&state, choice, address, &cart).await?;
        cart = cart.with_shipping(cost)?;
    }

    let new = NewOrder {
        channel: OrderChannel::Online,
        status: OrderStatus::Pending,
        payment_method: request.payment_method,
        customer_name,
        customer_email: Some(customer_email),
        customer_phone: request
            .customer
            .phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty()),
        shipping_address: request.shipping_address,
        subtotal: cart.totals.subtotal,
        discount: cart.totals.discount,
        shipping_cost: cart.totals.shipping,
        total: cart.totals.total,
        coupon_id: cart.coupon.as_ref().map(|c| c.id),
        amount_received: None,
        change_given: None,
        shipping_provider: request.shipping.as_ref().map(|s| s.provider),
        shipping_carrier: request.shipping.as_ref().map(|s| s.carrier.clone()),
        shipping_service: request.shipping.as_ref().map(|s| s.service.clone()),
        notes: request.notes.filter(|n| !n.trim().is_empty()),
        items: cart.order_items(),
    };

    let order = OrderRepository::new(state.pool()).create(&new).await?;
    tracing::info!(
        order_number = order.order.number,
        total = %order.order.total,
        "Online order placed"
    );

    if let Some(email) = state.email()
        && let Err(e) = email.send_order_confirmation(&order).await
    {
        tracing::warn!(order_number = order.order.number, error = %e, "Order confirmation email failed");
    }

    Ok((StatusCode::CREATED, Json(order)))
}

/// Order status for the customer, who proves ownership with their email.
pub async fn show(
    State(state): State<AppState>,
    Path(number): Path<i64>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<OrderWithItems>> {
    let not_found = || AppError::NotFound(format!("order {number}"));

    let order = OrderRepository::new(state.pool())
        .get_by_number(number)
        .await?
        .ok_or_else(not_found)?;

    let matches = order
        .order
        .customer_email
        .as_deref()
        .is_some_and(|email| email.eq_ignore_ascii_case(query.email.trim()));
    if !matches {
        return Err(not_found());
    }

    Ok(Json(order))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(name: &str, email: &str) -> CustomerInput {
        CustomerInput {
            name: name.to_string(),
            email: email.to_string(),
            phone: None,
        }
    }

    #[test]
    fn test_validate_customer() {
        let (name, email) = validate_customer(&customer(" Ana López ", " Ana@Example.com ")).expect("valid");
        assert_eq!(name, "Ana López");
        assert_eq!(email, "ana@example.com");

        assert!(matches!(
            validate_customer(&customer("  ", "ana@example.com")),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            validate_customer(&customer("Ana", "sin-correo")),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_checkout_request_accepts_spanish_keys() {
        let request: CheckoutRequest = serde_json::from_str(
            r#"{
                "cliente": {"nombre": "Ana", "correo": "ana@example.com"},
                "items": [{"variante_id": 3, "cantidad": 1}],
                "cupon": "VERANO10",
                "envio": {"provider": "envia", "carrier": "estafeta", "service": "ground"}
            }"#,
        )
        .expect("request");

        assert_eq!(request.payment_method, PaymentMethod::default());
        assert_eq!(request.coupon.as_deref(), Some("VERANO10"));
        assert_eq!(request.shipping.map(|s| s.provider), Some(ProviderKind::Envia));
    }
}
