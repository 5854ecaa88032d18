//! Carrier quote and label endpoints.
//!
//! Envia and Skydropx share one flow; the provider comes from the path.
//! Quotes work for a placed order (found by number and customer email) or
//! for an ad-hoc destination and cart. Labels are bought for paid orders
//! and stored on the order at most once.

use axum::{Json, Router, extract::State, routing::post};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tienda_core::OrderId;
use tienda_shipping::rates::find_requested;
use tienda_shipping::{
    AddressInput, Label, LabelOutcome, LabelRequest, ProviderKind, QuoteResult, RateSelector,
    ShippingError,
};

use crate::db::OrderRepository;
use crate::db::orders::StoredLabel;
use crate::error::{AppError, Result};
use crate::models::Order;
use crate::routes::orders::ShippingChoice;
use crate::services::{CartItemInput, PricedCart, price_cart};
use crate::state::AppState;

/// What to quote: a placed order, or a destination with a cart.
#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    #[serde(default, alias = "orden")]
    pub order_number: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "destino")]
    pub destination: Option<AddressInput>,
    #[serde(default)]
    pub items: Vec<CartItemInput>,
    /// Overrides the store's ranking for this quote.
    #[serde(default)]
    pub selector: Option<RateSelector>,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub provider: ProviderKind,
    #[serde(flatten)]
    pub quote: QuoteResult,
}

#[derive(Debug, Deserialize)]
pub struct LabelBody {
    pub order_id: OrderId,
    /// Buy a new label even if the order has one.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct LabelResponse {
    /// `true` when this request bought and stored the label.
    pub created: bool,
    pub label: Label,
    pub order: Order,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/envia/cotizar", post(envia_quote))
        .route("/skydropx/cotizar", post(skydropx_quote))
        .route("/envia/guia", post(envia_label))
        .route("/skydropx/guia", post(skydropx_label))
}

pub async fn envia_quote(
    State(state): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>> {
    quote(&state, ProviderKind::Envia, request).await.map(Json)
}

pub async fn skydropx_quote(
    State(state): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>> {
    quote(&state, ProviderKind::Skydropx, request).await.map(Json)
}

pub async fn envia_label(
    State(state): State<AppState>,
    Json(body): Json<LabelBody>,
) -> Result<Json<LabelResponse>> {
    label(&state, ProviderKind::Envia, body).await.map(Json)
}

pub async fn skydropx_label(
    State(state): State<AppState>,
    Json(body): Json<LabelBody>,
) -> Result<Json<LabelResponse>> {
    label(&state, ProviderKind::Skydropx, body).await.map(Json)
}

#[instrument(skip(state, request), fields(provider = %kind))]
async fn quote(state: &AppState, kind: ProviderKind, request: QuoteRequest) -> Result<QuoteResponse> {
    let shipping = state.shipping();
    // Fail before touching the database when the carrier is off.
    shipping.provider(kind)?;

    let shipment = match (request.order_number, request.destination) {
        (Some(number), _) => {
            let email = request.email.as_deref().map(str::trim).unwrap_or_default();
            let orders = OrderRepository::new(state.pool());
            let order = orders
                .get_by_number(number)
                .await?
                .filter(|o| {
                    o.order
                        .customer_email
                        .as_deref()
                        .is_some_and(|e| e.eq_ignore_ascii_case(email))
                })
                .ok_or_else(|| AppError::NotFound(format!("order {number}")))?;
            let order = order.order;
            let address = order.shipping_address.as_ref().ok_or_else(|| {
                AppError::BadRequest("order has no shipping address".to_string())
            })?;
            let items = orders.item_dimensions(order.id).await?;
            shipping.shipment(
                address,
                &items,
                order.subtotal - order.discount,
                Some(order.number.to_string()),
            )?
        }
        (None, Some(destination)) => {
            let cart = price_cart(state.pool(), &request.items, None, Decimal::ZERO, Utc::now()).await?;
            shipping.shipment(&destination, &cart.dimensions(), cart.totals.subtotal, None)?
        }
        (None, None) => {
            return Err(AppError::BadRequest(
                "send an order_number or a destination with items".to_string(),
            ));
        }
    };

    let quote = shipping
        .quote(kind, &shipment, request.selector.as_ref())
        .await?;
    Ok(QuoteResponse {
        provider: kind,
        quote,
    })
}

/// Shipping cost of the rate a customer picked, quoted again server-side.
///
/// # Errors
///
/// Returns `ShippingError::RateUnavailable` when the carrier no longer offers
/// the chosen service.
pub(crate) async fn quote_cart_shipping(
    state: &AppState,
    choice: &ShippingChoice,
    address: &AddressInput,
    cart: &PricedCart,
) -> Result<Decimal> {
    let shipping = state.shipping();
    let shipment = shipping.shipment(address, &cart.dimensions(), cart.totals.subtotal, None)?;
    let quote = shipping.quote(choice.provider, &shipment, None).await?;

    find_requested(&quote.rates, &choice.carrier, &choice.service)
        .map(|rate| rate.price)
        .ok_or_else(|| {
            AppError::Shipping(ShippingError::RateUnavailable {
                carrier: choice.carrier.clone(),
                service: choice.service.clone(),
            })
        })
}

/// What a label request for an order should do before any carrier call.
#[derive(Debug, PartialEq, Eq)]
enum LabelPlan {
    /// The order already has a label and no new one was asked for.
    Stored(Label),
    /// Buy a label, matching the customer's choice when there is one.
    Buy { requested: Option<(String, String)> },
}

/// Decide whether `kind` may buy a label for `order`.
///
/// A stored label is returned whatever the order status, so repeating a
/// request is safe even after delivery.
fn plan_label(order: &Order, kind: ProviderKind, force: bool) -> Result<LabelPlan> {
    if let Some(stored) = order.label.as_ref().filter(|_| !force) {
        return Ok(LabelPlan::Stored(Label::from(stored)));
    }

    if !order.status.is_shippable() {
        return Err(AppError::Conflict(format!(
            "order is {}, only paid orders can be shipped",
            order.status
        )));
    }

    match order.shipping_provider {
        Some(chosen) if chosen != kind && !force => Err(AppError::Conflict(format!(
            "the customer chose {chosen} shipping; buy the label through /api/{chosen}/guia \
             or set force to take the best {kind} rate"
        ))),
        Some(chosen) if chosen != kind => Ok(LabelPlan::Buy { requested: None }),
        _ => Ok(LabelPlan::Buy {
            requested: order.requested_rate(),
        }),
    }
}

#[instrument(skip(state), fields(provider = %kind, order_id = %body.order_id))]
async fn label(state: &AppState, kind: ProviderKind, body: LabelBody) -> Result<LabelResponse> {
    let orders = OrderRepository::new(state.pool());
    let order = orders.get(body.order_id).await?;

    let requested = match plan_label(&order, kind, body.force)? {
        LabelPlan::Stored(label) => {
            return Ok(LabelResponse {
                created: false,
                label,
                order,
            });
        }
        LabelPlan::Buy { requested } => requested,
    };

    let address = order
        .shipping_address
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("order has no shipping address".to_string()))?;

    let items = orders.item_dimensions(order.id).await?;
    let shipment = state.shipping().shipment(
        address,
        &items,
        order.subtotal - order.discount,
        Some(order.number.to_string()),
    )?;

    let request = LabelRequest {
        shipment,
        existing: order.label.as_ref().map(Label::from),
        force: body.force,
        requested,
    };

    let label = match state.shipping().label(kind, request).await? {
        LabelOutcome::Created { label, .. } => label,
        LabelOutcome::AlreadyLabeled { label } => {
            return Ok(LabelResponse {
                created: false,
                label,
                order,
            });
        }
    };

    match orders.record_label(order.id, &label, body.force).await? {
        StoredLabel::Saved(saved) => {
            notify_shipped(state, &saved).await;
            Ok(LabelResponse {
                created: true,
                label,
                order: saved,
            })
        }
        StoredLabel::Existing(existing) => {
            let stored = existing
                .label
                .as_ref()
                .map_or_else(|| label.clone(), Label::from);
            Ok(LabelResponse {
                created: false,
                label: stored,
                order: existing,
            })
        }
    }
}

/// Email the tracking number; failures are logged and do not undo the label.
async fn notify_shipped(state: &AppState, order: &Order) {
    let (Some(email), Some(to), Some(label)) = (
        state.email(),
        order.customer_email.as_deref(),
        order.label.as_ref(),
    ) else {
        return;
    };

    if let Err(e) = email
        .send_shipment_notification(to, &order.customer_name, order.number, label)
        .await
    {
        tracing::warn!(order_number = order.number, error = %e, "Shipment email failed");
    }
}

#[cfg(test)]
mod tests {
    use tienda_core::{OrderChannel, OrderStatus, PaymentMethod};

    use super::*;
    use crate::models::OrderLabel;

    fn order(status: OrderStatus) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(12),
            number: 1012,
            channel: OrderChannel::Online,
            status,
            payment_method: PaymentMethod::Card,
            customer_name: "Ana López".to_string(),
            customer_email: Some("ana@example.com".to_string()),
            customer_phone: None,
            shipping_address: None,
            subtotal: Decimal::new(69900, 2),
            discount: Decimal::ZERO,
            shipping_cost: Decimal::new(14950, 2),
            total: Decimal::new(84850, 2),
            coupon_id: None,
            amount_received: None,
            change_given: None,
            shipping_provider: Some(ProviderKind::Envia),
            shipping_carrier: Some("fedex".to_string()),
            shipping_service: Some("ground".to_string()),
            label: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn labeled(status: OrderStatus) -> Order {
        let mut order = order(status);
        order.label = Some(OrderLabel {
            provider: ProviderKind::Envia,
            carrier: "fedex".to_string(),
            service: "ground".to_string(),
            tracking_number: "794623".to_string(),
            label_url: "https://labels.example/794623.pdf".to_string(),
            tracking_url: None,
            cost: Some(Decimal::new(14950, 2)),
            shipped_at: Some(Utc::now()),
        });
        order
    }

    #[test]
    fn test_delivered_order_returns_stored_label() {
        let order = labeled(OrderStatus::Delivered);

        match plan_label(&order, ProviderKind::Envia, false).expect("plan") {
            LabelPlan::Stored(label) => assert_eq!(label.tracking_number, "794623"),
            other => panic!("expected the stored label, got {other:?}"),
        }

        // The stored label wins even when asked through the other provider.
        assert!(matches!(
            plan_label(&order, ProviderKind::Skydropx, false),
            Ok(LabelPlan::Stored(_))
        ));
    }

    #[test]
    fn test_forced_relabel_requires_shippable_status() {
        assert!(matches!(
            plan_label(&labeled(OrderStatus::Delivered), ProviderKind::Envia, true),
            Err(AppError::Conflict(_))
        ));
        assert_eq!(
            plan_label(&labeled(OrderStatus::Shipped), ProviderKind::Envia, true).expect("plan"),
            LabelPlan::Buy {
                requested: Some(("fedex".to_string(), "ground".to_string()))
            }
        );
    }

    #[test]
    fn test_unpaid_order_cannot_be_labeled() {
        assert!(matches!(
            plan_label(&order(OrderStatus::Pending), ProviderKind::Envia, false),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn test_label_follows_customer_provider() {
        let paid = order(OrderStatus::Paid);

        assert_eq!(
            plan_label(&paid, ProviderKind::Envia, false).expect("plan"),
            LabelPlan::Buy {
                requested: Some(("fedex".to_string(), "ground".to_string()))
            }
        );

        let Err(AppError::Conflict(message)) = plan_label(&paid, ProviderKind::Skydropx, false)
        else {
            panic!("expected a conflict for the other provider");
        };
        assert!(message.contains("/api/envia/guia"), "{message}");

        assert_eq!(
            plan_label(&paid, ProviderKind::Skydropx, true).expect("plan"),
            LabelPlan::Buy { requested: None }
        );
    }

    #[test]
    fn test_counter_order_without_choice_takes_best_rate() {
        let mut paid = order(OrderStatus::Paid);
        paid.shipping_provider = None;
        paid.shipping_carrier = None;
        paid.shipping_service = None;

        assert_eq!(
            plan_label(&paid, ProviderKind::Skydropx, false).expect("plan"),
            LabelPlan::Buy { requested: None }
        );
    }

    #[test]
    fn test_quote_request_for_order() {
        let request: QuoteRequest =
            serde_json::from_str(r#"{"orden": 1042, "email": "ana@example.com"}"#).expect("request");
        assert_eq!(request.order_number, Some(1042));
        assert!(request.destination.is_none());
        assert!(request.items.is_empty());
    }

    #[test]
    fn test_label_body_defaults() {
        let body: LabelBody = serde_json::from_str(r#"{"order_id": 7}"#).expect("body");
        assert_eq!(body.order_id, OrderId::new(7));
        assert!(!body.force);
    }
}
