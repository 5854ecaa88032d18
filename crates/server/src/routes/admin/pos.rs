//! Point of sale: scanning, counter sales and receipts.
//!
//! A counter sale is paid and handed over on the spot, so it is stored as
//! delivered. Receipts are rendered here as ESC/POS bytes; the browser sends
//! them to a Bluetooth printer using the profile for its model.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use tienda_core::{OrderChannel, OrderId, OrderStatus, PaymentMethod, cash_change};
use tienda_printer::driver::KNOWN_PRINTER_SERVICES;
use tienda_printer::profile::{GENERIC, PROFILES};
use tienda_printer::{DeviceProfile, PaperWidth, Receipt, ReceiptItem, ReceiptLayout};

use crate::config::StoreConfig;
use crate::db::orders::NewOrder;
use crate::db::{OrderRepository, ProductRepository};
use crate::error::{AppError, Result};
use crate::models::{OrderWithItems, PricedVariant};
use crate::services::{CartItemInput, price_cart};
use crate::state::AppState;

/// Customer name on walk-in sales.
const WALK_IN_CUSTOMER: &str = "Mostrador";

#[derive(Debug, Deserialize)]
pub struct SaleRequest {
    pub items: Vec<CartItemInput>,
    #[serde(default, alias = "cupon")]
    pub coupon: Option<String>,
    #[serde(alias = "metodo_pago")]
    pub payment_method: PaymentMethod,
    /// Cash handed over; required for cash sales.
    #[serde(default, alias = "recibido")]
    pub amount_received: Option<Decimal>,
    #[serde(default, alias = "cliente")]
    pub customer_name: Option<String>,
    #[serde(default, alias = "correo")]
    pub customer_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SaleResponse {
    #[serde(flatten)]
    pub order: OrderWithItems,
    pub receipt: Ticket,
}

#[derive(Debug, Default, Deserialize)]
pub struct TicketQuery {
    #[serde(alias = "ancho")]
    pub width: Option<PaperWidth>,
}

/// A rendered receipt.
#[derive(Debug, Serialize)]
pub struct Ticket {
    pub width: PaperWidth,
    /// Plain-text preview, one entry per printed line.
    pub lines: Vec<String>,
    /// ESC/POS bytes, base64-encoded.
    pub escpos: String,
}

#[derive(Debug, Serialize)]
pub struct PrinterService {
    pub service: Uuid,
    pub characteristic: Uuid,
}

#[derive(Debug, Serialize)]
pub struct PrintersResponse {
    pub profiles: Vec<&'static DeviceProfile>,
    pub fallback: &'static DeviceProfile,
    /// GATT services to request access to, in preference order.
    pub services: Vec<PrinterService>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/escanear/{code}", get(scan))
        .route("/ventas", post(sale))
        .route("/ventas/{id}/ticket", get(ticket))
        .route("/impresoras", get(printers))
}

/// Look a variant up by barcode or SKU.
pub async fn scan(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<PricedVariant>> {
    let code = code.trim();
    if code.is_empty() {
        return Err(AppError::BadRequest("empty code".to_string()));
    }
    ProductRepository::new(state.pool())
        .find_by_code(code)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no product with code {code}")))
}

/// Cash received and change due for a payment method.
///
/// Only cash sales record what was handed over.
fn settle(
    method: PaymentMethod,
    total: Decimal,
    received: Option<Decimal>,
) -> Result<(Option<Decimal>, Option<Decimal>)> {
    if method != PaymentMethod::Cash {
        return Ok((None, None));
    }
    let received = received.ok_or_else(|| {
        AppError::BadRequest("amount_received is required for cash sales".to_string())
    })?;
    let change = cash_change(total, received)?;
    Ok((Some(received), Some(change)))
}

/// Ring up a counter sale.
#[instrument(skip(state, request), fields(items = request.items.len(), method = %request.payment_method))]
pub async fn sale(
    State(state): State<AppState>,
    Json(request): Json<SaleRequest>,
) -> Result<(StatusCode, Json<SaleResponse>)> {
    let cart = price_cart(
        state.pool(),
        &request.items,
        request.coupon.as_deref(),
        Decimal::ZERO,
        Utc::now(),
    )
    .await?;
    let (amount_received, change_given) =
        settle(request.payment_method, cart.totals.total, request.amount_received)?;

    let new = NewOrder {
        channel: OrderChannel::Pos,
        status: OrderStatus::Delivered,
        payment_method: request.payment_method,
        customer_name: request
            .customer_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| WALK_IN_CUSTOMER.to_string()),
        customer_email: request
            .customer_email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty()),
        customer_phone: None,
        shipping_address: None,
        subtotal: cart.totals.subtotal,
        discount: cart.totals.discount,
        shipping_cost: Decimal::ZERO,
        total: cart.totals.total,
        coupon_id: cart.coupon.as_ref().map(|c| c.id),
        amount_received,
        change_given,
        shipping_provider: None,
        shipping_carrier: None,
        shipping_service: None,
        notes: None,
        items: cart.order_items(),
    };

    let order = OrderRepository::new(state.pool()).create(&new).await?;
    tracing::info!(
        order_number = order.order.number,
        total = %order.order.total,
        "Counter sale recorded"
    );

    let store = &state.config().store;
    let receipt = render(&receipt_for(store, &order), store.paper_width);
    Ok((StatusCode::CREATED, Json(SaleResponse { order, receipt })))
}

/// Receipt for a stored order, for reprints.
pub async fn ticket(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Query(query): Query<TicketQuery>,
) -> Result<Json<Ticket>> {
    let order = OrderRepository::new(state.pool()).get_with_items(id).await?;
    let store = &state.config().store;
    let width = query.width.unwrap_or(store.paper_width);
    Ok(Json(render(&receipt_for(store, &order), width)))
}

pub async fn printers() -> Json<PrintersResponse> {
    Json(PrintersResponse {
        profiles: PROFILES.iter().collect(),
        fallback: &GENERIC,
        services: KNOWN_PRINTER_SERVICES
            .iter()
            .map(|&(service, characteristic)| PrinterService {
                service,
                characteristic,
            })
            .collect(),
    })
}

fn receipt_for(store: &StoreConfig, order: &OrderWithItems) -> Receipt {
    let o = &order.order;
    Receipt {
        store_name: store.name.clone(),
        header_lines: store.receipt_header.clone(),
        order_number: o.number.to_string(),
        issued_at: o.created_at,
        items: order
            .items
            .iter()
            .map(|item| ReceiptItem {
                name: item.display_name(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.line_total,
            })
            .collect(),
        subtotal: o.subtotal,
        discount: o.discount,
        total: o.total,
        payment_method: o.payment_method,
        amount_received: o.amount_received,
        change: o.change_given,
        footer_lines: store.receipt_footer.clone(),
    }
}

fn render(receipt: &Receipt, width: PaperWidth) -> Ticket {
    let layout = ReceiptLayout::new(width);
    Ticket {
        width,
        lines: layout.text_lines(receipt),
        escpos: BASE64.encode(layout.render(receipt)),
    }
}
