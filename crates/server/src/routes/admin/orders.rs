//! Order back office: listing, detail and status changes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch},
};
use serde::Deserialize;

use tienda_core::{OrderId, OrderStatus};

use crate::db::OrderRepository;
use crate::db::orders::OrderFilter;
use crate::error::Result;
use crate::models::{Order, OrderWithItems};
use crate::routes::{Page, PageQuery};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    #[serde(alias = "estado")]
    pub status: OrderStatus,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/{id}", get(show))
        .route("/{id}/estado", patch(update_status))
}

pub async fn index(
    State(state): State<AppState>,
    Query(filter): Query<OrderFilter>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<Order>>> {
    let bounds = page.bounds();
    let (orders, total) = OrderRepository::new(state.pool())
        .list(&filter, bounds.0, bounds.1)
        .await?;
    Ok(Json(Page::new(orders, total, bounds)))
}

pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderWithItems>> {
    Ok(Json(
        OrderRepository::new(state.pool()).get_with_items(id).await?,
    ))
}

/// Move an order along the status machine.
///
/// Cancelling restocks the lines and gives the coupon use back.
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Json(body): Json<StatusBody>,
) -> Result<Json<Order>> {
    Ok(Json(
        OrderRepository::new(state.pool())
            .update_status(id, body.status)
            .await?,
    ))
}
