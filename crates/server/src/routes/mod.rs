//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! # Catalog
//! GET  /api/productos                              - Product listing (q, categoria, page, per_page)
//! GET  /api/productos/categorias                   - Categories with active products
//! GET  /api/productos/{slug}                       - Product detail with variants
//!
//! # Cart and checkout
//! POST /api/cupones/validar                        - Check a coupon against a subtotal
//! POST /api/carrito/totales                        - Price a cart from the catalog
//! POST /api/ordenes                                - Place an online order
//! GET  /api/ordenes/{number}?email=                - Order lookup for the customer
//!
//! # Shipping
//! POST /api/envia/cotizar                          - Quote with Envia
//! POST /api/skydropx/cotizar                       - Quote with Skydropx
//! POST /api/envia/guia                             - Buy an Envia label for an order
//! POST /api/skydropx/guia                          - Buy a Skydropx label for an order
//!
//! # Support chat
//! POST /api/chat/conversaciones                    - Open a conversation
//! GET  /api/chat/conversaciones/{id}/mensajes      - Read messages (after=)
//! POST /api/chat/conversaciones/{id}/mensajes      - Customer message
//! POST /api/chat/token                             - Realtime token for one conversation
//!
//! # Back office (see `admin`)
//! /api/admin/...
//! ```

pub mod admin;
pub mod cart;
pub mod chat;
pub mod coupons;
pub mod orders;
pub mod products;
pub mod shipping;

use axum::Router;
use serde::{Deserialize, Serialize};

use crate::db::page_bounds;
use crate::state::AppState;

/// Pagination query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    #[serde(alias = "pagina")]
    pub page: Option<u32>,
    #[serde(alias = "por_pagina")]
    pub per_page: Option<u32>,
}

impl PageQuery {
    /// `(limit, offset)` for SQL.
    #[must_use]
    pub fn bounds(self) -> (i64, i64) {
        page_bounds(self.page, self.per_page)
    }
}

/// A page of results with the total match count.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, total: i64, (limit, offset): (i64, i64)) -> Self {
        Self {
            items,
            total,
            page: offset / limit.max(1) + 1,
            per_page: limit,
        }
    }
}

/// Create all API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/api/productos", products::router())
        .nest("/api/cupones", coupons::router())
        .nest("/api/carrito", cart::router())
        .nest("/api/ordenes", orders::router())
        .nest("/api/chat", chat::router())
        .nest("/api", shipping::router())
        .nest("/api/admin", admin::router())
}
