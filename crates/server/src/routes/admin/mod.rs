//! Back-office routes under `/api/admin`.
//!
//! ```text
//! GET|POST          /productos                         - List (incl. inactive) / create
//! GET|PUT|DELETE    /productos/{id}                    - Detail / replace / delete
//! GET|POST          /productos/{id}/variantes          - Variants / add variant with opening stock
//! PUT|DELETE        /variantes/{id}                    - Replace / delete variant
//! POST              /variantes/{id}/stock              - Stock adjustment
//! GET               /variantes/{id}/movimientos        - Stock ledger
//! GET|POST          /cupones                           - Coupons
//! PUT|DELETE        /cupones/{id}
//! GET               /ordenes                           - Filtered order list
//! GET               /ordenes/{id}                      - Order with lines
//! PATCH             /ordenes/{id}/estado               - Status change
//! GET               /pos/escanear/{code}               - Barcode or SKU lookup
//! POST              /pos/ventas                        - Counter sale
//! GET               /pos/ventas/{id}/ticket            - ESC/POS receipt
//! GET               /pos/impresoras                    - Known printer profiles
//! GET               /reportes/ventas                   - Sales by day and channel
//! GET               /chat/conversaciones               - Inbox
//! GET|POST          /chat/conversaciones/{id}/mensajes - Read / agent reply
//! POST              /chat/conversaciones/{id}/cerrar   - Close
//! POST              /chat/token                        - Agent realtime token
//! ```

pub mod chat;
pub mod coupons;
pub mod orders;
pub mod pos;
pub mod products;
pub mod reports;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(products::router())
        .nest("/cupones", coupons::router())
        .nest("/ordenes", orders::router())
        .nest("/pos", pos::router())
        .nest("/reportes", reports::router())
        .nest("/chat", chat::router())
}
