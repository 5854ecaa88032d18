//! Database operations.
//!
//! ## Tables
//!
//! - `products`, `variants` - Catalog and stock levels
//! - `stock_movements` - Ledger of every stock change
//! - `coupons` - Discount codes
//! - `orders`, `order_items` - Online and counter sales
//! - `conversations`, `messages` - Support chat
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p tienda-cli -- migrate
//! ```

pub mod chat;
pub mod coupons;
pub mod orders;
pub mod products;
pub mod reports;

use std::str::FromStr;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use chat::ChatRepository;
pub use coupons::CouponRepository;
pub use orders::OrderRepository;
pub use products::ProductRepository;
pub use reports::ReportRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (duplicate SKU, insufficient stock, ...).
    #[error("{0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map unique and check violations to `Conflict` with a readable message.
    pub(crate) fn from_constraint(err: sqlx::Error, message: impl FnOnce() -> String) -> Self {
        match &err {
            sqlx::Error::Database(db)
                if db.is_unique_violation() || db.is_check_violation() || db.is_foreign_key_violation() =>
            {
                Self::Conflict(message())
            }
            _ => Self::Database(err),
        }
    }
}

/// Parse a `TEXT` column holding an enum.
pub(crate) fn parse_column<T>(value: &str, column: &str) -> Result<T, RepositoryError>
where
    T: FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|e| RepositoryError::DataCorruption(format!("{column}: {e}")))
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Clamp pagination parameters and return `(limit, offset)`.
#[must_use]
pub fn page_bounds(page: Option<u32>, per_page: Option<u32>) -> (i64, i64) {
    let per_page = i64::from(per_page.unwrap_or(24).clamp(1, 100));
    let page = i64::from(page.unwrap_or(1).max(1));
    (per_page, (page - 1) * per_page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tienda_core::OrderStatus;

    #[test]
    fn test_page_bounds() {
        assert_eq!(page_bounds(None, None), (24, 0));
        assert_eq!(page_bounds(Some(3), Some(10)), (10, 20));
        assert_eq!(page_bounds(Some(0), Some(1000)), (100, 0));
    }

    #[test]
    fn test_parse_column() {
        let status: OrderStatus = parse_column("paid", "orders.status").expect("valid");
        assert_eq!(status, OrderStatus::Paid);

        let err = parse_column::<OrderStatus>("pagado", "orders.status").unwrap_err();
        assert!(matches!(err, RepositoryError::DataCorruption(msg) if msg.contains("orders.status")));
    }
}
