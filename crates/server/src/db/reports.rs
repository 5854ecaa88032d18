//! Sales reporting queries.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use tienda_core::OrderChannel;

use super::{RepositoryError, parse_column};

/// Sales for one day on one channel. Cancelled orders are excluded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailySales {
    pub day: NaiveDate,
    pub channel: OrderChannel,
    pub orders: i64,
    pub revenue: Decimal,
    pub discounts: Decimal,
}

/// A best-selling product over a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct TopProduct {
    pub product_name: String,
    pub units: i64,
    pub revenue: Decimal,
}

/// The sales report for a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub days: Vec<DailySales>,
    pub top_products: Vec<TopProduct>,
    pub total_orders: i64,
    pub total_revenue: Decimal,
}

impl SalesReport {
    fn new(from: NaiveDate, to: NaiveDate, days: Vec<DailySales>, top: Vec<TopProduct>) -> Self {
        let total_orders = days.iter().map(|d| d.orders).sum();
        let total_revenue = days.iter().map(|d| d.revenue).sum();
        Self {
            from,
            to,
            days,
            top_products: top,
            total_orders,
            total_revenue,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DailySalesRow {
    day: NaiveDate,
    channel: String,
    orders: i64,
    revenue: Decimal,
    discounts: Decimal,
}

/// Repository for reporting queries.
pub struct ReportRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ReportRepository<'a> {
    /// Create a new report repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Sales per day and channel between `from` and `to` inclusive (UTC),
    /// plus the `top` best-selling products by units.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn sales(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        top: i64,
    ) -> Result<SalesReport, RepositoryError> {
        let rows = sqlx::query_as::<_, DailySalesRow>(
            "SELECT (created_at AT TIME ZONE 'UTC')::date AS day, channel, \
             COUNT(*) AS orders, COALESCE(SUM(total), 0) AS revenue, \
             COALESCE(SUM(discount), 0) AS discounts \
             FROM orders \
             WHERE status <> 'cancelled' \
             AND created_at >= $1::date AND created_at < $2::date + 1 \
             GROUP BY day, channel ORDER BY day, channel",
        )
        .bind(from)
        .bind(to)
        .fetch_all(self.pool)
        .await?;

        let days = rows
            .into_iter()
            .map(|row| {
                Ok(DailySales {
                    day: row.day,
                    channel: parse_column(&row.channel, "orders.channel")?,
                    orders: row.orders,
                    revenue: row.revenue,
                    discounts: row.discounts,
                })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        let top_products = sqlx::query_as::<_, TopProduct>(
            "SELECT oi.product_name, SUM(oi.quantity)::bigint AS units, \
             SUM(oi.line_total) AS revenue \
             FROM order_items oi JOIN orders o ON o.id = oi.order_id \
             WHERE o.status <> 'cancelled' \
             AND o.created_at >= $1::date AND o.created_at < $2::date + 1 \
             GROUP BY oi.product_name ORDER BY units DESC, revenue DESC LIMIT $3",
        )
        .bind(from)
        .bind(to)
        .bind(top)
        .fetch_all(self.pool)
        .await?;

        Ok(SalesReport::new(from, to, days, top_products))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_totals_sum_days() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 14).expect("date");
        let report = SalesReport::new(
            day,
            day,
            vec![
                DailySales {
                    day,
                    channel: OrderChannel::Online,
                    orders: 3,
                    revenue: Decimal::new(150_000, 2),
                    discounts: Decimal::ZERO,
                },
                DailySales {
                    day,
                    channel: OrderChannel::Pos,
                    orders: 2,
                    revenue: Decimal::new(45_050, 2),
                    discounts: Decimal::new(5_000, 2),
                },
            ],
            vec![],
        );

        assert_eq!(report.total_orders, 5);
        assert_eq!(report.total_revenue, Decimal::new(195_050, 2));
    }
}
