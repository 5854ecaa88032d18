//! Order queries: checkout, status changes and shipping labels.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

use tienda_core::{
    CouponId, OrderChannel, OrderId, OrderItemId, OrderStatus, PaymentMethod, VariantId,
};
use tienda_shipping::{AddressInput, ItemDimensions, Label, ProviderKind};

use super::products::record_movement;
use super::{RepositoryError, coupons, parse_column};
use crate::models::{Order, OrderItem, OrderLabel, OrderWithItems, StockReason};

// =============================================================================
// Internal Row Types
// =============================================================================

const ORDER_COLUMNS: &str = "id, number, channel, status, payment_method, customer_name, \
     customer_email, customer_phone, shipping_address, subtotal, discount, shipping_cost, total, \
     coupon_id, amount_received, change_given, shipping_carrier, shipping_service, \
     shipping_provider, tracking_number, label_url, tracking_url, label_cost, shipped_at, notes, \
     created_at, updated_at";

const ITEM_COLUMNS: &str =
    "id, order_id, variant_id, product_name, variant_name, sku, unit_price, quantity, line_total";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    number: i64,
    channel: String,
    status: String,
    payment_method: String,
    customer_name: String,
    customer_email: Option<String>,
    customer_phone: Option<String>,
    shipping_address: Option<Json<AddressInput>>,
    subtotal: Decimal,
    discount: Decimal,
    shipping_cost: Decimal,
    total: Decimal,
    coupon_id: Option<i32>,
    amount_received: Option<Decimal>,
    change_given: Option<Decimal>,
    shipping_carrier: Option<String>,
    shipping_service: Option<String>,
    shipping_provider: Option<String>,
    tracking_number: Option<String>,
    label_url: Option<String>,
    tracking_url: Option<String>,
    label_cost: Option<Decimal>,
    shipped_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let provider = row
            .shipping_provider
            .as_deref()
            .map(|p| parse_column(p, "orders.shipping_provider"))
            .transpose()?;
        // A label exists once the tracking number is written; the other
        // label columns are written in the same statement.
        let label = match (row.tracking_number, provider) {
            (Some(tracking_number), Some(provider)) => Some(OrderLabel {
                provider,
                carrier: row.shipping_carrier.clone().unwrap_or_default(),
                service: row.shipping_service.clone().unwrap_or_default(),
                tracking_number,
                label_url: row.label_url.unwrap_or_default(),
                tracking_url: row.tracking_url,
                cost: row.label_cost,
                shipped_at: row.shipped_at,
            }),
            (Some(_), None) => {
                return Err(RepositoryError::DataCorruption(format!(
                    "order {} has a tracking number without a provider",
                    row.id
                )));
            }
            _ => None,
        };

        Ok(Self {
            id: OrderId::new(row.id),
            number: row.number,
            channel: parse_column(&row.channel, "orders.channel")?,
            status: parse_column(&row.status, "orders.status")?,
            payment_method: parse_column(&row.payment_method, "orders.payment_method")?,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            customer_phone: row.customer_phone,
            shipping_address: row.shipping_address.map(|Json(address)| address),
            subtotal: row.subtotal,
            discount: row.discount,
            shipping_cost: row.shipping_cost,
            total: row.total,
            coupon_id: row.coupon_id.map(CouponId::new),
            amount_received: row.amount_received,
            change_given: row.change_given,
            shipping_provider: provider,
            shipping_carrier: row.shipping_carrier,
            shipping_service: row.shipping_service,
            label,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: i32,
    order_id: i32,
    variant_id: Option<i32>,
    product_name: String,
    variant_name: Option<String>,
    sku: String,
    unit_price: Decimal,
    quantity: i32,
    line_total: Decimal,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: OrderItemId::new(row.id),
            order_id: OrderId::new(row.order_id),
            variant_id: row.variant_id.map(VariantId::new),
            product_name: row.product_name,
            variant_name: row.variant_name,
            sku: row.sku,
            unit_price: row.unit_price,
            quantity: row.quantity,
            line_total: row.line_total,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ItemDimensionsRow {
    quantity: i32,
    weight_kg: Decimal,
    length_cm: Option<Decimal>,
    width_cm: Option<Decimal>,
    height_cm: Option<Decimal>,
}

// =============================================================================
// Inputs
// =============================================================================

/// A priced order ready to be stored.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub channel: OrderChannel,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub shipping_address: Option<AddressInput>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,
    pub coupon_id: Option<CouponId>,
    pub amount_received: Option<Decimal>,
    pub change_given: Option<Decimal>,
    pub shipping_provider: Option<ProviderKind>,
    pub shipping_carrier: Option<String>,
    pub shipping_service: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<NewOrderItem>,
}

/// One priced line of a [`NewOrder`].
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub variant_id: VariantId,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub sku: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

/// Back-office order listing filters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub channel: Option<OrderChannel>,
    /// Inclusive start date (UTC).
    pub from: Option<NaiveDate>,
    /// Inclusive end date (UTC).
    pub to: Option<NaiveDate>,
    /// Matches the order number, customer name or email.
    pub q: Option<String>,
}

/// Result of [`OrderRepository::record_label`].
#[derive(Debug, Clone)]
pub enum StoredLabel {
    /// The label was written to the order.
    Saved(Order),
    /// The order already had a label, which is returned unchanged.
    Existing(Order),
}

impl StoredLabel {
    #[must_use]
    pub const fn order(&self) -> &Order {
        match self {
            Self::Saved(order) | Self::Existing(order) => order,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Store an order in one transaction: insert the order and its lines,
    /// take each line out of stock and count the coupon use.
    ///
    /// Nothing is written if any line lacks stock or the coupon ran out.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` for insufficient stock, a vanished
    /// variant or an exhausted coupon.
    pub async fn create(&self, new: &NewOrder) -> Result<OrderWithItems, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO orders (channel, status, payment_method, customer_name, customer_email, \
             customer_phone, shipping_address, subtotal, discount, shipping_cost, total, coupon_id, \
             amount_received, change_given, shipping_provider, shipping_carrier, shipping_service, \
             notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
             $18) \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(new.channel.as_str())
        .bind(new.status.as_str())
        .bind(new.payment_method.as_str())
        .bind(&new.customer_name)
        .bind(&new.customer_email)
        .bind(&new.customer_phone)
        .bind(new.shipping_address.as_ref().map(Json))
        .bind(new.subtotal)
        .bind(new.discount)
        .bind(new.shipping_cost)
        .bind(new.total)
        .bind(new.coupon_id)
        .bind(new.amount_received)
        .bind(new.change_given)
        .bind(new.shipping_provider.map(ProviderKind::as_str))
        .bind(&new.shipping_carrier)
        .bind(&new.shipping_service)
        .bind(&new.notes)
        .fetch_one(&mut *tx)
        .await?;

        let order: Order = row.try_into()?;
        let mut items = Vec::with_capacity(new.items.len());

        for item in &new.items {
            take_stock(&mut tx, item).await?;
            record_movement(
                &mut tx,
                item.variant_id,
                -item.quantity,
                StockReason::Sale,
                Some(order.id.as_i32()),
                None,
            )
            .await?;

            let row = sqlx::query_as::<_, OrderItemRow>(&format!(
                "INSERT INTO order_items (order_id, variant_id, product_name, variant_name, sku, \
                 unit_price, quantity, line_total) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 RETURNING {ITEM_COLUMNS}"
            ))
            .bind(order.id)
            .bind(item.variant_id)
            .bind(&item.product_name)
            .bind(&item.variant_name)
            .bind(&item.sku)
            .bind(item.unit_price)
            .bind(item.quantity)
            .bind(item.line_total)
            .fetch_one(&mut *tx)
            .await?;
            items.push(row.into());
        }

        if let Some(coupon_id) = new.coupon_id {
            coupons::redeem(&mut tx, coupon_id).await?;
        }

        tx.commit().await?;

        tracing::info!(
            order_number = order.number,
            channel = %order.channel,
            total = %order.total,
            items = items.len(),
            "Order created"
        );
        Ok(OrderWithItems { order, items })
    }

    /// Get an order by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't exist.
    pub async fn get(&self, id: OrderId) -> Result<Order, RepositoryError> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?
            .try_into()
    }

    /// Get an order with its lines by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't exist.
    pub async fn get_with_items(&self, id: OrderId) -> Result<OrderWithItems, RepositoryError> {
        let order = self.get(id).await?;
        let items = self.items(id).await?;
        Ok(OrderWithItems { order, items })
    }

    /// Get an order with its lines by customer-facing number.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_number(
        &self,
        number: i64,
    ) -> Result<Option<OrderWithItems>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE number = $1"
        ))
        .bind(number)
        .fetch_optional(self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let order: Order = row.try_into()?;
        let items = self.items(order.id).await?;
        Ok(Some(OrderWithItems { order, items }))
    }

    /// Lines of an order, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id"
        ))
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// List orders matching a filter, newest first, with the total count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        filter: &OrderFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Order>, i64), RepositoryError> {
        let search = filter
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty());
        let number = search.and_then(|q| q.trim_start_matches('#').parse::<i64>().ok());
        let pattern = search.map(|q| format!("%{q}%"));

        let condition = "($1::text IS NULL OR status = $1) \
             AND ($2::text IS NULL OR channel = $2) \
             AND ($3::date IS NULL OR created_at >= $3::date) \
             AND ($4::date IS NULL OR created_at < $4::date + 1) \
             AND ($5::text IS NULL OR number = $6 OR customer_name ILIKE $5 OR customer_email ILIKE $5)";

        let status = filter.status.map(OrderStatus::as_str);
        let channel = filter.channel.map(OrderChannel::as_str);

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE {condition} \
             ORDER BY created_at DESC, id DESC LIMIT $7 OFFSET $8"
        ))
        .bind(status)
        .bind(channel)
        .bind(filter.from)
        .bind(filter.to)
        .bind(&pattern)
        .bind(number)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM orders WHERE {condition}"
        ))
        .bind(status)
        .bind(channel)
        .bind(filter.from)
        .bind(filter.to)
        .bind(&pattern)
        .bind(number)
        .fetch_one(self.pool)
        .await?;

        let orders = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((orders, total))
    }

    /// Move an order to `next`, checked against the status machine.
    ///
    /// Cancelling puts every line back in stock and returns the coupon use.
    /// Setting the current status again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't exist and
    /// `RepositoryError::Conflict` for a transition the machine forbids.
    pub async fn update_status(
        &self,
        id: OrderId,
        next: OrderStatus,
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<(String, Option<i32>)> =
            sqlx::query_as("SELECT status, coupon_id FROM orders WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let (current, coupon_id) = locked.ok_or(RepositoryError::NotFound)?;
        let current: OrderStatus = parse_column(&current, "orders.status")?;

        if !current.can_transition_to(next) {
            return Err(RepositoryError::Conflict(format!(
                "cannot change order from {current} to {next}"
            )));
        }

        if current != next {
            sqlx::query("UPDATE orders SET status = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(next.as_str())
                .execute(&mut *tx)
                .await?;

            if next == OrderStatus::Cancelled {
                restock(&mut tx, id).await?;
                if let Some(coupon_id) = coupon_id {
                    coupons::release(&mut tx, CouponId::new(coupon_id)).await?;
                }
            }
        }

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(order_id = %id, from = %current, to = %next, "Order status updated");
        row.try_into()
    }

    /// Weights and sizes of an order's lines, for building a parcel.
    ///
    /// Lines whose variant was deleted fall back to the default item weight.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn item_dimensions(
        &self,
        id: OrderId,
    ) -> Result<Vec<ItemDimensions>, RepositoryError> {
        let rows = sqlx::query_as::<_, ItemDimensionsRow>(
            "SELECT oi.quantity, COALESCE(p.weight_kg, 0.5) AS weight_kg, \
             p.length_cm, p.width_cm, p.height_cm \
             FROM order_items oi \
             LEFT JOIN variants v ON v.id = oi.variant_id \
             LEFT JOIN products p ON p.id = v.product_id \
             WHERE oi.order_id = $1 ORDER BY oi.id",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ItemDimensions {
                weight_kg: row.weight_kg,
                quantity: row.quantity,
                length_cm: row.length_cm,
                width_cm: row.width_cm,
                height_cm: row.height_cm,
            })
            .collect())
    }

    /// Write a label to an order exactly once.
    ///
    /// The update only matches while the order has no tracking number (or
    /// `replace` is set), so two concurrent requests cannot both store a
    /// label. A paid order becomes shipped. When nothing is updated the
    /// order is re-read and its stored label returned.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't exist.
    pub async fn record_label(
        &self,
        id: OrderId,
        label: &Label,
        replace: bool,
    ) -> Result<StoredLabel, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders SET shipping_provider = $2, shipping_carrier = $3, shipping_service = $4, \
             tracking_number = $5, label_url = $6, tracking_url = $7, label_cost = $8, \
             shipped_at = now(), updated_at = now(), \
             status = CASE WHEN status = 'paid' THEN 'shipped' ELSE status END \
             WHERE id = $1 AND ($9 OR tracking_number IS NULL) \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(label.provider.as_str())
        .bind(&label.carrier)
        .bind(&label.service)
        .bind(&label.tracking_number)
        .bind(&label.label_url)
        .bind(&label.tracking_url)
        .bind(label.cost)
        .bind(replace)
        .fetch_optional(self.pool)
        .await?;

        if let Some(row) = row {
            tracing::info!(
                order_id = %id,
                provider = %label.provider,
                tracking_number = %label.tracking_number,
                "Shipping label stored"
            );
            return Ok(StoredLabel::Saved(row.try_into()?));
        }

        let existing = self.get(id).await?;
        tracing::warn!(
            order_id = %id,
            discarded_tracking_number = %label.tracking_number,
            "Order already had a label, keeping the stored one"
        );
        Ok(StoredLabel::Existing(existing))
    }
}

async fn take_stock(
    tx: &mut Transaction<'_, Postgres>,
    item: &NewOrderItem,
) -> Result<(), RepositoryError> {
    let updated: Option<i32> = sqlx::query_scalar(
        "UPDATE variants SET stock = stock - $2, updated_at = now() \
         WHERE id = $1 AND stock >= $2 RETURNING stock",
    )
    .bind(item.variant_id)
    .bind(item.quantity)
    .fetch_optional(&mut **tx)
    .await?;

    if updated.is_none() {
        return Err(RepositoryError::Conflict(format!(
            "insufficient stock for SKU {}",
            item.sku
        )));
    }
    Ok(())
}

async fn restock(tx: &mut Transaction<'_, Postgres>, id: OrderId) -> Result<(), RepositoryError> {
    let lines: Vec<(i32, i32)> = sqlx::query_as(
        "SELECT variant_id, quantity FROM order_items \
         WHERE order_id = $1 AND variant_id IS NOT NULL ORDER BY id",
    )
    .bind(id)
    .fetch_all(&mut **tx)
    .await?;

    for (variant_id, quantity) in lines {
        sqlx::query("UPDATE variants SET stock = stock + $2, updated_at = now() WHERE id = $1")
            .bind(variant_id)
            .bind(quantity)
            .execute(&mut **tx)
            .await?;
        record_movement(
            tx,
            VariantId::new(variant_id),
            quantity,
            StockReason::Cancellation,
            Some(id.as_i32()),
            None,
        )
        .await?;
    }
    Ok(())
}
