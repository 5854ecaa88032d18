//! Cart pricing and order placement.
//!
//! Prices always come from the database; the client only says which
//! variants and how many. The same pricing backs the cart preview, the
//! online checkout and the counter sale.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use tienda_core::{CartError, CartLine, CartTotals, CouponId, VariantId, compute_totals};
use tienda_shipping::ItemDimensions;

use crate::db::orders::NewOrderItem;
use crate::db::{CouponRepository, ProductRepository};
use crate::error::{AppError, Result};
use crate::models::PricedVariant;

/// A cart line as sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CartItemInput {
    #[serde(alias = "variante_id")]
    pub variant_id: VariantId,
    #[serde(alias = "cantidad")]
    pub quantity: i32,
}

/// A line priced from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricedLine {
    #[serde(flatten)]
    pub variant: PricedVariant,
    pub quantity: i32,
    pub line_total: Decimal,
}

/// The coupon applied to a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedCoupon {
    pub id: CouponId,
    pub code: String,
    pub discount: Decimal,
}

/// A fully priced cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricedCart {
    pub lines: Vec<PricedLine>,
    pub coupon: Option<AppliedCoupon>,
    #[serde(flatten)]
    pub totals: CartTotals,
}

impl PricedCart {
    /// Parcel inputs for quoting this cart.
    #[must_use]
    pub fn dimensions(&self) -> Vec<ItemDimensions> {
        self.lines
            .iter()
            .map(|line| line.variant.dimensions(line.quantity))
            .collect()
    }

    /// Recompute totals with a shipping cost quoted after pricing.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NegativeShipping` for a negative cost.
    pub fn with_shipping(mut self, shipping: Decimal) -> std::result::Result<Self, CartError> {
        let discount = self.coupon.as_ref().map_or(Decimal::ZERO, |c| c.discount);
        self.totals = compute_totals(&self.cart_lines(), discount, shipping)?;
        Ok(self)
    }

    fn cart_lines(&self) -> Vec<CartLine> {
        self.lines
            .iter()
            .map(|line| CartLine {
                unit_price: line.variant.unit_price,
                quantity: line.quantity,
            })
            .collect()
    }

    /// Order lines to store.
    #[must_use]
    pub fn order_items(&self) -> Vec<NewOrderItem> {
        self.lines
            .iter()
            .map(|line| NewOrderItem {
                variant_id: line.variant.variant_id,
                product_name: line.variant.product_name.clone(),
                variant_name: line.variant.variant_name.clone(),
                sku: line.variant.sku.clone(),
                unit_price: line.variant.unit_price,
                quantity: line.quantity,
                line_total: line.line_total,
            })
            .collect()
    }
}

/// Merge repeated variants and reject bad quantities, keeping first-seen order.
///
/// # Errors
///
/// Returns `CartError::Empty` or `CartError::InvalidQuantity`.
pub fn merge_items(items: &[CartItemInput]) -> std::result::Result<Vec<(VariantId, i32)>, CartError> {
    if items.is_empty() {
        return Err(CartError::Empty);
    }

    let mut merged: Vec<(VariantId, i32)> = Vec::with_capacity(items.len());
    let mut index: HashMap<VariantId, usize> = HashMap::new();

    for (line, item) in items.iter().enumerate() {
        if item.quantity <= 0 {
            return Err(CartError::InvalidQuantity { line });
        }
        if let Some(&at) = index.get(&item.variant_id) {
            if let Some(entry) = merged.get_mut(at) {
                entry.1 = entry.1.saturating_add(item.quantity);
            }
        } else {
            index.insert(item.variant_id, merged.len());
            merged.push((item.variant_id, item.quantity));
        }
    }
    Ok(merged)
}

/// Check a catalog row can be sold in the requested quantity.
fn check_sellable(variant: &PricedVariant, quantity: i32) -> Result<()> {
    if !variant.active {
        return Err(AppError::Conflict(format!(
            "{} is no longer available",
            variant.sku
        )));
    }
    if variant.stock < quantity {
        return Err(AppError::Conflict(format!(
            "insufficient stock for SKU {} ({} available)",
            variant.sku, variant.stock
        )));
    }
    Ok(())
}

/// Price a cart from the catalog, with an optional coupon and shipping cost.
///
/// # Errors
///
/// Returns `AppError::NotFound` for unknown variants, `AppError::Conflict`
/// for inactive or out-of-stock lines, and coupon or cart errors.
pub async fn price_cart(
    pool: &PgPool,
    items: &[CartItemInput],
    coupon_code: Option<&str>,
    shipping: Decimal,
    now: DateTime<Utc>,
) -> Result<PricedCart> {
    let merged = merge_items(items)?;
    let ids: Vec<VariantId> = merged.iter().map(|(id, _)| *id).collect();

    let mut catalog: HashMap<VariantId, PricedVariant> = ProductRepository::new(pool)
        .priced_variants(&ids)
        .await?
        .into_iter()
        .map(|v| (v.variant_id, v))
        .collect();

    let mut lines = Vec::with_capacity(merged.len());
    for (id, quantity) in merged {
        let variant = catalog
            .remove(&id)
            .ok_or_else(|| AppError::NotFound(format!("variant {id}")))?;
        check_sellable(&variant, quantity)?;
        let line_total = CartLine {
            unit_price: variant.unit_price,
            quantity,
        }
        .line_total();
        lines.push(PricedLine {
            variant,
            quantity,
            line_total,
        });
    }

    let mut cart = PricedCart {
        lines,
        coupon: None,
        totals: CartTotals::default(),
    };
    let cart_lines = cart.cart_lines();
    let undiscounted = compute_totals(&cart_lines, Decimal::ZERO, shipping)?;

    cart.coupon = match coupon_code.map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => {
            let coupon = CouponRepository::new(pool)
                .get_by_code(code)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("coupon {code}")))?;
            let discount = coupon.rules.evaluate(undiscounted.subtotal, now)?;
            Some(AppliedCoupon {
                id: coupon.id,
                code: coupon.code,
                discount,
            })
        }
        None => None,
    };

    cart.totals = match &cart.coupon {
        Some(applied) => compute_totals(&cart_lines, applied.discount, shipping)?,
        None => undiscounted,
    };
    Ok(cart)
}
