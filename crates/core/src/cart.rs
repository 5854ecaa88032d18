//! Cart and checkout arithmetic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::round_cents;

/// Errors from cart arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("cart is empty")]
    Empty,
    #[error("quantity must be positive (line {line})")]
    InvalidQuantity { line: usize },
    #[error("price cannot be negative (line {line})")]
    NegativePrice { line: usize },
    #[error("shipping cost cannot be negative")]
    NegativeShipping,
    #[error("amount received {received} is less than total {total}")]
    InsufficientPayment { received: Decimal, total: Decimal },
}

/// A priced cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub unit_price: Decimal,
    pub quantity: i32,
}

impl CartLine {
    /// Unit price times quantity, rounded to cents.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        round_cents(self.unit_price * Decimal::from(self.quantity))
    }
}

/// Totals shown at checkout and stored on the order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub item_count: i32,
}

/// Compute order totals.
///
/// `discount` is clamped to the subtotal; shipping is never discounted.
///
/// # Errors
///
/// Returns `CartError` for empty carts, non-positive quantities, negative
/// prices or negative shipping.
pub fn compute_totals(
    lines: &[CartLine],
    discount: Decimal,
    shipping: Decimal,
) -> Result<CartTotals, CartError> {
    if lines.is_empty() {
        return Err(CartError::Empty);
    }
    if shipping < Decimal::ZERO {
        return Err(CartError::NegativeShipping);
    }

    let mut subtotal = Decimal::ZERO;
    let mut item_count = 0i32;
    for (line, item) in lines.iter().enumerate() {
        if item.quantity <= 0 {
            return Err(CartError::InvalidQuantity { line });
        }
        if item.unit_price < Decimal::ZERO {
            return Err(CartError::NegativePrice { line });
        }
        subtotal += item.line_total();
        item_count = item_count.saturating_add(item.quantity);
    }

    let discount = round_cents(discount.clamp(Decimal::ZERO, subtotal));
    let shipping = round_cents(shipping);

    Ok(CartTotals {
        subtotal,
        discount,
        shipping,
        total: subtotal - discount + shipping,
        item_count,
    })
}

/// Change to hand back for a cash payment.
///
/// # Errors
///
/// Returns `CartError::InsufficientPayment` when `received` is below `total`.
pub fn cash_change(total: Decimal, received: Decimal) -> Result<Decimal, CartError> {
    if received < total {
        return Err(CartError::InsufficientPayment { received, total });
    }
    Ok(round_cents(received - total))
}
