//! Catalog models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tienda_core::{ProductId, VariantId};
use tienda_shipping::ItemDimensions;

/// A product as listed in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub category: Option<String>,
    /// Price of variants that do not set their own.
    pub base_price: Decimal,
    pub weight_kg: Decimal,
    pub length_cm: Option<Decimal>,
    pub width_cm: Option<Decimal>,
    pub height_cm: Option<Decimal>,
    pub image_url: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A sellable size/color combination of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub sku: String,
    pub barcode: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    /// Overrides the product's base price when set.
    pub price: Option<Decimal>,
    pub stock: i32,
    pub active: bool,
}

impl Variant {
    /// Human label such as `M / Rojo`, `None` when neither size nor color is set.
    #[must_use]
    pub fn label(&self) -> Option<String> {
        variant_label(self.size.as_deref(), self.color.as_deref())
    }
}

pub(crate) fn variant_label(size: Option<&str>, color: Option<&str>) -> Option<String> {
    match (size, color) {
        (Some(size), Some(color)) => Some(format!("{size} / {color}")),
        (Some(one), None) | (None, Some(one)) => Some(one.to_string()),
        (None, None) => None,
    }
}

/// A product page: the product with its active variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub variants: Vec<Variant>,
}

/// A variant joined with the product fields needed to sell and ship it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedVariant {
    pub variant_id: VariantId,
    pub product_id: ProductId,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub sku: String,
    pub barcode: Option<String>,
    /// Effective price: the variant's own or the product's base price.
    pub unit_price: Decimal,
    pub stock: i32,
    pub weight_kg: Decimal,
    pub length_cm: Option<Decimal>,
    pub width_cm: Option<Decimal>,
    pub height_cm: Option<Decimal>,
    /// Both the variant and its product are active.
    pub active: bool,
}

impl PricedVariant {
    #[must_use]
    pub const fn dimensions(&self, quantity: i32) -> ItemDimensions {
        ItemDimensions {
            weight_kg: self.weight_kg,
            quantity,
            length_cm: self.length_cm,
            width_cm: self.width_cm,
            height_cm: self.height_cm,
        }
    }
}

/// Why stock changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockReason {
    Sale,
    Restock,
    Adjustment,
    /// Stock returned by cancelling an order.
    Cancellation,
}

impl StockReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::Restock => "restock",
            Self::Adjustment => "adjustment",
            Self::Cancellation => "cancellation",
        }
    }
}

impl std::str::FromStr for StockReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sale" => Ok(Self::Sale),
            "restock" => Ok(Self::Restock),
            "adjustment" => Ok(Self::Adjustment),
            "cancellation" => Ok(Self::Cancellation),
            _ => Err(format!("invalid stock reason: {s}")),
        }
    }
}

/// One entry of the stock ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: i32,
    pub variant_id: VariantId,
    pub delta: i32,
    pub reason: StockReason,
    pub order_id: Option<i32>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_label() {
        assert_eq!(variant_label(Some("M"), Some("Rojo")).as_deref(), Some("M / Rojo"));
        assert_eq!(variant_label(None, Some("Azul")).as_deref(), Some("Azul"));
        assert_eq!(variant_label(None, None), None);
    }

    #[test]
    fn test_stock_reason_text() {
        assert_eq!("restock".parse::<StockReason>(), Ok(StockReason::Restock));
        assert_eq!(StockReason::Cancellation.as_str(), "cancellation");
        assert!("theft".parse::<StockReason>().is_err());
    }
}
