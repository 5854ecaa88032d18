//! Order models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tienda_core::{
    CouponId, OrderChannel, OrderId, OrderItemId, OrderStatus, PaymentMethod, VariantId,
};
use tienda_shipping::{AddressInput, Label, ProviderKind};

/// An order from the storefront or the counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Customer-facing number, assigned by the database.
    pub number: i64,
    pub channel: OrderChannel,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    /// Destination as the customer entered it; `None` for counter sales.
    pub shipping_address: Option<AddressInput>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,
    pub coupon_id: Option<CouponId>,
    pub amount_received: Option<Decimal>,
    pub change_given: Option<Decimal>,
    /// Aggregator the customer quoted with at checkout, or the one on the label.
    pub shipping_provider: Option<ProviderKind>,
    /// Carrier the customer picked at checkout, or the one on the label.
    pub shipping_carrier: Option<String>,
    pub shipping_service: Option<String>,
    pub label: Option<OrderLabel>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Carrier and service chosen at checkout, if both are known.
    #[must_use]
    pub fn requested_rate(&self) -> Option<(String, String)> {
        match (&self.shipping_carrier, &self.shipping_service) {
            (Some(carrier), Some(service)) => Some((carrier.clone(), service.clone())),
            _ => None,
        }
    }
}

/// The shipping label stored on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLabel {
    pub provider: ProviderKind,
    pub carrier: String,
    pub service: String,
    pub tracking_number: String,
    pub label_url: String,
    pub tracking_url: Option<String>,
    pub cost: Option<Decimal>,
    pub shipped_at: Option<DateTime<Utc>>,
}

impl From<&OrderLabel> for Label {
    fn from(stored: &OrderLabel) -> Self {
        Self {
            provider: stored.provider,
            carrier: stored.carrier.clone(),
            service: stored.service.clone(),
            tracking_number: stored.tracking_number.clone(),
            label_url: stored.label_url.clone(),
            tracking_url: stored.tracking_url.clone(),
            cost: stored.cost,
        }
    }
}

/// A sold line, with names copied at sale time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    /// `None` once the variant has been deleted.
    pub variant_id: Option<VariantId>,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub sku: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

impl OrderItem {
    /// Name for receipts and emails, e.g. `Blusa bordada (M / Rojo)`.
    #[must_use]
    pub fn display_name(&self) -> String {
        match &self.variant_name {
            Some(variant) => format!("{} ({variant})", self.product_name),
            None => self.product_name.clone(),
        }
    }
}

/// An order with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(variant_name: Option<&str>) -> OrderItem {
        OrderItem {
            id: OrderItemId::new(1),
            order_id: OrderId::new(1),
            variant_id: Some(VariantId::new(4)),
            product_name: "Blusa bordada".to_string(),
            variant_name: variant_name.map(ToString::to_string),
            sku: "BLU-M-RJ".to_string(),
            unit_price: Decimal::new(34950, 2),
            quantity: 1,
            line_total: Decimal::new(34950, 2),
        }
    }

    #[test]
    fn test_item_display_name() {
        assert_eq!(item(Some("M / Rojo")).display_name(), "Blusa bordada (M / Rojo)");
        assert_eq!(item(None).display_name(), "Blusa bordada");
    }

    #[test]
    fn test_stored_label_converts() {
        let stored = OrderLabel {
            provider: ProviderKind::Skydropx,
            carrier: "fedex".to_string(),
            service: "express".to_string(),
            tracking_number: "794623".to_string(),
            label_url: "https://labels.example/794623.pdf".to_string(),
            tracking_url: None,
            cost: Some(Decimal::new(18900, 2)),
            shipped_at: None,
        };
        let label = Label::from(&stored);
        assert_eq!(label.provider, ProviderKind::Skydropx);
        assert_eq!(label.tracking_number, "794623");
    }
}
