//! The provider seam shared by the carrier clients.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ShippingError;
use crate::address::Address;
use crate::parcel::Parcel;
use crate::rates::Rate;

/// Which shipping aggregator a rate or label came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Envia,
    Skydropx,
}

impl ProviderKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Envia => "envia",
            Self::Skydropx => "skydropx",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "envia" => Ok(Self::Envia),
            "skydropx" => Ok(Self::Skydropx),
            _ => Err(format!("invalid provider: {s}")),
        }
    }
}

/// Everything a carrier needs to quote or ship one parcel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentRequest {
    pub origin: Address,
    pub destination: Address,
    pub parcel: Parcel,
    /// Declared value for insurance and customs.
    pub declared_value: Decimal,
    /// Short description of the contents.
    pub contents: String,
    /// Our order number, sent as the carrier-side reference.
    pub reference: Option<String>,
}

/// A purchased shipping label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub provider: ProviderKind,
    pub carrier: String,
    pub service: String,
    pub tracking_number: String,
    pub label_url: String,
    pub tracking_url: Option<String>,
    pub cost: Option<Decimal>,
}

/// A carrier aggregator that can quote and buy labels.
#[async_trait]
pub trait ShippingProvider: Send + Sync {
    /// Which aggregator this is.
    fn kind(&self) -> ProviderKind;

    /// Fetch every rate the aggregator offers for the shipment.
    async fn quote(&self, shipment: &ShipmentRequest) -> Result<Vec<Rate>, ShippingError>;

    /// Buy a label for a rate previously returned by [`Self::quote`].
    async fn create_label(
        &self,
        shipment: &ShipmentRequest,
        rate: &Rate,
    ) -> Result<Label, ShippingError>;
}

/// A decimal as a JSON number; carriers reject numeric strings.
pub(crate) fn json_number(value: Decimal) -> serde_json::Value {
    value
        .normalize()
        .to_string()
        .parse::<serde_json::Number>()
        .map_or(serde_json::Value::Null, serde_json::Value::Number)
}

/// Read a decimal that carriers send either as a number or a string.
pub(crate) fn decimal_value(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => n.to_string().parse().ok(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a field that may be a string or a number as text.
pub(crate) fn text_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
