//! Quote ranking and idempotent label generation.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::ShippingError;
use crate::provider::{Label, ShipmentRequest, ShippingProvider};
use crate::rates::{Rate, RateSelector, find_requested};

/// Ranked rates with the winner pulled out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteResult {
    pub best: Rate,
    /// Every eligible rate, best first (includes `best`).
    pub rates: Vec<Rate>,
}

/// A label request for one order.
#[derive(Debug, Clone)]
pub struct LabelRequest {
    pub shipment: ShipmentRequest,
    /// Label already stored on the order, if any.
    pub existing: Option<Label>,
    /// Buy a new label even when one exists.
    pub force: bool,
    /// Carrier and service the customer picked at checkout.
    pub requested: Option<(String, String)>,
}

/// What [`generate_label`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LabelOutcome {
    /// The order already had a label; the carrier was not called.
    AlreadyLabeled { label: Label },
    /// A new label was bought with `rate`.
    Created { label: Label, rate: Rate },
}

impl LabelOutcome {
    #[must_use]
    pub const fn label(&self) -> &Label {
        match self {
            Self::AlreadyLabeled { label } | Self::Created { label, .. } => label,
        }
    }

    #[must_use]
    pub const fn is_new(&self) -> bool {
        matches!(self, Self::Created { .. })
    }
}

/// Quote a shipment and rank the results.
///
/// # Errors
///
/// Propagates provider errors; returns `ShippingError::NoRates` when no
/// rate passes the selector.
#[instrument(skip_all, fields(provider = %provider.kind()))]
pub async fn quote(
    provider: &dyn ShippingProvider,
    shipment: &ShipmentRequest,
    selector: &RateSelector,
) -> Result<QuoteResult, ShippingError> {
    let rates = selector.rank(provider.quote(shipment).await?);
    let best = rates.first().cloned().ok_or(ShippingError::NoRates)?;

    info!(
        rates = rates.len(),
        carrier = %best.carrier,
        service = %best.service,
        price = %best.price,
        "Shipment quoted"
    );
    Ok(QuoteResult { best, rates })
}

/// Buy a label for an order unless it already has one.
///
/// With an existing label and `force == false` the stored label comes back
/// as [`LabelOutcome::AlreadyLabeled`] and the carrier is never contacted.
/// Otherwise the shipment is quoted, the requested carrier/service (or else
/// the best rate) is chosen, and a label is bought.
///
/// # Errors
///
/// Returns `ShippingError::RateUnavailable` when the requested carrier and
/// service are not among the quoted rates, and propagates quoting and label
/// errors.
#[instrument(skip_all, fields(provider = %provider.kind(), force = request.force))]
pub async fn generate_label(
    provider: &dyn ShippingProvider,
    selector: &RateSelector,
    request: LabelRequest,
) -> Result<LabelOutcome, ShippingError> {
    if let Some(label) = request.existing
        && !request.force
    {
        info!(tracking_number = %label.tracking_number, "Order already labeled");
        return Ok(LabelOutcome::AlreadyLabeled { label });
    }

    let quoted = quote(provider, &request.shipment, selector).await?;

    let rate = match &request.requested {
        Some((carrier, service)) => find_requested(&quoted.rates, carrier, service)
            .cloned()
            .ok_or_else(|| ShippingError::RateUnavailable {
                carrier: carrier.clone(),
                service: service.clone(),
            })?,
        None => quoted.best,
    };

    let label = provider.create_label(&request.shipment, &rate).await?;
    Ok(LabelOutcome::Created { label, rate })
}
