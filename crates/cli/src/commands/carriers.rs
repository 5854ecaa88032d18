//! Carrier connectivity checks.
//!
//! `carriers probe` quotes a one-kilo parcel from the warehouse with each
//! configured aggregator, then reports which base URL and credential
//! scheme answered. Useful after rotating keys or when an aggregator moves
//! its API.

use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{error, info, warn};

use tienda_server::config::ShippingConfig;
use tienda_shipping::{
    Address, EndpointProber, EnviaClient, ItemDimensions, Parcel, ProviderKind, ShipmentRequest,
    ShippingProvider, SkydropxClient, quote,
};

const PROBE_TIMEOUT: Duration = Duration::from_secs(20);

/// Quote a sample parcel with each configured provider.
///
/// # Errors
///
/// Returns an error if the warehouse address is missing, the parcel cannot
/// be built, no provider is configured, or every provider fails.
pub async fn probe(
    to: Option<&str>,
    only: Option<ProviderKind>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = ShippingConfig::from_env()?;
    let origin = config
        .origin
        .clone()
        .ok_or("SHIP_FROM_* is not configured; set the warehouse address first")?;

    let shipment = sample_shipment(&origin, to, &config)?;
    info!(
        from = %shipment.origin.postal_code,
        to = %shipment.destination.postal_code,
        weight_kg = %shipment.parcel.weight_kg,
        "Probing carriers"
    );

    let client = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build()?;
    let mut attempted = 0;
    let mut succeeded = 0;

    if only.is_none_or(|kind| kind == ProviderKind::Envia) {
        match &config.envia {
            Some(envia) => {
                attempted += 1;
                let envia = EnviaClient::new(envia, client.clone());
                info!(carriers = %envia.carriers().join(","), "envia");
                if probe_one(&envia, &shipment, &config).await {
                    succeeded += 1;
                }
                report_prober("envia", envia.prober()).await;
            }
            None => warn!("envia: not configured (ENVIA_API_KEY)"),
        }
    }

    if only.is_none_or(|kind| kind == ProviderKind::Skydropx) {
        let skydropx = SkydropxClient::new(&config.skydropx, client);
        if skydropx.is_configured() {
            attempted += 1;
            if probe_one(&skydropx, &shipment, &config).await {
                succeeded += 1;
            }
            for (generation, prober) in skydropx.probers() {
                report_prober(&format!("skydropx {generation:?}"), prober).await;
            }
        } else {
            warn!("skydropx: not configured (SKYDROPX_CLIENT_ID or SKYDROPX_API_KEY)");
        }
    }

    if attempted == 0 {
        return Err("no carrier is configured".into());
    }
    if succeeded == 0 {
        return Err("every configured carrier failed".into());
    }
    info!("{succeeded} of {attempted} carriers answered");
    Ok(())
}

fn sample_shipment(
    origin: &Address,
    to: Option<&str>,
    config: &ShippingConfig,
) -> Result<ShipmentRequest, Box<dyn std::error::Error>> {
    let mut destination = origin.clone();
    if let Some(postal_code) = to {
        let postal_code = postal_code.trim();
        if postal_code.len() != 5 || !postal_code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("invalid postal code: {postal_code}").into());
        }
        destination.postal_code = postal_code.to_string();
    }

    let item = ItemDimensions {
        weight_kg: Decimal::ONE,
        quantity: 1,
        length_cm: None,
        width_cm: None,
        height_cm: None,
    };
    let parcel = Parcel::from_items(&[item], &config.packaging)?;

    Ok(ShipmentRequest {
        origin: origin.clone(),
        destination,
        parcel,
        declared_value: Decimal::ONE_HUNDRED,
        contents: "Prueba de cotización".to_string(),
        reference: None,
    })
}

async fn probe_one(
    provider: &dyn ShippingProvider,
    shipment: &ShipmentRequest,
    config: &ShippingConfig,
) -> bool {
    let kind = provider.kind();
    match quote(provider, shipment, &config.selector).await {
        Ok(result) => {
            info!(
                provider = %kind,
                rates = result.rates.len(),
                best = %format!(
                    "{} {} ${} {}",
                    result.best.carrier,
                    result.best.service,
                    result.best.price,
                    result.best.currency
                ),
                days = ?result.best.days,
                "Quote OK"
            );
            true
        }
        Err(e) => {
            error!(provider = %kind, "Quote failed: {e}");
            false
        }
    }
}

async fn report_prober(name: &str, prober: &EndpointProber) {
    match prober.resolved().await {
        Some(candidate) => info!("  {name}: using {}", candidate.describe()),
        None => {
            warn!("  {name}: no candidate answered");
            for candidate in prober.candidates() {
                info!("    tried {}", candidate.describe());
            }
        }
    }
}
