//! Carrier access for the HTTP layer.
//!
//! Holds the configured Envia and Skydropx clients, the store's origin
//! address and packaging defaults, and caches quotes for a few minutes so a
//! customer reloading the checkout does not hit the carriers again.

use std::sync::Arc;

use moka::future::Cache;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use tienda_shipping::address::normalize;
use tienda_shipping::{
    Address, AddressInput, EnviaClient, ItemDimensions, LabelOutcome, LabelRequest, Parcel,
    ProviderKind, QuoteResult, RateSelector, ShipmentRequest, ShippingError, ShippingProvider,
    SkydropxClient, generate_label, quote,
};

use crate::config::ShippingConfig;
use crate::error::{AppError, Result};

/// Shipping clients plus store-wide shipping settings.
#[derive(Clone)]
pub struct ShippingService {
    inner: Arc<ShippingServiceInner>,
}

struct ShippingServiceInner {
    envia: Option<EnviaClient>,
    skydropx: Option<SkydropxClient>,
    origin: Option<Address>,
    packaging: tienda_shipping::PackagingDefaults,
    selector: RateSelector,
    quotes: Cache<String, QuoteResult>,
}

impl ShippingService {
    /// Build the service from configuration, sharing one HTTP client.
    #[must_use]
    pub fn new(config: &ShippingConfig, client: &reqwest::Client) -> Self {
        let envia = config
            .envia
            .as_ref()
            .map(|envia| EnviaClient::new(envia, client.clone()));
        let skydropx = Some(SkydropxClient::new(&config.skydropx, client.clone()))
            .filter(SkydropxClient::is_configured);

        let quotes = Cache::builder()
            .max_capacity(1000)
            .time_to_live(config.quote_ttl)
            .build();

        Self {
            inner: Arc::new(ShippingServiceInner {
                envia,
                skydropx,
                origin: config.origin.clone(),
                packaging: config.packaging,
                selector: config.selector.clone(),
                quotes,
            }),
        }
    }

    /// The client for `kind`, if its credentials are configured.
    ///
    /// # Errors
    ///
    /// Returns `ShippingError::NotConfigured` when the provider has no credentials.
    pub fn provider(&self, kind: ProviderKind) -> Result<&dyn ShippingProvider> {
        let provider: Option<&dyn ShippingProvider> = match kind {
            ProviderKind::Envia => self.inner.envia.as_ref().map(|c| c as &dyn ShippingProvider),
            ProviderKind::Skydropx => self
                .inner
                .skydropx
                .as_ref()
                .map(|c| c as &dyn ShippingProvider),
        };
        provider.ok_or(AppError::Shipping(ShippingError::NotConfigured(kind)))
    }

    /// Providers with credentials, for health and probe output.
    #[must_use]
    pub fn configured(&self) -> Vec<ProviderKind> {
        let mut kinds = Vec::new();
        if self.inner.envia.is_some() {
            kinds.push(ProviderKind::Envia);
        }
        if self.inner.skydropx.is_some() {
            kinds.push(ProviderKind::Skydropx);
        }
        kinds
    }

    #[must_use]
    pub fn selector(&self) -> &RateSelector {
        &self.inner.selector
    }

    /// Build a shipment from the store's origin to `destination`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unavailable` when no origin address is configured,
    /// and shipping errors for an invalid destination or parcel.
    pub fn shipment(
        &self,
        destination: &AddressInput,
        items: &[ItemDimensions],
        declared_value: Decimal,
        reference: Option<String>,
    ) -> Result<ShipmentRequest> {
        let origin = self.inner.origin.clone().ok_or_else(|| {
            AppError::Unavailable("shipping origin address is not configured".to_string())
        })?;
        let destination = normalize(destination).map_err(ShippingError::from)?;
        let parcel = Parcel::from_items(items, &self.inner.packaging)?;

        Ok(ShipmentRequest {
            origin,
            destination,
            parcel,
            declared_value,
            contents: "Ropa y accesorios".to_string(),
            reference,
        })
    }

    /// Quote a shipment, reusing a recent identical quote.
    ///
    /// # Errors
    ///
    /// Returns shipping errors from the provider or `NoRates`.
    #[instrument(skip(self, shipment), fields(provider = %kind))]
    pub async fn quote(
        &self,
        kind: ProviderKind,
        shipment: &ShipmentRequest,
        selector: Option<&RateSelector>,
    ) -> Result<QuoteResult> {
        let provider = self.provider(kind)?;
        let selector = selector.unwrap_or(&self.inner.selector);
        let key = cache_key(kind, shipment, selector)?;

        if let Some(cached) = self.inner.quotes.get(&key).await {
            debug!("Quote served from cache");
            return Ok(cached);
        }

        let result = quote(provider, shipment, selector).await?;
        self.inner.quotes.insert(key, result.clone()).await;
        Ok(result)
    }

    /// Buy a label unless the order already has one.
    ///
    /// # Errors
    ///
    /// Returns shipping errors from quoting or label creation.
    pub async fn label(&self, kind: ProviderKind, request: LabelRequest) -> Result<LabelOutcome> {
        let provider = self.provider(kind)?;
        Ok(generate_label(provider, &self.inner.selector, request).await?)
    }
}

/// Cache key over everything that changes the quote.
fn cache_key(
    kind: ProviderKind,
    shipment: &ShipmentRequest,
    selector: &RateSelector,
) -> Result<String> {
    let payload = serde_json::to_vec(&(shipment, selector))
        .map_err(|e| AppError::Internal(format!("quote cache key: {e}")))?;
    Ok(format!("{kind}:{}", hex::encode(Sha256::digest(&payload))))
}
