//! Envia shipping API client.
//!
//! Envia quotes one carrier per request, so [`EnviaClient::quote`] fans out
//! over the configured carriers concurrently and merges what comes back.
//! Labels are bought by carrier and service code; Envia has no rate ids.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::ShippingError;
use crate::address::Address;
use crate::auth::AuthScheme;
use crate::probe::{Candidate, EndpointProber};
use crate::provider::{
    Label, ProviderKind, ShipmentRequest, ShippingProvider, decimal_value, json_number, text_value,
};
use crate::rates::Rate;

/// Envia production API.
pub const PRODUCTION_URL: &str = "https://api.envia.com";

/// Envia sandbox API.
pub const SANDBOX_URL: &str = "https://api-test.envia.com";

/// Carriers quoted when none are configured.
pub const DEFAULT_CARRIERS: &[&str] = &["estafeta", "fedex", "dhl", "redpack", "paquetexpress"];

const RATE_PATH: &str = "/ship/rate/";
const GENERATE_PATH: &str = "/ship/generate/";

static DAYS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("Invalid regex"));

/// Envia credentials and options.
#[derive(Clone)]
pub struct EnviaConfig {
    pub api_key: SecretString,
    /// When set, an HMAC-signed candidate is probed after the plain ones.
    pub api_secret: Option<SecretString>,
    /// Try the sandbox host before production.
    pub sandbox: bool,
    /// Replaces the default hosts when not empty.
    pub base_urls: Vec<String>,
    /// Carrier codes to quote.
    pub carriers: Vec<String>,
}

impl std::fmt::Debug for EnviaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnviaConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &self.api_secret.as_ref().map(|_| "[REDACTED]"))
            .field("sandbox", &self.sandbox)
            .field("base_urls", &self.base_urls)
            .field("carriers", &self.carriers)
            .finish()
    }
}

impl EnviaConfig {
    /// Candidate endpoints in probing order.
    #[must_use]
    pub fn candidates(&self) -> Vec<Candidate> {
        let bases: Vec<String> = if self.base_urls.is_empty() {
            let (first, second) = if self.sandbox {
                (SANDBOX_URL, PRODUCTION_URL)
            } else {
                (PRODUCTION_URL, SANDBOX_URL)
            };
            vec![first.to_string(), second.to_string()]
        } else {
            self.base_urls.clone()
        };

        let mut candidates = Vec::new();
        for base in &bases {
            candidates.push(Candidate::new(
                base.clone(),
                AuthScheme::Bearer {
                    token: self.api_key.clone(),
                },
            ));
            candidates.push(Candidate::new(
                base.clone(),
                AuthScheme::ApiKeyHeader {
                    header: "X-Api-Key".to_string(),
                    key: self.api_key.clone(),
                },
            ));
            if let Some(secret) = &self.api_secret {
                candidates.push(Candidate::new(
                    base.clone(),
                    AuthScheme::HmacSha256 {
                        key_id: self.api_key.expose_secret().to_string(),
                        secret: secret.clone(),
                    },
                ));
            }
        }
        candidates
    }
}

/// Envia API client.
#[derive(Clone, Debug)]
pub struct EnviaClient {
    inner: Arc<EnviaClientInner>,
}

#[derive(Debug)]
struct EnviaClientInner {
    prober: EndpointProber,
    carriers: Vec<String>,
}

impl EnviaClient {
    #[must_use]
    pub fn new(config: &EnviaConfig, client: reqwest::Client) -> Self {
        let carriers = if config.carriers.is_empty() {
            DEFAULT_CARRIERS.iter().map(ToString::to_string).collect()
        } else {
            config.carriers.clone()
        };

        Self {
            inner: Arc::new(EnviaClientInner {
                prober: EndpointProber::new(ProviderKind::Envia, client, config.candidates()),
                carriers,
            }),
        }
    }

    /// The underlying prober, for connectivity checks.
    #[must_use]
    pub fn prober(&self) -> &EndpointProber {
        &self.inner.prober
    }

    #[must_use]
    pub fn carriers(&self) -> &[String] {
        &self.inner.carriers
    }

    #[instrument(skip(self, shipment), fields(carrier = %carrier))]
    async fn quote_carrier(
        &self,
        shipment: &ShipmentRequest,
        carrier: &str,
    ) -> Result<Vec<Rate>, ShippingError> {
        let body = rate_body(shipment, carrier);
        let response = self.inner.prober.post(RATE_PATH, &body).await?;
        check_meta(&response)?;
        Ok(parse_rates(&response))
    }
}

#[async_trait]
impl ShippingProvider for EnviaClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Envia
    }

    #[instrument(skip(self, shipment), fields(to = %shipment.destination.postal_code))]
    async fn quote(&self, shipment: &ShipmentRequest) -> Result<Vec<Rate>, ShippingError> {
        let results = join_all(
            self.inner
                .carriers
                .iter()
                .map(|carrier| self.quote_carrier(shipment, carrier)),
        )
        .await;

        let mut rates = Vec::new();
        let mut first_error = None;
        for (carrier, result) in self.inner.carriers.iter().zip(results) {
            match result {
                Ok(carrier_rates) => rates.extend(carrier_rates),
                Err(e) => {
                    warn!(carrier = %carrier, error = %e, "Envia quote failed for carrier");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(err) if rates.is_empty() => Err(err),
            _ => Ok(rates),
        }
    }

    #[instrument(skip(self, shipment, rate), fields(carrier = %rate.carrier, service = %rate.service))]
    async fn create_label(
        &self,
        shipment: &ShipmentRequest,
        rate: &Rate,
    ) -> Result<Label, ShippingError> {
        let body = generate_body(shipment, rate);
        let response = self.inner.prober.post(GENERATE_PATH, &body).await?;
        check_meta(&response)?;

        let label = parse_label(&response, rate)?;
        info!(tracking_number = %label.tracking_number, "Envia label created");
        Ok(label)
    }
}

fn address_json(address: &Address) -> Value {
    let number = match &address.interior {
        Some(interior) => format!("{} Int. {interior}", address.number),
        None => address.number.clone(),
    };
    json!({
        "name": address.name,
        "company": address.company.clone().unwrap_or_default(),
        "email": address.email.clone().unwrap_or_default(),
        "phone": address.phone.clone().unwrap_or_default(),
        "street": address.street,
        "number": number,
        "district": address.district_or_city(),
        "city": address.city,
        "state": address.state_code,
        "country": address.country,
        "postalCode": address.postal_code,
        "reference": address.reference.clone().unwrap_or_default(),
    })
}

fn package_json(shipment: &ShipmentRequest) -> Value {
    let parcel = &shipment.parcel;
    json!({
        "content": shipment.contents,
        "amount": 1,
        "type": "box",
        "dimensions": {
            "length": json_number(parcel.length_cm),
            "width": json_number(parcel.width_cm),
            "height": json_number(parcel.height_cm),
        },
        "weight": json_number(parcel.billable_weight()),
        "insurance": 0,
        "declaredValue": json_number(shipment.declared_value),
        "weightUnit": "KG",
        "lengthUnit": "CM",
    })
}

fn rate_body(shipment: &ShipmentRequest, carrier: &str) -> Value {
    json!({
        "origin": address_json(&shipment.origin),
        "destination": address_json(&shipment.destination),
        "packages": [package_json(shipment)],
        "shipment": { "carrier": carrier, "type": 1 },
        "settings": { "currency": "MXN" },
    })
}

fn generate_body(shipment: &ShipmentRequest, rate: &Rate) -> Value {
    let mut body = json!({
        "origin": address_json(&shipment.origin),
        "destination": address_json(&shipment.destination),
        "packages": [package_json(shipment)],
        "shipment": { "carrier": rate.carrier, "service": rate.service, "type": 1 },
        "settings": {
            "printFormat": "PDF",
            "printSize": "STOCK_4X6",
            "currency": rate.currency,
        },
    });
    if let Some(reference) = &shipment.reference {
        body["shipment"]["reference"] = json!(reference);
    }
    body
}

/// Envia reports some failures as HTTP 200 with `"meta": "error"`.
fn check_meta(response: &Value) -> Result<(), ShippingError> {
    if response.get("meta").and_then(Value::as_str) != Some("error") {
        return Ok(());
    }

    let error = response.get("error").unwrap_or(&Value::Null);
    let message = ["message", "description"]
        .iter()
        .find_map(|key| error.get(key).and_then(text_value))
        .unwrap_or_else(|| "unknown error".to_string());

    Err(ShippingError::Rejected {
        provider: ProviderKind::Envia,
        status: 200,
        message,
    })
}

/// Transit days from `deliveryDate.dateDifference` or the largest number in
/// `deliveryEstimate` ("2-3 días" is 3).
fn parse_days(entry: &Value) -> Option<u32> {
    if let Some(days) = entry
        .pointer("/deliveryDate/dateDifference")
        .and_then(Value::as_u64)
    {
        return u32::try_from(days).ok();
    }

    let estimate = entry.get("deliveryEstimate")?.as_str()?;
    DAYS_RE
        .find_iter(estimate)
        .filter_map(|m| m.as_str().parse::<u32>().ok())
        .max()
}

fn parse_rates(response: &Value) -> Vec<Rate> {
    let Some(entries) = response.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let carrier = entry.get("carrier").and_then(text_value)?;
            let service = entry.get("service").and_then(text_value)?;
            let price = entry.get("totalPrice").and_then(decimal_value)?;
            Some(Rate {
                provider: ProviderKind::Envia,
                carrier: carrier.to_lowercase(),
                service,
                description: entry.get("serviceDescription").and_then(text_value),
                price,
                currency: entry
                    .get("currency")
                    .and_then(text_value)
                    .unwrap_or_else(|| "MXN".to_string()),
                days: parse_days(entry),
                rate_id: None,
                api: None,
            })
        })
        .collect()
}

fn parse_label(response: &Value, rate: &Rate) -> Result<Label, ShippingError> {
    let entry = response
        .get("data")
        .and_then(|data| data.as_array().and_then(|a| a.first()).or(Some(data)))
        .unwrap_or(&Value::Null);

    let tracking_number = entry.get("trackingNumber").and_then(text_value);
    let label_url = entry.get("label").and_then(text_value);

    let (Some(tracking_number), Some(label_url)) = (tracking_number, label_url) else {
        return Err(ShippingError::UnexpectedResponse {
            provider: ProviderKind::Envia,
            message: "label response has no tracking number or label".to_string(),
        });
    };

    Ok(Label {
        provider: ProviderKind::Envia,
        carrier: entry
            .get("carrier")
            .and_then(text_value)
            .unwrap_or_else(|| rate.carrier.clone()),
        service: entry
            .get("service")
            .and_then(text_value)
            .unwrap_or_else(|| rate.service.clone()),
        tracking_number,
        label_url,
        tracking_url: entry.get("trackUrl").and_then(text_value),
        cost: entry
            .get("totalPrice")
            .and_then(decimal_value)
            .or(Some(rate.price)),
    })
}
