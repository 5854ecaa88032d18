//! Skydropx shipping API client.
//!
//! Skydropx runs two API generations side by side:
//!
//! - **Pro**: OAuth2 client credentials. Quotations and shipments are
//!   asynchronous, so both are polled until the carrier answers.
//! - **Legacy**: `Authorization: Token token=<key>`. Creating a shipment
//!   returns its rates immediately; labels are bought by rate id.
//!
//! Pro is preferred. When every Pro endpoint fails (bad credentials, moved
//! host) the legacy API is tried; a Pro *rejection* is returned as-is since
//! legacy would reject the same input. Each [`Rate`] records the generation
//! that quoted it and labels are bought through that same generation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::ShippingError;
use crate::address::Address;
use crate::auth::AuthScheme;
use crate::probe::{Candidate, EndpointProber};
use crate::provider::{
    Label, ProviderKind, ShipmentRequest, ShippingProvider, decimal_value, json_number, text_value,
};
use crate::rates::Rate;

/// Skydropx Pro production API.
pub const PRO_PRODUCTION_URL: &str = "https://pro.skydropx.com";

/// Skydropx Pro sandbox API.
pub const PRO_SANDBOX_URL: &str = "https://sb-pro.skydropx.com";

/// Skydropx legacy production API.
pub const LEGACY_PRODUCTION_URL: &str = "https://api.skydropx.com";

/// Skydropx legacy sandbox API.
pub const LEGACY_SANDBOX_URL: &str = "https://api-demo.skydropx.com";

const OAUTH_TOKEN_PATH: &str = "/api/v1/oauth/token";

pub use crate::rates::ApiGeneration;

/// How long to wait for asynchronous quotations and shipments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_secs(2),
        }
    }
}

/// Skydropx credentials and options.
#[derive(Clone)]
pub struct SkydropxConfig {
    /// Pro OAuth2 client id.
    pub client_id: Option<String>,
    /// Pro OAuth2 client secret.
    pub client_secret: Option<SecretString>,
    /// Legacy API token.
    pub api_key: Option<SecretString>,
    /// Try sandbox hosts before production.
    pub sandbox: bool,
    /// Replaces the default Pro hosts when not empty.
    pub pro_base_urls: Vec<String>,
    /// Replaces the default legacy hosts when not empty.
    pub legacy_base_urls: Vec<String>,
    pub poll: PollPolicy,
    /// SAT product code required on Mexican waybills.
    pub consignment_note: String,
    /// SAT packaging code.
    pub package_type: String,
}

impl std::fmt::Debug for SkydropxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkydropxConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("sandbox", &self.sandbox)
            .field("pro_base_urls", &self.pro_base_urls)
            .field("legacy_base_urls", &self.legacy_base_urls)
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

impl Default for SkydropxConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            api_key: None,
            sandbox: false,
            pro_base_urls: Vec::new(),
            legacy_base_urls: Vec::new(),
            poll: PollPolicy::default(),
            consignment_note: "53102400".to_string(),
            package_type: "4G".to_string(),
        }
    }
}

fn ordered_hosts(overrides: &[String], sandbox: bool, production: &str, test: &str) -> Vec<String> {
    if !overrides.is_empty() {
        return overrides.to_vec();
    }
    if sandbox {
        vec![test.to_string(), production.to_string()]
    } else {
        vec![production.to_string(), test.to_string()]
    }
}

impl SkydropxConfig {
    /// Pro candidates, empty without client credentials.
    #[must_use]
    pub fn pro_candidates(&self) -> Vec<Candidate> {
        let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret) else {
            return Vec::new();
        };

        ordered_hosts(&self.pro_base_urls, self.sandbox, PRO_PRODUCTION_URL, PRO_SANDBOX_URL)
            .into_iter()
            .map(|base| {
                Candidate::new(
                    base,
                    AuthScheme::OAuth2ClientCredentials {
                        token_path: OAUTH_TOKEN_PATH.to_string(),
                        client_id: client_id.clone(),
                        client_secret: client_secret.clone(),
                        scope: None,
                    },
                )
            })
            .collect()
    }

    /// Legacy candidates, empty without an API key.
    #[must_use]
    pub fn legacy_candidates(&self) -> Vec<Candidate> {
        let Some(api_key) = &self.api_key else {
            return Vec::new();
        };

        ordered_hosts(
            &self.legacy_base_urls,
            self.sandbox,
            LEGACY_PRODUCTION_URL,
            LEGACY_SANDBOX_URL,
        )
        .into_iter()
        .flat_map(|base| {
            [
                Candidate::new(base.clone(), AuthScheme::token_authorization(api_key.clone())),
                Candidate::new(
                    base,
                    AuthScheme::Bearer {
                        token: api_key.clone(),
                    },
                ),
            ]
        })
        .collect()
    }
}

/// Skydropx API client.
#[derive(Clone, Debug)]
pub struct SkydropxClient {
    inner: Arc<SkydropxClientInner>,
}

#[derive(Debug)]
struct SkydropxClientInner {
    pro: Option<EndpointProber>,
    legacy: Option<EndpointProber>,
    poll: PollPolicy,
    consignment_note: String,
    package_type: String,
}

impl SkydropxClient {
    #[must_use]
    pub fn new(config: &SkydropxConfig, client: reqwest::Client) -> Self {
        let prober = |candidates: Vec<Candidate>| {
            (!candidates.is_empty())
                .then(|| EndpointProber::new(ProviderKind::Skydropx, client.clone(), candidates))
        };

        Self {
            inner: Arc::new(SkydropxClientInner {
                pro: prober(config.pro_candidates()),
                legacy: prober(config.legacy_candidates()),
                poll: config.poll,
                consignment_note: config.consignment_note.clone(),
                package_type: config.package_type.clone(),
            }),
        }
    }

    /// Whether any credentials are configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.inner.pro.is_some() || self.inner.legacy.is_some()
    }

    /// The probers in preference order, for connectivity checks.
    #[must_use]
    pub fn probers(&self) -> Vec<(ApiGeneration, &EndpointProber)> {
        let mut probers = Vec::new();
        if let Some(pro) = &self.inner.pro {
            probers.push((ApiGeneration::Pro, pro));
        }
        if let Some(legacy) = &self.inner.legacy {
            probers.push((ApiGeneration::Legacy, legacy));
        }
        probers
    }

    fn prober(&self, generation: ApiGeneration) -> Result<&EndpointProber, ShippingError> {
        match generation {
            ApiGeneration::Pro => self.inner.pro.as_ref(),
            ApiGeneration::Legacy => self.inner.legacy.as_ref(),
        }
        .ok_or(ShippingError::NotConfigured(ProviderKind::Skydropx))
    }

    /// GET `path` until `check` yields a value, within the poll policy.
    async fn poll_until<T>(
        &self,
        prober: &EndpointProber,
        path: &str,
        what: &str,
        mut check: impl FnMut(&Value) -> Result<Option<T>, ShippingError> + Send,
    ) -> Result<T, ShippingError> {
        for attempt in 1..=self.inner.poll.attempts {
            tokio::time::sleep(self.inner.poll.interval).await;
            let response = prober.get(path).await?;
            if let Some(done) = check(&response)? {
                return Ok(done);
            }
            debug!(attempt, what, "Still waiting on Skydropx");
        }
        Err(ShippingError::PollTimeout(what.to_string()))
    }

    // =========================================================================
    // Pro API
    // =========================================================================

    #[instrument(skip(self, prober, shipment))]
    async fn quote_pro(
        &self,
        prober: &EndpointProber,
        shipment: &ShipmentRequest,
    ) -> Result<Vec<Rate>, ShippingError> {
        let response = prober
            .post("/api/v1/quotations", &pro_quotation_body(shipment))
            .await?;

        if quotation_completed(&response) {
            return Ok(parse_pro_rates(&response));
        }

        let id = response
            .get("id")
            .and_then(text_value)
            .ok_or_else(|| unexpected("quotation response has no id"))?;

        self.poll_until(
            prober,
            &format!("/api/v1/quotations/{id}"),
            "quotation",
            |value| Ok(quotation_completed(value).then(|| parse_pro_rates(value))),
        )
        .await
    }

    #[instrument(skip(self, prober, shipment, rate))]
    async fn label_pro(
        &self,
        prober: &EndpointProber,
        shipment: &ShipmentRequest,
        rate: &Rate,
    ) -> Result<Label, ShippingError> {
        let rate_id = rate
            .rate_id
            .as_deref()
            .ok_or_else(|| ShippingError::LabelFailed("rate has no id".to_string()))?;

        let body = pro_shipment_body(
            shipment,
            rate_id,
            &self.inner.consignment_note,
            &self.inner.package_type,
        );
        let response = prober.post("/api/v1/shipments", &body).await?;

        if let Some(label) = pro_shipment_label(&response, rate)? {
            return Ok(label);
        }

        let id = response
            .pointer("/data/id")
            .and_then(text_value)
            .ok_or_else(|| unexpected("shipment response has no id"))?;

        self.poll_until(prober, &format!("/api/v1/shipments/{id}"), "shipment", |value| {
            pro_shipment_label(value, rate)
        })
        .await
    }

    // =========================================================================
    // Legacy API
    // =========================================================================

    #[instrument(skip(self, prober, shipment))]
    async fn quote_legacy(
        &self,
        prober: &EndpointProber,
        shipment: &ShipmentRequest,
    ) -> Result<Vec<Rate>, ShippingError> {
        let response = prober
            .post("/v1/shipments", &legacy_shipment_body(shipment))
            .await?;
        Ok(parse_legacy_rates(&response))
    }

    #[instrument(skip(self, prober, rate))]
    async fn label_legacy(&self, prober: &EndpointProber, rate: &Rate) -> Result<Label, ShippingError> {
        let rate_id = rate
            .rate_id
            .as_deref()
            .ok_or_else(|| ShippingError::LabelFailed("rate has no id".to_string()))?;

        // Legacy rate ids are integers; send them as numbers when they parse.
        let rate_id_json = rate_id
            .parse::<u64>()
            .map_or_else(|_| json!(rate_id), |id| json!(id));
        let response = prober
            .post(
                "/v1/labels",
                &json!({ "rate_id": rate_id_json, "label_format": "pdf" }),
            )
            .await?;

        if let Some(label) = legacy_label(&response, rate)? {
            return Ok(label);
        }

        let id = response
            .pointer("/data/id")
            .and_then(text_value)
            .ok_or_else(|| unexpected("label response has no id"))?;

        self.poll_until(prober, &format!("/v1/labels/{id}"), "label", |value| {
            legacy_label(value, rate)
        })
        .await
    }
}

#[async_trait]
impl ShippingProvider for SkydropxClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Skydropx
    }

    #[instrument(skip(self, shipment), fields(to = %shipment.destination.postal_code))]
    async fn quote(&self, shipment: &ShipmentRequest) -> Result<Vec<Rate>, ShippingError> {
        if let Some(pro) = &self.inner.pro {
            match self.quote_pro(pro, shipment).await {
                Ok(rates) => return Ok(rates),
                Err(err @ ShippingError::Exhausted { .. }) if self.inner.legacy.is_some() => {
                    warn!(error = %err, "Skydropx Pro unavailable, falling back to legacy API");
                }
                Err(err) => return Err(err),
            }
        }

        let legacy = self.prober(ApiGeneration::Legacy)?;
        self.quote_legacy(legacy, shipment).await
    }

    #[instrument(skip(self, shipment, rate), fields(carrier = %rate.carrier, service = %rate.service))]
    async fn create_label(
        &self,
        shipment: &ShipmentRequest,
        rate: &Rate,
    ) -> Result<Label, ShippingError> {
        let generation = rate.api.unwrap_or(if self.inner.pro.is_some() {
            ApiGeneration::Pro
        } else {
            ApiGeneration::Legacy
        });
        let prober = self.prober(generation)?;

        let label = match generation {
            ApiGeneration::Pro => self.label_pro(prober, shipment, rate).await?,
            ApiGeneration::Legacy => self.label_legacy(prober, rate).await?,
        };

        info!(
            tracking_number = %label.tracking_number,
            api = generation.as_str(),
            "Skydropx label created"
        );
        Ok(label)
    }
}

fn unexpected(message: &str) -> ShippingError {
    ShippingError::UnexpectedResponse {
        provider: ProviderKind::Skydropx,
        message: message.to_string(),
    }
}

fn parcel_json(shipment: &ShipmentRequest) -> Value {
    let parcel = &shipment.parcel;
    json!({
        "length": json_number(parcel.length_cm),
        "width": json_number(parcel.width_cm),
        "height": json_number(parcel.height_cm),
        "weight": json_number(parcel.billable_weight()),
    })
}

// -----------------------------------------------------------------------------
// Pro payloads
// -----------------------------------------------------------------------------

fn pro_area(address: &Address) -> Value {
    json!({
        "country_code": address.country.to_lowercase(),
        "postal_code": address.postal_code,
        "area_level1": address.state_name,
        "area_level2": address.city,
        "area_level3": address.district_or_city(),
    })
}

fn pro_party(address: &Address) -> Value {
    json!({
        "street1": address.street_line(),
        "name": address.name,
        "company": address.company.clone().unwrap_or_else(|| address.name.clone()),
        "phone": address.phone.clone().unwrap_or_default(),
        "email": address.email.clone().unwrap_or_default(),
        "reference": address.reference.clone().unwrap_or_default(),
    })
}

fn pro_quotation_body(shipment: &ShipmentRequest) -> Value {
    let mut body = json!({
        "quotation": {
            "address_from": pro_area(&shipment.origin),
            "address_to": pro_area(&shipment.destination),
            "parcel": parcel_json(shipment),
        }
    });
    if let Some(reference) = &shipment.reference {
        body["quotation"]["order_id"] = json!(reference);
    }
    body
}

fn pro_shipment_body(
    shipment: &ShipmentRequest,
    rate_id: &str,
    consignment_note: &str,
    package_type: &str,
) -> Value {
    json!({
        "shipment": {
            "rate_id": rate_id,
            "printing_format": "standard",
            "address_from": pro_party(&shipment.origin),
            "address_to": pro_party(&shipment.destination),
            "packages": [{
                "package_number": "1",
                "package_protected": false,
                "declared_value": json_number(shipment.declared_value),
                "consignment_note": consignment_note,
                "package_type": package_type,
            }],
        }
    })
}

fn quotation_completed(response: &Value) -> bool {
    response
        .get("is_completed")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn parse_pro_rates(response: &Value) -> Vec<Rate> {
    let Some(entries) = response.get("rates").and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter(|entry| entry.get("success").and_then(Value::as_bool).unwrap_or(true))
        .filter_map(|entry| {
            let carrier = entry.get("provider_name").and_then(text_value)?;
            let service = entry
                .get("provider_service_code")
                .and_then(text_value)
                .or_else(|| entry.get("provider_service_name").and_then(text_value))?;
            let price = entry.get("total").and_then(decimal_value)?;
            Some(Rate {
                provider: ProviderKind::Skydropx,
                carrier: carrier.to_lowercase(),
                service,
                description: entry.get("provider_service_name").and_then(text_value),
                price,
                currency: entry
                    .get("currency_code")
                    .and_then(text_value)
                    .unwrap_or_else(|| "MXN".to_string()),
                days: entry
                    .get("days")
                    .and_then(Value::as_u64)
                    .and_then(|d| u32::try_from(d).ok()),
                rate_id: entry.get("id").and_then(text_value),
                api: Some(ApiGeneration::Pro),
            })
        })
        .collect()
}

/// The label once a Pro shipment is done, `None` while it is in progress.
fn pro_shipment_label(response: &Value, rate: &Rate) -> Result<Option<Label>, ShippingError> {
    let attributes = response.pointer("/data/attributes").unwrap_or(&Value::Null);
    let status = attributes
        .get("workflow_status")
        .and_then(Value::as_str)
        .unwrap_or("in_progress");

    match status {
        "failed" | "cancelled" => {
            let reason = attributes
                .get("error")
                .or_else(|| attributes.get("error_message"))
                .and_then(text_value)
                .unwrap_or_else(|| format!("shipment {status}"));
            return Err(ShippingError::LabelFailed(reason));
        }
        "success" => {}
        _ => return Ok(None),
    }

    let package = response
        .get("included")
        .and_then(Value::as_array)
        .and_then(|items| {
            items
                .iter()
                .find(|item| item.get("type").and_then(Value::as_str) == Some("package"))
        })
        .and_then(|item| item.get("attributes"));

    let Some(package) = package else {
        return Ok(None);
    };
    let (Some(tracking_number), Some(label_url)) = (
        package.get("tracking_number").and_then(text_value),
        package.get("label_url").and_then(text_value),
    ) else {
        return Ok(None);
    };

    Ok(Some(Label {
        provider: ProviderKind::Skydropx,
        carrier: attributes
            .get("carrier_name")
            .and_then(text_value)
            .map_or_else(|| rate.carrier.clone(), |c| c.to_lowercase()),
        service: rate.service.clone(),
        tracking_number,
        label_url,
        tracking_url: package.get("tracking_url_provider").and_then(text_value),
        cost: attributes
            .get("total")
            .and_then(decimal_value)
            .or(Some(rate.price)),
    }))
}

// -----------------------------------------------------------------------------
// Legacy payloads
// -----------------------------------------------------------------------------

fn legacy_party(address: &Address) -> Value {
    json!({
        "province": address.state_name,
        "city": address.city,
        "name": address.name,
        "zip": address.postal_code,
        "country": address.country,
        "address1": address.street_line(),
        "address2": address.district_or_city(),
        "company": address.company.clone().unwrap_or_else(|| address.name.clone()),
        "phone": address.phone.clone().unwrap_or_default(),
        "email": address.email.clone().unwrap_or_default(),
        "reference": address.reference.clone().unwrap_or_default(),
    })
}

fn legacy_shipment_body(shipment: &ShipmentRequest) -> Value {
    let mut parcel = parcel_json(shipment);
    parcel["distance_unit"] = json!("CM");
    parcel["mass_unit"] = json!("KG");

    json!({
        "address_from": legacy_party(&shipment.origin),
        "address_to": legacy_party(&shipment.destination),
        "parcels": [parcel],
    })
}

fn parse_legacy_rates(response: &Value) -> Vec<Rate> {
    let Some(included) = response.get("included").and_then(Value::as_array) else {
        return Vec::new();
    };

    included
        .iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("rates"))
        .filter_map(|item| {
            let attributes = item.get("attributes")?;
            if attributes
                .get("out_of_area_service")
                .and_then(Value::as_bool)
                .unwrap_or(false)
            {
                return None;
            }
            let carrier = attributes.get("provider").and_then(text_value)?;
            let service = attributes
                .get("service_level_code")
                .and_then(text_value)
                .or_else(|| attributes.get("service_level_name").and_then(text_value))?;
            let price = attributes.get("total_pricing").and_then(decimal_value)?;
            Some(Rate {
                provider: ProviderKind::Skydropx,
                carrier: carrier.to_lowercase(),
                service,
                description: attributes.get("service_level_name").and_then(text_value),
                price,
                currency: attributes
                    .get("currency_local")
                    .and_then(text_value)
                    .unwrap_or_else(|| "MXN".to_string()),
                days: attributes
                    .get("days")
                    .and_then(Value::as_u64)
                    .and_then(|d| u32::try_from(d).ok()),
                rate_id: item.get("id").and_then(text_value),
                api: Some(ApiGeneration::Legacy),
            })
        })
        .collect()
}

/// The label once a legacy label request is done, `None` while pending.
fn legacy_label(response: &Value, rate: &Rate) -> Result<Option<Label>, ShippingError> {
    let attributes = response.pointer("/data/attributes").unwrap_or(&Value::Null);

    if attributes.get("status").and_then(Value::as_str) == Some("ERROR") {
        let reason = attributes
            .get("error_message")
            .and_then(message_text)
            .unwrap_or_else(|| "label request failed".to_string());
        return Err(ShippingError::LabelFailed(reason));
    }

    let (Some(tracking_number), Some(label_url)) = (
        attributes.get("tracking_number").and_then(text_value),
        attributes.get("label_url").and_then(text_value),
    ) else {
        return Ok(None);
    };

    Ok(Some(Label {
        provider: ProviderKind::Skydropx,
        carrier: rate.carrier.clone(),
        service: rate.service.clone(),
        tracking_number,
        label_url,
        tracking_url: attributes
            .get("tracking_url_provider")
            .and_then(text_value),
        cost: Some(rate.price),
    }))
}

/// Legacy errors come as a string or a list of `{message}` objects.
fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|item| item.get("message").and_then(text_value).or_else(|| text_value(item)))
                .collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        other => text_value(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{AddressInput, normalize};
    use crate::parcel::Parcel;

    fn d(s: &str) -> rust_decimal::Decimal {
        s.parse().expect("decimal literal")
    }

    fn shipment() -> ShipmentRequest {
        let address = |name: &str, street: &str, city: &str, state: &str, cp: &str| {
            normalize(&AddressInput {
                name: name.to_string(),
                street: street.to_string(),
                city: city.to_string(),
                state: state.to_string(),
                postal_code: cp.to_string(),
                phone: Some("3312345678".to_string()),
                ..AddressInput::default()
            })
            .expect("address")
        };
        ShipmentRequest {
            origin: address("Tienda", "Madero 10", "Guadalajara", "Jalisco", "44100"),
            destination: address("Luis", "Hidalgo 12", "Monterrey", "NL", "64000"),
            parcel: Parcel {
                length_cm: d("30"),
                width_cm: d("25"),
                height_cm: d("10"),
                weight_kg: d("2"),
            },
            declared_value: d("500"),
            contents: "Ropa".to_string(),
            reference: None,
        }
    }

    fn rate(api: ApiGeneration) -> Rate {
        Rate {
            provider: ProviderKind::Skydropx,
            carrier: "estafeta".to_string(),
            service: "standard".to_string(),
            description: None,
            price: d("150"),
            currency: "MXN".to_string(),
            days: Some(3),
            rate_id: Some("r-1".to_string()),
            api: Some(api),
        }
    }

    #[test]
    fn test_candidates_depend_on_credentials() {
        let mut config = SkydropxConfig::default();
        assert!(config.pro_candidates().is_empty());
        assert!(config.legacy_candidates().is_empty());

        config.client_id = Some("id".to_string());
        config.client_secret = Some(SecretString::from("secret"));
        config.api_key = Some(SecretString::from("key"));

        let pro = config.pro_candidates();
        assert_eq!(pro.len(), 2);
        assert_eq!(pro[0].describe(), "https://pro.skydropx.com (oauth2)");

        let legacy = config.legacy_candidates();
        assert_eq!(legacy.len(), 4);
        assert_eq!(legacy[0].describe(), "https://api.skydropx.com (token)");
        assert_eq!(legacy[1].describe(), "https://api.skydropx.com (bearer)");
    }

    #[test]
    fn test_sandbox_hosts_come_first() {
        let config = SkydropxConfig {
            client_id: Some("id".to_string()),
            client_secret: Some(SecretString::from("secret")),
            sandbox: true,
            ..SkydropxConfig::default()
        };
        assert_eq!(config.pro_candidates()[0].base_url, PRO_SANDBOX_URL);
    }

    #[test]
    fn test_pro_quotation_body() {
        let body = pro_quotation_body(&shipment());
        let quotation = &body["quotation"];
        assert_eq!(quotation["address_from"]["country_code"], "mx");
        assert_eq!(quotation["address_from"]["area_level1"], "Jalisco");
        assert_eq!(quotation["address_to"]["area_level1"], "Nuevo León");
        assert_eq!(quotation["address_to"]["area_level3"], "Monterrey");
        assert_eq!(quotation["parcel"]["weight"], json!(2));
    }

    #[test]
    fn test_parse_pro_rates_skips_unsuccessful() {
        let response = json!({
            "id": "q-1",
            "is_completed": true,
            "rates": [
                {
                    "id": "r-1", "success": true, "provider_name": "Estafeta",
                    "provider_service_name": "Terrestre", "provider_service_code": "standard",
                    "total": "150.00", "currency_code": "MXN", "days": 3
                },
                { "id": "r-2", "success": false, "provider_name": "DHL", "total": null },
                {
                    "id": "r-3", "success": true, "provider_name": "FedEx",
                    "provider_service_name": "Express Saver", "total": 210.5, "days": 2
                }
            ]
        });
        let rates = parse_pro_rates(&response);
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].carrier, "estafeta");
        assert_eq!(rates[0].service, "standard");
        assert_eq!(rates[0].rate_id.as_deref(), Some("r-1"));
        assert_eq!(rates[0].api, Some(ApiGeneration::Pro));
        assert_eq!(rates[1].service, "Express Saver");
        assert!(quotation_completed(&response));
    }

    #[test]
    fn test_pro_shipment_states() {
        let rate = rate(ApiGeneration::Pro);
        let pending = json!({ "data": { "id": "s-1", "attributes": { "workflow_status": "in_progress" } } });
        assert!(pro_shipment_label(&pending, &rate).expect("pending").is_none());

        let failed = json!({ "data": { "attributes": { "workflow_status": "failed", "error": "No coverage" } } });
        assert!(matches!(
            pro_shipment_label(&failed, &rate),
            Err(ShippingError::LabelFailed(ref reason)) if reason == "No coverage"
        ));

        let done = json!({
            "data": { "id": "s-1", "attributes": { "workflow_status": "success", "carrier_name": "Estafeta" } },
            "included": [
                { "type": "address", "attributes": {} },
                { "type": "package", "attributes": {
                    "tracking_number": "EST123",
                    "label_url": "https://labels.skydropx.com/EST123.pdf",
                    "tracking_url_provider": "https://rastreo.estafeta.com/EST123"
                } }
            ]
        });
        let label = pro_shipment_label(&done, &rate)
            .expect("done")
            .expect("label present");
        assert_eq!(label.tracking_number, "EST123");
        assert_eq!(label.carrier, "estafeta");
        assert_eq!(label.cost, Some(d("150")));
    }

    #[test]
    fn test_success_without_package_keeps_polling() {
        let response = json!({ "data": { "attributes": { "workflow_status": "success" } }, "included": [] });
        assert!(pro_shipment_label(&response, &rate(ApiGeneration::Pro)).expect("ok").is_none());
    }

    #[test]
    fn test_legacy_body_and_rates() {
        let body = legacy_shipment_body(&shipment());
        assert_eq!(body["address_to"]["province"], "Nuevo León");
        assert_eq!(body["address_to"]["address1"], "Hidalgo 12");
        assert_eq!(body["parcels"][0]["mass_unit"], "KG");

        let response = json!({
            "data": { "id": "9001" },
            "included": [
                { "id": "11", "type": "parcels", "attributes": {} },
                { "id": "12", "type": "rates", "attributes": {
                    "total_pricing": "145.00", "provider": "ESTAFETA",
                    "service_level_name": "Terrestre", "service_level_code": "ESTAFETA_STANDARD",
                    "days": 4, "currency_local": "MXN", "out_of_area_service": false
                } },
                { "id": "13", "type": "rates", "attributes": {
                    "total_pricing": "99.00", "provider": "REDPACK",
                    "service_level_code": "ECOEXPRESS", "out_of_area_service": true
                } }
            ]
        });
        let rates = parse_legacy_rates(&response);
        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].carrier, "estafeta");
        assert_eq!(rates[0].service, "ESTAFETA_STANDARD");
        assert_eq!(rates[0].rate_id.as_deref(), Some("12"));
        assert_eq!(rates[0].api, Some(ApiGeneration::Legacy));
    }

    #[test]
    fn test_legacy_label_states() {
        let rate = rate(ApiGeneration::Legacy);
        let done = json!({ "data": { "id": "77", "attributes": {
            "status": "SUCCESS", "tracking_number": "RP1", "label_url": "https://x/RP1.pdf"
        } } });
        let label = legacy_label(&done, &rate).expect("ok").expect("label");
        assert_eq!(label.tracking_number, "RP1");

        let error = json!({ "data": { "attributes": {
            "status": "ERROR", "error_message": [{ "message": "Saldo insuficiente" }]
        } } });
        assert!(matches!(
            legacy_label(&error, &rate),
            Err(ShippingError::LabelFailed(ref reason)) if reason == "Saldo insuficiente"
        ));

        let pending = json!({ "data": { "id": "77", "attributes": { "status": "CREATED" } } });
        assert!(legacy_label(&pending, &rate).expect("ok").is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_client() {
        let client = SkydropxClient::new(&SkydropxConfig::default(), reqwest::Client::new());
        assert!(!client.is_configured());
        let err = client.quote(&shipment()).await.expect_err("not configured");
        assert!(matches!(err, ShippingError::NotConfigured(ProviderKind::Skydropx)));
    }
}
