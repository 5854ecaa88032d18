//! Skydropx client against local mock servers.
//!
//! Pro quotations and shipments are asynchronous and OAuth-protected; the
//! legacy API takes a static token. These tests run both generations and the
//! fallback between them.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::{Form, Path};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{MethodRouter, get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::{Value, json};

use tienda_integration_tests::{Hits, MockServer, http_client, shipment};
use tienda_shipping::skydropx::PollPolicy;
use tienda_shipping::{
    ApiGeneration, ProviderKind, RateSelector, ShippingError, ShippingProvider, SkydropxClient,
    SkydropxConfig, quote,
};

const CLIENT_ID: &str = "sky-client";
const CLIENT_SECRET: &str = "sky-client-secret";
const LEGACY_KEY: &str = "legacy-key";

fn fast_poll(attempts: u32) -> PollPolicy {
    PollPolicy {
        attempts,
        interval: Duration::from_millis(10),
    }
}

fn pro_config(base_url: &str) -> SkydropxConfig {
    SkydropxConfig {
        client_id: Some(CLIENT_ID.to_string()),
        client_secret: Some(SecretString::from(CLIENT_SECRET)),
        pro_base_urls: vec![base_url.to_string()],
        poll: fast_poll(5),
        ..SkydropxConfig::default()
    }
}

fn legacy_config(base_url: &str) -> SkydropxConfig {
    SkydropxConfig {
        api_key: Some(SecretString::from(LEGACY_KEY)),
        legacy_base_urls: vec![base_url.to_string()],
        poll: fast_poll(5),
        ..SkydropxConfig::default()
    }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Client-credentials endpoint handing out `tok-1`, `tok-2`, ...
fn token_route(hits: Hits) -> MethodRouter {
    post(move |Form(form): Form<HashMap<String, String>>| async move {
        let n = hits.record() + 1;
        let field = |name: &str| form.get(name).map(String::as_str);
        if field("grant_type") != Some("client_credentials")
            || field("client_id") != Some(CLIENT_ID)
            || field("client_secret") != Some(CLIENT_SECRET)
        {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "invalid_client" })),
            )
                .into_response();
        }
        Json(json!({
            "access_token": format!("tok-{n}"),
            "token_type": "Bearer",
            "expires_in": 7200
        }))
        .into_response()
    })
}

fn rejecting_token_route() -> MethodRouter {
    post(|| async {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid_client", "error_description": "Client authentication failed" })),
        )
    })
}

fn completed_quotation() -> Value {
    json!({
        "id": "q-1",
        "is_completed": true,
        "rates": [
            {
                "id": "r-1",
                "success": true,
                "provider_name": "Estafeta",
                "provider_service_code": "standard",
                "provider_service_name": "Estafeta Terrestre",
                "total": "168.20",
                "currency_code": "MXN",
                "days": 4
            },
            {
                "id": "r-2",
                "success": false,
                "provider_name": "Paquetexpress",
                "provider_service_code": "standard",
                "total": "99.00",
                "days": 3
            },
            {
                "id": "r-3",
                "success": true,
                "provider_name": "DHL",
                "provider_service_code": "express",
                "provider_service_name": "DHL Express",
                "total": 245,
                "currency_code": "MXN",
                "days": 1
            }
        ]
    })
}

fn pending_quotation() -> Value {
    json!({ "id": "q-1", "is_completed": false, "rates": [] })
}

/// Quotations that require `accepted_token`, answered immediately.
fn quotation_route(accepted_token: &'static str, hits: Hits) -> MethodRouter {
    post(move |headers: HeaderMap| async move {
        hits.record();
        if bearer(&headers).as_deref() != Some(accepted_token) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "invalid_token" })),
            )
                .into_response();
        }
        Json(completed_quotation()).into_response()
    })
}

#[tokio::test]
async fn test_oauth_token_is_fetched_once_and_reused() {
    let tokens = Hits::default();
    let quotations = Hits::default();
    let server = MockServer::start(
        Router::new()
            .route("/api/v1/oauth/token", token_route(tokens.clone()))
            .route("/api/v1/quotations", quotation_route("tok-1", quotations.clone())),
    )
    .await;
    let client = SkydropxClient::new(&pro_config(&server.base_url), http_client());

    let rates = client.quote(&shipment()).await.expect("rates");
    client.quote(&shipment()).await.expect("rates again");

    assert_eq!(tokens.count(), 1);
    assert_eq!(quotations.count(), 2);

    // The unsuccessful Paquetexpress entry is dropped.
    assert_eq!(rates.len(), 2);
    let estafeta = &rates[0];
    assert_eq!(estafeta.provider, ProviderKind::Skydropx);
    assert_eq!(estafeta.carrier, "estafeta");
    assert_eq!(estafeta.service, "standard");
    assert_eq!(estafeta.price, Decimal::new(16820, 2));
    assert_eq!(estafeta.rate_id.as_deref(), Some("r-1"));
    assert_eq!(estafeta.api, Some(ApiGeneration::Pro));
}

#[tokio::test]
async fn test_revoked_token_is_refreshed_once() {
    let tokens = Hits::default();
    let quotations = Hits::default();
    let server = MockServer::start(
        Router::new()
            .route("/api/v1/oauth/token", token_route(tokens.clone()))
            .route("/api/v1/quotations", quotation_route("tok-2", quotations.clone())),
    )
    .await;
    let client = SkydropxClient::new(&pro_config(&server.base_url), http_client());

    let rates = client.quote(&shipment()).await.expect("rates after refresh");
    assert_eq!(rates.len(), 2);
    assert_eq!(tokens.count(), 2);
    assert_eq!(quotations.count(), 2);

    client.quote(&shipment()).await.expect("rates with cached token");
    assert_eq!(tokens.count(), 2);
}

#[tokio::test]
async fn test_quotation_is_polled_until_complete() {
    let polls = Hits::default();
    let poll_hits = polls.clone();
    let server = MockServer::start(
        Router::new()
            .route("/api/v1/oauth/token", token_route(Hits::default()))
            .route(
                "/api/v1/quotations",
                post(|| async { Json(pending_quotation()) }),
            )
            .route(
                "/api/v1/quotations/{id}",
                get(move |Path(id): Path<String>| async move {
                    assert_eq!(id, "q-1");
                    if poll_hits.record() < 2 {
                        return Json(pending_quotation());
                    }
                    Json(completed_quotation())
                }),
            ),
    )
    .await;
    let client = SkydropxClient::new(&pro_config(&server.base_url), http_client());

    let result = quote(&client, &shipment(), &RateSelector::default())
        .await
        .expect("quote");
    assert_eq!(polls.count(), 3);
    assert_eq!(result.best.carrier, "estafeta");
    assert_eq!(result.rates.len(), 2);
}

#[tokio::test]
async fn test_quotation_polling_gives_up() {
    let server = MockServer::start(
        Router::new()
            .route("/api/v1/oauth/token", token_route(Hits::default()))
            .route(
                "/api/v1/quotations",
                post(|| async { Json(pending_quotation()) }),
            )
            .route(
                "/api/v1/quotations/{id}",
                get(|| async { Json(pending_quotation()) }),
            ),
    )
    .await;
    let mut config = pro_config(&server.base_url);
    config.poll = fast_poll(2);
    let client = SkydropxClient::new(&config, http_client());

    let err = client.quote(&shipment()).await.expect_err("timeout");
    assert!(matches!(err, ShippingError::PollTimeout(ref what) if what == "quotation"));
}

fn shipment_in_progress() -> Value {
    json!({
        "data": {
            "id": "s-1",
            "type": "shipment",
            "attributes": { "workflow_status": "in_progress" }
        }
    })
}

fn shipment_done() -> Value {
    json!({
        "data": {
            "id": "s-1",
            "type": "shipment",
            "attributes": {
                "workflow_status": "success",
                "carrier_name": "Estafeta",
                "total": "168.20"
            }
        },
        "included": [
            { "type": "parcel", "attributes": {} },
            {
                "type": "package",
                "attributes": {
                    "tracking_number": "EST999000",
                    "label_url": "https://sky.test/labels/EST999000.pdf",
                    "tracking_url_provider": "https://estafeta.test/EST999000"
                }
            }
        ]
    })
}

#[tokio::test]
async fn test_shipment_is_polled_until_label_is_ready() {
    let polls = Hits::default();
    let poll_hits = polls.clone();
    let server = MockServer::start(
        Router::new()
            .route("/api/v1/oauth/token", token_route(Hits::default()))
            .route("/api/v1/quotations", quotation_route("tok-1", Hits::default()))
            .route(
                "/api/v1/shipments",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body.pointer("/shipment/rate_id"), Some(&json!("r-1")));
                    assert_eq!(
                        body.pointer("/shipment/packages/0/consignment_note"),
                        Some(&json!("53102400"))
                    );
                    Json(shipment_in_progress())
                }),
            )
            .route(
                "/api/v1/shipments/{id}",
                get(move || async move {
                    if poll_hits.record() == 0 {
                        return Json(shipment_in_progress());
                    }
                    Json(shipment_done())
                }),
            ),
    )
    .await;
    let client = SkydropxClient::new(&pro_config(&server.base_url), http_client());

    let quoted = quote(&client, &shipment(), &RateSelector::default())
        .await
        .expect("quote");
    let label = client
        .create_label(&shipment(), &quoted.best)
        .await
        .expect("label");

    assert_eq!(polls.count(), 2);
    assert_eq!(label.provider, ProviderKind::Skydropx);
    assert_eq!(label.carrier, "estafeta");
    assert_eq!(label.service, "standard");
    assert_eq!(label.tracking_number, "EST999000");
    assert_eq!(label.label_url, "https://sky.test/labels/EST999000.pdf");
    assert_eq!(
        label.tracking_url.as_deref(),
        Some("https://estafeta.test/EST999000")
    );
    assert_eq!(label.cost, Some(Decimal::new(16820, 2)));
}

#[tokio::test]
async fn test_failed_shipment_is_an_error() {
    let server = MockServer::start(
        Router::new()
            .route("/api/v1/oauth/token", token_route(Hits::default()))
            .route("/api/v1/quotations", quotation_route("tok-1", Hits::default()))
            .route(
                "/api/v1/shipments",
                post(|| async { Json(shipment_in_progress()) }),
            )
            .route(
                "/api/v1/shipments/{id}",
                get(|| async {
                    Json(json!({
                        "data": {
                            "id": "s-1",
                            "attributes": {
                                "workflow_status": "failed",
                                "error": "Sin cobertura en destino"
                            }
                        }
                    }))
                }),
            ),
    )
    .await;
    let client = SkydropxClient::new(&pro_config(&server.base_url), http_client());

    let quoted = quote(&client, &shipment(), &RateSelector::default())
        .await
        .expect("quote");
    let err = client
        .create_label(&shipment(), &quoted.best)
        .await
        .expect_err("failed shipment");
    assert!(matches!(
        err,
        ShippingError::LabelFailed(ref reason) if reason == "Sin cobertura en destino"
    ));
}

/// Legacy host: `/v1/shipments` with rates in `included`, `/v1/labels` polled by id.
fn legacy_router(hits: Hits) -> Router {
    let is_legacy_token = |headers: &HeaderMap| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == format!("Token token={LEGACY_KEY}"))
    };

    Router::new()
        .route(
            "/v1/shipments",
            post(move |headers: HeaderMap| async move {
                hits.record();
                if !is_legacy_token(&headers) {
                    return StatusCode::UNAUTHORIZED.into_response();
                }
                Json(json!({
                    "data": { "id": "9001", "type": "shipments" },
                    "included": [
                        {
                            "id": "5501",
                            "type": "rates",
                            "attributes": {
                                "provider": "REDPACK",
                                "service_level_code": "ECOEXPRESS",
                                "service_level_name": "Eco Express",
                                "total_pricing": "132.00",
                                "currency_local": "MXN",
                                "days": 3,
                                "out_of_area_service": false
                            }
                        },
                        {
                            "id": "5502",
                            "type": "rates",
                            "attributes": {
                                "provider": "FEDEX",
                                "service_level_code": "STANDARD_OVERNIGHT",
                                "total_pricing": "410.00",
                                "days": 1,
                                "out_of_area_service": true
                            }
                        }
                    ]
                }))
                .into_response()
            }),
        )
        .route(
            "/v1/labels",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body.get("rate_id"), Some(&json!(5501)));
                Json(json!({ "data": { "id": "77", "attributes": { "status": "CREATED" } } }))
            }),
        )
        .route(
            "/v1/labels/{id}",
            get(|| async {
                Json(json!({
                    "data": {
                        "id": "77",
                        "attributes": {
                            "status": "SUCCESS",
                            "tracking_number": "RP123456",
                            "label_url": "https://legacy.sky.test/RP123456.pdf"
                        }
                    }
                }))
            }),
        )
}

#[tokio::test]
async fn test_legacy_api_quotes_and_labels() {
    let server = MockServer::start(legacy_router(Hits::default())).await;
    let client = SkydropxClient::new(&legacy_config(&server.base_url), http_client());

    let rates = client.quote(&shipment()).await.expect("rates");
    // The out-of-area FedEx rate is dropped.
    assert_eq!(rates.len(), 1);
    let rate = &rates[0];
    assert_eq!(rate.carrier, "redpack");
    assert_eq!(rate.service, "ECOEXPRESS");
    assert_eq!(rate.api, Some(ApiGeneration::Legacy));

    let label = client.create_label(&shipment(), rate).await.expect("label");
    assert_eq!(label.tracking_number, "RP123456");
    assert_eq!(label.carrier, "redpack");
    assert_eq!(label.cost, Some(Decimal::from(132)));
}

#[tokio::test]
async fn test_falls_back_to_legacy_when_pro_is_exhausted() {
    let pro = MockServer::start(
        Router::new().route("/api/v1/oauth/token", rejecting_token_route()),
    )
    .await;
    let legacy_hits = Hits::default();
    let legacy = MockServer::start(legacy_router(legacy_hits.clone())).await;

    let config = SkydropxConfig {
        legacy_base_urls: vec![legacy.base_url.clone()],
        api_key: Some(SecretString::from(LEGACY_KEY)),
        ..pro_config(&pro.base_url)
    };
    let client = SkydropxClient::new(&config, http_client());
    assert_eq!(client.probers().len(), 2);

    let rates = client.quote(&shipment()).await.expect("legacy rates");
    assert_eq!(rates.len(), 1);
    assert_eq!(rates[0].api, Some(ApiGeneration::Legacy));
    assert_eq!(legacy_hits.count(), 1);

    // The legacy rate is labeled through the legacy API.
    let label = client
        .create_label(&shipment(), &rates[0])
        .await
        .expect("label");
    assert_eq!(label.tracking_number, "RP123456");
}

#[tokio::test]
async fn test_pro_rejection_does_not_fall_back() {
    let pro = MockServer::start(
        Router::new()
            .route("/api/v1/oauth/token", token_route(Hits::default()))
            .route(
                "/api/v1/quotations",
                post(|| async {
                    (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        Json(json!({ "errors": { "zip_to": ["is invalid"] } })),
                    )
                }),
            ),
    )
    .await;
    let legacy_hits = Hits::default();
    let legacy = MockServer::start(legacy_router(legacy_hits.clone())).await;

    let config = SkydropxConfig {
        legacy_base_urls: vec![legacy.base_url.clone()],
        api_key: Some(SecretString::from(LEGACY_KEY)),
        ..pro_config(&pro.base_url)
    };
    let client = SkydropxClient::new(&config, http_client());

    let err = client.quote(&shipment()).await.expect_err("rejected");
    assert!(matches!(
        err,
        ShippingError::Rejected { status: 422, ref message, .. } if message == "zip_to: is invalid"
    ));
    assert_eq!(legacy_hits.count(), 0);
}
