//! Integration tests for Tienda.
//!
//! # Running Tests
//!
//! ```bash
//! # Carrier clients against local mock servers, and the router in-process
//! cargo test -p tienda-integration-tests
//!
//! # Tests against a running server and database
//! TIENDA_TEST_URL=http://127.0.0.1:3000 cargo test -p tienda-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `envia` - Envia client: endpoint probing, per-carrier fan-out, labels
//! - `skydropx` - Skydropx client: OAuth tokens, polling, legacy fallback
//! - `api` - Router behavior that needs no database
//! - `live` - Full checkout flows against a running server (ignored)

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use rust_decimal::Decimal;
use tokio::task::JoinHandle;

use tienda_shipping::address::normalize;
use tienda_shipping::{AddressInput, Parcel, ShipmentRequest};

/// A carrier stand-in listening on an ephemeral local port.
///
/// The server task is aborted when this is dropped.
pub struct MockServer {
    pub base_url: String,
    handle: JoinHandle<()>,
}

impl MockServer {
    /// Serve `router` on `127.0.0.1:0`.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    pub async fn start(router: Router) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock server");
        let addr = listener.local_addr().expect("Mock server has no address");

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self {
            base_url: format!("http://{addr}"),
            handle,
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Request counter shared between a mock handler and the test.
#[derive(Debug, Clone, Default)]
pub struct Hits(Arc<AtomicUsize>);

impl Hits {
    /// Count one request and return how many came before it.
    pub fn record(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// A base URL nothing listens on, for candidates that should fail to connect.
#[must_use]
pub fn unreachable_base_url() -> String {
    "http://127.0.0.1:9".to_string()
}

/// Warehouse in Guadalajara.
#[must_use]
pub fn origin() -> AddressInput {
    AddressInput {
        name: "Tienda Centro".to_string(),
        phone: Some("33 3614 0000".to_string()),
        street: "Av. Juárez 120".to_string(),
        district: Some("Centro".to_string()),
        city: "Guadalajara".to_string(),
        state: "Jalisco".to_string(),
        postal_code: "44100".to_string(),
        ..AddressInput::default()
    }
}

/// Customer in Mexico City.
#[must_use]
pub fn destination() -> AddressInput {
    AddressInput {
        name: "Ana López".to_string(),
        email: Some("ana@example.com".to_string()),
        phone: Some("55 1234 5678".to_string()),
        street: "Reforma 222 Int 4".to_string(),
        district: Some("Juárez".to_string()),
        city: "Cuauhtémoc".to_string(),
        state: "CDMX".to_string(),
        postal_code: "06600".to_string(),
        ..AddressInput::default()
    }
}

/// A one-box shipment between the fixture addresses.
///
/// # Panics
///
/// Panics if the fixture addresses stop normalizing.
#[must_use]
pub fn shipment() -> ShipmentRequest {
    ShipmentRequest {
        origin: normalize(&origin()).expect("origin fixture"),
        destination: normalize(&destination()).expect("destination fixture"),
        parcel: Parcel {
            length_cm: Decimal::from(30),
            width_cm: Decimal::from(25),
            height_cm: Decimal::from(10),
            weight_kg: Decimal::new(15, 1),
        },
        declared_value: Decimal::new(89900, 2),
        contents: "Ropa".to_string(),
        reference: Some("1042".to_string()),
    }
}

/// An HTTP client that does not wait long on dead candidates.
///
/// # Panics
///
/// Panics if the client cannot be built.
#[must_use]
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .expect("Failed to create HTTP client")
}
