//! Tienda Shipping - carrier integrations.
//!
//! Quotes rates and buys labels from Envia and Skydropx.
//!
//! # Architecture
//!
//! - [`address`] and [`parcel`] turn checkout data into what carriers accept
//! - [`probe`] walks a list of (base URL, [`auth::AuthScheme`]) candidates
//!   until one answers, and remembers the winner
//! - [`envia`] and [`skydropx`] speak each carrier's API through a prober
//! - [`orchestrator`] ranks rates and creates labels idempotently
//!
//! Nothing here touches the database. Persisting the label on the order is
//! the caller's job; [`orchestrator::generate_label`] only refuses to buy a
//! second label when told the order already has one.

pub mod address;
pub mod auth;
pub mod envia;
pub mod orchestrator;
pub mod parcel;
pub mod probe;
pub mod provider;
pub mod rates;
pub mod skydropx;

pub use address::{Address, AddressError, AddressInput};
pub use envia::{EnviaClient, EnviaConfig};
pub use orchestrator::{LabelOutcome, LabelRequest, QuoteResult, generate_label, quote};
pub use parcel::{ItemDimensions, PackagingDefaults, Parcel};
pub use probe::{Candidate, EndpointProber, FailureKind, ProbeFailure};
pub use provider::{Label, ProviderKind, ShipmentRequest, ShippingProvider};
pub use rates::{ApiGeneration, Preference, Rate, RateSelector};
pub use skydropx::{SkydropxClient, SkydropxConfig};

use thiserror::Error;

/// Errors that can occur when talking to a shipping carrier.
#[derive(Debug, Error)]
pub enum ShippingError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Address could not be normalized.
    #[error("Invalid address: {0}")]
    Address(#[from] AddressError),

    /// Parcel could not be built.
    #[error("Invalid parcel: {0}")]
    InvalidParcel(String),

    /// The carrier authenticated us but refused the request.
    #[error("{provider} rejected the request (HTTP {status}): {message}")]
    Rejected {
        provider: ProviderKind,
        status: u16,
        message: String,
    },

    /// Rate limited by the carrier.
    #[error("Rate limited by {provider}, retry after {retry_after} seconds")]
    RateLimited {
        provider: ProviderKind,
        retry_after: u64,
    },

    /// Credentials were refused while fetching a token.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Every candidate endpoint failed.
    #[error("{provider}: no endpoint accepted the request ({})", format_failures(.attempts))]
    Exhausted {
        provider: ProviderKind,
        attempts: Vec<ProbeFailure>,
    },

    /// The carrier answered with something we cannot use.
    #[error("Unexpected response from {provider}: {message}")]
    UnexpectedResponse {
        provider: ProviderKind,
        message: String,
    },

    /// No rate survived filtering.
    #[error("No shipping rates available")]
    NoRates,

    /// The requested carrier/service was not among the quoted rates.
    #[error("Rate {carrier}/{service} is not available")]
    RateUnavailable { carrier: String, service: String },

    /// Polling did not finish within the allowed attempts.
    #[error("Timed out waiting for {0}")]
    PollTimeout(String),

    /// The carrier reported a failed shipment or quotation.
    #[error("Label creation failed: {0}")]
    LabelFailed(String),

    /// The provider has no credentials configured.
    #[error("{0} is not configured")]
    NotConfigured(ProviderKind),
}

impl ShippingError {
    /// Whether the failure came from the carrier refusing our input, as
    /// opposed to transport or configuration trouble.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Address(_)
                | Self::InvalidParcel(_)
                | Self::Rejected { .. }
                | Self::NoRates
                | Self::RateUnavailable { .. }
        )
    }
}

fn format_failures(failures: &[ProbeFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
