//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use thiserror::Error;

use crate::config::ServerConfig;
use crate::services::{AblyClient, EmailService, RealtimeError, ShippingService};

/// Timeout for every outbound HTTP call (carriers, Ably).
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Error building application state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("SMTP setup error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("realtime setup error: {0}")]
    Realtime(#[from] RealtimeError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    pool: PgPool,
    shipping: ShippingService,
    email: Option<EmailService>,
    realtime: Option<AblyClient>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Email and the chat relay are enabled only when configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client, SMTP relay or Ably client cannot
    /// be built.
    pub fn new(config: ServerConfig, pool: PgPool) -> Result<Self, StateError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("tienda/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let shipping = ShippingService::new(&config.shipping, &http);
        let email = config
            .email
            .as_ref()
            .map(|email| EmailService::new(email, &config.store.name, &config.base_url))
            .transpose()?;
        let realtime = config
            .ably
            .as_ref()
            .map(|ably| AblyClient::new(ably, http.clone()))
            .transpose()?;

        tracing::info!(
            carriers = ?shipping.configured(),
            email = email.is_some(),
            realtime = realtime.is_some(),
            "Application state ready"
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                shipping,
                email,
                realtime,
            }),
        })
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn shipping(&self) -> &ShippingService {
        &self.inner.shipping
    }

    /// The email service, when SMTP is configured.
    #[must_use]
    pub fn email(&self) -> Option<&EmailService> {
        self.inner.email.as_ref()
    }

    /// The chat relay, when Ably is configured.
    #[must_use]
    pub fn realtime(&self) -> Option<&AblyClient> {
        self.inner.realtime.as_ref()
    }
}
