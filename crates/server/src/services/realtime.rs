//! Ably relay for live support chat.
//!
//! Messages are stored in the database first, then published on the
//! conversation's channel so the customer widget and agent inbox update
//! without polling. Browsers never see the API key: they ask the server
//! for a signed token request scoped to one channel.
//!
//! # API Reference
//!
//! - Publish: `POST {rest_url}/channels/{channel}/messages` with basic auth
//! - Token requests: HMAC-SHA256 over the request fields, base64-encoded

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::Rng;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::instrument;

use crate::config::AblyConfig;

type HmacSha256 = Hmac<Sha256>;

/// Token lifetime handed to chat widgets.
const TOKEN_TTL_MS: i64 = 60 * 60 * 1000;

/// Errors from the realtime relay.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Ably refused the request.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Rate limited by Ably.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The key could not be used as a header or signing key.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Payload could not be encoded.
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A signed token request a browser exchanges with Ably for a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub key_name: String,
    pub ttl: i64,
    /// JSON object mapping channel names to allowed operations.
    pub capability: String,
    pub client_id: String,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    pub nonce: String,
    pub mac: String,
}

#[derive(Debug, Serialize)]
struct PublishBody<'a, T: Serialize> {
    name: &'a str,
    data: &'a T,
}

/// Ably REST client.
#[derive(Clone)]
pub struct AblyClient {
    inner: Arc<AblyClientInner>,
}

struct AblyClientInner {
    client: reqwest::Client,
    config: AblyConfig,
    authorization: HeaderValue,
}

impl AblyClient {
    /// Create a client sharing the server's HTTP connection pool.
    ///
    /// # Errors
    ///
    /// Returns `RealtimeError::InvalidKey` if the key is not a valid header value.
    pub fn new(config: &AblyConfig, client: reqwest::Client) -> Result<Self, RealtimeError> {
        let encoded = BASE64.encode(config.basic_credentials());
        let mut authorization = HeaderValue::from_str(&format!("Basic {encoded}"))
            .map_err(|e| RealtimeError::InvalidKey(e.to_string()))?;
        authorization.set_sensitive(true);

        Ok(Self {
            inner: Arc::new(AblyClientInner {
                client,
                config: config.clone(),
                authorization,
            }),
        })
    }

    /// Publish an event on a channel.
    ///
    /// # Errors
    ///
    /// Returns `RealtimeError` if Ably rejects the message or is unreachable.
    #[instrument(skip(self, data), fields(channel = %channel, event = %event))]
    pub async fn publish<T: Serialize + Sync>(
        &self,
        channel: &str,
        event: &str,
        data: &T,
    ) -> Result<(), RealtimeError> {
        let url = format!(
            "{}/channels/{}/messages",
            self.inner.config.rest_url,
            urlencoding::encode(channel)
        );

        let response = self
            .inner
            .client
            .post(&url)
            .header(AUTHORIZATION, self.inner.authorization.clone())
            .json(&PublishBody { name: event, data })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!("Realtime message published");
            return Ok(());
        }

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(RealtimeError::RateLimited(retry_after));
        }

        let message = response.text().await.unwrap_or_default();
        Err(RealtimeError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Sign a token request that lets `client_id` use only `channels`.
    ///
    /// Agents get publish and subscribe on their channels; customers get the
    /// same on their one conversation.
    ///
    /// # Errors
    ///
    /// Returns `RealtimeError::Encode` if the capability cannot be encoded.
    pub fn token_request(
        &self,
        client_id: &str,
        channels: &[String],
    ) -> Result<TokenRequest, RealtimeError> {
        let nonce = format!("{:016x}", rand::rng().random::<u64>());
        self.sign_token_request(client_id, channels, Utc::now().timestamp_millis(), nonce)
    }

    fn sign_token_request(
        &self,
        client_id: &str,
        channels: &[String],
        timestamp: i64,
        nonce: String,
    ) -> Result<TokenRequest, RealtimeError> {
        let capability = capability_json(channels)?;
        let key_name = self.inner.config.key_name.clone();

        let text = format!(
            "{key_name}\n{TOKEN_TTL_MS}\n{capability}\n{client_id}\n{timestamp}\n{nonce}\n"
        );
        let mut mac =
            HmacSha256::new_from_slice(self.inner.config.key_secret.expose_secret().as_bytes())
                .map_err(|e| RealtimeError::InvalidKey(e.to_string()))?;
        mac.update(text.as_bytes());
        let mac = BASE64.encode(mac.finalize().into_bytes());

        Ok(TokenRequest {
            key_name,
            ttl: TOKEN_TTL_MS,
            capability,
            client_id: client_id.to_string(),
            timestamp,
            nonce,
            mac,
        })
    }
}

/// `{"chat:1":["publish","subscribe","presence"]}` for each channel.
fn capability_json(channels: &[String]) -> Result<String, serde_json::Error> {
    let map: serde_json::Map<String, serde_json::Value> = channels
        .iter()
        .map(|channel| {
            (
                channel.clone(),
                serde_json::json!(["publish", "subscribe", "presence"]),
            )
        })
        .collect();
    serde_json::to_string(&map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AblyClient {
        let config = AblyConfig::parse("app1.key1:Zq8vN3kLp2Xr7TgW", "https://rest.ably.io")
            .expect("valid key");
        AblyClient::new(&config, reqwest::Client::new()).expect("client")
    }

    #[test]
    fn test_capability_json() {
        let json = capability_json(&["chat:7".to_string()]).expect("json");
        assert_eq!(json, r#"{"chat:7":["publish","subscribe","presence"]}"#);
    }

    #[test]
    fn test_token_request_signature() {
        let request = client()
            .sign_token_request("cliente-7", &["chat:7".to_string()], 1_700_000_000_000, "abc".to_string())
            .expect("signed");

        let text = format!(
            "app1.key1\n{TOKEN_TTL_MS}\n{}\ncliente-7\n1700000000000\nabc\n",
            request.capability
        );
        let mut mac = HmacSha256::new_from_slice(b"Zq8vN3kLp2Xr7TgW").expect("hmac key");
        mac.update(text.as_bytes());
        assert_eq!(request.mac, BASE64.encode(mac.finalize().into_bytes()));
        assert_eq!(request.key_name, "app1.key1");
        assert_eq!(request.ttl, TOKEN_TTL_MS);
    }

    #[test]
    fn test_token_request_serializes_camel_case() {
        let request = client()
            .token_request("agente", &["chat:1".to_string()])
            .expect("signed");
        let json = serde_json::to_value(&request).expect("json");
        assert!(json.get("keyName").is_some());
        assert!(json.get("clientId").is_some());
        assert_eq!(request.nonce.len(), 16);
    }
}
