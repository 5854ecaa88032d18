//! Authentication schemes carriers accept.
//!
//! A scheme either decorates each request with static or signed headers, or
//! (OAuth2 client credentials) needs a token fetched from the same base URL
//! first. Tokens are cached by the [`crate::probe::EndpointProber`].

use hmac::{Hmac, Mac};
use reqwest::{Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use tracing::instrument;

use crate::ShippingError;

type HmacSha256 = Hmac<Sha256>;

/// Seconds before expiry at which a token is treated as expired.
const EXPIRY_BUFFER_SECS: i64 = 60;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// How to authenticate against one candidate endpoint.
#[derive(Clone)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`.
    Bearer { token: SecretString },
    /// A header holding a prefix and a token, e.g. `Authorization: Token token=<key>`.
    TokenHeader {
        header: String,
        prefix: String,
        token: SecretString,
    },
    /// A bare API key header, e.g. `X-Api-Key: <key>`.
    ApiKeyHeader { header: String, key: SecretString },
    /// OAuth2 client-credentials grant against `{base_url}{token_path}`.
    OAuth2ClientCredentials {
        token_path: String,
        client_id: String,
        client_secret: SecretString,
        scope: Option<String>,
    },
    /// HMAC-SHA256 over `timestamp + METHOD + path + body`, hex encoded.
    HmacSha256 { key_id: String, secret: SecretString },
}

impl std::fmt::Debug for AuthScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer { .. } => f.debug_struct("Bearer").field("token", &"[REDACTED]").finish(),
            Self::TokenHeader { header, prefix, .. } => f
                .debug_struct("TokenHeader")
                .field("header", header)
                .field("prefix", prefix)
                .field("token", &"[REDACTED]")
                .finish(),
            Self::ApiKeyHeader { header, .. } => f
                .debug_struct("ApiKeyHeader")
                .field("header", header)
                .field("key", &"[REDACTED]")
                .finish(),
            Self::OAuth2ClientCredentials {
                token_path,
                client_id,
                scope,
                ..
            } => f
                .debug_struct("OAuth2ClientCredentials")
                .field("token_path", token_path)
                .field("client_id", client_id)
                .field("client_secret", &"[REDACTED]")
                .field("scope", scope)
                .finish(),
            Self::HmacSha256 { key_id, .. } => f
                .debug_struct("HmacSha256")
                .field("key_id", key_id)
                .field("secret", &"[REDACTED]")
                .finish(),
        }
    }
}

impl AuthScheme {
    /// `Authorization: Token token=<key>`, the legacy Skydropx header.
    #[must_use]
    pub fn token_authorization(token: SecretString) -> Self {
        Self::TokenHeader {
            header: "Authorization".to_string(),
            prefix: "Token token=".to_string(),
            token,
        }
    }

    /// Short label used in logs and probe reports.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Bearer { .. } => "bearer",
            Self::TokenHeader { .. } => "token",
            Self::ApiKeyHeader { .. } => "api-key",
            Self::OAuth2ClientCredentials { .. } => "oauth2",
            Self::HmacSha256 { .. } => "hmac",
        }
    }

    /// Whether requests need a token fetched beforehand.
    #[must_use]
    pub const fn needs_token(&self) -> bool {
        matches!(self, Self::OAuth2ClientCredentials { .. })
    }

    /// Add this scheme's headers to a request.
    ///
    /// `path` is the request path including any query string, and `body` the
    /// exact bytes sent; both feed the HMAC signature. `token` is the OAuth2
    /// access token for schemes that need one.
    pub(crate) fn apply(
        &self,
        request: RequestBuilder,
        method: &Method,
        path: &str,
        body: &str,
        token: Option<&SecretString>,
    ) -> RequestBuilder {
        match self {
            Self::Bearer { token } => request.bearer_auth(token.expose_secret()),
            Self::TokenHeader {
                header,
                prefix,
                token,
            } => request.header(header.as_str(), format!("{prefix}{}", token.expose_secret())),
            Self::ApiKeyHeader { header, key } => {
                request.header(header.as_str(), key.expose_secret())
            }
            Self::OAuth2ClientCredentials { .. } => match token {
                Some(token) => request.bearer_auth(token.expose_secret()),
                None => request,
            },
            Self::HmacSha256 { key_id, secret } => {
                let timestamp = chrono::Utc::now().timestamp().to_string();
                let signature = sign_request(secret, &timestamp, method.as_str(), path, body);
                request
                    .header("X-Api-Key", key_id.as_str())
                    .header("X-Timestamp", timestamp)
                    .header("X-Signature", signature)
            }
        }
    }
}

/// Hex HMAC-SHA256 of `timestamp + METHOD + path + body`.
#[must_use]
pub fn sign_request(
    secret: &SecretString,
    timestamp: &str,
    method: &str,
    path: &str,
    body: &str,
) -> String {
    // HMAC accepts keys of any length, so this cannot fail.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.expose_secret().as_bytes()) else {
        return String::new();
    };
    mac.update(timestamp.as_bytes());
    mac.update(method.to_ascii_uppercase().as_bytes());
    mac.update(path.as_bytes());
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// An OAuth2 access token with its expiry.
#[derive(Debug, Clone)]
pub struct OAuthToken {
    pub access_token: SecretString,
    /// Unix timestamp when the token expires.
    pub expires_at: i64,
}

impl OAuthToken {
    /// Check if the token has expired or is about to.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        now >= self.expires_at - EXPIRY_BUFFER_SECS
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Outcome of a token request that did not produce a token.
#[derive(Debug)]
pub(crate) enum TokenFailure {
    /// The token endpoint refused the credentials.
    Rejected(u16, String),
    /// The token endpoint does not exist at this base URL.
    NotFound(u16),
    /// Transport failure or server error.
    Unavailable(String),
}

/// Fetch a client-credentials token with a form POST.
#[instrument(skip(client, client_secret), fields(url = %url))]
pub(crate) async fn fetch_client_credentials_token(
    client: &reqwest::Client,
    url: &str,
    client_id: &str,
    client_secret: &SecretString,
    scope: Option<&str>,
) -> Result<OAuthToken, TokenFailure> {
    let now = chrono::Utc::now().timestamp();

    let mut form = vec![
        ("grant_type", "client_credentials"),
        ("client_id", client_id),
        ("client_secret", client_secret.expose_secret()),
    ];
    if let Some(scope) = scope {
        form.push(("scope", scope));
    }

    let response = client
        .post(url)
        .form(&form)
        .send()
        .await
        .map_err(|e| TokenFailure::Unavailable(e.to_string()))?;

    let status = response.status();

    if status.is_success() {
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| TokenFailure::Unavailable(format!("invalid token response: {e}")))?;

        return Ok(OAuthToken {
            access_token: SecretString::from(token.access_token),
            expires_at: now + token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS),
        });
    }

    match status.as_u16() {
        404 | 405 => Err(TokenFailure::NotFound(status.as_u16())),
        code @ 400..=499 => {
            let message = response
                .json::<TokenErrorResponse>()
                .await
                .ok()
                .and_then(|e| e.error_description.or(e.error))
                .unwrap_or_else(|| "invalid client credentials".to_string());
            Err(TokenFailure::Rejected(code, message))
        }
        code => Err(TokenFailure::Unavailable(format!("HTTP {code}"))),
    }
}

impl From<TokenFailure> for ShippingError {
    fn from(failure: TokenFailure) -> Self {
        match failure {
            TokenFailure::Rejected(status, message) => {
                Self::AuthenticationFailed(format!("HTTP {status}: {message}"))
            }
            TokenFailure::NotFound(status) => {
                Self::AuthenticationFailed(format!("token endpoint not found (HTTP {status})"))
            }
            TokenFailure::Unavailable(message) => Self::AuthenticationFailed(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_not_expired() {
        let token = OAuthToken {
            access_token: SecretString::from("test"),
            expires_at: chrono::Utc::now().timestamp() + 3600,
        };
        assert!(!token.is_expired());
    }

    #[test]
    fn test_token_expired_within_buffer() {
        let token = OAuthToken {
            access_token: SecretString::from("test"),
            expires_at: chrono::Utc::now().timestamp() + 30,
        };
        assert!(token.is_expired());
    }

    #[test]
    fn test_sign_request_is_stable_and_uppercases_method() {
        let secret = SecretString::from("s3cr3t");
        let a = sign_request(&secret, "1700000000", "post", "/v1/rates", "{\"a\":1}");
        let b = sign_request(&secret, "1700000000", "POST", "/v1/rates", "{\"a\":1}");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_sign_request_matches_manual_hmac() {
        let secret = SecretString::from("key");
        let expected = {
            let mut mac = HmacSha256::new_from_slice(b"key").expect("hmac key");
            mac.update(b"1GET/ping");
            hex::encode(mac.finalize().into_bytes())
        };
        assert_eq!(sign_request(&secret, "1", "GET", "/ping", ""), expected);
    }

    #[test]
    fn test_signature_changes_with_body() {
        let secret = SecretString::from("key");
        assert_ne!(
            sign_request(&secret, "1", "POST", "/x", "{}"),
            sign_request(&secret, "1", "POST", "/x", "{\"b\":2}")
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let scheme = AuthScheme::OAuth2ClientCredentials {
            token_path: "/api/v1/oauth/token".to_string(),
            client_id: "client".to_string(),
            client_secret: SecretString::from("super-secret-value"),
            scope: None,
        };
        let debug = format!("{scheme:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret-value"));

        let token = AuthScheme::token_authorization(SecretString::from("abc123"));
        assert!(!format!("{token:?}").contains("abc123"));
        assert_eq!(token.label(), "token");
    }
}
