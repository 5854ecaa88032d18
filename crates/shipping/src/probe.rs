//! Carrier endpoint probing.
//!
//! Carriers move hosts between sandbox and production, and accounts differ in
//! which credential format they accept. An [`EndpointProber`] holds every
//! (base URL, auth scheme) pair that might work, tries them in order, and
//! remembers the first one that answers so later calls go straight to it.
//!
//! Only failures that say "wrong door" fall through to the next candidate:
//! rejected credentials, missing routes, server errors and transport errors.
//! A 429 or any other 4xx means the door was right and the request was not,
//! so it is returned immediately.

use std::collections::HashMap;
use std::fmt;

use reqwest::{Method, StatusCode};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::ShippingError;
use crate::auth::{AuthScheme, OAuthToken, TokenFailure, fetch_client_credentials_token};
use crate::provider::ProviderKind;

/// Retry-After assumed when a 429 omits it.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Longest carrier error text kept in messages.
const MAX_MESSAGE_CHARS: usize = 300;

/// A base URL paired with the scheme to authenticate against it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub base_url: String,
    pub auth: AuthScheme,
}

impl Candidate {
    #[must_use]
    pub fn new(base_url: impl Into<String>, auth: AuthScheme) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        }
    }

    /// `https://api.example.com (bearer)`.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{} ({})", self.base_url, self.auth.label())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Why a candidate was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// 401/403, or the token endpoint refused the client credentials.
    AuthRejected(u16),
    /// 404/405, or a success response that was not JSON.
    WrongEndpoint(u16),
    /// 5xx or a transport error.
    Unavailable(String),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthRejected(status) => write!(f, "credentials rejected (HTTP {status})"),
            Self::WrongEndpoint(status) => write!(f, "endpoint not found (HTTP {status})"),
            Self::Unavailable(reason) => write!(f, "unavailable: {reason}"),
        }
    }
}

/// One failed attempt, kept for the `Exhausted` error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    pub candidate: String,
    pub kind: FailureKind,
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.candidate, self.kind)
    }
}

/// What a status code means for probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    AuthRejected,
    WrongEndpoint,
    Unavailable,
    RateLimited,
    Rejected,
}

/// Classify an HTTP status for probing.
#[must_use]
pub const fn classify(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        401 | 403 => StatusClass::AuthRejected,
        404 | 405 => StatusClass::WrongEndpoint,
        429 => StatusClass::RateLimited,
        400..=499 => StatusClass::Rejected,
        _ => StatusClass::Unavailable,
    }
}

/// Result of trying one candidate.
enum Attempt {
    Done(Value),
    FallThrough(FailureKind),
    Fatal(ShippingError),
}

/// Tries candidates in order and caches the one that works.
pub struct EndpointProber {
    provider: ProviderKind,
    client: reqwest::Client,
    candidates: Vec<Candidate>,
    /// Index of the candidate that last succeeded.
    resolved: RwLock<Option<usize>>,
    /// OAuth2 tokens per candidate index.
    tokens: RwLock<HashMap<usize, OAuthToken>>,
}

impl fmt::Debug for EndpointProber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointProber")
            .field("provider", &self.provider)
            .field("candidates", &self.candidates)
            .finish_non_exhaustive()
    }
}

impl EndpointProber {
    #[must_use]
    pub fn new(provider: ProviderKind, client: reqwest::Client, candidates: Vec<Candidate>) -> Self {
        Self {
            provider,
            client,
            candidates,
            resolved: RwLock::new(None),
            tokens: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn provider(&self) -> ProviderKind {
        self.provider
    }

    #[must_use]
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// The candidate that last succeeded, if any.
    pub async fn resolved(&self) -> Option<&Candidate> {
        let index = (*self.resolved.read().await)?;
        self.candidates.get(index)
    }

    /// Forget the resolved candidate and every cached token.
    pub async fn reset(&self) {
        *self.resolved.write().await = None;
        self.tokens.write().await.clear();
    }

    /// Candidate indices in the order they should be tried.
    async fn attempt_order(&self) -> Vec<usize> {
        let resolved = *self.resolved.read().await;
        let mut order: Vec<usize> = Vec::with_capacity(self.candidates.len());
        if let Some(index) = resolved
            && index < self.candidates.len()
        {
            order.push(index);
        }
        order.extend((0..self.candidates.len()).filter(|i| Some(*i) != resolved));
        order
    }

    /// `GET path` against the first working candidate.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn get(&self, path: &str) -> Result<Value, ShippingError> {
        self.send(Method::GET, path, None).await
    }

    /// `POST path` with a JSON body against the first working candidate.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ShippingError> {
        self.send(Method::POST, path, Some(body)).await
    }

    /// Send a request, probing candidates until one accepts it.
    ///
    /// Returns the parsed JSON body (`Value::Null` for an empty body).
    ///
    /// # Errors
    ///
    /// Returns `ShippingError::RateLimited` on 429, `ShippingError::Rejected`
    /// on any other 4xx except auth and routing failures, and
    /// `ShippingError::Exhausted` when every candidate fell through.
    #[instrument(skip(self, body), fields(provider = %self.provider))]
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ShippingError> {
        if self.candidates.is_empty() {
            return Err(ShippingError::NotConfigured(self.provider));
        }

        let body = body.map(serde_json::to_string).transpose()?;
        let mut failures = Vec::new();

        for index in self.attempt_order().await {
            let candidate = &self.candidates[index];
            match self.try_candidate(index, &method, path, body.as_deref()).await {
                Attempt::Done(value) => {
                    let mut resolved = self.resolved.write().await;
                    if *resolved != Some(index) {
                        debug!(candidate = %candidate.describe(), "Resolved carrier endpoint");
                        *resolved = Some(index);
                    }
                    return Ok(value);
                }
                Attempt::FallThrough(kind) => {
                    debug!(candidate = %candidate.describe(), failure = %kind, "Candidate failed, trying next");
                    let mut resolved = self.resolved.write().await;
                    if *resolved == Some(index) {
                        *resolved = None;
                    }
                    failures.push(ProbeFailure {
                        candidate: candidate.describe(),
                        kind,
                    });
                }
                Attempt::Fatal(err) => return Err(err),
            }
        }

        warn!(attempts = failures.len(), "Every carrier endpoint failed");
        Err(ShippingError::Exhausted {
            provider: self.provider,
            attempts: failures,
        })
    }

    async fn try_candidate(
        &self,
        index: usize,
        method: &Method,
        path: &str,
        body: Option<&str>,
    ) -> Attempt {
        let candidate = &self.candidates[index];

        if !candidate.auth.needs_token() {
            return self.dispatch(candidate, method, path, body, None).await;
        }

        let token = match self.token_for(index, false).await {
            Ok(token) => token,
            Err(failure) => return token_failure_attempt(failure),
        };

        let attempt = self
            .dispatch(candidate, method, path, body, Some(&token))
            .await;

        // A cached token can be revoked before it expires: fetch once more.
        if matches!(attempt, Attempt::FallThrough(FailureKind::AuthRejected(401))) {
            debug!(candidate = %candidate.describe(), "Token refused, fetching a new one");
            let token = match self.token_for(index, true).await {
                Ok(token) => token,
                Err(failure) => return token_failure_attempt(failure),
            };
            return self
                .dispatch(candidate, method, path, body, Some(&token))
                .await;
        }

        attempt
    }

    /// Cached token for a candidate, fetching one when missing or expired.
    async fn token_for(&self, index: usize, force: bool) -> Result<OAuthToken, TokenFailure> {
        if !force
            && let Some(token) = self.tokens.read().await.get(&index)
            && !token.is_expired()
        {
            return Ok(token.clone());
        }

        self.tokens.write().await.remove(&index);

        let candidate = &self.candidates[index];
        let AuthScheme::OAuth2ClientCredentials {
            token_path,
            client_id,
            client_secret,
            scope,
        } = &candidate.auth
        else {
            return Err(TokenFailure::Unavailable("scheme has no token".to_string()));
        };

        let token = fetch_client_credentials_token(
            &self.client,
            &candidate.url(token_path),
            client_id,
            client_secret,
            scope.as_deref(),
        )
        .await?;

        self.tokens.write().await.insert(index, token.clone());
        Ok(token)
    }

    async fn dispatch(
        &self,
        candidate: &Candidate,
        method: &Method,
        path: &str,
        body: Option<&str>,
        token: Option<&OAuthToken>,
    ) -> Attempt {
        let mut request = self
            .client
            .request(method.clone(), candidate.url(path))
            .header("Accept", "application/json");
        request = candidate.auth.apply(
            request,
            method,
            path,
            body.unwrap_or_default(),
            token.map(|t| &t.access_token),
        );
        if let Some(body) = body {
            request = request
                .header("Content-Type", "application/json")
                .body(body.to_string());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return Attempt::FallThrough(FailureKind::Unavailable(e.to_string())),
        };

        let status = response.status();
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return Attempt::FallThrough(FailureKind::Unavailable(e.to_string())),
        };

        self.interpret(status, retry_after, &text)
    }

    fn interpret(&self, status: StatusCode, retry_after: u64, text: &str) -> Attempt {
        let code = status.as_u16();
        match classify(code) {
            StatusClass::Success => {
                if text.trim().is_empty() {
                    return Attempt::Done(Value::Null);
                }
                // Some hosts answer unknown routes with an HTML 200.
                serde_json::from_str(text).map_or_else(
                    |_| Attempt::FallThrough(FailureKind::WrongEndpoint(code)),
                    Attempt::Done,
                )
            }
            StatusClass::AuthRejected => Attempt::FallThrough(FailureKind::AuthRejected(code)),
            StatusClass::WrongEndpoint => Attempt::FallThrough(FailureKind::WrongEndpoint(code)),
            StatusClass::Unavailable => {
                Attempt::FallThrough(FailureKind::Unavailable(format!("HTTP {code}")))
            }
            StatusClass::RateLimited => Attempt::Fatal(ShippingError::RateLimited {
                provider: self.provider,
                retry_after,
            }),
            StatusClass::Rejected => Attempt::Fatal(ShippingError::Rejected {
                provider: self.provider,
                status: code,
                message: error_message(text),
            }),
        }
    }
}

fn token_failure_attempt(failure: TokenFailure) -> Attempt {
    match failure {
        TokenFailure::Rejected(status, _) => {
            Attempt::FallThrough(FailureKind::AuthRejected(status))
        }
        TokenFailure::NotFound(status) => Attempt::FallThrough(FailureKind::WrongEndpoint(status)),
        TokenFailure::Unavailable(reason) => Attempt::FallThrough(FailureKind::Unavailable(reason)),
    }
}

/// Pull a human-readable message out of a carrier error body.
///
/// Understands `message`, `error` (string or object), `errors` (array, object
/// of field arrays, or string), `detail` and `description`; falls back to the
/// raw text.
#[must_use]
pub fn error_message(text: &str) -> String {
    let message = serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|value| message_from_value(&value))
        .unwrap_or_else(|| text.trim().to_string());

    if message.is_empty() {
        return "no details provided".to_string();
    }
    message.chars().take(MAX_MESSAGE_CHARS).collect()
}

fn message_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(message_from_value).collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        Value::Object(map) => {
            for key in ["message", "error", "errors", "detail", "description"] {
                if let Some(found) = map.get(key).and_then(message_from_value) {
                    return Some(found);
                }
            }
            // {"errors": {"zip": ["is invalid"]}} style field errors.
            let parts: Vec<String> = map
                .iter()
                .filter_map(|(field, v)| message_from_value(v).map(|m| format!("{field}: {m}")))
                .collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_statuses() {
        assert_eq!(classify(200), StatusClass::Success);
        assert_eq!(classify(201), StatusClass::Success);
        assert_eq!(classify(401), StatusClass::AuthRejected);
        assert_eq!(classify(403), StatusClass::AuthRejected);
        assert_eq!(classify(404), StatusClass::WrongEndpoint);
        assert_eq!(classify(405), StatusClass::WrongEndpoint);
        assert_eq!(classify(429), StatusClass::RateLimited);
        assert_eq!(classify(400), StatusClass::Rejected);
        assert_eq!(classify(422), StatusClass::Rejected);
        assert_eq!(classify(500), StatusClass::Unavailable);
        assert_eq!(classify(503), StatusClass::Unavailable);
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(error_message(r#"{"message":"Invalid zip"}"#), "Invalid zip");
        assert_eq!(
            error_message(r#"{"error":{"message":"Carrier unavailable"}}"#),
            "Carrier unavailable"
        );
        assert_eq!(
            error_message(r#"{"errors":[{"detail":"a"},{"detail":"b"}]}"#),
            "a; b"
        );
        assert_eq!(
            error_message(r#"{"errors":{"zip_to":["is invalid"]}}"#),
            "zip_to: is invalid"
        );
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
        assert_eq!(error_message(""), "no details provided");
    }

    #[test]
    fn test_candidate_trims_trailing_slash() {
        let candidate = Candidate::new(
            "https://api.envia.com/",
            AuthScheme::Bearer {
                token: secrecy::SecretString::from("t"),
            },
        );
        assert_eq!(candidate.url("/ship/rate/"), "https://api.envia.com/ship/rate/");
        assert_eq!(candidate.describe(), "https://api.envia.com (bearer)");
    }

    #[tokio::test]
    async fn test_attempt_order_puts_resolved_first() {
        let bearer = || AuthScheme::Bearer {
            token: secrecy::SecretString::from("t"),
        };
        let prober = EndpointProber::new(
            ProviderKind::Envia,
            reqwest::Client::new(),
            vec![
                Candidate::new("https://a", bearer()),
                Candidate::new("https://b", bearer()),
                Candidate::new("https://c", bearer()),
            ],
        );
        assert_eq!(prober.attempt_order().await, vec![0, 1, 2]);

        *prober.resolved.write().await = Some(2);
        assert_eq!(prober.attempt_order().await, vec![2, 0, 1]);
        assert_eq!(
            prober.resolved().await.map(|c| c.base_url.as_str()),
            Some("https://c")
        );

        prober.reset().await;
        assert!(prober.resolved().await.is_none());
    }

    #[tokio::test]
    async fn test_no_candidates_is_not_configured() {
        let prober = EndpointProber::new(ProviderKind::Skydropx, reqwest::Client::new(), vec![]);
        let err = prober.get("/ping").await.expect_err("no candidates");
        assert!(matches!(
            err,
            ShippingError::NotConfigured(ProviderKind::Skydropx)
        ));
    }
}
