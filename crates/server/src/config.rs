//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `TIENDA_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `TIENDA_HOST` - Bind address (default: 127.0.0.1)
//! - `TIENDA_PORT` - Listen port (default: 3000)
//! - `TIENDA_BASE_URL` - Public URL used in emails (default: `http://localhost:3000`)
//! - `TIENDA_STORE_NAME` - Name printed on receipts and emails (default: Tienda)
//! - `TIENDA_RECEIPT_HEADER` / `TIENDA_RECEIPT_FOOTER` - Receipt lines, separated by `|`
//! - `TIENDA_PAPER_WIDTH` - `58mm` or `80mm` (default: 58mm)
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`
//! - `TIENDA_LOG_FORMAT` - `json` for structured logs (default: text)
//!
//! ## Optional (Envia)
//! - `ENVIA_API_KEY` - Enables Envia
//! - `ENVIA_API_SECRET` - Adds HMAC-signed candidates
//! - `ENVIA_SANDBOX` - Try the sandbox host first
//! - `ENVIA_BASE_URLS` - Comma-separated hosts replacing the defaults
//! - `ENVIA_CARRIERS` - Comma-separated carriers to quote
//!
//! ## Optional (Skydropx)
//! - `SKYDROPX_CLIENT_ID` / `SKYDROPX_CLIENT_SECRET` - Pro API credentials (set together)
//! - `SKYDROPX_API_KEY` - Legacy API token
//! - `SKYDROPX_SANDBOX`, `SKYDROPX_PRO_BASE_URLS`, `SKYDROPX_LEGACY_BASE_URLS`
//! - `SKYDROPX_POLL_ATTEMPTS`, `SKYDROPX_POLL_INTERVAL_SECS`
//!
//! ## Optional (shipping origin and packaging)
//! - `SHIP_FROM_NAME`, `SHIP_FROM_STREET`, `SHIP_FROM_CITY`, `SHIP_FROM_STATE`,
//!   `SHIP_FROM_POSTAL_CODE` - Required together when any is set
//! - `SHIP_FROM_COMPANY`, `SHIP_FROM_EMAIL`, `SHIP_FROM_PHONE`, `SHIP_FROM_NUMBER`,
//!   `SHIP_FROM_DISTRICT`, `SHIP_FROM_COUNTRY`, `SHIP_FROM_REFERENCE`
//! - `PACKAGE_LENGTH_CM`, `PACKAGE_WIDTH_CM`, `PACKAGE_HEIGHT_CM`, `PACKAGE_TARE_KG`,
//!   `PACKAGE_MIN_WEIGHT_KG`
//! - `SHIPPING_PREFERENCE` (`cheapest`/`fastest`), `SHIPPING_CARRIERS`, `SHIPPING_MAX_DAYS`
//! - `SHIPPING_QUOTE_TTL_SECS` - Quote cache lifetime (default: 600)
//!
//! ## Optional (email, all four set together)
//! - `SMTP_HOST`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_FROM`, plus `SMTP_PORT` (default: 587)
//!
//! ## Optional (chat relay)
//! - `ABLY_API_KEY` - Ably key in `name:secret` form

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use tienda_printer::PaperWidth;
use tienda_shipping::address::{Address, AddressInput, normalize};
use tienda_shipping::skydropx::PollPolicy;
use tienda_shipping::{EnviaConfig, PackagingDefaults, Preference, RateSelector, SkydropxConfig};

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_STORE_NAME: &str = "Tienda";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL, used for links in emails
    pub base_url: String,
    /// Store identity for receipts and emails
    pub store: StoreConfig,
    /// Carrier credentials, origin address and packaging
    pub shipping: ShippingConfig,
    /// SMTP settings; email is disabled when absent
    pub email: Option<EmailConfig>,
    /// Ably settings; chat relay is disabled when absent
    pub ably: Option<AblyConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// What gets printed at the top and bottom of receipts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub name: String,
    pub receipt_header: Vec<String>,
    pub receipt_footer: Vec<String>,
    pub paper_width: PaperWidth,
}

/// Shipping configuration.
#[derive(Debug, Clone)]
pub struct ShippingConfig {
    pub envia: Option<EnviaConfig>,
    pub skydropx: SkydropxConfig,
    /// Normalized warehouse address; quoting is disabled without it.
    pub origin: Option<Address>,
    pub packaging: PackagingDefaults,
    pub selector: RateSelector,
    pub quote_ttl: Duration,
}

/// SMTP configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: SecretString,
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

/// Ably realtime configuration.
#[derive(Clone)]
pub struct AblyConfig {
    /// Public part of the key, before the colon.
    pub key_name: String,
    /// Signing secret, after the colon.
    pub key_secret: SecretString,
    /// REST host (default: `https://rest.ably.io`).
    pub rest_url: String,
}

impl std::fmt::Debug for AblyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AblyConfig")
            .field("key_name", &self.key_name)
            .field("key_secret", &"[REDACTED]")
            .field("rest_url", &self.rest_url)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("TIENDA_DATABASE_URL")?;
        let host = get_parsed_env("TIENDA_HOST", IpAddr::from([127, 0, 0, 1]))?;
        let port = get_parsed_env("TIENDA_PORT", 3000u16)?;
        let base_url = get_env_or_default("TIENDA_BASE_URL", "http://localhost:3000");

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);

        Ok(Self {
            database_url,
            host,
            port,
            base_url: base_url.trim_end_matches('/').to_string(),
            store: StoreConfig::from_env()?,
            shipping: ShippingConfig::from_env()?,
            email: EmailConfig::from_env()?,
            ably: AblyConfig::from_env()?,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl StoreConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let paper_width = match get_env_or_default("TIENDA_PAPER_WIDTH", "58mm").as_str() {
            "58mm" | "58" => PaperWidth::Mm58,
            "80mm" | "80" => PaperWidth::Mm80,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "TIENDA_PAPER_WIDTH".to_string(),
                    format!("expected 58mm or 80mm, got {other}"),
                ));
            }
        };

        Ok(Self {
            name: get_env_or_default("TIENDA_STORE_NAME", DEFAULT_STORE_NAME),
            receipt_header: split_list(&get_env_or_default("TIENDA_RECEIPT_HEADER", ""), '|'),
            receipt_footer: split_list(
                &get_env_or_default("TIENDA_RECEIPT_FOOTER", "¡Gracias por su compra!"),
                '|',
            ),
            paper_width,
        })
    }
}

impl ShippingConfig {
    /// Carrier settings alone, for tools that do not serve HTTP.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for malformed `ENVIA_*`, `SKYDROPX_*`,
    /// `SHIP_FROM_*`, `PACKAGE_*` or `SHIPPING_*` values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = PackagingDefaults::default();
        let packaging = PackagingDefaults {
            length_cm: get_parsed_env("PACKAGE_LENGTH_CM", defaults.length_cm)?,
            width_cm: get_parsed_env("PACKAGE_WIDTH_CM", defaults.width_cm)?,
            height_cm: get_parsed_env("PACKAGE_HEIGHT_CM", defaults.height_cm)?,
            tare_kg: get_parsed_env("PACKAGE_TARE_KG", defaults.tare_kg)?,
            min_weight_kg: get_parsed_env("PACKAGE_MIN_WEIGHT_KG", defaults.min_weight_kg)?,
        };
        if [packaging.length_cm, packaging.width_cm, packaging.height_cm]
            .iter()
            .any(|d| *d <= Decimal::ZERO)
        {
            return Err(ConfigError::InvalidEnvVar(
                "PACKAGE_*".to_string(),
                "box dimensions must be positive".to_string(),
            ));
        }

        let selector = RateSelector {
            preference: get_parsed_env("SHIPPING_PREFERENCE", Preference::Cheapest)?,
            allowed_carriers: split_list(&get_env_or_default("SHIPPING_CARRIERS", ""), ','),
            max_days: get_optional_env("SHIPPING_MAX_DAYS")
                .map(|v| parse_value::<u32>("SHIPPING_MAX_DAYS", &v))
                .transpose()?,
        };

        Ok(Self {
            envia: envia_from_env()?,
            skydropx: skydropx_from_env()?,
            origin: origin_from_env()?,
            packaging,
            selector,
            quote_ttl: Duration::from_secs(get_parsed_env("SHIPPING_QUOTE_TTL_SECS", 600u64)?),
        })
    }
}

fn envia_from_env() -> Result<Option<EnviaConfig>, ConfigError> {
    let Some(api_key) = get_optional_env("ENVIA_API_KEY") else {
        return Ok(None);
    };
    validate_secret_strength(&api_key, "ENVIA_API_KEY")?;

    Ok(Some(EnviaConfig {
        api_key: SecretString::from(api_key),
        api_secret: get_optional_env("ENVIA_API_SECRET").map(SecretString::from),
        sandbox: get_parsed_env("ENVIA_SANDBOX", false)?,
        base_urls: split_list(&get_env_or_default("ENVIA_BASE_URLS", ""), ','),
        carriers: split_list(&get_env_or_default("ENVIA_CARRIERS", ""), ','),
    }))
}

fn skydropx_from_env() -> Result<SkydropxConfig, ConfigError> {
    let client_id = get_optional_env("SKYDROPX_CLIENT_ID");
    let client_secret = get_optional_env("SKYDROPX_CLIENT_SECRET");
    let (client_id, client_secret) = match (client_id, client_secret) {
        (Some(id), Some(secret)) => {
            validate_secret_strength(&secret, "SKYDROPX_CLIENT_SECRET")?;
            (Some(id), Some(SecretString::from(secret)))
        }
        (None, None) => (None, None),
        _ => {
            return Err(ConfigError::InvalidEnvVar(
                "SKYDROPX_CLIENT_*".to_string(),
                "Both SKYDROPX_CLIENT_ID and SKYDROPX_CLIENT_SECRET must be set together"
                    .to_string(),
            ));
        }
    };

    let api_key = get_optional_env("SKYDROPX_API_KEY");
    if let Some(key) = &api_key {
        validate_secret_strength(key, "SKYDROPX_API_KEY")?;
    }

    let defaults = SkydropxConfig::default();
    Ok(SkydropxConfig {
        client_id,
        client_secret,
        api_key: api_key.map(SecretString::from),
        sandbox: get_parsed_env("SKYDROPX_SANDBOX", false)?,
        pro_base_urls: split_list(&get_env_or_default("SKYDROPX_PRO_BASE_URLS", ""), ','),
        legacy_base_urls: split_list(&get_env_or_default("SKYDROPX_LEGACY_BASE_URLS", ""), ','),
        poll: PollPolicy {
            attempts: get_parsed_env("SKYDROPX_POLL_ATTEMPTS", defaults.poll.attempts)?,
            interval: Duration::from_secs(get_parsed_env(
                "SKYDROPX_POLL_INTERVAL_SECS",
                defaults.poll.interval.as_secs(),
            )?),
        },
        ..defaults
    })
}

fn origin_from_env() -> Result<Option<Address>, ConfigError> {
    const REQUIRED: [&str; 5] = [
        "SHIP_FROM_NAME",
        "SHIP_FROM_STREET",
        "SHIP_FROM_CITY",
        "SHIP_FROM_STATE",
        "SHIP_FROM_POSTAL_CODE",
    ];

    if REQUIRED.iter().all(|key| get_optional_env(key).is_none()) {
        return Ok(None);
    }

    let input = AddressInput {
        name: get_required_env("SHIP_FROM_NAME")?,
        company: get_optional_env("SHIP_FROM_COMPANY"),
        email: get_optional_env("SHIP_FROM_EMAIL"),
        phone: get_optional_env("SHIP_FROM_PHONE"),
        street: get_required_env("SHIP_FROM_STREET")?,
        number: get_optional_env("SHIP_FROM_NUMBER"),
        interior: None,
        district: get_optional_env("SHIP_FROM_DISTRICT"),
        city: get_required_env("SHIP_FROM_CITY")?,
        state: get_required_env("SHIP_FROM_STATE")?,
        postal_code: get_required_env("SHIP_FROM_POSTAL_CODE")?,
        country: get_optional_env("SHIP_FROM_COUNTRY"),
        reference: get_optional_env("SHIP_FROM_REFERENCE"),
    };

    normalize(&input)
        .map(Some)
        .map_err(|e| ConfigError::InvalidEnvVar("SHIP_FROM_*".to_string(), e.to_string()))
}

impl EmailConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = get_optional_env("SMTP_HOST") else {
            return Ok(None);
        };

        Ok(Some(Self {
            smtp_host,
            smtp_port: get_parsed_env("SMTP_PORT", 587u16)?,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: get_required_secret("SMTP_PASSWORD")?,
            from_address: get_required_env("SMTP_FROM")?,
        }))
    }
}

impl AblyConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(key) = get_optional_env("ABLY_API_KEY") else {
            return Ok(None);
        };
        let rest_url = get_env_or_default("ABLY_REST_URL", "https://rest.ably.io");
        Self::parse(&key, &rest_url).map(Some)
    }

    /// Split an Ably key of the form `appId.keyId:secret`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` when the key has no secret part.
    pub fn parse(key: &str, rest_url: &str) -> Result<Self, ConfigError> {
        let (name, secret) = key
            .trim()
            .split_once(':')
            .filter(|(name, secret)| !name.is_empty() && !secret.is_empty())
            .ok_or_else(|| {
                ConfigError::InvalidEnvVar(
                    "ABLY_API_KEY".to_string(),
                    "expected the form name:secret".to_string(),
                )
            })?;
        validate_secret_strength(secret, "ABLY_API_KEY")?;

        Ok(Self {
            key_name: name.to_string(),
            key_secret: SecretString::from(secret.to_string()),
            rest_url: rest_url.trim_end_matches('/').to_string(),
        })
    }

    /// The full key, for HTTP basic auth.
    #[must_use]
    pub fn basic_credentials(&self) -> String {
        format!("{}:{}", self.key_name, self.key_secret.expose_secret())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    get_optional_env(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// The database URL alone, loading `.env` first.
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` when neither variable is set.
pub fn database_url_from_env() -> Result<SecretString, ConfigError> {
    let _ = dotenvy::dotenv();
    get_database_url("TIENDA_DATABASE_URL")
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable; blank values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable, using `default` when it is unset.
fn get_parsed_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |value| parse_value(key, &value))
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Split a separated list, dropping blanks.
fn split_list(value: &str, separator: char) -> Vec<String> {
    value
        .split(separator)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the key issued by the provider."
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_config() -> ServerConfig {
        ServerConfig {
            database_url: SecretString::from("postgres://localhost/tienda"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            store: StoreConfig {
                name: "Tienda".to_string(),
                receipt_header: vec![],
                receipt_footer: vec![],
                paper_width: PaperWidth::Mm58,
            },
            shipping: ShippingConfig {
                envia: None,
                skydropx: SkydropxConfig::default(),
                origin: None,
                packaging: PackagingDefaults::default(),
                selector: RateSelector::default(),
                quote_ttl: Duration::from_secs(600),
            },
            email: None,
            ably: None,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.1,
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-envia-key-here", "ENVIA_API_KEY");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaa", "ENVIA_API_KEY");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        assert!(validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "ENVIA_API_KEY").is_ok());
    }

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list(" estafeta, fedex ,,dhl ", ','),
            vec!["estafeta", "fedex", "dhl"]
        );
        assert_eq!(
            split_list("Av. Juárez 15|Centro, CDMX", '|'),
            vec!["Av. Juárez 15", "Centro, CDMX"]
        );
        assert!(split_list("", ',').is_empty());
    }

    #[test]
    fn test_parse_value_reports_variable() {
        let err = parse_value::<u16>("TIENDA_PORT", "eighty").unwrap_err();
        assert!(err.to_string().contains("TIENDA_PORT"));
        assert!(parse_value::<bool>("ENVIA_SANDBOX", " true ").unwrap());
        assert_eq!(
            parse_value::<Preference>("SHIPPING_PREFERENCE", "rapido").unwrap(),
            Preference::Fastest
        );
    }

    #[test]
    fn test_ably_key_parsing() {
        let config = AblyConfig::parse("appX.keyY:Zq8$rT2!mN5@kL9#", "https://rest.ably.io/").unwrap();
        assert_eq!(config.key_name, "appX.keyY");
        assert_eq!(config.rest_url, "https://rest.ably.io");
        assert_eq!(config.basic_credentials(), "appX.keyY:Zq8$rT2!mN5@kL9#");

        assert!(AblyConfig::parse("no-secret", "https://rest.ably.io").is_err());
        assert!(AblyConfig::parse("name:", "https://rest.ably.io").is_err());
    }

    #[test]
    fn test_socket_addr() {
        let addr = test_config().socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_email_config_debug_redacts_secrets() {
        let config = EmailConfig {
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            smtp_username: "ventas@tienda.mx".to_string(),
            smtp_password: SecretString::from("super_secret_smtp_password"),
            from_address: "ventas@tienda.mx".to_string(),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("smtp.example.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_smtp_password"));
    }

    #[test]
    fn test_ably_config_debug_redacts_secret() {
        let config = AblyConfig::parse("appX.keyY:Zq8$rT2!mN5@kL9#", "https://rest.ably.io").unwrap();
        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("appX.keyY"));
        assert!(!debug_output.contains("Zq8$rT2"));
    }
}
