//! Address normalization for carrier requests.
//!
//! Checkout forms and the back-office send addresses in whatever shape the
//! customer typed them. Carriers are strict: Envia wants ISO state codes and
//! a separate exterior number, Skydropx wants canonical state names, both want
//! five-digit Mexican postal codes and ten-digit phones, and both truncate or
//! reject long fields. [`normalize`] turns an [`AddressInput`] into an
//! [`Address`] both clients can send as-is.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tienda_core::Email;

/// Maximum characters carriers accept per field.
pub const NAME_MAX: usize = 35;
pub const COMPANY_MAX: usize = 35;
pub const STREET_MAX: usize = 45;
pub const DISTRICT_MAX: usize = 35;
pub const CITY_MAX: usize = 35;
pub const REFERENCE_MAX: usize = 50;

/// Exterior number used when the address has none.
pub const NO_NUMBER: &str = "S/N";

/// Errors produced while normalizing an address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid postal code: {0}")]
    InvalidPostalCode(String),
    #[error("unknown state: {0}")]
    UnknownState(String),
    #[error("invalid country: {0}")]
    InvalidCountry(String),
    #[error("invalid phone number: {0}")]
    InvalidPhone(String),
    #[error("invalid email: {0}")]
    InvalidEmail(String),
}

/// An address as submitted by a form or stored on an order.
///
/// Field names are accepted in English or Spanish.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInput {
    #[serde(alias = "nombre")]
    pub name: String,
    #[serde(default, alias = "empresa")]
    pub company: Option<String>,
    #[serde(default, alias = "correo")]
    pub email: Option<String>,
    #[serde(default, alias = "telefono")]
    pub phone: Option<String>,
    #[serde(alias = "calle")]
    pub street: String,
    #[serde(default, alias = "numero", alias = "numero_exterior")]
    pub number: Option<String>,
    #[serde(default, alias = "numero_interior")]
    pub interior: Option<String>,
    #[serde(default, alias = "colonia")]
    pub district: Option<String>,
    #[serde(alias = "ciudad", alias = "municipio")]
    pub city: String,
    #[serde(alias = "estado")]
    pub state: String,
    #[serde(alias = "cp", alias = "codigo_postal")]
    pub postal_code: String,
    #[serde(default, alias = "pais")]
    pub country: Option<String>,
    #[serde(default, alias = "referencias")]
    pub reference: Option<String>,
}

/// A normalized address ready for carrier requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    /// Digits only; ten digits for Mexican numbers.
    pub phone: Option<String>,
    pub street: String,
    /// Exterior number, `S/N` when unknown.
    pub number: String,
    pub interior: Option<String>,
    pub district: Option<String>,
    pub city: String,
    /// ISO 3166-2 subdivision code for Mexico, upper-cased input elsewhere.
    pub state_code: String,
    /// Canonical state name.
    pub state_name: String,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2.
    pub country: String,
    pub reference: Option<String>,
}

impl Address {
    /// Street line with number and interior, e.g. `Av. Reforma 222 Int. 4`.
    #[must_use]
    pub fn street_line(&self) -> String {
        let mut line = format!("{} {}", self.street, self.number);
        if let Some(interior) = &self.interior {
            line.push_str(" Int. ");
            line.push_str(interior);
        }
        line
    }

    /// District, falling back to the city when the customer left it empty.
    #[must_use]
    pub fn district_or_city(&self) -> &str {
        self.district.as_deref().unwrap_or(&self.city)
    }
}

/// Mexican states: ISO code, canonical name, extra aliases (already folded).
const MX_STATES: &[(&str, &str, &[&str])] = &[
    ("AG", "Aguascalientes", &["ags"]),
    ("BC", "Baja California", &["baja california norte", "bcn"]),
    ("BS", "Baja California Sur", &["bcs"]),
    ("CM", "Campeche", &["camp"]),
    ("CS", "Chiapas", &["chis"]),
    ("CH", "Chihuahua", &["chih"]),
    (
        "CX",
        "Ciudad de México",
        &["cdmx", "df", "distrito federal", "mexico df", "ciudad de mexico cdmx"],
    ),
    ("CO", "Coahuila", &["coahuila de zaragoza", "coah"]),
    ("CL", "Colima", &["col"]),
    ("DG", "Durango", &["dgo"]),
    ("GT", "Guanajuato", &["gto"]),
    ("GR", "Guerrero", &["gro"]),
    ("HG", "Hidalgo", &["hgo"]),
    ("JA", "Jalisco", &["jal"]),
    (
        "EM",
        "Estado de México",
        &["mexico", "edomex", "edo mex", "edo de mexico", "mex"],
    ),
    ("MI", "Michoacán", &["michoacan de ocampo", "mich"]),
    ("MO", "Morelos", &["mor"]),
    ("NA", "Nayarit", &["nay"]),
    ("NL", "Nuevo León", &["nuevo leon", "n l"]),
    ("OA", "Oaxaca", &["oax"]),
    ("PU", "Puebla", &["pue"]),
    ("QT", "Querétaro", &["queretaro de arteaga", "qro"]),
    ("QR", "Quintana Roo", &["q roo", "qroo"]),
    ("SL", "San Luis Potosí", &["slp"]),
    ("SI", "Sinaloa", &["sin"]),
    ("SO", "Sonora", &["son"]),
    ("TB", "Tabasco", &["tab"]),
    ("TM", "Tamaulipas", &["tamps"]),
    ("TL", "Tlaxcala", &["tlax"]),
    ("VE", "Veracruz", &["veracruz de ignacio de la llave", "ver"]),
    ("YU", "Yucatán", &["yuc"]),
    ("ZA", "Zacatecas", &["zac"]),
];

/// Generic street-type words that, alone, are not a street name.
const STREET_TYPE_WORDS: &[&str] = &[
    "calle",
    "avenida",
    "av",
    "privada",
    "priv",
    "callejon",
    "cerrada",
    "andador",
    "boulevard",
    "blvd",
    "calzada",
    "circuito",
    "retorno",
];

static STREET_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?P<street>.+?)[\s,]+(?P<marker>(?:no\.?|n[uú]m\.?|#)\s*)?(?P<number>\d+(?:-?[a-z])?(?:-\d+)?)(?:[\s,]+(?:int\.?|interior|depto\.?|dpto\.?|#)\s*(?P<interior>[\w-]+))?$",
    )
    .expect("street number regex is valid")
});

/// Normalize a raw address.
///
/// # Errors
///
/// Returns an [`AddressError`] when a required field is missing or a value
/// cannot be made acceptable to carriers.
pub fn normalize(input: &AddressInput) -> Result<Address, AddressError> {
    let name = required(&input.name, "name")?;
    let street_raw = required(&input.street, "street")?;
    let city = required(&input.city, "city")?;
    let state_raw = required(&input.state, "state")?;
    let postal_raw = required(&input.postal_code, "postal_code")?;

    let country = normalize_country(input.country.as_deref())?;
    let postal_code = normalize_postal_code(&postal_raw, &country)?;
    let (state_code, state_name) = normalize_state(&state_raw, &country)?;

    let explicit_number = optional(input.number.as_deref());
    let explicit_interior = optional(input.interior.as_deref());
    let (street, number, interior) = match explicit_number {
        Some(number) => (street_raw, number, explicit_interior),
        None => {
            let (street, number, interior) = split_street_number(&street_raw);
            (
                street,
                number.unwrap_or_else(|| NO_NUMBER.to_string()),
                explicit_interior.or(interior),
            )
        }
    };

    let phone = optional(input.phone.as_deref())
        .map(|phone| normalize_phone(&phone, &country))
        .transpose()?;

    let email = optional(input.email.as_deref())
        .map(|email| {
            Email::parse(&email)
                .map(|e| e.as_str().to_string())
                .map_err(|e| AddressError::InvalidEmail(e.to_string()))
        })
        .transpose()?;

    Ok(Address {
        name: truncate(&name, NAME_MAX),
        company: optional(input.company.as_deref()).map(|c| truncate(&c, COMPANY_MAX)),
        email,
        phone,
        street: truncate(&street, STREET_MAX),
        number,
        interior,
        district: optional(input.district.as_deref()).map(|d| truncate(&d, DISTRICT_MAX)),
        city: truncate(&city, CITY_MAX),
        state_code,
        state_name,
        postal_code,
        country,
        reference: optional(input.reference.as_deref()).map(|r| truncate(&r, REFERENCE_MAX)),
    })
}

/// Collapse runs of whitespace and trim.
#[must_use]
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn required(value: &str, field: &'static str) -> Result<String, AddressError> {
    let cleaned = collapse_whitespace(value);
    if cleaned.is_empty() {
        Err(AddressError::MissingField(field))
    } else {
        Ok(cleaned)
    }
}

fn optional(value: Option<&str>) -> Option<String> {
    value.map(collapse_whitespace).filter(|v| !v.is_empty())
}

/// Truncate on a character boundary.
#[must_use]
pub fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect::<String>().trim_end().to_string()
}

/// Lower-case, strip accents and punctuation, collapse whitespace.
#[must_use]
pub fn fold(value: &str) -> String {
    let folded: String = value
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            c if c.is_alphanumeric() => c,
            _ => ' ',
        })
        .collect();
    collapse_whitespace(&folded)
}

fn normalize_country(value: Option<&str>) -> Result<String, AddressError> {
    let Some(raw) = optional(value) else {
        return Ok("MX".to_string());
    };

    match fold(&raw).as_str() {
        "mx" | "mex" | "mexico" | "estados unidos mexicanos" => Ok("MX".to_string()),
        "us" | "usa" | "estados unidos" | "united states" | "eua" | "eeuu" => {
            Ok("US".to_string())
        }
        other if other.len() == 2 && other.chars().all(|c| c.is_ascii_alphabetic()) => {
            Ok(other.to_ascii_uppercase())
        }
        _ => Err(AddressError::InvalidCountry(raw)),
    }
}

fn normalize_postal_code(raw: &str, country: &str) -> Result<String, AddressError> {
    if country == "MX" {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        return match digits.len() {
            5 => Ok(digits),
            4 => Ok(format!("0{digits}")),
            _ => Err(AddressError::InvalidPostalCode(raw.to_string())),
        };
    }

    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == ' ')
        .collect::<String>()
        .trim()
        .to_ascii_uppercase();
    if cleaned.is_empty() {
        Err(AddressError::InvalidPostalCode(raw.to_string()))
    } else {
        Ok(cleaned)
    }
}

/// Resolve a Mexican state by code, name or alias.
///
/// Returns `(code, canonical_name)`.
#[must_use]
pub fn lookup_mx_state(value: &str) -> Option<(&'static str, &'static str)> {
    let key = fold(value);
    let key = key
        .strip_prefix("estado de ")
        .filter(|rest| *rest != "mexico")
        .unwrap_or(&key);

    MX_STATES.iter().find_map(|(code, name, aliases)| {
        let matches = key.eq_ignore_ascii_case(code)
            || key == fold(name)
            || aliases.iter().any(|alias| key == *alias);
        matches.then_some((*code, *name))
    })
}

fn normalize_state(raw: &str, country: &str) -> Result<(String, String), AddressError> {
    if country == "MX" {
        return lookup_mx_state(raw)
            .map(|(code, name)| (code.to_string(), name.to_string()))
            .ok_or_else(|| AddressError::UnknownState(raw.to_string()));
    }

    let code = if raw.chars().count() <= 3 {
        raw.to_ascii_uppercase()
    } else {
        raw.to_string()
    };
    Ok((code, raw.to_string()))
}

/// Split a trailing exterior (and interior) number off a street line.
///
/// Returns the street unchanged with no number when no safe split exists.
#[must_use]
pub fn split_street_number(street: &str) -> (String, Option<String>, Option<String>) {
    let unchanged = || (street.to_string(), None, None);

    let Some(caps) = STREET_NUMBER_RE.captures(street) else {
        return unchanged();
    };
    let (Some(name), Some(number)) = (caps.name("street"), caps.name("number")) else {
        return unchanged();
    };

    let name = name.as_str().trim_end_matches([',', ' ']).to_string();
    let has_marker = caps.name("marker").is_some();
    // "Calle 10" names a street; only split it with an explicit "#"/"No." marker.
    if !has_marker && STREET_TYPE_WORDS.contains(&fold(&name).as_str()) {
        return unchanged();
    }

    (
        name,
        Some(number.as_str().to_string()),
        caps.name("interior").map(|i| i.as_str().to_string()),
    )
}

fn normalize_phone(raw: &str, country: &str) -> Result<String, AddressError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    if country == "MX" {
        let national = match digits.len() {
            10 => digits.as_str(),
            12 if digits.starts_with("52") => &digits[2..],
            13 if digits.starts_with("521") => &digits[3..],
            _ => return Err(AddressError::InvalidPhone(raw.to_string())),
        };
        return Ok(national.to_string());
    }

    if (7..=15).contains(&digits.len()) {
        Ok(digits)
    } else {
        Err(AddressError::InvalidPhone(raw.to_string()))
    }
}
