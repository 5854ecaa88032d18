//! Decimal money amounts.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// ISO 4217 currency codes accepted by the store and its carriers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    MXN,
    USD,
}

impl CurrencyCode {
    /// The three-letter code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::MXN => "MXN",
            Self::USD => "USD",
        }
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MXN" => Ok(Self::MXN),
            "USD" => Ok(Self::USD),
            other => Err(format!("unsupported currency: {other}")),
        }
    }
}

/// An amount with its currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in the currency's standard unit (pesos, not centavos).
    pub amount: Decimal,
    /// Currency of the amount.
    pub currency: CurrencyCode,
}

impl Money {
    /// Create a new amount, rounded to cents.
    #[must_use]
    pub fn new(amount: Decimal, currency: CurrencyCode) -> Self {
        Self {
            amount: round_cents(amount),
            currency,
        }
    }

    /// Create an amount in Mexican pesos.
    #[must_use]
    pub fn mxn(amount: Decimal) -> Self {
        Self::new(amount, CurrencyCode::MXN)
    }

    /// Format for receipts and emails, e.g. `$1,234.50`.
    #[must_use]
    pub fn display(&self) -> String {
        format_amount(self.amount)
    }
}

/// Round a decimal to two places, half away from zero.
#[must_use]
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Format a decimal as `$1,234.50` (negative amounts as `-$12.00`).
#[must_use]
pub fn format_amount(amount: Decimal) -> String {
    let rounded = round_cents(amount);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if negative {
        format!("-${grouped}.{frac_part}")
    } else {
        format!("${grouped}.{frac_part}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().expect("decimal literal")
    }

    #[test]
    fn test_round_cents_half_up() {
        assert_eq!(round_cents(d("10.005")), d("10.01"));
        assert_eq!(round_cents(d("10.004")), d("10.00"));
    }

    #[test]
    fn test_format_amount_groups_thousands() {
        assert_eq!(format_amount(d("0")), "$0.00");
        assert_eq!(format_amount(d("999.5")), "$999.50");
        assert_eq!(format_amount(d("1234.5")), "$1,234.50");
        assert_eq!(format_amount(d("1234567.891")), "$1,234,567.89");
        assert_eq!(format_amount(d("-12")), "-$12.00");
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!("mxn".parse::<CurrencyCode>(), Ok(CurrencyCode::MXN));
        assert!("EUR".parse::<CurrencyCode>().is_err());
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::mxn(d("89.9")).display(), "$89.90");
    }
}
