//! Coupon rules and discount evaluation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::round_cents;

/// How a coupon reduces the subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponKind {
    /// `value` is a percentage of the subtotal, in (0, 100].
    Percentage,
    /// `value` is an amount subtracted from the subtotal.
    FixedAmount,
}

impl CouponKind {
    /// The stored/wire spelling of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::FixedAmount => "fixed_amount",
        }
    }
}

impl std::str::FromStr for CouponKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(Self::Percentage),
            "fixed_amount" => Ok(Self::FixedAmount),
            _ => Err(format!("invalid coupon kind: {s}")),
        }
    }
}

/// Reasons a coupon cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    #[error("coupon is not active")]
    Inactive,
    #[error("coupon is not valid yet")]
    NotStarted,
    #[error("coupon has expired")]
    Expired,
    #[error("coupon has reached its usage limit")]
    Exhausted,
    #[error("order subtotal must be at least {minimum}")]
    BelowMinimum { minimum: Decimal },
    #[error("coupon value is invalid: {0}")]
    InvalidValue(String),
}

/// Everything needed to decide whether a coupon applies to a subtotal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponRules {
    pub kind: CouponKind,
    pub value: Decimal,
    pub min_purchase: Option<Decimal>,
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CouponRules {
    /// Check the coupon's own value for consistency.
    ///
    /// # Errors
    ///
    /// Returns `CouponError::InvalidValue` for non-positive values, percentages
    /// above 100, or a usage limit below one.
    pub fn validate(&self) -> Result<(), CouponError> {
        if self.value <= Decimal::ZERO {
            return Err(CouponError::InvalidValue(
                "value must be greater than zero".to_string(),
            ));
        }
        if self.kind == CouponKind::Percentage && self.value > Decimal::ONE_HUNDRED {
            return Err(CouponError::InvalidValue(
                "percentage cannot exceed 100".to_string(),
            ));
        }
        if self.max_uses.is_some_and(|max| max < 1) {
            return Err(CouponError::InvalidValue(
                "usage limit must be at least 1".to_string(),
            ));
        }
        if let (Some(start), Some(end)) = (self.starts_at, self.expires_at)
            && end <= start
        {
            return Err(CouponError::InvalidValue(
                "expiry must be after start".to_string(),
            ));
        }
        Ok(())
    }

    /// Compute the discount this coupon gives on `subtotal` at time `now`.
    ///
    /// The discount is rounded to cents and never exceeds the subtotal.
    ///
    /// # Errors
    ///
    /// Returns the first `CouponError` that prevents the coupon from applying.
    pub fn evaluate(&self, subtotal: Decimal, now: DateTime<Utc>) -> Result<Decimal, CouponError> {
        self.validate()?;

        if !self.active {
            return Err(CouponError::Inactive);
        }
        if self.starts_at.is_some_and(|start| now < start) {
            return Err(CouponError::NotStarted);
        }
        if self.expires_at.is_some_and(|end| now >= end) {
            return Err(CouponError::Expired);
        }
        if self.max_uses.is_some_and(|max| self.used_count >= max) {
            return Err(CouponError::Exhausted);
        }
        if let Some(minimum) = self.min_purchase
            && subtotal < minimum
        {
            return Err(CouponError::BelowMinimum { minimum });
        }

        let raw = match self.kind {
            CouponKind::Percentage => subtotal * self.value / Decimal::ONE_HUNDRED,
            CouponKind::FixedAmount => self.value,
        };

        Ok(round_cents(raw.min(subtotal)).max(Decimal::ZERO))
    }
}

/// Normalize a coupon code the way it is stored: trimmed and upper-case.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn d(s: &str) -> Decimal {
        s.parse().expect("decimal literal")
    }

    fn rules(kind: CouponKind, value: &str) -> CouponRules {
        CouponRules {
            kind,
            value: d(value),
            min_purchase: None,
            max_uses: None,
            used_count: 0,
            active: true,
            starts_at: None,
            expires_at: None,
        }
    }

    #[test]
    fn test_percentage_discount_rounds_to_cents() {
        let coupon = rules(CouponKind::Percentage, "15");
        assert_eq!(coupon.evaluate(d("333.33"), Utc::now()), Ok(d("50.00")));
    }

    #[test]
    fn test_fixed_discount_is_capped_at_subtotal() {
        let coupon = rules(CouponKind::FixedAmount, "200");
        assert_eq!(coupon.evaluate(d("149.90"), Utc::now()), Ok(d("149.90")));
    }

    #[test]
    fn test_time_window() {
        let now = Utc::now();
        let mut coupon = rules(CouponKind::Percentage, "10");
        coupon.starts_at = Some(now + Duration::days(1));
        assert_eq!(coupon.evaluate(d("100"), now), Err(CouponError::NotStarted));

        coupon.starts_at = Some(now - Duration::days(2));
        coupon.expires_at = Some(now - Duration::days(1));
        assert_eq!(coupon.evaluate(d("100"), now), Err(CouponError::Expired));
    }

    #[test]
    fn test_usage_limit_and_minimum() {
        let mut coupon = rules(CouponKind::FixedAmount, "50");
        coupon.max_uses = Some(3);
        coupon.used_count = 3;
        assert_eq!(coupon.evaluate(d("500"), Utc::now()), Err(CouponError::Exhausted));

        coupon.used_count = 0;
        coupon.min_purchase = Some(d("300"));
        assert_eq!(
            coupon.evaluate(d("299.99"), Utc::now()),
            Err(CouponError::BelowMinimum { minimum: d("300") })
        );
        assert_eq!(coupon.evaluate(d("300"), Utc::now()), Ok(d("50")));
    }

    #[test]
    fn test_inactive_coupon() {
        let mut coupon = rules(CouponKind::Percentage, "10");
        coupon.active = false;
        assert_eq!(coupon.evaluate(d("100"), Utc::now()), Err(CouponError::Inactive));
    }

    #[test]
    fn test_invalid_values() {
        assert!(rules(CouponKind::Percentage, "120").validate().is_err());
        assert!(rules(CouponKind::FixedAmount, "0").validate().is_err());
        assert!(rules(CouponKind::Percentage, "100").validate().is_ok());
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  verano25 "), "VERANO25");
    }
}
