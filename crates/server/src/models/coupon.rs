//! Coupon model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tienda_core::{CouponId, CouponRules};

/// A stored discount code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: CouponId,
    /// Upper-case code as customers type it.
    pub code: String,
    #[serde(flatten)]
    pub rules: CouponRules,
    pub created_at: DateTime<Utc>,
}
