//! Coupon commands.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::info;

use tienda_core::CouponKind;
use tienda_server::db::CouponRepository;
use tienda_server::db::coupons::CouponInput;

/// Arguments of `coupon create`.
#[derive(Debug)]
pub struct NewCoupon {
    pub code: String,
    pub kind: CouponKind,
    pub value: Decimal,
    pub min_purchase: Option<Decimal>,
    pub max_uses: Option<i32>,
    pub expires: Option<NaiveDate>,
}

impl NewCoupon {
    /// The stored input. An expiry date lasts until the end of that day, UTC.
    fn into_input(self) -> CouponInput {
        CouponInput {
            code: self.code,
            kind: self.kind,
            value: self.value,
            min_purchase: self.min_purchase,
            max_uses: self.max_uses,
            active: true,
            starts_at: None,
            expires_at: self.expires.and_then(end_of_day),
        }
    }
}

fn end_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.succ_opt()?.and_hms_opt(0, 0, 0).map(|t| t.and_utc())
}

/// Create a coupon.
///
/// # Errors
///
/// Returns an error if the rules are invalid, the code is taken, or the
/// database is unreachable.
pub async fn create(coupon: NewCoupon) -> Result<(), Box<dyn std::error::Error>> {
    let input = coupon.into_input();
    input.rules().validate()?;

    let pool = super::connect().await?;
    let created = CouponRepository::new(&pool).create(&input).await?;

    info!(
        id = %created.id,
        code = %created.code,
        kind = created.rules.kind.as_str(),
        value = %created.rules.value,
        "Coupon created"
    );
    if let Some(expires) = created.rules.expires_at {
        info!("  Expires: {expires}");
    }
    Ok(())
}
