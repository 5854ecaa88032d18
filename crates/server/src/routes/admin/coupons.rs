//! Coupon management.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
};

use tienda_core::CouponId;
use tienda_core::coupon::normalize_code;

use crate::db::CouponRepository;
use crate::db::coupons::CouponInput;
use crate::error::{AppError, Result};
use crate::models::Coupon;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index).post(create))
        .route("/{id}", put(update).delete(destroy))
}

/// Codes are short upper-case tokens customers can type.
fn validate(input: &CouponInput) -> Result<()> {
    let code = normalize_code(&input.code);
    if code.is_empty() || code.len() > 32 || !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(AppError::BadRequest(
            "code must be 1-32 letters, digits, dashes or underscores".to_string(),
        ));
    }
    input.rules().validate()?;
    Ok(())
}

pub async fn index(State(state): State<AppState>) -> Result<Json<Vec<Coupon>>> {
    Ok(Json(CouponRepository::new(state.pool()).list().await?))
}

pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CouponInput>,
) -> Result<(StatusCode, Json<Coupon>)> {
    validate(&input)?;
    let coupon = CouponRepository::new(state.pool()).create(&input).await?;
    tracing::info!(coupon_id = %coupon.id, code = %coupon.code, "Coupon created");
    Ok((StatusCode::CREATED, Json(coupon)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<CouponId>,
    Json(input): Json<CouponInput>,
) -> Result<Json<Coupon>> {
    validate(&input)?;
    Ok(Json(
        CouponRepository::new(state.pool()).update(id, &input).await?,
    ))
}

pub async fn destroy(
    State(state): State<AppState>,
    Path(id): Path<CouponId>,
) -> Result<StatusCode> {
    CouponRepository::new(state.pool()).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use tienda_core::CouponKind;

    use super::*;

    fn input(code: &str, value: Decimal) -> CouponInput {
        CouponInput {
            code: code.to_string(),
            kind: CouponKind::Percentage,
            value,
            min_purchase: None,
            max_uses: None,
            active: true,
            starts_at: None,
            expires_at: None,
        }
    }

    #[test]
    fn test_validate_code() {
        assert!(validate(&input(" verano-10 ", Decimal::TEN)).is_ok());
        assert!(matches!(
            validate(&input("DOS PALABRAS", Decimal::TEN)),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_validate_rules() {
        assert!(matches!(
            validate(&input("CERO", Decimal::ZERO)),
            Err(AppError::Coupon(_))
        ));
    }
}
