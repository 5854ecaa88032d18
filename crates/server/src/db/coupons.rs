//! Coupon queries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgPool, Postgres, Transaction};

use tienda_core::coupon::normalize_code;
use tienda_core::{CouponId, CouponKind, CouponRules};

use super::{RepositoryError, parse_column};
use crate::models::Coupon;

const COUPON_COLUMNS: &str = "id, code, kind, value, min_purchase, max_uses, used_count, active, \
     starts_at, expires_at, created_at";

#[derive(Debug, sqlx::FromRow)]
struct CouponRow {
    id: i32,
    code: String,
    kind: String,
    value: Decimal,
    min_purchase: Option<Decimal>,
    max_uses: Option<i32>,
    used_count: i32,
    active: bool,
    starts_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = RepositoryError;

    fn try_from(row: CouponRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: CouponId::new(row.id),
            code: row.code,
            rules: CouponRules {
                kind: parse_column(&row.kind, "coupons.kind")?,
                value: row.value,
                min_purchase: row.min_purchase,
                max_uses: row.max_uses,
                used_count: row.used_count,
                active: row.active,
                starts_at: row.starts_at,
                expires_at: row.expires_at,
            },
            created_at: row.created_at,
        })
    }
}

/// Fields for creating or replacing a coupon.
#[derive(Debug, Clone, Deserialize)]
pub struct CouponInput {
    pub code: String,
    pub kind: CouponKind,
    pub value: Decimal,
    pub min_purchase: Option<Decimal>,
    pub max_uses: Option<i32>,
    #[serde(default = "default_active")]
    pub active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

const fn default_active() -> bool {
    true
}

impl CouponInput {
    /// The rules this input would store, with no uses yet.
    #[must_use]
    pub fn rules(&self) -> CouponRules {
        CouponRules {
            kind: self.kind,
            value: self.value,
            min_purchase: self.min_purchase,
            max_uses: self.max_uses,
            used_count: 0,
            active: self.active,
            starts_at: self.starts_at,
            expires_at: self.expires_at,
        }
    }
}

/// Repository for coupon database operations.
pub struct CouponRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CouponRepository<'a> {
    /// Create a new coupon repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List every coupon, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Coupon>, RepositoryError> {
        let rows = sqlx::query_as::<_, CouponRow>(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Look up a coupon by code, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_code(&self, code: &str) -> Result<Option<Coupon>, RepositoryError> {
        let row = sqlx::query_as::<_, CouponRow>(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1"
        ))
        .bind(normalize_code(code))
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Create a coupon. The code is stored upper-case.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the code already exists.
    pub async fn create(&self, input: &CouponInput) -> Result<Coupon, RepositoryError> {
        let code = normalize_code(&input.code);
        let row = sqlx::query_as::<_, CouponRow>(&format!(
            "INSERT INTO coupons (code, kind, value, min_purchase, max_uses, active, starts_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {COUPON_COLUMNS}"
        ))
        .bind(&code)
        .bind(input.kind.as_str())
        .bind(input.value)
        .bind(input.min_purchase)
        .bind(input.max_uses)
        .bind(input.active)
        .bind(input.starts_at)
        .bind(input.expires_at)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, || format!("coupon {code} already exists")))?;

        row.try_into()
    }

    /// Replace a coupon's rules. The usage count is kept.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the coupon doesn't exist and
    /// `RepositoryError::Conflict` if the new code is taken or the limit is
    /// below the uses already made.
    pub async fn update(
        &self,
        id: CouponId,
        input: &CouponInput,
    ) -> Result<Coupon, RepositoryError> {
        let code = normalize_code(&input.code);
        let row = sqlx::query_as::<_, CouponRow>(&format!(
            "UPDATE coupons SET code = $2, kind = $3, value = $4, min_purchase = $5, max_uses = $6, \
             active = $7, starts_at = $8, expires_at = $9 WHERE id = $1 RETURNING {COUPON_COLUMNS}"
        ))
        .bind(id)
        .bind(&code)
        .bind(input.kind.as_str())
        .bind(input.value)
        .bind(input.min_purchase)
        .bind(input.max_uses)
        .bind(input.active)
        .bind(input.starts_at)
        .bind(input.expires_at)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| {
            RepositoryError::from_constraint(e, || {
                format!("coupon {code} conflicts with an existing code or its usage count")
            })
        })?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Delete a coupon. Orders that used it keep their discount.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the coupon doesn't exist.
    pub async fn delete(&self, id: CouponId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM coupons WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

/// Count one use of a coupon inside a checkout transaction.
///
/// Fails with `Conflict` when a concurrent checkout took the last use.
pub(crate) async fn redeem(
    tx: &mut Transaction<'_, Postgres>,
    id: CouponId,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE coupons SET used_count = used_count + 1 \
         WHERE id = $1 AND active AND (max_uses IS NULL OR used_count < max_uses)",
    )
    .bind(id)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Conflict(
            "coupon has reached its usage limit".to_string(),
        ));
    }
    Ok(())
}

/// Give back a use when an order that redeemed the coupon is cancelled.
pub(crate) async fn release(
    tx: &mut Transaction<'_, Postgres>,
    id: CouponId,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE coupons SET used_count = used_count - 1 WHERE id = $1 AND used_count > 0")
        .bind(id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_rules_start_unused() {
        let input: CouponInput = serde_json::from_str(
            r#"{"code":" verano10 ","kind":"percentage","value":"10","max_uses":50}"#,
        )
        .expect("input");

        let rules = input.rules();
        assert_eq!(rules.used_count, 0);
        assert!(rules.active);
        assert_eq!(rules.max_uses, Some(50));
        assert!(rules.validate().is_ok());
        assert_eq!(normalize_code(&input.code), "VERANO10");
    }
}
