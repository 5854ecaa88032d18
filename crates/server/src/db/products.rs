//! Catalog queries: products, variants and stock.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgPool, Postgres, Transaction};

use tienda_core::{ProductId, VariantId};

use super::{RepositoryError, parse_column};
use crate::models::product::variant_label;
use crate::models::{PricedVariant, Product, ProductDetail, StockMovement, StockReason, Variant};

// =============================================================================
// Internal Row Types
// =============================================================================

const PRODUCT_COLUMNS: &str = "id, slug, name, description, category, base_price, weight_kg, \
     length_cm, width_cm, height_cm, image_url, active, created_at, updated_at";

const VARIANT_COLUMNS: &str = "id, product_id, sku, barcode, size, color, price, stock, active";

const PRICED_VARIANT_SELECT: &str = "SELECT v.id AS variant_id, v.product_id, p.name AS product_name, \
     v.size, v.color, v.sku, v.barcode, COALESCE(v.price, p.base_price) AS unit_price, v.stock, \
     p.weight_kg, p.length_cm, p.width_cm, p.height_cm, (v.active AND p.active) AS active \
     FROM variants v JOIN products p ON p.id = v.product_id";

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i32,
    slug: String,
    name: String,
    description: String,
    category: Option<String>,
    base_price: Decimal,
    weight_kg: Decimal,
    length_cm: Option<Decimal>,
    width_cm: Option<Decimal>,
    height_cm: Option<Decimal>,
    image_url: Option<String>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: ProductId::new(row.id),
            slug: row.slug,
            name: row.name,
            description: row.description,
            category: row.category,
            base_price: row.base_price,
            weight_kg: row.weight_kg,
            length_cm: row.length_cm,
            width_cm: row.width_cm,
            height_cm: row.height_cm,
            image_url: row.image_url,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct VariantRow {
    id: i32,
    product_id: i32,
    sku: String,
    barcode: Option<String>,
    size: Option<String>,
    color: Option<String>,
    price: Option<Decimal>,
    stock: i32,
    active: bool,
}

impl From<VariantRow> for Variant {
    fn from(row: VariantRow) -> Self {
        Self {
            id: VariantId::new(row.id),
            product_id: ProductId::new(row.product_id),
            sku: row.sku,
            barcode: row.barcode,
            size: row.size,
            color: row.color,
            price: row.price,
            stock: row.stock,
            active: row.active,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PricedVariantRow {
    variant_id: i32,
    product_id: i32,
    product_name: String,
    size: Option<String>,
    color: Option<String>,
    sku: String,
    barcode: Option<String>,
    unit_price: Decimal,
    stock: i32,
    weight_kg: Decimal,
    length_cm: Option<Decimal>,
    width_cm: Option<Decimal>,
    height_cm: Option<Decimal>,
    active: bool,
}

impl From<PricedVariantRow> for PricedVariant {
    fn from(row: PricedVariantRow) -> Self {
        Self {
            variant_id: VariantId::new(row.variant_id),
            product_id: ProductId::new(row.product_id),
            variant_name: variant_label(row.size.as_deref(), row.color.as_deref()),
            product_name: row.product_name,
            sku: row.sku,
            barcode: row.barcode,
            unit_price: row.unit_price,
            stock: row.stock,
            weight_kg: row.weight_kg,
            length_cm: row.length_cm,
            width_cm: row.width_cm,
            height_cm: row.height_cm,
            active: row.active,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StockMovementRow {
    id: i32,
    variant_id: i32,
    delta: i32,
    reason: String,
    order_id: Option<i32>,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<StockMovementRow> for StockMovement {
    type Error = RepositoryError;

    fn try_from(row: StockMovementRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            variant_id: VariantId::new(row.variant_id),
            delta: row.delta,
            reason: parse_column(&row.reason, "stock_movements.reason")?,
            order_id: row.order_id,
            note: row.note,
            created_at: row.created_at,
        })
    }
}

// =============================================================================
// Inputs
// =============================================================================

/// Catalog listing filters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    /// Free-text search over name, description and SKU.
    pub q: Option<String>,
    #[serde(alias = "categoria")]
    pub category: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
}

/// Fields for creating or replacing a product.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: Option<String>,
    pub base_price: Decimal,
    pub weight_kg: Decimal,
    pub length_cm: Option<Decimal>,
    pub width_cm: Option<Decimal>,
    pub height_cm: Option<Decimal>,
    pub image_url: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Fields for creating or replacing a variant.
#[derive(Debug, Clone, Deserialize)]
pub struct VariantInput {
    pub sku: String,
    pub barcode: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub price: Option<Decimal>,
    #[serde(default = "default_true")]
    pub active: bool,
}

const fn default_true() -> bool {
    true
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for catalog database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List products matching a filter, newest first, with the total count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        filter: &ProductFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Product>, i64), RepositoryError> {
        let search = filter
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", escape_like(q)));
        let category = filter.category.as_deref().map(str::trim).filter(|c| !c.is_empty());

        let condition = "($1::text IS NULL OR p.name ILIKE $1 OR p.description ILIKE $1 \
             OR EXISTS (SELECT 1 FROM variants v WHERE v.product_id = p.id AND v.sku ILIKE $1)) \
             AND ($2::text IS NULL OR p.category = $2) AND (p.active OR $3)";

        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE {condition} \
             ORDER BY p.created_at DESC, p.id DESC LIMIT $4 OFFSET $5"
        ))
        .bind(&search)
        .bind(category)
        .bind(filter.include_inactive)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM products p WHERE {condition}"
        ))
        .bind(&search)
        .bind(category)
        .bind(filter.include_inactive)
        .fetch_one(self.pool)
        .await?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    /// Get an active product and its active variants by slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<ProductDetail>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE slug = $1 AND active"
        ))
        .bind(slug)
        .fetch_optional(self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let product = Product::from(row);
        let variants = self
            .variants(product.id)
            .await?
            .into_iter()
            .filter(|v| v.active)
            .collect();
        Ok(Some(ProductDetail { product, variants }))
    }

    /// Whether any product, active or not, uses `slug`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn slug_exists(&self, slug: &str) -> Result<bool, RepositoryError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE slug = $1)")
                .bind(slug)
                .fetch_one(self.pool)
                .await?;
        Ok(exists)
    }

    /// Get a product by ID regardless of status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    pub async fn get(&self, id: ProductId) -> Result<ProductDetail, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        let variants = self.variants(id).await?;
        Ok(ProductDetail {
            product: row.into(),
            variants,
        })
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    pub async fn create(&self, input: &ProductInput) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "INSERT INTO products (slug, name, description, category, base_price, weight_kg, \
             length_cm, width_cm, height_cm, image_url, active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(input.slug.trim())
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(&input.category)
        .bind(input.base_price)
        .bind(input.weight_kg)
        .bind(input.length_cm)
        .bind(input.width_cm)
        .bind(input.height_cm)
        .bind(&input.image_url)
        .bind(input.active)
        .fetch_one(self.pool)
        .await
        .map_err(|e| {
            RepositoryError::from_constraint(e, || format!("slug already in use: {}", input.slug))
        })?;

        Ok(row.into())
    }

    /// Replace a product's fields.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist and
    /// `RepositoryError::Conflict` if the slug is taken.
    pub async fn update(
        &self,
        id: ProductId,
        input: &ProductInput,
    ) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE products SET slug = $2, name = $3, description = $4, category = $5, \
             base_price = $6, weight_kg = $7, length_cm = $8, width_cm = $9, height_cm = $10, \
             image_url = $11, active = $12, updated_at = now() \
             WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(input.slug.trim())
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(&input.category)
        .bind(input.base_price)
        .bind(input.weight_kg)
        .bind(input.length_cm)
        .bind(input.width_cm)
        .bind(input.height_cm)
        .bind(&input.image_url)
        .bind(input.active)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| {
            RepositoryError::from_constraint(e, || format!("slug already in use: {}", input.slug))
        })?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    /// Delete a product and its variants. Past order lines keep their copy
    /// of the names.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    pub async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// All variants of a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn variants(&self, product_id: ProductId) -> Result<Vec<Variant>, RepositoryError> {
        let rows = sqlx::query_as::<_, VariantRow>(&format!(
            "SELECT {VARIANT_COLUMNS} FROM variants WHERE product_id = $1 ORDER BY id"
        ))
        .bind(product_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Add a variant with an opening stock level.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` for a duplicate SKU or barcode and
    /// `RepositoryError::NotFound` if the product doesn't exist.
    pub async fn create_variant(
        &self,
        product_id: ProductId,
        input: &VariantInput,
        initial_stock: i32,
    ) -> Result<Variant, RepositoryError> {
        if initial_stock < 0 {
            return Err(RepositoryError::Conflict(
                "stock cannot be negative".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
            .bind(product_id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(RepositoryError::NotFound);
        }

        let row = sqlx::query_as::<_, VariantRow>(&format!(
            "INSERT INTO variants (product_id, sku, barcode, size, color, price, stock, active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {VARIANT_COLUMNS}"
        ))
        .bind(product_id)
        .bind(input.sku.trim())
        .bind(input.barcode.as_deref().map(str::trim))
        .bind(&input.size)
        .bind(&input.color)
        .bind(input.price)
        .bind(initial_stock)
        .bind(input.active)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| duplicate_code(e, input))?;

        if initial_stock > 0 {
            record_movement(
                &mut tx,
                VariantId::new(row.id),
                initial_stock,
                StockReason::Restock,
                None,
                Some("initial stock"),
            )
            .await?;
        }

        tx.commit().await?;
        Ok(row.into())
    }

    /// Replace a variant's descriptive fields. Stock changes go through
    /// [`Self::adjust_stock`].
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the variant doesn't exist and
    /// `RepositoryError::Conflict` for a duplicate SKU or barcode.
    pub async fn update_variant(
        &self,
        id: VariantId,
        input: &VariantInput,
    ) -> Result<Variant, RepositoryError> {
        let row = sqlx::query_as::<_, VariantRow>(&format!(
            "UPDATE variants SET sku = $2, barcode = $3, size = $4, color = $5, price = $6, \
             active = $7, updated_at = now() WHERE id = $1 RETURNING {VARIANT_COLUMNS}"
        ))
        .bind(id)
        .bind(input.sku.trim())
        .bind(input.barcode.as_deref().map(str::trim))
        .bind(&input.size)
        .bind(&input.color)
        .bind(input.price)
        .bind(input.active)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| duplicate_code(e, input))?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    /// Delete a variant.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the variant doesn't exist.
    pub async fn delete_variant(&self, id: VariantId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM variants WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Change stock by `delta` and record the movement.
    ///
    /// Returns the new stock level.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the variant doesn't exist and
    /// `RepositoryError::Conflict` if stock would go negative.
    pub async fn adjust_stock(
        &self,
        id: VariantId,
        delta: i32,
        reason: StockReason,
        note: Option<&str>,
    ) -> Result<i32, RepositoryError> {
        if delta == 0 {
            return Err(RepositoryError::Conflict("delta cannot be zero".to_string()));
        }

        let mut tx = self.pool.begin().await?;

        let stock: Option<i32> = sqlx::query_scalar(
            "UPDATE variants SET stock = stock + $2, updated_at = now() \
             WHERE id = $1 AND stock + $2 >= 0 RETURNING stock",
        )
        .bind(id)
        .bind(delta)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(stock) = stock else {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM variants WHERE id = $1)")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?;
            return Err(if exists {
                RepositoryError::Conflict("insufficient stock".to_string())
            } else {
                RepositoryError::NotFound
            });
        };

        record_movement(&mut tx, id, delta, reason, None, note).await?;
        tx.commit().await?;

        tracing::info!(variant_id = %id, delta, stock, reason = reason.as_str(), "Stock adjusted");
        Ok(stock)
    }

    /// Recent stock movements for a variant, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn movements(
        &self,
        id: VariantId,
        limit: i64,
    ) -> Result<Vec<StockMovement>, RepositoryError> {
        let rows = sqlx::query_as::<_, StockMovementRow>(
            "SELECT id, variant_id, delta, reason, order_id, note, created_at \
             FROM stock_movements WHERE variant_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Find a variant by exact SKU or barcode, for the point of sale.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_code(&self, code: &str) -> Result<Option<PricedVariant>, RepositoryError> {
        let row = sqlx::query_as::<_, PricedVariantRow>(&format!(
            "{PRICED_VARIANT_SELECT} WHERE v.barcode = $1 OR upper(v.sku) = upper($1) \
             ORDER BY (v.barcode = $1) DESC LIMIT 1"
        ))
        .bind(code.trim())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Price and stock for a set of variants.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn priced_variants(
        &self,
        ids: &[VariantId],
    ) -> Result<Vec<PricedVariant>, RepositoryError> {
        let ids: Vec<i32> = ids.iter().map(VariantId::as_i32).collect();
        let rows = sqlx::query_as::<_, PricedVariantRow>(&format!(
            "{PRICED_VARIANT_SELECT} WHERE v.id = ANY($1)"
        ))
        .bind(&ids)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Distinct categories of active products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn categories(&self) -> Result<Vec<String>, RepositoryError> {
        let categories = sqlx::query_scalar(
            "SELECT DISTINCT category FROM products \
             WHERE active AND category IS NOT NULL ORDER BY category",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(categories)
    }
}

/// Append to the stock ledger inside a transaction.
pub(crate) async fn record_movement(
    tx: &mut Transaction<'_, Postgres>,
    variant_id: VariantId,
    delta: i32,
    reason: StockReason,
    order_id: Option<i32>,
    note: Option<&str>,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO stock_movements (variant_id, delta, reason, order_id, note) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(variant_id)
    .bind(delta)
    .bind(reason.as_str())
    .bind(order_id)
    .bind(note)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn duplicate_code(err: sqlx::Error, input: &VariantInput) -> RepositoryError {
    RepositoryError::from_constraint(err, || match &input.barcode {
        Some(barcode) => format!("SKU {} or barcode {barcode} already in use", input.sku),
        None => format!("SKU {} already in use", input.sku),
    })
}

/// Escape `%`, `_` and `\` for use inside an `ILIKE` pattern.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("blusa"), "blusa");
    }

    #[test]
    fn test_product_filter_accepts_spanish_category() {
        let filter: ProductFilter =
            serde_json::from_str(r#"{"q":"blusa","categoria":"ropa"}"#).expect("filter");
        assert_eq!(filter.category.as_deref(), Some("ropa"));
        assert!(!filter.include_inactive);
    }
}
