//! Seed the catalog and coupons from a YAML file.
//!
//! ```yaml
//! products:
//!   - slug: blusa-bordada
//!     name: Blusa bordada
//!     category: blusas
//!     base_price: "349.50"
//!     weight_kg: "0.3"
//!     variants:
//!       - sku: BLU-M-RJ
//!         size: M
//!         color: Rojo
//!         stock: 12
//! coupons:
//!   - code: VERANO10
//!     kind: percentage
//!     value: "10"
//!     min_purchase: "500"
//! ```
//!
//! The whole file is validated before connecting. Products whose slug and
//! coupons whose code already exist are skipped, so seeding is repeatable.

use std::collections::HashSet;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{error, info, warn};

use tienda_core::coupon::normalize_code;
use tienda_server::db::coupons::CouponInput;
use tienda_server::db::products::{ProductInput, VariantInput};
use tienda_server::db::{CouponRepository, ProductRepository};

/// Top-level seed document.
#[derive(Debug, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub products: Vec<SeedProduct>,
    #[serde(default)]
    pub coupons: Vec<CouponInput>,
}

#[derive(Debug, Deserialize)]
pub struct SeedProduct {
    #[serde(flatten)]
    pub product: ProductInput,
    #[serde(default)]
    pub variants: Vec<SeedVariant>,
}

#[derive(Debug, Deserialize)]
pub struct SeedVariant {
    #[serde(flatten)]
    pub variant: VariantInput,
    #[serde(default)]
    pub stock: i32,
}

/// Counts reported after seeding.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub products: usize,
    pub variants: usize,
    pub coupons: usize,
    pub skipped: usize,
}

/// Problems that would make the insert fail halfway, one message each.
#[must_use]
pub fn validate(seed: &SeedFile) -> Vec<String> {
    let mut errors = Vec::new();
    let mut slugs = HashSet::new();
    let mut skus = HashSet::new();
    let mut codes = HashSet::new();

    for item in &seed.products {
        let product = &item.product;
        let slug = product.slug.trim();
        if slug.is_empty() || product.name.trim().is_empty() {
            errors.push(format!("product '{slug}': slug and name are required"));
        }
        if !slugs.insert(slug.to_string()) {
            errors.push(format!("product '{slug}': duplicate slug"));
        }
        if product.base_price < Decimal::ZERO {
            errors.push(format!("product '{slug}': negative base price"));
        }
        if product.weight_kg <= Decimal::ZERO {
            errors.push(format!("product '{slug}': weight must be positive"));
        }
        if item.variants.is_empty() {
            errors.push(format!("product '{slug}': no variants"));
        }

        for variant in &item.variants {
            let sku = variant.variant.sku.trim();
            if sku.is_empty() {
                errors.push(format!("product '{slug}': variant without SKU"));
            } else if !skus.insert(sku.to_string()) {
                errors.push(format!("SKU {sku}: duplicate"));
            }
            if variant.stock < 0 {
                errors.push(format!("SKU {sku}: negative stock"));
            }
            if variant.variant.price.is_some_and(|p| p < Decimal::ZERO) {
                errors.push(format!("SKU {sku}: negative price"));
            }
        }
    }

    for coupon in &seed.coupons {
        let code = normalize_code(&coupon.code);
        if !codes.insert(code.clone()) {
            errors.push(format!("coupon {code}: duplicate code"));
        }
        if let Err(e) = coupon.rules().validate() {
            errors.push(format!("coupon {code}: {e}"));
        }
    }

    errors
}

/// Parse and validate a seed document.
///
/// # Errors
///
/// Returns an error for malformed YAML or any validation problem.
pub fn parse(content: &str) -> Result<SeedFile, Box<dyn std::error::Error>> {
    let seed: SeedFile = serde_yaml::from_str(content)?;

    let errors = validate(&seed);
    if !errors.is_empty() {
        error!("Seed file validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }
    Ok(seed)
}

/// Seed the database from `file`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or validated, or if the
/// database rejects an insert.
pub async fn run(file: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !file.exists() {
        return Err(format!("File not found: {}", file.display()).into());
    }

    info!(path = %file.display(), "Loading seed file");
    let content = tokio::fs::read_to_string(file).await?;
    let seed = parse(&content)?;
    info!(
        products = seed.products.len(),
        coupons = seed.coupons.len(),
        "Seed file validated"
    );

    if dry_run {
        info!("Dry run, nothing written");
        return Ok(());
    }

    let pool = super::connect().await?;
    let summary = insert(&pool, &seed).await?;

    info!("Seeding complete!");
    info!("  Products created: {}", summary.products);
    info!("  Variants created: {}", summary.variants);
    info!("  Coupons created: {}", summary.coupons);
    info!("  Skipped (already exist): {}", summary.skipped);
    Ok(())
}

async fn insert(
    pool: &sqlx::PgPool,
    seed: &SeedFile,
) -> Result<SeedSummary, Box<dyn std::error::Error>> {
    let products = ProductRepository::new(pool);
    let coupons = CouponRepository::new(pool);
    let mut summary = SeedSummary::default();

    for item in &seed.products {
        let slug = item.product.slug.trim();
        if products.slug_exists(slug).await? {
            warn!(slug, "Product exists, skipping");
            summary.skipped += 1;
            continue;
        }

        let product = products.create(&item.product).await?;
        summary.products += 1;
        for variant in &item.variants {
            products
                .create_variant(product.id, &variant.variant, variant.stock)
                .await?;
            summary.variants += 1;
        }
        info!(slug, variants = item.variants.len(), "Product created");
    }

    for coupon in &seed.coupons {
        if coupons.get_by_code(&coupon.code).await?.is_some() {
            warn!(code = %normalize_code(&coupon.code), "Coupon exists, skipping");
            summary.skipped += 1;
            continue;
        }
        let created = coupons.create(coupon).await?;
        summary.coupons += 1;
        info!(code = %created.code, "Coupon created");
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use tienda_core::CouponKind;

    use super::*;

    const SEED: &str = r#"
products:
  - slug: blusa-bordada
    name: Blusa bordada
    description: Manta con bordado a mano
    category: blusas
    base_price: "349.50"
    weight_kg: "0.3"
    variants:
      - sku: BLU-M-RJ
        size: M
        color: Rojo
        stock: 12
      - sku: BLU-G-RJ
        size: G
        color: Rojo
        price: "369.50"
  - slug: rebozo
    name: Rebozo de seda
    base_price: "1200"
    weight_kg: "0.4"
    active: false
    variants:
      - sku: REB-AZ
        barcode: "7501234567890"
coupons:
  - code: verano10
    kind: percentage
    value: "10"
    min_purchase: "500"
  - code: ENVIO150
    kind: fixed_amount
    value: "150"
    max_uses: 100
"#;

    #[test]
    fn test_parse_seed_file() {
        let seed = parse(SEED).expect("valid seed");

        assert_eq!(seed.products.len(), 2);
        let blusa = &seed.products[0];
        assert_eq!(blusa.product.slug, "blusa-bordada");
        assert_eq!(blusa.product.base_price, Decimal::new(34950, 2));
        assert!(blusa.product.active);
        assert_eq!(blusa.variants.len(), 2);
        assert_eq!(blusa.variants[0].stock, 12);
        assert_eq!(blusa.variants[1].stock, 0);
        assert_eq!(blusa.variants[1].variant.price, Some(Decimal::new(36950, 2)));

        let rebozo = &seed.products[1];
        assert!(!rebozo.product.active);
        assert_eq!(rebozo.variants[0].variant.barcode.as_deref(), Some("7501234567890"));

        assert_eq!(seed.coupons.len(), 2);
        assert_eq!(seed.coupons[0].kind, CouponKind::Percentage);
        assert_eq!(seed.coupons[1].max_uses, Some(100));
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let yaml = r#"
products:
  - slug: falda
    name: Falda
    base_price: "-1"
    weight_kg: "0"
    variants:
      - sku: FAL-1
        stock: -2
      - sku: FAL-1
  - slug: falda
    name: Falda larga
    base_price: "100"
    weight_kg: "0.5"
coupons:
  - code: DOBLE
    kind: percentage
    value: "120"
  - code: doble
    kind: fixed_amount
    value: "50"
"#;
        let seed: SeedFile = serde_yaml::from_str(yaml).expect("yaml");
        let errors = validate(&seed);

        assert!(errors.contains(&"product 'falda': negative base price".to_string()));
        assert!(errors.contains(&"product 'falda': weight must be positive".to_string()));
        assert!(errors.contains(&"SKU FAL-1: negative stock".to_string()));
        assert!(errors.contains(&"SKU FAL-1: duplicate".to_string()));
        assert!(errors.contains(&"product 'falda': duplicate slug".to_string()));
        assert!(errors.contains(&"product 'falda': no variants".to_string()));
        assert!(errors.contains(&"coupon DOBLE: duplicate code".to_string()));
        assert!(
            errors
                .iter()
                .any(|e| e.starts_with("coupon DOBLE: ") && !e.ends_with("duplicate code"))
        );
        assert!(parse(yaml).is_err());
    }

    #[test]
    fn test_empty_file_is_valid() {
        let seed = parse("{}").expect("empty seed");
        assert!(seed.products.is_empty());
        assert!(seed.coupons.is_empty());
    }
}
