//! Catalog management and stock control.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};

use tienda_core::{ProductId, VariantId};

use crate::db::ProductRepository;
use crate::db::products::{ProductFilter, ProductInput, VariantInput};
use crate::error::{AppError, Result};
use crate::models::{Product, ProductDetail, StockMovement, StockReason, Variant};
use crate::routes::{Page, PageQuery};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    #[serde(alias = "categoria")]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewVariantBody {
    #[serde(flatten)]
    pub variant: VariantInput,
    #[serde(default, alias = "existencias")]
    pub initial_stock: i32,
}

#[derive(Debug, Deserialize)]
pub struct StockBody {
    pub delta: i32,
    #[serde(default = "default_reason")]
    pub reason: StockReason,
    #[serde(default, alias = "nota")]
    pub note: Option<String>,
}

const fn default_reason() -> StockReason {
    StockReason::Adjustment
}

#[derive(Debug, Serialize)]
pub struct StockResponse {
    pub variant_id: VariantId,
    pub stock: i32,
}

#[derive(Debug, Deserialize)]
pub struct MovementsQuery {
    pub limit: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/productos", get(index).post(create))
        .route("/productos/{id}", get(show).put(update).delete(destroy))
        .route(
            "/productos/{id}/variantes",
            get(variants).post(create_variant),
        )
        .route("/variantes/{id}", put(update_variant).delete(delete_variant))
        .route("/variantes/{id}/stock", post(adjust_stock))
        .route("/variantes/{id}/movimientos", get(movements))
}

/// Reject product fields the database would accept but the store cannot sell.
fn validate_product(input: &ProductInput) -> Result<()> {
    let slug_ok = !input.slug.is_empty()
        && input
            .slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !slug_ok {
        return Err(AppError::BadRequest(
            "slug must be lowercase letters, digits and dashes".to_string(),
        ));
    }
    if input.name.trim().is_empty() {
        return Err(AppError::BadRequest("name is required".to_string()));
    }
    if input.base_price.is_sign_negative() {
        return Err(AppError::BadRequest("price cannot be negative".to_string()));
    }
    if input.weight_kg <= rust_decimal::Decimal::ZERO {
        return Err(AppError::BadRequest("weight must be positive".to_string()));
    }
    Ok(())
}

fn validate_variant(input: &VariantInput) -> Result<()> {
    if input.sku.trim().is_empty() {
        return Err(AppError::BadRequest("SKU is required".to_string()));
    }
    if input.price.is_some_and(|p| p.is_sign_negative()) {
        return Err(AppError::BadRequest("price cannot be negative".to_string()));
    }
    Ok(())
}

pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<Product>>> {
    let filter = ProductFilter {
        q: query.q,
        category: query.category,
        include_inactive: true,
    };
    let bounds = page.bounds();
    let (products, total) = ProductRepository::new(state.pool())
        .list(&filter, bounds.0, bounds.1)
        .await?;
    Ok(Json(Page::new(products, total, bounds)))
}

pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<ProductDetail>> {
    Ok(Json(ProductRepository::new(state.pool()).get(id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<ProductInput>,
) -> Result<(StatusCode, Json<Product>)> {
    validate_product(&input)?;
    let product = ProductRepository::new(state.pool()).create(&input).await?;
    tracing::info!(product_id = %product.id, slug = %product.slug, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    Json(input): Json<ProductInput>,
) -> Result<Json<Product>> {
    validate_product(&input)?;
    Ok(Json(
        ProductRepository::new(state.pool()).update(id, &input).await?,
    ))
}

pub async fn destroy(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<StatusCode> {
    ProductRepository::new(state.pool()).delete(id).await?;
    tracing::info!(product_id = %id, "Product deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn variants(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Vec<Variant>>> {
    Ok(Json(ProductRepository::new(state.pool()).variants(id).await?))
}

pub async fn create_variant(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    Json(body): Json<NewVariantBody>,
) -> Result<(StatusCode, Json<Variant>)> {
    validate_variant(&body.variant)?;
    let variant = ProductRepository::new(state.pool())
        .create_variant(id, &body.variant, body.initial_stock)
        .await?;
    Ok((StatusCode::CREATED, Json(variant)))
}

pub async fn update_variant(
    State(state): State<AppState>,
    Path(id): Path<VariantId>,
    Json(input): Json<VariantInput>,
) -> Result<Json<Variant>> {
    validate_variant(&input)?;
    Ok(Json(
        ProductRepository::new(state.pool())
            .update_variant(id, &input)
            .await?,
    ))
}

pub async fn delete_variant(
    State(state): State<AppState>,
    Path(id): Path<VariantId>,
) -> Result<StatusCode> {
    ProductRepository::new(state.pool()).delete_variant(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Add or remove stock with a ledger entry.
///
/// Sales and cancellations are recorded by orders, never by hand.
pub async fn adjust_stock(
    State(state): State<AppState>,
    Path(id): Path<VariantId>,
    Json(body): Json<StockBody>,
) -> Result<Json<StockResponse>> {
    if matches!(body.reason, StockReason::Sale | StockReason::Cancellation) {
        return Err(AppError::BadRequest(format!(
            "{} movements are recorded by orders",
            body.reason.as_str()
        )));
    }

    let stock = ProductRepository::new(state.pool())
        .adjust_stock(id, body.delta, body.reason, body.note.as_deref())
        .await?;
    tracing::info!(variant_id = %id, delta = body.delta, stock, "Stock adjusted");
    Ok(Json(StockResponse {
        variant_id: id,
        stock,
    }))
}

pub async fn movements(
    State(state): State<AppState>,
    Path(id): Path<VariantId>,
    Query(query): Query<MovementsQuery>,
) -> Result<Json<Vec<StockMovement>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    Ok(Json(
        ProductRepository::new(state.pool())
            .movements(id, limit)
            .await?,
    ))
}
