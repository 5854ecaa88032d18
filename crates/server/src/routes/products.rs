//! Public catalog handlers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::Deserialize;

use crate::db::ProductRepository;
use crate::db::products::ProductFilter;
use crate::error::{AppError, Result};
use crate::models::{Product, ProductDetail};
use crate::routes::{Page, PageQuery};
use crate::state::AppState;

/// Listing query: free-text search and category.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    #[serde(alias = "categoria")]
    pub category: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/categorias", get(categories))
        .route("/{slug}", get(show))
}

/// Active products matching the query.
#[tracing::instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<Product>>> {
    let filter = ProductFilter {
        q: query.q,
        category: query.category,
        include_inactive: false,
    };
    let bounds = page.bounds();
    let (products, total) = ProductRepository::new(state.pool())
        .list(&filter, bounds.0, bounds.1)
        .await?;
    Ok(Json(Page::new(products, total, bounds)))
}

pub async fn categories(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(ProductRepository::new(state.pool()).categories().await?))
}

/// One active product with its active variants.
pub async fn show(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ProductDetail>> {
    ProductRepository::new(state.pool())
        .get_by_slug(&slug)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("product {slug}")))
}
