//! Subcommand implementations.

pub mod carriers;
pub mod coupon;
pub mod migrate;
pub mod seed;

use sqlx::PgPool;

/// Connect using `TIENDA_DATABASE_URL` or `DATABASE_URL`.
async fn connect() -> Result<PgPool, Box<dyn std::error::Error>> {
    let database_url = tienda_server::config::database_url_from_env()?;
    tracing::info!("Connecting to database...");
    Ok(tienda_server::db::create_pool(&database_url).await?)
}
