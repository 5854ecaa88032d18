//! Database migration command.
//!
//! Applies the SQL files in `crates/server/migrations/`, which are embedded
//! in the binary at build time. Already-applied migrations are skipped.
//!
//! # Usage
//!
//! ```bash
//! tienda-cli migrate
//! ```

use tracing::info;

/// Run pending migrations.
///
/// # Errors
///
/// Returns an error if the database URL is missing, the connection fails,
/// or a migration fails or was modified after being applied.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let pool = super::connect().await?;

    let migrator = sqlx::migrate!("../server/migrations");
    info!(available = migrator.iter().count(), "Running migrations...");
    migrator.run(&pool).await?;

    info!("Migrations complete!");
    Ok(())
}
