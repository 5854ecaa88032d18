//! Tienda CLI - database and carrier maintenance.
//!
//! # Usage
//!
//! ```bash
//! # Apply database migrations
//! tienda-cli migrate
//!
//! # Load products, variants and coupons from YAML
//! tienda-cli seed data/catalogo.yaml
//!
//! # Create a coupon
//! tienda-cli coupon create -c VERANO10 -k percentage -v 10 --min-purchase 500
//!
//! # Check which carrier endpoints and credentials work
//! tienda-cli carriers probe --to 06600
//! ```
//!
//! Every command reads `TIENDA_DATABASE_URL` (or `DATABASE_URL`) and the
//! carrier variables the server uses, from the environment or `.env`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tienda_core::CouponKind;
use tienda_shipping::ProviderKind;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "tienda-cli")]
#[command(author, version, about = "Tienda CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Load catalog and coupons from a YAML file
    Seed {
        /// Path to the YAML file
        file: PathBuf,

        /// Check the file without touching the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Manage coupons
    Coupon {
        #[command(subcommand)]
        action: CouponAction,
    },
    /// Carrier connectivity
    Carriers {
        #[command(subcommand)]
        action: CarrierAction,
    },
}

#[derive(Subcommand)]
enum CouponAction {
    /// Create a new coupon
    Create {
        /// Coupon code (stored upper-case)
        #[arg(short, long)]
        code: String,

        /// `percentage` or `fixed_amount`
        #[arg(short, long, default_value = "percentage")]
        kind: CouponKind,

        /// Percentage (0-100] or amount in pesos
        #[arg(short, long)]
        value: Decimal,

        /// Smallest subtotal the coupon applies to
        #[arg(long)]
        min_purchase: Option<Decimal>,

        /// Total redemptions allowed
        #[arg(long)]
        max_uses: Option<i32>,

        /// Expiry date (YYYY-MM-DD, end of day UTC)
        #[arg(long)]
        expires: Option<chrono::NaiveDate>,
    },
}

#[derive(Subcommand)]
enum CarrierAction {
    /// Quote a sample parcel and report which endpoint answered
    Probe {
        /// Destination postal code (default: the origin's)
        #[arg(long)]
        to: Option<String>,

        /// Only probe this provider (`envia` or `skydropx`)
        #[arg(long)]
        provider: Option<ProviderKind>,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed { file, dry_run } => commands::seed::run(&file, dry_run).await?,
        Commands::Coupon { action } => match action {
            CouponAction::Create {
                code,
                kind,
                value,
                min_purchase,
                max_uses,
                expires,
            } => {
                commands::coupon::create(commands::coupon::NewCoupon {
                    code,
                    kind,
                    value,
                    min_purchase,
                    max_uses,
                    expires,
                })
                .await?;
            }
        },
        Commands::Carriers { action } => match action {
            CarrierAction::Probe { to, provider } => {
                commands::carriers::probe(to.as_deref(), provider).await?;
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_coupon_create() {
        let cli = Cli::try_parse_from([
            "tienda-cli", "coupon", "create", "-c", "verano10", "-k", "fixed_amount", "-v", "150",
            "--max-uses", "20", "--expires", "2026-08-31",
        ])
        .expect("parse");

        let Commands::Coupon {
            action:
                CouponAction::Create {
                    code,
                    kind,
                    value,
                    max_uses,
                    expires,
                    ..
                },
        } = cli.command
        else {
            panic!("expected coupon create");
        };
        assert_eq!(code, "verano10");
        assert_eq!(kind, CouponKind::FixedAmount);
        assert_eq!(value, Decimal::from(150));
        assert_eq!(max_uses, Some(20));
        assert_eq!(expires, chrono::NaiveDate::from_ymd_opt(2026, 8, 31));
    }

    #[test]
    fn test_parse_probe_provider() {
        let cli = Cli::try_parse_from(["tienda-cli", "carriers", "probe", "--provider", "skydropx"])
            .expect("parse");
        assert!(matches!(
            cli.command,
            Commands::Carriers {
                action: CarrierAction::Probe {
                    to: None,
                    provider: Some(ProviderKind::Skydropx)
                }
            }
        ));
    }
}
