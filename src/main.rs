use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use barpay::payment_processor::PaymentProcessor;
use barpay::stripe_client::StripeConfig;
use barpay::stripe_processor::StripeProcessor;
use barpay::web::{PgPool, start_web_server};

// Embed migrations into the binary
const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

#[derive(Parser, Debug)]
#[command(name = "barpay", about = "Payments backend for the beach-bar platform")]
struct Args {
    /// Interface to bind the web server to
    #[arg(long, default_value = "0.0.0.0")]
    interface: String,

    /// Port to listen on
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    barpay::metrics::init_metrics();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool: PgPool = Pool::builder()
        .build(manager)
        .context("Failed to create database pool")?;

    run_migrations(pool.clone()).await?;

    let stripe_config = match StripeConfig::from_env() {
        Ok(config) => Some(config),
        Err(e) => {
            warn!("Stripe is not configured, payment routes will be unavailable: {e}");
            None
        }
    };
    let processor: Option<Arc<dyn PaymentProcessor>> = stripe_config
        .as_ref()
        .map(|config| Arc::new(StripeProcessor::new(config.client.clone())) as _);

    start_web_server(args.interface, args.port, pool, stripe_config, processor).await
}

async fn run_migrations(pool: PgPool) -> Result<()> {
    info!("Running database migrations");
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow::anyhow!("Failed to run migrations: {e}"))?;
        Ok::<(), anyhow::Error>(())
    })
    .await??;
    info!("Database migrations completed");
    Ok(())
}
