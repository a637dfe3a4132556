//! One-shot database bootstrap.
//!
//! Creates the tables, hypertable and indexes, then exits. Safe to rerun;
//! set `DB_RESET=true` to drop existing tables first (destroys all data).
use anyhow::Result;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;

use infra_telemetry::{config, logging, schema};

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    logging::init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&cfg.db_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    schema::create_schema(&pool, cfg.db_reset).await?;
    pool.close().await;

    tracing::info!("Bootstrap complete");
    Ok(())
}
