//! Application entry point for the `infra-telemetry` API server.
//!
//! This binary orchestrates the full startup sequence for the ingestion API,
//! including:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Establishing a PostgreSQL connection pool
//! - Bootstrapping the schema and hypertable if they do not exist
//! - Loading the required-fields table
//! - Mounting all API routes via the `routes` gateway (EMBP pattern)
//! - Binding the Axum HTTP server and serving requests
//!
//! # Environment Variables
//! - `DATABASE_URL` (**required**) – PostgreSQL connection string
//! - `DB_POOL_MAX` (optional) – maximum number of DB connections (default: 5)
//! - `BIND_ADDR` (optional) – listen address (default: `0.0.0.0:8080`)
//! - `DB_RESET` (optional) – drop tables before bootstrap (default: false)
//! - `REQUIRED_FIELDS_PATH` (optional) – JSON required-fields table
//! - `AXUM_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
use std::sync::Arc;

use axum::Router;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;

use anyhow::Result;

use infra_telemetry::store::PgStore;
use infra_telemetry::{config, logging, routes, schema, IngestService, RequiredFields};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    logging::init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let required = RequiredFields::load(cfg.required_fields_path.as_deref())?;
    tracing::info!("Required-fields table covers {} device types", required.len());

    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(&cfg.db_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool, cfg.db_reset).await?;

    let service = IngestService::new(Arc::new(PgStore::new(pool)), required);

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(service);

    tracing::info!("Listening on {}", cfg.bind_addr);

    let listener = tokio::net::TcpListener::bind(cfg.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
