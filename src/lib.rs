//! Telemetry ingestion backend for transportation infrastructure.
//!
//! Assets (roads, bridges, tunnels, traffic signals, streetlights, ...) are
//! registered once; their sensors then append time-stamped readings, which
//! are checked against the required measurement keys of the asset's device
//! type before being written to a TimescaleDB hypertable.
//!
//! Module layout follows the Explicit Module Boundary Pattern (EMBP):
//! - `config`     – environment configuration for every binary
//! - `logging`    – tracing subscriber setup
//! - `models`     – request bodies, stored rows, simulator envelope
//! - `validation` – device type → required keys table
//! - `store`      – storage trait with PostgreSQL and in-memory backends
//! - `service`    – the ingestion write path
//! - `routes`     – axum gateway over the service
//! - `schema`     – idempotent database bootstrap
//! - `simulator`  – synthetic load generator

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod routes;
pub mod schema;
pub mod service;
pub mod simulator;
pub mod store;
pub mod validation;

pub use config::{Config, SimulatorConfig};
pub use error::{IngestError, IngestResult};
pub use service::IngestService;

// Re-exported so routes/*.rs only depend on the crate root, not on the
// modules that define these types.
pub use models::{
    InfrastructureAsset, NewInfrastructure, NewSensorReading, SensorReading, TelemetryEnvelope,
};
pub use validation::{RequiredFields, ValidationError};
