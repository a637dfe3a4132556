//! Storage for assets and readings.
//!
//! The ingestion service talks to a [`InfrastructureStore`] handle that is
//! built once at startup and passed in, so tests can swap the PostgreSQL
//! backend for [`MemoryStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::IngestResult;
use crate::models::{InfrastructureAsset, NewInfrastructure, NewSensorReading, SensorReading};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

// ---

#[async_trait]
pub trait InfrastructureStore: Send + Sync {
    /// Insert a new asset row and return it as stored.
    ///
    /// Fails with `DuplicateDevice` when the device id is already taken.
    async fn insert_asset(&self, asset: NewInfrastructure) -> IngestResult<InfrastructureAsset>;

    /// Look up an asset by its logical device id.
    async fn find_asset(&self, device_id: &str) -> IngestResult<Option<InfrastructureAsset>>;

    /// Append one reading stamped with `timestamp`.
    ///
    /// Fails with `UnknownDevice` when the referenced asset does not exist.
    async fn insert_reading(
        &self,
        reading: NewSensorReading,
        timestamp: DateTime<Utc>,
    ) -> IngestResult<SensorReading>;
}
