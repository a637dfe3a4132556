//! Ingestion service: the write path shared by every API route.
//!
//! Device type is always resolved from the stored asset, never taken from
//! the request, so a reading cannot skip validation by omitting or
//! misstating its type.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{IngestError, IngestResult};
use crate::models::{
    InfrastructureAsset, NewInfrastructure, NewSensorReading, SensorReading, TelemetryEnvelope,
};
use crate::store::InfrastructureStore;
use crate::validation::RequiredFields;

// ---

#[derive(Clone)]
pub struct IngestService {
    store: Arc<dyn InfrastructureStore>,
    required: Arc<RequiredFields>,
}

impl IngestService {
    // ---
    pub fn new(store: Arc<dyn InfrastructureStore>, required: RequiredFields) -> Self {
        Self {
            store,
            required: Arc::new(required),
        }
    }

    /// Create an infrastructure asset after checking its scalar fields.
    pub async fn create_infrastructure(
        &self,
        asset: NewInfrastructure,
    ) -> IngestResult<InfrastructureAsset> {
        // ---
        check_asset(&asset)?;

        debug!(device_id = %asset.device_id, device_type = %asset.device_type, "Creating asset");
        let stored = self.store.insert_asset(asset).await?;

        info!(device_id = %stored.device_id, id = stored.id, "Asset created");
        Ok(stored)
    }

    /// Validate and store one sensor reading.
    pub async fn create_sensor_reading(
        &self,
        reading: NewSensorReading,
    ) -> IngestResult<SensorReading> {
        // ---
        let asset = self.resolve_asset(&reading.device_id).await?;
        self.store_reading(&asset, reading).await
    }

    /// Store a simulator envelope as a sensor reading.
    ///
    /// The envelope's `infrastructure_type` is only compared against the
    /// stored asset; validation uses the stored type.
    pub async fn ingest_envelope(&self, envelope: TelemetryEnvelope) -> IngestResult<SensorReading> {
        // ---
        let asset = self.resolve_asset(&envelope.infrastructure_id).await?;
        if asset.device_type != envelope.infrastructure_type {
            warn!(
                device_id = %asset.device_id,
                stored_type = %asset.device_type,
                claimed_type = %envelope.infrastructure_type,
                "Envelope device type disagrees with stored asset, using stored type"
            );
        }

        self.store_reading(&asset, envelope.into_sensor_reading()).await
    }

    async fn resolve_asset(&self, device_id: &str) -> IngestResult<InfrastructureAsset> {
        self.store
            .find_asset(device_id)
            .await?
            .ok_or_else(|| IngestError::UnknownDevice(device_id.to_string()))
    }

    /// Validate `reading` against the resolved asset's type and append it.
    async fn store_reading(
        &self,
        asset: &InfrastructureAsset,
        reading: NewSensorReading,
    ) -> IngestResult<SensorReading> {
        // ---
        self.required.validate(&asset.device_type, &reading.sensor_readings)?;

        let timestamp = reading.timestamp.unwrap_or_else(Utc::now);
        let stored = self.store.insert_reading(reading, timestamp).await?;

        info!(
            device_id = %stored.device_id,
            id = stored.id,
            device_type = %asset.device_type,
            "Sensor reading stored"
        );
        Ok(stored)
    }
}

/// Reject blank identifiers and out-of-range coordinates.
fn check_asset(asset: &NewInfrastructure) -> IngestResult<()> {
    // ---
    let blank = [
        ("device_id", &asset.device_id),
        ("device_type", &asset.device_type),
        ("name", &asset.name),
    ]
    .into_iter()
    .find(|(_, value)| value.trim().is_empty());

    if let Some((field, _)) = blank {
        return Err(IngestError::InvalidAsset(format!("{field} must not be empty")));
    }
    if !(-90.0..=90.0).contains(&asset.lat) {
        return Err(IngestError::InvalidAsset(format!(
            "lat {} outside [-90, 90]",
            asset.lat
        )));
    }
    if !(-180.0..=180.0).contains(&asset.lon) {
        return Err(IngestError::InvalidAsset(format!(
            "lon {} outside [-180, 180]",
            asset.lon
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use serde_json::{json, Map, Value};
    use std::collections::BTreeSet;
    use tokio_test::{assert_err, assert_ok};

    fn service() -> (IngestService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = IngestService::new(store.clone(), RequiredFields::default());
        (service, store)
    }

    fn main_st() -> NewInfrastructure {
        NewInfrastructure {
            device_id: "ROAD_001".into(),
            device_type: "road".into(),
            lat: 40.7128,
            lon: -74.0060,
            name: "Main St".into(),
            description: None,
            metadata: Map::new(),
        }
    }

    fn reading(device_id: &str, readings: Value) -> NewSensorReading {
        NewSensorReading {
            device_id: device_id.into(),
            timestamp: None,
            temperature: None,
            operational_status: None,
            weather_condition: None,
            sensor_readings: readings.as_object().cloned().unwrap_or_default(),
        }
    }

    #[tokio::test]
    async fn test_road_scenario() {
        // ---
        let (service, _) = service();
        assert_ok!(service.create_infrastructure(main_st()).await);

        let full = json!({"traffic_flow": 1500, "surface_moisture": 15, "surface_condition": "dry"});
        let stored = service
            .create_sensor_reading(reading("ROAD_001", full))
            .await
            .unwrap();
        assert!(stored.id > 0);

        let partial = json!({"traffic_flow": 1500});
        let err = service
            .create_sensor_reading(reading("ROAD_001", partial))
            .await
            .unwrap_err();

        match err {
            IngestError::Validation(v) => {
                assert_eq!(v.device_type, "road");
                assert_eq!(
                    v.missing,
                    BTreeSet::from(["surface_moisture".to_string(), "surface_condition".to_string()])
                );
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_device_fails_regardless_of_payload() {
        // ---
        let (service, _) = service();
        let full = json!({"traffic_flow": 1500, "surface_moisture": 15, "surface_condition": "dry"});

        for payload in [full, json!({})] {
            let err = service
                .create_sensor_reading(reading("ROAD_404", payload))
                .await
                .unwrap_err();
            assert!(matches!(err, IngestError::UnknownDevice(ref id) if id == "ROAD_404"));
        }
    }

    #[tokio::test]
    async fn test_unvalidated_types_accept_empty_readings() {
        // ---
        let (service, _) = service();
        for (id, device_type) in [("HWY_001", "highway"), ("X_001", "unknown_type")] {
            let mut asset = main_st();
            asset.device_id = id.into();
            asset.device_type = device_type.into();
            assert_ok!(service.create_infrastructure(asset).await);
            assert_ok!(service.create_sensor_reading(reading(id, json!({}))).await);
        }
    }

    #[tokio::test]
    async fn test_asset_round_trips_fields() {
        // ---
        let (service, store) = service();
        let mut asset = main_st();
        asset.description = Some("Primary road sensor for downtown area".into());
        asset.metadata = json!({"manufacturer": "SensorCorp", "model": "RS-2000", "lanes": 4})
            .as_object()
            .cloned()
            .unwrap();

        let created = service.create_infrastructure(asset.clone()).await.unwrap();
        let fetched = store.find_asset("ROAD_001").await.unwrap().unwrap();

        assert_eq!(created, fetched);
        assert_eq!(fetched.device_id, asset.device_id);
        assert_eq!(fetched.device_type, asset.device_type);
        assert_eq!(fetched.lat, asset.lat);
        assert_eq!(fetched.lon, asset.lon);
        assert_eq!(fetched.name, asset.name);
        assert_eq!(fetched.description, asset.description);
        assert_eq!(fetched.metadata, asset.metadata);
        assert_eq!(fetched.created_at, fetched.updated_at);
    }

    #[tokio::test]
    async fn test_asset_scalar_checks() {
        // ---
        let (service, _) = service();

        let mut blank = main_st();
        blank.name = "  ".into();
        let err = service.create_infrastructure(blank).await.unwrap_err();
        assert!(matches!(err, IngestError::InvalidAsset(ref m) if m.contains("name")));

        let mut far_north = main_st();
        far_north.lat = 91.0;
        assert_err!(service.create_infrastructure(far_north).await);

        let mut far_east = main_st();
        far_east.lon = 180.5;
        assert_err!(service.create_infrastructure(far_east).await);
    }

    #[tokio::test]
    async fn test_missing_timestamp_defaults_to_now() {
        // ---
        let (service, _) = service();
        service.create_infrastructure(main_st()).await.unwrap();

        let before = Utc::now();
        let full = json!({"traffic_flow": 1, "surface_moisture": 2, "surface_condition": "wet"});
        let stored = service
            .create_sensor_reading(reading("ROAD_001", full.clone()))
            .await
            .unwrap();
        assert!(stored.timestamp >= before);

        let fixed = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut explicit = reading("ROAD_001", full);
        explicit.timestamp = Some(fixed);
        let stored = service.create_sensor_reading(explicit).await.unwrap();
        assert_eq!(stored.timestamp, fixed);
    }

    #[tokio::test]
    async fn test_envelope_uses_stored_device_type() {
        // ---
        let (service, store) = service();
        service.create_infrastructure(main_st()).await.unwrap();

        // Claims to be a highway, but the stored asset is a road.
        let envelope: TelemetryEnvelope = serde_json::from_value(json!({
            "infrastructure_id": "ROAD_001",
            "infrastructure_type": "highway",
            "location": {"lat": 40.7128, "lng": -74.0060},
            "timestamp": "2025-03-26T18:45:00Z",
            "readings": {"weight_load": {"value": 1200.0, "unit": "kg"}}
        }))
        .unwrap();

        let err = service.ingest_envelope(envelope).await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
        assert!(store.readings_for("ROAD_001").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_envelope_is_stored_as_reading() {
        // ---
        let (service, store) = service();
        service.create_infrastructure(main_st()).await.unwrap();

        let envelope: TelemetryEnvelope = serde_json::from_value(json!({
            "infrastructure_id": "ROAD_001",
            "infrastructure_type": "road",
            "location": {"lat": 40.7128, "lng": -74.0060},
            "timestamp": "2025-03-26T18:45:00Z",
            "readings": {
                "traffic_flow": {"value": 812.4, "unit": "vehicles/hour"},
                "surface_moisture": {"value": 40.1, "unit": "%"},
                "surface_condition": {"value": "wet", "unit": null},
                "temperature": {"value": 3.5, "unit": "°C"}
            }
        }))
        .unwrap();

        let stored = service.ingest_envelope(envelope).await.unwrap();
        assert_eq!(stored.temperature, Some(3.5));
        assert_eq!(stored.sensor_readings["surface_condition"], "wet");
        assert_eq!(store.readings_for("ROAD_001").unwrap(), vec![stored]);
    }

    fn signal_envelope() -> TelemetryEnvelope {
        serde_json::from_value(json!({
            "infrastructure_id": "SIG_001",
            "infrastructure_type": "traffic_signal",
            "location": {"lat": 40.7128, "lng": -74.0060},
            "timestamp": "2025-03-26T18:45:00",
            "readings": {
                "signal_status": {"value": "red", "unit": null},
                "operational_status": {"value": "flashing", "unit": null}
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_envelope_common_fields_satisfy_custom_table() {
        // ---
        let table = RequiredFields::from_json(
            r#"{"traffic_signal": ["signal_status", "operational_status"]}"#,
        )
        .unwrap();
        let store = Arc::new(MemoryStore::new());
        let service = IngestService::new(store.clone(), table);

        let mut signal = main_st();
        signal.device_id = "SIG_001".into();
        signal.device_type = "traffic_signal".into();
        service.create_infrastructure(signal).await.unwrap();

        let stored = service.ingest_envelope(signal_envelope()).await.unwrap();
        assert_eq!(stored.operational_status.as_deref(), Some("flashing"));
        assert_eq!(stored.sensor_readings["operational_status"], "flashing");
    }

    /// Counts asset lookups on top of an in-memory store.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        lookups: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl InfrastructureStore for CountingStore {
        async fn insert_asset(&self, asset: NewInfrastructure) -> IngestResult<InfrastructureAsset> {
            self.inner.insert_asset(asset).await
        }

        async fn find_asset(&self, device_id: &str) -> IngestResult<Option<InfrastructureAsset>> {
            self.lookups
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.find_asset(device_id).await
        }

        async fn insert_reading(
            &self,
            reading: NewSensorReading,
            timestamp: chrono::DateTime<Utc>,
        ) -> IngestResult<SensorReading> {
            self.inner.insert_reading(reading, timestamp).await
        }
    }

    #[tokio::test]
    async fn test_envelope_resolves_asset_once() {
        // ---
        let store = Arc::new(CountingStore::default());
        let service = IngestService::new(store.clone(), RequiredFields::default());

        let mut signal = main_st();
        signal.device_id = "SIG_001".into();
        signal.device_type = "highway".into();
        service.create_infrastructure(signal).await.unwrap();

        assert_ok!(service.ingest_envelope(signal_envelope()).await);
        assert_eq!(store.lookups.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_envelope_for_unknown_device_is_referential() {
        // ---
        let (service, _) = service();
        let err = service.ingest_envelope(signal_envelope()).await.unwrap_err();
        assert!(matches!(err, IngestError::UnknownDevice(ref id) if id == "SIG_001"));
    }
}
