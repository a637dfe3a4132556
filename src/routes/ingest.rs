use axum::{
    extract::rejection::JsonRejection, extract::State, http::StatusCode, routing::post, Json,
    Router,
};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use super::error::ApiError;
use crate::{
    IngestService, InfrastructureAsset, NewInfrastructure, NewSensorReading, SensorReading,
    TelemetryEnvelope,
};

// ---

pub fn router() -> Router<IngestService> {
    // ---
    Router::new()
        .route("/infrastructure", post(create_infrastructure))
        .route("/sensor-data", post(create_sensor_reading))
        .route("/api/data", post(ingest_envelope))
}

type Created<T> = Result<(StatusCode, Json<T>), ApiError>;

async fn create_infrastructure(
    State(service): State<IngestService>,
    payload: Result<Json<NewInfrastructure>, JsonRejection>,
) -> Created<InfrastructureAsset> {
    // ---
    let span = info_span!("create_infrastructure", request_id = %Uuid::new_v4());
    async move {
        info!("POST /infrastructure");
        let Json(asset) = payload?;
        let stored = service.create_infrastructure(asset).await?;
        Ok((StatusCode::CREATED, Json(stored)))
    }
    .instrument(span)
    .await
}

async fn create_sensor_reading(
    State(service): State<IngestService>,
    payload: Result<Json<NewSensorReading>, JsonRejection>,
) -> Created<SensorReading> {
    // ---
    let span = info_span!("create_sensor_reading", request_id = %Uuid::new_v4());
    async move {
        info!("POST /sensor-data");
        let Json(reading) = payload?;
        let stored = service.create_sensor_reading(reading).await?;
        Ok((StatusCode::CREATED, Json(stored)))
    }
    .instrument(span)
    .await
}

async fn ingest_envelope(
    State(service): State<IngestService>,
    payload: Result<Json<TelemetryEnvelope>, JsonRejection>,
) -> Created<SensorReading> {
    // ---
    let span = info_span!("ingest_envelope", request_id = %Uuid::new_v4());
    async move {
        info!("POST /api/data");
        let Json(envelope) = payload?;
        let stored = service.ingest_envelope(envelope).await?;
        Ok((StatusCode::CREATED, Json(stored)))
    }
    .instrument(span)
    .await
}
