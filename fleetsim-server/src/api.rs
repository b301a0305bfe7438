// Fleetsim Server - HTTP handlers
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Configuration boundary and operational endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use fleetsim::{Engine, FleetError, LoopState, StatsSnapshot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::metrics::{encode_metrics, update_engine_metrics, EngineSample};
use crate::ws::ws_handler;

/// Application state shared across handlers.
pub struct AppState {
    pub engine: Arc<Engine>,
    /// Queue depth of each WebSocket subscriber
    pub queue_depth: usize,
    pub start_time: Instant,
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/configure", post(configure_handler))
        .route("/inject-anomaly", post(inject_anomaly_handler))
        .route("/maintenance", post(maintenance_handler))
        .route("/ws", get(ws_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}

/// Engine error mapped to an HTTP status.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct ApiError(#[from] FleetError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            FleetError::UnknownSensor(_) => StatusCode::NOT_FOUND,
            FleetError::InvalidConfig(_) | FleetError::UnknownAnomalyKind(_) => {
                StatusCode::BAD_REQUEST
            }
            FleetError::Sink(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            status: "error",
            detail: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfigureRequest {
    pub num_sensors: usize,
    pub frequency_hz: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigureResponse {
    pub status: String,
    pub sensor_count: usize,
    pub frequency: f64,
}

#[derive(Debug, Deserialize)]
pub struct AnomalyRequest {
    pub sensor_ids: Vec<String>,
    pub anomaly_type: String,
}

#[derive(Debug, Deserialize)]
pub struct MaintenanceRequest {
    pub sensor_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusBody {
    pub status: String,
}

impl StatusBody {
    fn new(status: &str) -> Json<Self> {
        Json(Self {
            status: status.to_string(),
        })
    }
}

/// Reconcile the population and start the loop on first use.
pub async fn configure_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConfigureRequest>,
) -> Result<Json<ConfigureResponse>, ApiError> {
    let report = state
        .engine
        .reconcile(request.num_sensors, request.frequency_hz)
        .await?;
    Ok(Json(ConfigureResponse {
        status: "configured".to_string(),
        sensor_count: report.sensor_count,
        frequency: report.frequency_hz,
    }))
}

pub async fn inject_anomaly_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnomalyRequest>,
) -> Result<Json<StatusBody>, ApiError> {
    state
        .engine
        .inject_anomaly(&request.sensor_ids, &request.anomaly_type)
        .await?;
    Ok(StatusBody::new("anomaly_injected"))
}

pub async fn maintenance_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MaintenanceRequest>,
) -> Result<Json<StatusBody>, ApiError> {
    state.engine.record_maintenance(&request.sensor_ids).await?;
    Ok(StatusBody::new("maintenance_recorded"))
}

async fn sample(engine: &Engine) -> EngineSample {
    let states = engine.sensor_states().await;
    EngineSample {
        sensors: states.len(),
        frequency_hz: engine.frequency(),
        loop_state: engine.loop_state(),
        active_anomalies: states.values().filter(|s| s.anomaly_active).count(),
        live_subscribers: engine.subscribers().len().await,
        stats: engine.stats(),
    }
}

/// Metrics handler - refreshes gauges and returns Prometheus text format.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    update_engine_metrics(&sample(&state.engine).await);
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        encode_metrics(),
    )
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Ready once the durable sink holds a connection.
pub async fn ready_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.engine.sink().is_connected() {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Sink disconnected")
    }
}

/// Status information response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub uptime_secs: u64,
    pub topic: String,
    pub loop_state: LoopState,
    pub frequency_hz: f64,
    pub sensor_count: usize,
    pub active_anomalies: usize,
    pub live_subscribers: usize,
    pub sink_success_rate: f64,
    pub stats: StatsSnapshot,
}

pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let sample = sample(&state.engine).await;
    Json(StatusResponse {
        version: fleetsim::VERSION.to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        topic: state.engine.config().topic.clone(),
        loop_state: sample.loop_state,
        frequency_hz: sample.frequency_hz,
        sensor_count: sample.sensors,
        active_anomalies: sample.active_anomalies,
        live_subscribers: sample.live_subscribers,
        sink_success_rate: sample.stats.sink_success_rate(),
        stats: sample.stats,
    })
}
