//! HTTP control API

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bigbrother_core::{BigBrotherError, HealthStatus};
use bigbrother_ipvs::{ClusterCollection, ClusterSummary, Ipvs};
use bigbrother_telemetry::MetricsSnapshot;
use serde_json::json;
use tracing::info;

#[derive(Clone)]
pub struct ApiState {
    pub clusters: Arc<ClusterCollection>,
    pub ipvs: Ipvs,
    pub service_id: &'static str,
    pub version: &'static str,
    pub started: Instant,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/clusters", get(list_clusters))
        .route(
            "/api/v1/clusters/{name}",
            get(show_cluster).put(start_cluster).delete(stop_cluster),
        )
        .route("/api/v1/metrics", get(metrics))
        .with_state(state)
}

/// Error body with the status the error maps to
#[derive(Debug)]
pub struct ApiError(BigBrotherError);

impl From<BigBrotherError> for ApiError {
    fn from(err: BigBrotherError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "error": self.0.error_code(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

async fn health(State(state): State<ApiState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        healthy: true,
        service_id: state.service_id.to_string(),
        version: state.version.to_string(),
        uptime_seconds: state.started.elapsed().as_secs(),
        monitored_clusters: state.clusters.running().await.len(),
    })
}

async fn list_clusters(State(state): State<ApiState>) -> Json<Vec<ClusterSummary>> {
    Json(state.clusters.summaries().await)
}

async fn show_cluster(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<ClusterSummary> {
    let cluster = state
        .clusters
        .get(&name)
        .ok_or_else(|| BigBrotherError::NotFound(format!("cluster {}", name)))?;
    let summary = cluster.lock().await.summary();
    Ok(Json(summary))
}

async fn start_cluster(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<ClusterSummary> {
    let cluster = state
        .clusters
        .get(&name)
        .ok_or_else(|| BigBrotherError::NotFound(format!("cluster {}", name)))?;
    let mut cluster = cluster.lock().await;

    info!(cluster = %cluster, "Start requested via API");
    cluster
        .start_monitoring(&state.ipvs)
        .await
        .map_err(BigBrotherError::from)?;
    Ok(Json(cluster.summary()))
}

async fn stop_cluster(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<ClusterSummary> {
    let cluster = state
        .clusters
        .get(&name)
        .ok_or_else(|| BigBrotherError::NotFound(format!("cluster {}", name)))?;
    let mut cluster = cluster.lock().await;

    info!(cluster = %cluster, "Stop requested via API");
    cluster
        .stop_monitoring(&state.ipvs)
        .await
        .map_err(BigBrotherError::from)?;
    Ok(Json(cluster.summary()))
}

async fn metrics(State(state): State<ApiState>) -> Json<MetricsSnapshot> {
    let running = state.clusters.running().await.len();
    let metrics = state.ipvs.metrics();
    metrics.monitored_clusters.set(running as u64);
    Json(metrics.snapshot())
}
