use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Json},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;

use crate::relay::{Relay, RelayStats};

pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn relay_stats(State(relay): State<Relay>) -> Json<RelayStats> {
    Json(relay.stats())
}

pub async fn render_metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
}
