use axum::{extract::State, response::IntoResponse};

use crate::Application;

/// GET /metrics — Prometheus text exposition of the broker's registry.
pub async fn metrics(State(app): State<Application>) -> impl IntoResponse {
    app.metrics.render()
}
