use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, error, warn};

use crate::Application;

/// POST /keepalive — re-arm the lease whose decimal id is the request body.
/// 200 on success; 204 when the store no longer knows the lease, which
/// clients must read as "lease gone, stop"; 500 for an unparseable id.
pub async fn keepalive(State(app): State<Application>, body: String) -> impl IntoResponse {
    debug!("Request body: {}", body);
    let lease_id: i64 = match body.parse() {
        Ok(id) => id,
        Err(e) => {
            error!("Failed to parse lease id from string, leaseIDString: {}, {}", body, e);
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    debug!("Trying to revive lease: {}", lease_id);
    match app.revive_lease(lease_id).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!("Failed to prolong lease: {}", e);
            StatusCode::NO_CONTENT
        }
    }
}
