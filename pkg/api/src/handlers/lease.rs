use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use pkg_constants::lease::{DEFAULT_LEASE_TTL_SECS, LEASE_TTL_HEADER};
use pkg_storage::LeaseStatus;
use pkg_types::lease::LeaseRequest;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::Application;

/// POST /lease — compete for a lease on the key in the JSON body.
/// 201 when this caller won, 202 when the lease is already held.
/// The response body is always the decimal lease id, even when it is 0.
pub async fn create_lease(
    State(app): State<Application>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    debug!("Request body: {}", String::from_utf8_lossy(&body));
    let request: LeaseRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            error!("Failed to unmarshal request body, {}", e);
            return (StatusCode::BAD_REQUEST, "Failed to unmarshal request body").into_response();
        }
    };

    let lease_ttl = parse_lease_ttl(&headers, &request.key);

    match app.create_lease(lease_ttl, &request).await {
        Ok(record) => {
            let code = match record.status {
                LeaseStatus::Created => StatusCode::CREATED,
                LeaseStatus::Accepted => StatusCode::ACCEPTED,
            };
            (code, record.id.to_string()).into_response()
        }
        Err(e) => {
            error!("{}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Read the TTL header as a duration literal (`3s`, `10s`, `1m`).
/// Missing or unparseable values fall back to the 10 s default.
fn parse_lease_ttl(headers: &HeaderMap, key: &str) -> Duration {
    headers
        .get(LEASE_TTL_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| humantime::parse_duration(value).ok())
        .unwrap_or_else(|| {
            warn!(
                "Can't parse value of {} header. Using default lease TTL for {}",
                LEASE_TTL_HEADER, key
            );
            Duration::from_secs(DEFAULT_LEASE_TTL_SECS)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lease_ttl_literals() {
        let mut headers = HeaderMap::new();
        headers.insert(LEASE_TTL_HEADER, "1m".parse().unwrap());
        assert_eq!(parse_lease_ttl(&headers, "k"), Duration::from_secs(60));

        headers.insert(LEASE_TTL_HEADER, "500ms".parse().unwrap());
        assert_eq!(parse_lease_ttl(&headers, "k"), Duration::from_millis(500));
    }

    #[test]
    fn test_parse_lease_ttl_defaults() {
        let empty = HeaderMap::new();
        assert_eq!(parse_lease_ttl(&empty, "k"), Duration::from_secs(10));

        let mut garbage = HeaderMap::new();
        garbage.insert(LEASE_TTL_HEADER, "soon".parse().unwrap());
        assert_eq!(parse_lease_ttl(&garbage, "k"), Duration::from_secs(10));
    }
}
