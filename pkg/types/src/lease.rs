use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Payload a client posts to `/lease` to compete for a named lease.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaseRequest {
    /// Caller-chosen identifier, unique per logical resource.
    pub key: String,
    /// Opaque value stored verbatim under the key in the KV store.
    #[serde(default)]
    pub value: String,
    /// Opaque labels; carried in the payload but not consulted by the broker.
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Informational client-side timestamp.
    #[serde(default, rename = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal_body() {
        let req: LeaseRequest = serde_json::from_str(r#"{"key":"k1","value":"v"}"#).unwrap();
        assert_eq!(req.key, "k1");
        assert_eq!(req.value, "v");
        assert!(req.labels.is_empty());
        assert!(req.created_at.is_none());
    }

    #[test]
    fn test_deserialize_full_body() {
        let body = r#"{
            "key": "example-key",
            "value": "example-value",
            "labels": {"env": "production"},
            "timestamp": "2024-05-01T12:00:00Z"
        }"#;
        let req: LeaseRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.labels.get("env").map(String::as_str), Some("production"));
        assert!(req.created_at.is_some());
    }
}
