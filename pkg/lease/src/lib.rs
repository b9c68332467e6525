//! Stateless grant policy over the storage seam.
//!
//! A grant probes for an existing holder first, then attempts the atomic
//! create, then immediately heartbeats the fresh lease once. The probe is a
//! cheap shortcut only; the conditional create is what makes the grant safe
//! against concurrent brokers.

use anyhow::{anyhow, Result};
use pkg_constants::lease::LEASE_KEY_PREFIX;
use pkg_storage::{LeaseStatus, Storage};
use pkg_types::lease::LeaseRequest;
use std::time::Duration;
use tracing::debug;

/// Attempt to grant a lease on `request.key` with the given TTL
/// (truncated to whole seconds).
pub async fn create_lease(
    storage: &dyn Storage,
    lease_ttl: Duration,
    request: &LeaseRequest,
) -> Result<(LeaseStatus, i64)> {
    let key = format!("{}{}", LEASE_KEY_PREFIX, request.key);

    debug!("Checking lease presence for the key: {}", key);
    let holder = storage
        .check_lease_presence(&key)
        .await
        .map_err(|e| anyhow!("failed to check lease presence: {}", e))?;
    if holder != 0 {
        return Ok((LeaseStatus::Accepted, holder));
    }

    debug!("Creating lease for the key: {}", key);
    let (status, lease_id) = storage
        .create_lease(&key, lease_ttl.as_secs() as i64, request.value.as_bytes())
        .await?;
    if status != LeaseStatus::Created {
        // Lost the create race; the winner's lease stands.
        return Ok((LeaseStatus::Accepted, lease_id));
    }

    // A fresh lease has its full TTL, but some store configurations expire
    // very young leases on certain races; one immediate keep-alive leaves a
    // known-good lease behind every `created` outcome.
    debug!("Prolong lease for the key: {}, with ttl: {:?}", key, lease_ttl);
    storage
        .keep_lease_once(lease_id)
        .await
        .map_err(|e| anyhow!("failed to prolong lease with leaseID: {}, {}", lease_id, e))?;

    Ok((LeaseStatus::Created, lease_id))
}

/// Re-arm an existing lease with a single heartbeat.
pub async fn revive_lease(storage: &dyn Storage, lease_id: i64) -> Result<()> {
    storage.keep_lease_once(lease_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted Storage double: each operation returns a fixed outcome and
    /// records the keys/ids it was called with.
    #[derive(Default)]
    struct ScriptedStorage {
        presence_id: i64,
        presence_error: Option<&'static str>,
        create_result: Option<(LeaseStatus, i64)>,
        create_error: Option<&'static str>,
        keep_error: Option<&'static str>,
        seen_keys: Mutex<Vec<String>>,
        kept_ids: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl Storage for ScriptedStorage {
        async fn check_lease_presence(&self, key: &str) -> Result<i64> {
            self.seen_keys.lock().unwrap().push(key.to_string());
            match self.presence_error {
                Some(msg) => Err(anyhow!(msg)),
                None => Ok(self.presence_id),
            }
        }

        async fn create_lease(&self, key: &str, _lease_ttl_secs: i64, _value: &[u8])
            -> Result<(LeaseStatus, i64)> {
            self.seen_keys.lock().unwrap().push(key.to_string());
            match self.create_error {
                Some(msg) => Err(anyhow!(msg)),
                None => Ok(self.create_result.unwrap_or((LeaseStatus::Created, 123))),
            }
        }

        async fn keep_lease_once(&self, lease_id: i64) -> Result<()> {
            self.kept_ids.lock().unwrap().push(lease_id);
            match self.keep_error {
                Some(msg) => Err(anyhow!(msg)),
                None => Ok(()),
            }
        }
    }

    fn request(key: &str) -> LeaseRequest {
        LeaseRequest {
            key: key.to_string(),
            value: "test-data".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_existing_holder_is_accepted_verbatim() {
        let storage = ScriptedStorage {
            presence_id: 456,
            ..Default::default()
        };
        let (status, id) = create_lease(&storage, Duration::from_secs(10), &request("test-key"))
            .await
            .unwrap();
        assert_eq!(status, LeaseStatus::Accepted);
        assert_eq!(id, 456);
        // Probe short-circuits: no create, no heartbeat.
        assert_eq!(storage.seen_keys.lock().unwrap().len(), 1);
        assert!(storage.kept_ids.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_successful_creation_heartbeats_once() {
        let storage = ScriptedStorage::default();
        let (status, id) = create_lease(&storage, Duration::from_secs(10), &request("test-key"))
            .await
            .unwrap();
        assert_eq!(status, LeaseStatus::Created);
        assert_eq!(id, 123);
        assert_eq!(*storage.kept_ids.lock().unwrap(), vec![123]);
    }

    #[tokio::test]
    async fn test_key_gets_fixed_prefix() {
        let storage = ScriptedStorage::default();
        create_lease(&storage, Duration::from_secs(10), &request("test-key"))
            .await
            .unwrap();
        let seen = storage.seen_keys.lock().unwrap();
        assert!(seen.iter().all(|k| k == "/shared-lock/test-key"));
    }

    #[tokio::test]
    async fn test_presence_check_error_aborts_grant() {
        let storage = ScriptedStorage {
            presence_error: Some("check error"),
            ..Default::default()
        };
        let err = create_lease(&storage, Duration::from_secs(10), &request("test-key"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "failed to check lease presence: check error");
    }

    #[tokio::test]
    async fn test_create_error_propagates() {
        let storage = ScriptedStorage {
            create_error: Some("create error"),
            ..Default::default()
        };
        let err = create_lease(&storage, Duration::from_secs(10), &request("test-key"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "create error");
    }

    #[tokio::test]
    async fn test_keepalive_error_fails_grant() {
        let storage = ScriptedStorage {
            keep_error: Some("keep error"),
            ..Default::default()
        };
        let err = create_lease(&storage, Duration::from_secs(10), &request("test-key"))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to prolong lease with leaseID: 123, keep error"
        );
    }

    #[tokio::test]
    async fn test_lost_race_skips_heartbeat() {
        // keep_error would fail the grant if the heartbeat ran; a lost race
        // must return accepted without touching the winner's lease.
        let storage = ScriptedStorage {
            create_result: Some((LeaseStatus::Accepted, 0)),
            keep_error: Some("keep error"),
            ..Default::default()
        };
        let (status, id) = create_lease(&storage, Duration::from_secs(10), &request("test-key"))
            .await
            .unwrap();
        assert_eq!(status, LeaseStatus::Accepted);
        assert_eq!(id, 0);
        assert!(storage.kept_ids.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revive_lease_success() {
        let storage = ScriptedStorage::default();
        revive_lease(&storage, 123).await.unwrap();
        assert_eq!(*storage.kept_ids.lock().unwrap(), vec![123]);
    }

    #[tokio::test]
    async fn test_revive_lease_error() {
        let storage = ScriptedStorage {
            keep_error: Some("keep error"),
            ..Default::default()
        };
        let err = revive_lease(&storage, 456).await.unwrap_err();
        assert_eq!(err.to_string(), "keep error");
    }
}
