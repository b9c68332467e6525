use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::{LeaseStatus, Storage};

/// Lease id the mock hands out for every winning create.
pub const MOCK_LEASE_ID: i64 = 123;
/// Reserved lease id whose keep-alive always fails with "lease not found".
pub const MISSING_LEASE_ID: i64 = 999;

/// In-memory Storage for tests and local development. Keys arrive already
/// prefixed; leases never expire on their own.
#[derive(Default)]
pub struct MockStorage {
    leases: Mutex<HashMap<String, i64>>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a lease currently exists for the (prefixed) key.
    pub fn contains(&self, key: &str) -> bool {
        self.leases.lock().unwrap().contains_key(key)
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn check_lease_presence(&self, key: &str) -> Result<i64> {
        let leases = self.leases.lock().unwrap();
        Ok(leases.get(key).copied().unwrap_or(0))
    }

    async fn create_lease(&self, key: &str, _lease_ttl_secs: i64, _value: &[u8])
        -> Result<(LeaseStatus, i64)> {
        let mut leases = self.leases.lock().unwrap();
        if leases.contains_key(key) {
            return Ok((LeaseStatus::Accepted, 0));
        }
        leases.insert(key.to_string(), MOCK_LEASE_ID);
        Ok((LeaseStatus::Created, MOCK_LEASE_ID))
    }

    async fn keep_lease_once(&self, lease_id: i64) -> Result<()> {
        if lease_id == MISSING_LEASE_ID {
            bail!("lease not found");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_create_wins_with_fixed_id() {
        let storage = MockStorage::new();
        let (status, id) = storage.create_lease("/shared-lock/k1", 10, b"v").await.unwrap();
        assert_eq!(status, LeaseStatus::Created);
        assert_eq!(id, MOCK_LEASE_ID);
        assert!(storage.contains("/shared-lock/k1"));
    }

    #[tokio::test]
    async fn test_second_create_is_accepted() {
        let storage = MockStorage::new();
        storage.create_lease("/shared-lock/k1", 10, b"v").await.unwrap();
        let (status, id) = storage.create_lease("/shared-lock/k1", 10, b"v").await.unwrap();
        assert_eq!(status, LeaseStatus::Accepted);
        assert_eq!(id, 0);
    }

    #[tokio::test]
    async fn test_presence_probe_returns_lease_id() {
        let storage = MockStorage::new();
        assert_eq!(storage.check_lease_presence("/shared-lock/k1").await.unwrap(), 0);
        storage.create_lease("/shared-lock/k1", 10, b"v").await.unwrap();
        assert_eq!(
            storage.check_lease_presence("/shared-lock/k1").await.unwrap(),
            MOCK_LEASE_ID
        );
    }

    #[tokio::test]
    async fn test_keepalive_fails_only_for_sentinel() {
        let storage = MockStorage::new();
        assert!(storage.keep_lease_once(MOCK_LEASE_ID).await.is_ok());
        let err = storage.keep_lease_once(MISSING_LEASE_ID).await.unwrap_err();
        assert_eq!(err.to_string(), "lease not found");
    }
}
