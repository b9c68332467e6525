use anyhow::Result;
use async_trait::async_trait;
use std::fmt;

pub mod etcd;
pub mod mock;

/// Outcome tag of a grant attempt against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseStatus {
    /// This caller won the race; a fresh lease was granted.
    Created,
    /// A lease already existed or a concurrent create won; nothing granted.
    Accepted,
}

impl LeaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseStatus::Created => "created",
            LeaseStatus::Accepted => "accepted",
        }
    }
}

impl fmt::Display for LeaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed operations over a distributed KV store with native lease support.
/// Production uses etcd; tests use the in-memory mock. Both honor the same
/// contract, in particular that `create_lease` is a single atomic
/// create-if-absent on the store side.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Return the lease id bound to `key`, or 0 if the key is absent.
    /// Errors only on transport/store failure.
    async fn check_lease_presence(&self, key: &str) -> Result<i64>;

    /// Grant a lease of `lease_ttl_secs` and atomically put `value` under
    /// `key` bound to it, if and only if the key does not exist yet.
    async fn create_lease(&self, key: &str, lease_ttl_secs: i64, value: &[u8])
        -> Result<(LeaseStatus, i64)>;

    /// Send exactly one keep-alive for `lease_id`, re-arming its timer by
    /// one TTL. Errors if the lease is unknown, expired, or unreachable.
    async fn keep_lease_once(&self, lease_id: i64) -> Result<()>;
}
