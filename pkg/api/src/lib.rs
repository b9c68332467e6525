pub mod handlers;
pub mod server;

use anyhow::Result;
use pkg_cache::TtlLruCache;
use pkg_metrics::{MetricsRegistry, LEASE_GRANT_DURATION, LEASE_OPERATIONS, OP_GET, OP_PROLONG};
use pkg_storage::{LeaseStatus, Storage};
use pkg_types::lease::LeaseRequest;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Grant outcome as recorded in the local cache and echoed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseRecord {
    pub status: LeaseStatus,
    pub id: i64,
}

/// Shared application state injected into all Axum handlers.
/// Applies the cache-first read-through in front of the lease manager.
#[derive(Clone)]
pub struct Application {
    storage: Arc<dyn Storage>,
    lease_cache: Option<Arc<TtlLruCache<LeaseRecord>>>,
    pub metrics: Arc<MetricsRegistry>,
}

impl Application {
    pub fn new(
        storage: Arc<dyn Storage>,
        lease_cache: Option<Arc<TtlLruCache<LeaseRecord>>>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            storage,
            lease_cache,
            metrics,
        }
    }

    /// Grant a lease on `request.key`, serving repeat requests for a key
    /// still in the cache without touching the store.
    pub async fn create_lease(
        &self,
        lease_ttl: Duration,
        request: &LeaseRequest,
    ) -> Result<LeaseRecord> {
        let start = Instant::now();
        let result = self.grant(lease_ttl, request).await;
        self.metrics
            .observe(LEASE_GRANT_DURATION, &[OP_GET], start.elapsed().as_secs_f64());
        match &result {
            Ok(record) => self
                .metrics
                .counter_inc(LEASE_OPERATIONS, &[OP_GET, record.status.as_str()]),
            Err(_) => self.metrics.counter_inc(LEASE_OPERATIONS, &[OP_GET, "error"]),
        }
        result
    }

    async fn grant(&self, lease_ttl: Duration, request: &LeaseRequest) -> Result<LeaseRecord> {
        if let Some(cache) = &self.lease_cache {
            if let Some(record) = cache.get(&request.key) {
                debug!("Cache hit for lease key: {}", request.key);
                return Ok(record);
            }
        }

        let (status, id) =
            pkg_lease::create_lease(self.storage.as_ref(), lease_ttl, request).await?;

        if let Some(cache) = &self.lease_cache {
            // An accepted outcome with id 0 carries no holder information
            // worth remembering; everything else is cached for one TTL.
            if status == LeaseStatus::Created || id != 0 {
                cache.set(&request.key, LeaseRecord { status, id }, lease_ttl);
            }
        }

        Ok(LeaseRecord { status, id })
    }

    /// Re-arm an existing lease. Never consults or updates the cache.
    pub async fn revive_lease(&self, lease_id: i64) -> Result<()> {
        match pkg_lease::revive_lease(self.storage.as_ref(), lease_id).await {
            Ok(()) => {
                self.metrics
                    .counter_inc(LEASE_OPERATIONS, &[OP_PROLONG, "success"]);
                Ok(())
            }
            Err(e) => {
                self.metrics
                    .counter_inc(LEASE_OPERATIONS, &[OP_PROLONG, "failure"]);
                Err(e)
            }
        }
    }
}
