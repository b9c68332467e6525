use anyhow::{anyhow, Result};
use async_trait::async_trait;
use etcd_client::{
    Certificate, Client, Compare, CompareOp, ConnectOptions, Identity, PutOptions, TlsOptions,
    Txn, TxnOp,
};
use pkg_config::EtcdConfig;
use pkg_constants::lease::{DEFAULT_LEASE_VALUE, PROBE_TIMEOUT_SECS};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{LeaseStatus, Storage};

/// Storage implementation backed by an etcd cluster. The underlying client
/// multiplexes one connection pool and is cheap to clone per call.
pub struct EtcdStorage {
    client: Client,
}

impl EtcdStorage {
    /// Connect to the configured endpoints, with optional mutual TLS.
    pub async fn connect(cfg: &EtcdConfig) -> Result<Self> {
        let mut options = ConnectOptions::new().with_connect_timeout(Duration::from_secs(5));

        if cfg.tls_enabled {
            let ca = std::fs::read(&cfg.ca_cert_path)
                .map_err(|e| anyhow!("failed to read CA certificate {}: {}", cfg.ca_cert_path, e))?;
            let cert = std::fs::read(&cfg.client_cert_path).map_err(|e| {
                anyhow!("failed to read client certificate {}: {}", cfg.client_cert_path, e)
            })?;
            let key = std::fs::read(&cfg.client_key_path)
                .map_err(|e| anyhow!("failed to read client key {}: {}", cfg.client_key_path, e))?;

            let tls = TlsOptions::new()
                .ca_certificate(Certificate::from_pem(ca))
                .identity(Identity::from_pem(cert, key));
            options = options.with_tls(tls);
        }

        let client = Client::connect(&cfg.endpoints, Some(options))
            .await
            .map_err(|e| anyhow!("failed to connect to etcd: {}", e))?;

        info!("Connected to etcd at {:?}", cfg.endpoints);
        Ok(Self { client })
    }
}

#[async_trait]
impl Storage for EtcdStorage {
    async fn check_lease_presence(&self, key: &str) -> Result<i64> {
        let mut kv = self.client.kv_client();
        let resp = tokio::time::timeout(Duration::from_secs(PROBE_TIMEOUT_SECS), kv.get(key, None))
            .await
            .map_err(|_| anyhow!("timed out getting key {} from etcd", key))?
            .map_err(|e| anyhow!("failed to get key from etcd: {}", e))?;

        match resp.kvs().first() {
            Some(entry) => {
                debug!("Lock {}, already exists", key);
                Ok(entry.lease())
            }
            None => Ok(0),
        }
    }

    async fn create_lease(&self, key: &str, lease_ttl_secs: i64, value: &[u8])
        -> Result<(LeaseStatus, i64)> {
        let value = if value.is_empty() {
            DEFAULT_LEASE_VALUE.as_bytes()
        } else {
            value
        };

        let mut lease = self.client.lease_client();
        let grant = lease
            .grant(lease_ttl_secs, None)
            .await
            .map_err(|e| anyhow!("failed to create lease: {}", e))?;

        // Single store-side compare-and-set: put only if the key was never
        // created. A lost race abandons the fresh lease to expire naturally.
        let txn = Txn::new()
            .when([Compare::create_revision(key, CompareOp::Equal, 0)])
            .and_then([TxnOp::put(
                key,
                value,
                Some(PutOptions::new().with_lease(grant.id())),
            )]);

        let mut kv = self.client.kv_client();
        let resp = kv.txn(txn).await?;

        if !resp.succeeded() {
            warn!("Lease race");
            return Ok((LeaseStatus::Accepted, 0));
        }

        info!("{} key created with a new lease {}", key, grant.id());
        Ok((LeaseStatus::Created, grant.id()))
    }

    async fn keep_lease_once(&self, lease_id: i64) -> Result<()> {
        let mut lease = self.client.lease_client();
        let (mut keeper, mut stream) = lease.keep_alive(lease_id).await?;
        keeper.keep_alive().await?;

        // etcd answers a keep-alive for an unknown lease with TTL 0 instead
        // of an error; surface that as a failure.
        match stream.message().await? {
            Some(resp) if resp.ttl() > 0 => {
                debug!("KeepAlive lease: {}", lease_id);
                Ok(())
            }
            _ => Err(anyhow!("lease {} not found or already expired", lease_id)),
        }
    }
}
