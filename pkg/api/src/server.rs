use anyhow::{anyhow, Result};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use pkg_cache::TtlLruCache;
use pkg_config::{CacheConfig, Config, StorageConfig, StorageType};
use pkg_metrics::{register_broker_metrics, MetricsRegistry};
use pkg_storage::{etcd::EtcdStorage, mock::MockStorage, Storage};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{handlers, Application, LeaseRecord};

/// Build the broker's router. Every route shares one request deadline so an
/// abandoned HTTP request releases its in-flight store call.
pub fn router(app: Application, request_timeout: Duration) -> Router {
    Router::new()
        .route("/lease", post(handlers::lease::create_lease))
        .route("/keepalive", post(handlers::keepalive::keepalive))
        .route("/health", get(handlers::health::health))
        .route("/metrics", get(handlers::metrics::metrics))
        .route_layer(middleware::from_fn_with_state(
            request_timeout,
            deadline_middleware,
        ))
        .with_state(app)
}

/// Bind the listener and serve until ctrl-c, then drain in-flight requests
/// within the configured shutdown window.
pub async fn start_server(cfg: Config) -> Result<()> {
    let metrics = Arc::new(MetricsRegistry::new());
    register_broker_metrics(&metrics);

    let storage = new_storage_connection(&cfg.storage).await?;
    let lease_cache = new_lease_cache(&cfg.cache, &metrics);
    if let Some(cache) = &lease_cache {
        cache.start_sweeper();
    }

    let app = Application::new(storage, lease_cache, metrics);
    let router = router(app, cfg.server.timeout.write);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server.port));
    let listener = TcpListener::bind(addr).await?;
    info!("Server is starting on {}", addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        let _ = shutdown_rx.await;
    });
    let server_task = tokio::spawn(server.into_future());

    tokio::signal::ctrl_c().await?;
    info!("Server is shutting down");
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(cfg.server.timeout.shutdown, server_task).await {
        Ok(result) => result??,
        Err(_) => warn!(
            "Server was unable to drain within {:?}, dropping in-flight requests",
            cfg.server.timeout.shutdown
        ),
    }

    Ok(())
}

async fn new_storage_connection(cfg: &StorageConfig) -> Result<Arc<dyn Storage>> {
    match cfg.storage_type {
        StorageType::Etcd => {
            let storage = EtcdStorage::connect(&cfg.etcd)
                .await
                .map_err(|e| anyhow!("failed to create etcd storage connection, {}", e))?;
            Ok(Arc::new(storage))
        }
        StorageType::Mock => Ok(Arc::new(MockStorage::new())),
    }
}

fn new_lease_cache(
    cfg: &CacheConfig,
    metrics: &Arc<MetricsRegistry>,
) -> Option<Arc<TtlLruCache<LeaseRecord>>> {
    if cfg.enabled {
        info!("Cache is enabled");
        Some(TtlLruCache::new(cfg.size, Arc::clone(metrics)))
    } else {
        info!("Cache is disabled");
        None
    }
}

async fn deadline_middleware(
    State(limit): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!("Request exceeded the {:?} deadline", limit);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
