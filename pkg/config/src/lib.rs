//! Environment-driven configuration. Every variable is prefixed with
//! `SHARED_LOCK_`; a missing or unparseable value falls back to its default,
//! except the storage type and the etcd endpoint list, which fail startup.

use anyhow::bail;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_SERVER_PORT: u16 = 8080;
const DEFAULT_SERVER_READ_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SERVER_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SERVER_IDLE_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_SERVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_STORAGE_TYPE: StorageType = StorageType::Etcd;
const DEFAULT_ETCD_ADDR_LIST: &str = "http://localhost:2379";
const DEFAULT_ETCD_TLS_ENABLED: bool = false;
const DEFAULT_ETCD_CA_CERT_PATH: &str = "/etc/etcd/ca.crt";
const DEFAULT_ETCD_CLIENT_CERT_PATH: &str = "/etc/etcd/client.crt";
const DEFAULT_ETCD_CLIENT_KEY_PATH: &str = "/etc/etcd/client.key";
const DEFAULT_CACHE_ENABLED: bool = false;
const DEFAULT_CACHE_SIZE: usize = 1000;
const DEFAULT_DEBUG_MODE: bool = false;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub debug: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub timeout: ServerTimeouts,
}

#[derive(Debug, Clone)]
pub struct ServerTimeouts {
    pub read: Duration,
    pub write: Duration,
    pub idle: Duration,
    pub shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub storage_type: StorageType,
    pub etcd: EtcdConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Etcd,
    Mock,
}

impl FromStr for StorageType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "etcd" => Ok(StorageType::Etcd),
            "mock" => Ok(StorageType::Mock),
            other => bail!("unsupported storage type: {}", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EtcdConfig {
    pub endpoints: Vec<String>,
    pub tls_enabled: bool,
    pub ca_cert_path: String,
    pub client_cert_path: String,
    pub client_key_path: String,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub size: usize,
}

impl Config {
    /// Assemble the configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let endpoints =
            parse_endpoint_list(&env_or("SHARED_LOCK_ETCD_ADDR_LIST", DEFAULT_ETCD_ADDR_LIST.to_string()))?;

        let storage_type = match std::env::var("SHARED_LOCK_STORAGE_TYPE") {
            Ok(raw) => raw.parse()?,
            Err(_) => DEFAULT_STORAGE_TYPE,
        };

        Ok(Config {
            server: ServerConfig {
                port: env_or("SHARED_LOCK_SERVER_PORT", DEFAULT_SERVER_PORT),
                timeout: ServerTimeouts {
                    read: env_duration_or("SHARED_LOCK_SERVER_READ_TIMEOUT", DEFAULT_SERVER_READ_TIMEOUT),
                    write: env_duration_or("SHARED_LOCK_SERVER_WRITE_TIMEOUT", DEFAULT_SERVER_WRITE_TIMEOUT),
                    idle: env_duration_or("SHARED_LOCK_SERVER_IDLE_TIMEOUT", DEFAULT_SERVER_IDLE_TIMEOUT),
                    shutdown: env_duration_or(
                        "SHARED_LOCK_SERVER_SHUTDOWN_TIMEOUT",
                        DEFAULT_SERVER_SHUTDOWN_TIMEOUT,
                    ),
                },
            },
            storage: StorageConfig {
                storage_type,
                etcd: EtcdConfig {
                    endpoints,
                    tls_enabled: env_or("SHARED_LOCK_ETCD_TLS", DEFAULT_ETCD_TLS_ENABLED),
                    ca_cert_path: env_or("SHARED_LOCK_CA_CERT_PATH", DEFAULT_ETCD_CA_CERT_PATH.to_string()),
                    client_cert_path: env_or(
                        "SHARED_LOCK_CLIENT_CERT_PATH",
                        DEFAULT_ETCD_CLIENT_CERT_PATH.to_string(),
                    ),
                    client_key_path: env_or(
                        "SHARED_LOCK_CLIENT_KEY_PATH",
                        DEFAULT_ETCD_CLIENT_KEY_PATH.to_string(),
                    ),
                },
            },
            cache: CacheConfig {
                enabled: env_or("SHARED_LOCK_CACHE_ENABLED", DEFAULT_CACHE_ENABLED),
                size: env_or("SHARED_LOCK_CACHE_SIZE", DEFAULT_CACHE_SIZE),
            },
            debug: env_or("SHARED_LOCK_DEBUG", DEFAULT_DEBUG_MODE),
        })
    }
}

/// Read a typed value from the environment, falling back to `default` when
/// the variable is unset or doesn't parse.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or(default),
        Err(_) => default,
    }
}

/// Duration variant of [`env_or`] using humantime literals (`10s`, `2m`).
fn env_duration_or(key: &str, default: Duration) -> Duration {
    match std::env::var(key) {
        Ok(raw) => humantime::parse_duration(&raw).unwrap_or(default),
        Err(_) => default,
    }
}

/// Split a comma-separated etcd endpoint list, rejecting `;` and `|`
/// separators and empty entries.
fn parse_endpoint_list(raw: &str) -> anyhow::Result<Vec<String>> {
    if raw.contains(';') || raw.contains('|') {
        bail!("invalid separator in etcd endpoints, use comma (,) to separate endpoints");
    }

    let endpoints: Vec<String> = raw.split(',').map(|e| e.trim().to_string()).collect();
    if endpoints.iter().any(|e| e.is_empty()) {
        bail!("empty etcd endpoint provided");
    }

    Ok(endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.server.port, DEFAULT_SERVER_PORT);
        assert_eq!(cfg.server.timeout.idle, Duration::from_secs(120));
        assert_eq!(cfg.storage.storage_type, StorageType::Etcd);
        assert_eq!(cfg.storage.etcd.endpoints, vec!["http://localhost:2379"]);
        assert!(!cfg.cache.enabled);
        assert_eq!(cfg.cache.size, 1000);
        assert!(!cfg.debug);
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("SHARED_LOCK_TEST_PORT", "not-a-port");
        assert_eq!(env_or("SHARED_LOCK_TEST_PORT", 8080u16), 8080);
        std::env::remove_var("SHARED_LOCK_TEST_PORT");
    }

    #[test]
    fn test_env_duration_parses_humantime() {
        std::env::set_var("SHARED_LOCK_TEST_TIMEOUT", "30s");
        assert_eq!(
            env_duration_or("SHARED_LOCK_TEST_TIMEOUT", Duration::from_secs(1)),
            Duration::from_secs(30)
        );
        std::env::remove_var("SHARED_LOCK_TEST_TIMEOUT");
    }

    #[test]
    fn test_endpoint_list_rejects_bad_separators() {
        assert!(parse_endpoint_list("http://a:2379;http://b:2379").is_err());
        assert!(parse_endpoint_list("http://a:2379|http://b:2379").is_err());
        assert!(parse_endpoint_list("http://a:2379,,http://b:2379").is_err());
    }

    #[test]
    fn test_endpoint_list_splits_on_comma() {
        let endpoints = parse_endpoint_list("http://a:2379, http://b:2379").unwrap();
        assert_eq!(endpoints, vec!["http://a:2379", "http://b:2379"]);
    }

    #[test]
    fn test_storage_type_from_str() {
        assert_eq!("etcd".parse::<StorageType>().unwrap(), StorageType::Etcd);
        assert_eq!("mock".parse::<StorageType>().unwrap(), StorageType::Mock);
        assert!("redis".parse::<StorageType>().is_err());
    }
}
