//! Runtime configuration, read from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use jobtrack_core::TransitionPolicy;
use jobtrack_infra::jobs::DEFAULT_FLUSH_INTERVAL;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_SNAPSHOT_PATH: &str = "data/jobs.json";
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
pub const DEFAULT_REDIS_KEY: &str = "jobtrack:jobs";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("JOBTRACK_STORE=redis requires the `redis` feature")]
    RedisFeatureDisabled,
}

/// Where job records are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Nothing survives a restart.
    Memory,
    /// JSON snapshot file.
    File { path: PathBuf },
    /// JSON snapshot under one redis key.
    #[cfg(feature = "redis")]
    Redis { url: String, key: String },
}

impl StoreBackend {
    pub fn name(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::File { .. } => "file",
            #[cfg(feature = "redis")]
            StoreBackend::Redis { .. } => "redis",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub store: StoreBackend,
    pub flush_interval: Duration,
    pub transitions: TransitionPolicy,
    /// Routes the store-clear endpoint.
    pub enable_admin: bool,
}

impl Default for AppConfig {
    /// In-memory, strict transitions, admin routes on. Used by tests.
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            store: StoreBackend::Memory,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            transitions: TransitionPolicy::Strict,
            enable_admin: true,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source (env in production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_raw = get("JOBTRACK_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .parse::<SocketAddr>()
            .map_err(|e| invalid("JOBTRACK_BIND_ADDR", &bind_raw, e))?;

        let store = match get("JOBTRACK_STORE").as_deref().unwrap_or("file") {
            "memory" => StoreBackend::Memory,
            "file" => StoreBackend::File {
                path: get("JOBTRACK_SNAPSHOT_PATH")
                    .unwrap_or_else(|| DEFAULT_SNAPSHOT_PATH.to_string())
                    .into(),
            },
            #[cfg(feature = "redis")]
            "redis" => StoreBackend::Redis {
                url: get("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
                key: get("JOBTRACK_REDIS_KEY").unwrap_or_else(|| DEFAULT_REDIS_KEY.to_string()),
            },
            #[cfg(not(feature = "redis"))]
            "redis" => return Err(ConfigError::RedisFeatureDisabled),
            other => {
                return Err(invalid(
                    "JOBTRACK_STORE",
                    other,
                    "expected memory, file or redis",
                ));
            }
        };

        let flush_interval = match get("JOBTRACK_FLUSH_INTERVAL_MS") {
            None => DEFAULT_FLUSH_INTERVAL,
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| invalid("JOBTRACK_FLUSH_INTERVAL_MS", &raw, e))?,
        };

        let transitions = match get("JOBTRACK_TRANSITIONS") {
            None => TransitionPolicy::default(),
            Some(raw) => raw
                .parse::<TransitionPolicy>()
                .map_err(|e| invalid("JOBTRACK_TRANSITIONS", &raw, e))?,
        };

        let enable_admin = match get("JOBTRACK_ENABLE_ADMIN") {
            None => false,
            Some(raw) => raw
                .to_ascii_lowercase()
                .parse::<bool>()
                .map_err(|e| invalid("JOBTRACK_ENABLE_ADMIN", &raw, e))?,
        };

        Ok(Self {
            bind_addr,
            store,
            flush_interval,
            transitions,
            enable_admin,
        })
    }
}

fn invalid(var: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(
            cfg.store,
            StoreBackend::File {
                path: DEFAULT_SNAPSHOT_PATH.into()
            }
        );
        assert_eq!(cfg.flush_interval, DEFAULT_FLUSH_INTERVAL);
        assert_eq!(cfg.transitions, TransitionPolicy::Strict);
        assert!(!cfg.enable_admin);
    }

    #[test]
    fn explicit_values_are_honoured() {
        let cfg = config(&[
            ("JOBTRACK_BIND_ADDR", "127.0.0.1:9000"),
            ("JOBTRACK_STORE", "memory"),
            ("JOBTRACK_FLUSH_INTERVAL_MS", "50"),
            ("JOBTRACK_TRANSITIONS", "permissive"),
            ("JOBTRACK_ENABLE_ADMIN", "TRUE"),
        ])
        .unwrap();

        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.store, StoreBackend::Memory);
        assert_eq!(cfg.flush_interval, Duration::from_millis(50));
        assert_eq!(cfg.transitions, TransitionPolicy::Permissive);
        assert!(cfg.enable_admin);
    }

    #[test]
    fn invalid_values_are_errors() {
        for (var, value) in [
            ("JOBTRACK_BIND_ADDR", "nowhere"),
            ("JOBTRACK_STORE", "sqlite"),
            ("JOBTRACK_FLUSH_INTERVAL_MS", "-1"),
            ("JOBTRACK_TRANSITIONS", "loose"),
            ("JOBTRACK_ENABLE_ADMIN", "maybe"),
        ] {
            match config(&[(var, value)]) {
                Err(ConfigError::Invalid { var: v, .. }) => assert_eq!(v, var),
                other => panic!("{var}={value}: expected invalid, got {other:?}"),
            }
        }
    }

    #[test]
    fn backend_names() {
        assert_eq!(StoreBackend::Memory.name(), "memory");
        assert_eq!(config(&[]).unwrap().store.name(), "file");
    }

    #[cfg(feature = "redis")]
    #[test]
    fn redis_backend_reads_url_and_key() {
        let cfg = config(&[
            ("JOBTRACK_STORE", "redis"),
            ("REDIS_URL", "redis://cache:6380"),
        ])
        .unwrap();
        assert_eq!(
            cfg.store,
            StoreBackend::Redis {
                url: "redis://cache:6380".into(),
                key: DEFAULT_REDIS_KEY.into(),
            }
        );
        assert_eq!(cfg.store.name(), "redis");
    }

    #[cfg(not(feature = "redis"))]
    #[test]
    fn redis_backend_requires_feature() {
        assert!(matches!(
            config(&[("JOBTRACK_STORE", "redis")]),
            Err(ConfigError::RedisFeatureDisabled)
        ));
    }
}
