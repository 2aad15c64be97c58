//! Layered settings.
//!
//! Load order (later sources override earlier ones):
//! 1. built-in defaults
//! 2. `config/default.toml`
//! 3. `config/{ORDERQ_ENV}.toml`
//! 4. environment variables, `ORDERQ__` prefix and `__` separator
//!    (`ORDERQ__WORKER__CONCURRENCY=8` -> `worker.concurrency`)

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

use crate::domain::TaskType;
use crate::queue::{BrokerOptions, RetryPolicy, VisibilityPolicy};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] ConfigError),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval_ms: 200,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub visibility_timeout_ms: u64,
    /// Per task kind overrides of `visibility_timeout_ms`.
    pub visibility_timeouts_ms: HashMap<String, u64>,
    /// How long finished task records stay readable before they are dropped.
    pub retention_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 60_000,
            visibility_timeout_ms: 30_000,
            visibility_timeouts_ms: HashMap::new(),
            retention_secs: 3_600,
        }
    }
}

impl QueueConfig {
    pub fn broker_options(&self) -> BrokerOptions {
        let visibility = self.visibility_timeouts_ms.iter().fold(
            VisibilityPolicy::new(Duration::from_millis(self.visibility_timeout_ms)),
            |policy, (kind, ms)| {
                policy.with_timeout(TaskType::new(kind.as_str()), Duration::from_millis(*ms))
            },
        );
        BrokerOptions {
            max_attempts: self.max_attempts,
            retry: RetryPolicy::new(
                Duration::from_millis(self.backoff_base_ms),
                Duration::from_millis(self.backoff_cap_ms),
            ),
            visibility,
            retention: Duration::from_secs(self.retention_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrderConfig {
    /// How long a created order may stay unpaid before it is closed.
    pub hold_window_secs: u64,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            hold_window_secs: 30 * 60,
        }
    }
}

impl OrderConfig {
    pub fn hold_window(&self) -> Duration {
        Duration::from_secs(self.hold_window_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub partitions: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { partitions: 8 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// json (structured) or pretty (human readable)
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub worker: WorkerConfig,
    pub queue: QueueConfig,
    pub order: OrderConfig,
    pub relay: RelayConfig,
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Load from config files and environment variables.
    pub fn load() -> Result<Self, SettingsError> {
        let env = std::env::var("ORDERQ_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("ORDERQ_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
        let config_dir = Path::new(&config_dir);

        let settings: Self = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{env}.toml"))).required(false))
            .add_source(
                Environment::with_prefix("ORDERQ")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()
    }

    /// Parse a TOML document on top of the built-in defaults.
    pub fn from_toml_str(toml: &str) -> Result<Self, SettingsError> {
        let settings: Self = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        settings.validate()
    }

    fn validate(self) -> Result<Self, SettingsError> {
        if self.worker.concurrency == 0 {
            return Err(SettingsError::Invalid {
                key: "worker.concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.queue.max_attempts == 0 {
            return Err(SettingsError::Invalid {
                key: "queue.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.queue.backoff_base_ms > self.queue.backoff_cap_ms {
            return Err(SettingsError::Invalid {
                key: "queue.backoff_base_ms",
                reason: format!("exceeds backoff_cap_ms ({})", self.queue.backoff_cap_ms),
            });
        }
        if self.relay.partitions == 0 {
            return Err(SettingsError::Invalid {
                key: "relay.partitions",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let settings = Settings::from_toml_str("").unwrap();

        assert_eq!(settings.worker.concurrency, 4);
        assert_eq!(settings.queue.max_attempts, 5);
        assert_eq!(settings.queue.retention_secs, 3_600);
        assert_eq!(settings.order.hold_window(), Duration::from_secs(1800));
        assert_eq!(settings.relay.partitions, 8);
        assert_eq!(settings.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn sections_override_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            [worker]
            concurrency = 2

            [queue]
            max_attempts = 3
            backoff_base_ms = 10
            backoff_cap_ms = 100
            retention_secs = 120

            [queue.visibility_timeouts_ms]
            slow = 120000

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(settings.worker.concurrency, 2);
        assert_eq!(settings.worker.poll_interval_ms, 200);
        assert_eq!(settings.observability.log_format, LogFormat::Json);

        let options = settings.queue.broker_options();
        assert_eq!(options.max_attempts, 3);
        assert_eq!(options.retention, Duration::from_secs(120));
        assert_eq!(options.retry.next_delay(1), Duration::from_millis(10));
        assert_eq!(options.retry.next_delay(10), Duration::from_millis(100));
        assert_eq!(
            options.visibility.timeout_for(&TaskType::new("slow")),
            Duration::from_secs(120)
        );
        assert_eq!(
            options.visibility.timeout_for(&TaskType::new("other")),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = Settings::from_toml_str("[worker]\nconcurrency = 0").unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Invalid {
                key: "worker.concurrency",
                ..
            }
        ));
    }
}
