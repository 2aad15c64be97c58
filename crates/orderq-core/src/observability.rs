//! Logging initialisation and queue counts.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, ObservabilityConfig};

/// Tasks per broker state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub in_flight: usize,
    pub retry_scheduled: usize,
    pub acked: usize,
    pub dead_lettered: usize,
    pub cancelled: usize,
}

impl QueueCounts {
    /// Tasks that may still be delivered.
    pub fn outstanding(&self) -> usize {
        self.pending + self.in_flight + self.retry_scheduled
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Returns an error if a subscriber
/// is already installed.
pub fn init_tracing(
    config: &ObservabilityConfig,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().with_target(true).with_ansi(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outstanding_ignores_terminal_states() {
        let counts = QueueCounts {
            pending: 1,
            in_flight: 2,
            retry_scheduled: 3,
            acked: 10,
            dead_lettered: 1,
            cancelled: 4,
        };
        assert_eq!(counts.outstanding(), 6);
    }
}
