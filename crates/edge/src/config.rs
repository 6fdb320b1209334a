use std::{num::NonZeroUsize, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::{EdgeError, EdgeResult},
    live_edge::effective_live_edge,
    prefetch::PrefetchMode,
    retry::RetryPolicy,
};

/// Reloads are never scheduled closer together than this.
const MIN_RELOAD_INTERVAL: Duration = Duration::from_millis(500);

/// Session-wide options, fixed when the stream is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LiveConfig {
    /// Drop segments inside SCTE-35 ad breaks.
    pub ad_skip: bool,
    /// Halve the live edge, fetch announced segments early and forward bytes
    /// as they arrive.
    pub low_latency: bool,
    /// Number of trailing segments of the first playlist to start from.
    pub live_edge_depth: NonZeroUsize,
    /// Attempts per playlist reload before the session fails.
    pub max_reload_attempts: u32,
    /// First retry delay after a failed reload, in seconds.
    #[serde(with = "seconds")]
    pub reload_backoff: Duration,
    /// Upper bound of the reload interval, in seconds.
    #[serde(with = "seconds")]
    pub reload_ceiling: Duration,
    /// Attempts per confirmed segment before the session fails.
    pub segment_attempts: u32,
    /// Concurrent segment fetches. Defaults to the effective live edge.
    pub max_concurrency: Option<NonZeroUsize>,
    /// Identical reloads in a row treated as a finished stream. `0` disables.
    pub stall_threshold: u32,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            ad_skip: true,
            low_latency: false,
            live_edge_depth: NonZeroUsize::new(3).unwrap_or(NonZeroUsize::MIN),
            max_reload_attempts: 3,
            reload_backoff: Duration::from_secs(1),
            reload_ceiling: Duration::from_secs(6),
            segment_attempts: 3,
            max_concurrency: None,
            stall_threshold: 3,
        }
    }
}

impl LiveConfig {
    pub fn validate(&self) -> EdgeResult<()> {
        if self.max_reload_attempts == 0 {
            return Err(EdgeError::InvalidConfig(
                "max-reload-attempts must be at least 1".to_string(),
            ));
        }
        if self.segment_attempts == 0 {
            return Err(EdgeError::InvalidConfig(
                "segment-attempts must be at least 1".to_string(),
            ));
        }
        if self.reload_ceiling.is_zero() {
            return Err(EdgeError::InvalidConfig(
                "reload-ceiling must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn prefetch_mode(&self) -> PrefetchMode {
        if self.low_latency {
            PrefetchMode::LowLatency
        } else {
            PrefetchMode::Standard
        }
    }

    pub fn live_edge(&self) -> NonZeroUsize {
        effective_live_edge(self.live_edge_depth, self.low_latency)
    }

    pub fn concurrency(&self) -> NonZeroUsize {
        self.max_concurrency.unwrap_or_else(|| self.live_edge())
    }

    /// Delay between two playlist fetches for a playlist with `target_duration`.
    pub fn reload_interval(&self, target_duration: Duration) -> Duration {
        target_duration
            .min(self.reload_ceiling)
            .max(MIN_RELOAD_INTERVAL)
    }

    /// How long a failed speculative fetch waits for a reload to confirm its
    /// segment before it is dropped.
    pub(crate) fn confirmation_wait(&self) -> Duration {
        self.reload_ceiling * 2
    }

    pub(crate) fn reload_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_reload_attempts,
            base_delay: self.reload_backoff,
            max_delay: self.reload_ceiling.max(self.reload_backoff),
            jitter: true,
        }
    }

    pub(crate) fn segment_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.segment_attempts,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
            jitter: true,
        }
    }
}

mod seconds {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
