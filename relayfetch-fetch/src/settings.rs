//! Pipeline settings.

use relayfetch_core::FetchContext;
use std::collections::HashMap;
use std::time::Duration;

use crate::block::BlockDetector;
use crate::config::FetchConfig;
use crate::probe::PREFLIGHT_TIMEOUT;
use crate::retry::BackoffPolicy;

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Knobs the orchestrator runs with.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Call timeout when nothing more specific applies.
    pub default_timeout: Duration,
    /// Per-backend call timeouts.
    pub backend_timeouts: HashMap<String, Duration>,
    /// Bound on session-backend preflight probes.
    pub preflight_timeout: Duration,
    /// Backoff ceilings.
    pub backoff: BackoffPolicy,
    /// Content inspection after successful calls.
    pub block_detector: BlockDetector,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_CALL_TIMEOUT,
            backend_timeouts: HashMap::new(),
            preflight_timeout: PREFLIGHT_TIMEOUT,
            backoff: BackoffPolicy::default(),
            block_detector: BlockDetector::default(),
        }
    }
}

impl PipelineSettings {
    /// Derives settings from the engine configuration.
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            default_timeout: config.default_timeout(),
            backend_timeouts: config
                .backend_timeouts_secs
                .iter()
                .map(|(name, secs)| (name.clone(), Duration::from_secs(*secs)))
                .collect(),
            preflight_timeout: config.preflight_timeout(),
            backoff: BackoffPolicy::new(
                Duration::from_secs(config.retry.rate_limit_ceiling_secs),
                Duration::from_secs(config.retry.max_wait_secs),
            ),
            block_detector: BlockDetector::new(config.min_content_bytes),
        }
    }

    /// Sets the default call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Sets the call timeout of one backend.
    pub fn with_backend_timeout(mut self, backend: impl Into<String>, timeout: Duration) -> Self {
        self.backend_timeouts.insert(backend.into(), timeout);
        self
    }

    /// Sets the preflight bound.
    pub fn with_preflight_timeout(mut self, timeout: Duration) -> Self {
        self.preflight_timeout = timeout;
        self
    }

    /// Sets the backoff policy.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the block detector.
    pub fn with_block_detector(mut self, detector: BlockDetector) -> Self {
        self.block_detector = detector;
        self
    }

    /// Timeout for one call: backend override, then request, then default.
    pub fn timeout_for(&self, backend: &str, ctx: &FetchContext) -> Duration {
        self.backend_timeouts
            .get(backend)
            .copied()
            .or(ctx.timeout)
            .unwrap_or(self.default_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_precedence() {
        let settings = PipelineSettings::default()
            .with_timeout(Duration::from_secs(10))
            .with_backend_timeout("cdp", Duration::from_secs(90));

        let plain = FetchContext::new("https://example.com");
        let timed = plain.clone().with_timeout(Duration::from_secs(5));

        assert_eq!(settings.timeout_for("http", &plain), Duration::from_secs(10));
        assert_eq!(settings.timeout_for("http", &timed), Duration::from_secs(5));
        assert_eq!(settings.timeout_for("cdp", &timed), Duration::from_secs(90));
    }

    #[test]
    fn test_from_config() {
        let mut config = FetchConfig::default();
        config.backend_timeouts_secs.insert("curl".to_string(), 12);
        config.preflight_timeout_ms = 750;
        config.retry.max_wait_secs = 30;

        let settings = PipelineSettings::from_config(&config);
        assert_eq!(settings.backend_timeouts["curl"], Duration::from_secs(12));
        assert_eq!(settings.preflight_timeout, Duration::from_millis(750));
        assert_eq!(settings.backoff.max_wait, Duration::from_secs(30));
    }
}
