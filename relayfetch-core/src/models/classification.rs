//! Failure taxonomy and classification verdicts.
//!
//! A classification is produced once per distinct failure, is immutable
//! afterwards, and may be cached and shared between requests.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ============================================================================
// Error Type
// ============================================================================

/// The failure taxonomy driving retry and fallback decisions.
///
/// Serializes under its display name, e.g. `"RATE_LIMIT"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    /// Will not succeed on this backend no matter how often it is retried.
    Permanent,
    /// Transient; retry with a short fixed wait.
    Temporary,
    /// Throttled; retry with a long, attempt-scaled wait.
    RateLimit,
    /// Secure-transport misconfiguration; switch backend instead of retrying.
    SslConfig,
    /// Unrecognized; retry conservatively.
    Unknown,
}

impl ErrorType {
    /// Returns the display name for this type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Permanent => "PERMANENT",
            Self::Temporary => "TEMPORARY",
            Self::RateLimit => "RATE_LIMIT",
            Self::SslConfig => "SSL_CONFIG",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ============================================================================
// Error Classification
// ============================================================================

/// Structured verdict for one failure.
///
/// Fields are private so that the constructors can uphold the invariant
/// `Permanent => !should_retry && max_retries == 0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorClassification {
    error_type: ErrorType,
    should_retry: bool,
    recommended_wait: Duration,
    max_retries: u32,
    fallback_method: Option<String>,
    reason: String,
    confidence: f64,
    cache_duration: Option<Duration>,
}

impl ErrorClassification {
    fn base(error_type: ErrorType, reason: impl Into<String>) -> Self {
        Self {
            error_type,
            should_retry: false,
            recommended_wait: Duration::ZERO,
            max_retries: 0,
            fallback_method: None,
            reason: reason.into(),
            confidence: 0.5,
            cache_duration: None,
        }
    }

    /// A failure that retrying cannot fix.
    pub fn permanent(reason: impl Into<String>) -> Self {
        Self {
            confidence: 0.9,
            ..Self::base(ErrorType::Permanent, reason)
        }
    }

    /// A transient failure, retried after `wait`.
    pub fn temporary(reason: impl Into<String>, wait: Duration, max_retries: u32) -> Self {
        Self {
            should_retry: true,
            recommended_wait: wait,
            max_retries,
            confidence: 0.9,
            ..Self::base(ErrorType::Temporary, reason)
        }
    }

    /// A throttling response, retried after an attempt-scaled `wait`.
    pub fn rate_limit(reason: impl Into<String>, wait: Duration, max_retries: u32) -> Self {
        Self {
            should_retry: true,
            recommended_wait: wait,
            max_retries,
            confidence: 0.95,
            ..Self::base(ErrorType::RateLimit, reason)
        }
    }

    /// A secure-transport failure; never retried on the same backend.
    pub fn ssl_config(reason: impl Into<String>) -> Self {
        Self {
            confidence: 0.95,
            ..Self::base(ErrorType::SslConfig, reason)
        }
    }

    /// An unrecognized failure.
    pub fn unknown(reason: impl Into<String>, wait: Duration, max_retries: u32) -> Self {
        Self {
            should_retry: max_retries > 0,
            recommended_wait: wait,
            max_retries,
            ..Self::base(ErrorType::Unknown, reason)
        }
    }

    /// Suggests a different backend to jump to.
    pub fn with_fallback(mut self, backend: impl Into<String>) -> Self {
        self.fallback_method = Some(backend.into());
        self
    }

    /// Sets the confidence, clamped to `[0, 1]`.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        self
    }

    /// Sets how long the verdict may be cached.
    pub fn with_cache_duration(mut self, duration: Duration) -> Self {
        self.cache_duration = Some(duration);
        self
    }

    /// Returns a copy that forbids retries and fallback jumps.
    ///
    /// The error type is kept, the reason is replaced.
    pub fn into_non_retryable(mut self, reason: impl Into<String>) -> Self {
        self.should_retry = false;
        self.max_retries = 0;
        self.recommended_wait = Duration::ZERO;
        self.fallback_method = None;
        self.reason = reason.into();
        self
    }

    /// The failure category.
    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    /// Whether the same backend may be tried again.
    pub fn should_retry(&self) -> bool {
        self.should_retry
    }

    /// Base wait before the next retry.
    pub fn recommended_wait(&self) -> Duration {
        self.recommended_wait
    }

    /// Maximum number of retries on the same backend.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Backend suggested as the next thing to try.
    pub fn fallback_method(&self) -> Option<&str> {
        self.fallback_method.as_deref()
    }

    /// Human-readable reason.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Confidence in `[0, 1]`.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// How long the verdict may be cached.
    pub fn cache_duration(&self) -> Option<Duration> {
        self.cache_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_never_retries() {
        let c = ErrorClassification::permanent("gone");
        assert_eq!(c.error_type(), ErrorType::Permanent);
        assert!(!c.should_retry());
        assert_eq!(c.max_retries(), 0);
    }

    #[test]
    fn test_confidence_clamped() {
        let c = ErrorClassification::permanent("x").with_confidence(1.7);
        assert!((c.confidence() - 1.0).abs() < f64::EPSILON);
        let c = ErrorClassification::permanent("x").with_confidence(-0.2);
        assert!(c.confidence().abs() < f64::EPSILON);
    }

    #[test]
    fn test_into_non_retryable() {
        let c = ErrorClassification::temporary("reset", Duration::from_secs(2), 3)
            .with_fallback("cdp")
            .into_non_retryable("driver/browser version mismatch");
        assert_eq!(c.error_type(), ErrorType::Temporary);
        assert!(!c.should_retry());
        assert_eq!(c.max_retries(), 0);
        assert!(c.fallback_method().is_none());
        assert_eq!(c.reason(), "driver/browser version mismatch");
    }

    #[test]
    fn test_error_type_display() {
        assert_eq!(ErrorType::SslConfig.to_string(), "SSL_CONFIG");
        assert_eq!(ErrorType::RateLimit.to_string(), "RATE_LIMIT");
    }

    #[test]
    fn test_error_type_serializes_as_display_name() {
        for t in [
            ErrorType::Permanent,
            ErrorType::Temporary,
            ErrorType::RateLimit,
            ErrorType::SslConfig,
            ErrorType::Unknown,
        ] {
            assert_eq!(serde_json::to_value(t).unwrap(), serde_json::json!(t.display_name()));
        }
        let parsed: ErrorType = serde_json::from_str("\"SSL_CONFIG\"").unwrap();
        assert_eq!(parsed, ErrorType::SslConfig);
    }
}
