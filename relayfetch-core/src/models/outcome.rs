//! Attempt records, fetched content and the aggregated outcome.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use super::classification::ErrorType;

// ============================================================================
// Capability
// ============================================================================

/// Something a backend is able to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Executes page JavaScript before returning content.
    JavaScript,
    /// Follows HTTP redirects.
    Redirects,
    /// Honours a custom user agent.
    CustomUserAgent,
    /// Uses a TLS stack independent of the in-process client.
    AlternateTls,
    /// Reuses cookies and login state of a long-lived browser session.
    SharedSession,
    /// Cheap enough to be the first thing tried.
    Fast,
}

impl Capability {
    /// Returns the wire name of this capability.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::Redirects => "redirects",
            Self::CustomUserAgent => "custom_user_agent",
            Self::AlternateTls => "alternate_tls",
            Self::SharedSession => "shared_session",
            Self::Fast => "fast",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Fetched Content
// ============================================================================

/// Opaque content handle returned by a backend.
///
/// The engine never parses the body. It only looks at its size, and at the
/// leading bytes when checking for anti-bot interstitials.
#[derive(Debug, Clone)]
pub struct FetchedContent {
    /// Raw body.
    pub body: Bytes,
    /// Content type reported by the backend.
    pub content_type: Option<String>,
    /// URL after redirects, if known.
    pub final_url: Option<String>,
    /// HTTP status, if the backend saw one.
    pub status: Option<u16>,
    /// Name of the backend that produced the content.
    pub source: String,
}

impl FetchedContent {
    /// Creates content from a body and its producing backend.
    pub fn new(body: impl Into<Bytes>, source: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: None,
            final_url: None,
            status: None,
            source: source.into(),
        }
    }

    /// Sets the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets the final URL.
    pub fn with_final_url(mut self, url: impl Into<String>) -> Self {
        self.final_url = Some(url.into());
        self
    }

    /// Sets the HTTP status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Body length in bytes.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Returns true if the body is empty.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Body decoded as UTF-8, lossily.
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

// ============================================================================
// Fetch Attempt
// ============================================================================

/// Which phase of a backend an attempt record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStage {
    /// Bounded reachability probe before any real work.
    Preflight,
    /// An actual fetch call.
    Fetch,
}

/// Record of a single backend call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchAttempt {
    /// Backend name.
    pub backend: String,
    /// Zero-based attempt index within this backend.
    pub attempt: u32,
    /// Preflight or fetch.
    pub stage: AttemptStage,
    /// Whether the call succeeded.
    pub success: bool,
    /// Error text if it failed.
    pub error: Option<String>,
    /// Classification of the failure.
    pub error_type: Option<ErrorType>,
    /// How long the call took.
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    /// Backoff scheduled after this failure, if the backend is retried.
    #[serde(default, with = "option_duration_ms")]
    pub wait_after: Option<Duration>,
    /// Body size on success.
    pub content_bytes: Option<usize>,
}

impl FetchAttempt {
    /// Creates a successful fetch record.
    pub fn success(
        backend: impl Into<String>,
        attempt: u32,
        duration: Duration,
        content_bytes: usize,
    ) -> Self {
        Self {
            backend: backend.into(),
            attempt,
            stage: AttemptStage::Fetch,
            success: true,
            error: None,
            error_type: None,
            duration,
            wait_after: None,
            content_bytes: Some(content_bytes),
        }
    }

    /// Creates a failed fetch record.
    pub fn failure(
        backend: impl Into<String>,
        attempt: u32,
        error: impl Into<String>,
        error_type: ErrorType,
        duration: Duration,
    ) -> Self {
        Self {
            backend: backend.into(),
            attempt,
            stage: AttemptStage::Fetch,
            success: false,
            error: Some(error.into()),
            error_type: Some(error_type),
            duration,
            wait_after: None,
            content_bytes: None,
        }
    }

    /// Creates a failed preflight record.
    pub fn preflight_failure(
        backend: impl Into<String>,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            backend: backend.into(),
            attempt: 0,
            stage: AttemptStage::Preflight,
            success: false,
            error: Some(error.into()),
            error_type: None,
            duration,
            wait_after: None,
            content_bytes: None,
        }
    }

    /// Records the backoff that follows this failure.
    pub fn with_wait_after(mut self, wait: Duration) -> Self {
        self.wait_after = Some(wait);
        self
    }

    /// Returns true for actual fetch calls.
    pub fn is_fetch(&self) -> bool {
        self.stage == AttemptStage::Fetch
    }
}

// ============================================================================
// Fetch Outcome
// ============================================================================

/// Aggregated result of one fetch request.
///
/// Individual failures never cross the API boundary on their own; they are
/// folded into `attempts` and `metadata`.
#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    /// Whether content was obtained.
    pub success: bool,
    /// The content, on success.
    #[serde(skip)]
    pub content: Option<FetchedContent>,
    /// Backend that produced the content.
    pub backend_used: Option<String>,
    /// Every attempt made, in order.
    pub attempts: Vec<FetchAttempt>,
    /// Number of fetch calls (preflight probes excluded).
    pub total_attempts: usize,
    /// Wall time of the whole request.
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    /// Human-readable failure message.
    pub error_message: Option<String>,
    /// Diagnostics: backends tried, overrides, per-attempt errors.
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// When the request finished.
    pub finished_at: DateTime<Utc>,
}

impl FetchOutcome {
    /// Creates a successful outcome.
    pub fn success(
        content: FetchedContent,
        attempts: Vec<FetchAttempt>,
        duration: Duration,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        let total_attempts = count_fetches(&attempts);
        Self {
            success: true,
            backend_used: Some(content.source.clone()),
            content: Some(content),
            attempts,
            total_attempts,
            duration,
            error_message: None,
            metadata,
            finished_at: Utc::now(),
        }
    }

    /// Creates a failed outcome.
    pub fn failure(
        message: impl Into<String>,
        attempts: Vec<FetchAttempt>,
        duration: Duration,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        let total_attempts = count_fetches(&attempts);
        Self {
            success: false,
            content: None,
            backend_used: None,
            attempts,
            total_attempts,
            duration,
            error_message: Some(message.into()),
            metadata,
            finished_at: Utc::now(),
        }
    }

    /// Returns true if the fetch succeeded.
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Number of fetch attempts made against one backend.
    pub fn attempts_for(&self, backend: &str) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.is_fetch() && a.backend == backend)
            .count()
    }

    /// Returns all errors that occurred.
    pub fn errors(&self) -> Vec<&str> {
        self.attempts
            .iter()
            .filter_map(|a| a.error.as_deref())
            .collect()
    }
}

fn count_fetches(attempts: &[FetchAttempt]) -> usize {
    attempts.iter().filter(|a| a.is_fetch()).count()
}

// ============================================================================
// Serde helpers
// ============================================================================

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_attempts_excludes_preflight() {
        let attempts = vec![
            FetchAttempt::preflight_failure("cdp", "unreachable", Duration::from_secs(2)),
            FetchAttempt::failure(
                "http",
                0,
                "HTTP 404 Not Found",
                ErrorType::Permanent,
                Duration::from_millis(30),
            ),
        ];
        let outcome =
            FetchOutcome::failure("gone", attempts, Duration::from_secs(2), BTreeMap::new());

        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(outcome.total_attempts, 1);
        assert_eq!(outcome.attempts_for("http"), 1);
        assert_eq!(outcome.attempts_for("cdp"), 0);
    }

    #[test]
    fn test_success_uses_content_source() {
        let content = FetchedContent::new("<html></html>", "curl").with_status(200);
        let outcome = FetchOutcome::success(
            content,
            vec![FetchAttempt::success("curl", 0, Duration::from_millis(5), 13)],
            Duration::from_millis(5),
            BTreeMap::new(),
        );
        assert_eq!(outcome.backend_used.as_deref(), Some("curl"));
        assert!(outcome.error_message.is_none());
    }

    #[test]
    fn test_capability_names() {
        assert_eq!(Capability::JavaScript.as_str(), "javascript");
        assert_eq!(Capability::SharedSession.to_string(), "shared_session");
    }
}
