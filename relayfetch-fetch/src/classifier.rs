//! Failure classification.
//!
//! [`ErrorClassifier::classify`] maps a backend failure plus the request URL
//! to an [`ErrorClassification`]. It is pure and total: the same input always
//! yields the same verdict, and unrecognized input yields `Unknown`.
//!
//! Checks run in a fixed order and the first match wins:
//!
//! 1. HTTP status code
//! 2. Anti-bot block signal
//! 3. Secure-transport signatures (transport errors only)
//! 4. Connectivity signatures (transport errors only)
//! 5. Name resolution failure
//! 6. Free-text groups: SSL, permanent, rate limit, temporary
//! 7. Unknown

use regex::RegexSet;
use relayfetch_core::ErrorClassification;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::FetchError;

/// Backend suggested when a browser is more likely to get through.
pub const BROWSER_FALLBACK: &str = "cdp";

const PERMANENT_STATUS_CACHE: Duration = Duration::from_secs(3600);
const RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);
const RATE_LIMIT_WAIT_MAX: Duration = Duration::from_secs(600);
const RATE_LIMIT_RETRIES: u32 = 3;
const SERVER_ERROR_WAIT: Duration = Duration::from_secs(5);
const SERVER_ERROR_RETRIES: u32 = 2;
const CONNECT_WAIT: Duration = Duration::from_secs(2);
const CONNECT_RETRIES: u32 = 3;
const DNS_CACHE: Duration = Duration::from_secs(600);
const TLS_CACHE: Duration = Duration::from_secs(1800);
const CERT_CACHE: Duration = Duration::from_secs(7200);
const BLOCK_CACHE: Duration = Duration::from_secs(900);
const UNKNOWN_WAIT: Duration = Duration::from_secs(3);
const UNKNOWN_RETRIES: u32 = 2;

/// Secure-transport wording, anchored on word boundaries. Only consulted for
/// errors whose text no longer carries the request URL.
const TLS_PATTERNS: &[&str] = &[
    r"\b(ssl|tls)(v\d)?\b",
    r"\bhandshake",
    r"\bcipher",
    r"\bcertificate",
    r"wrong version number",
    r"unsupported protocol",
    r"alert protocol version",
    r"unexpected eof while reading",
    r"unrecognized name",
    r"peer sent no certificates",
    r"received fatal alert",
    r"invalidcontenttype",
];

const CERTIFICATE_SIGNATURES: &[&str] = &[
    "certificate has expired",
    "certificate expired",
    "certificate verify failed",
    "unable to get local issuer certificate",
    "self signed certificate",
    "self-signed certificate",
    "unknownissuer",
    "certificate is not valid for",
    "notvalidforname",
    "ssl certificate problem",
    "invalid peer certificate",
];

const CONNECTIVITY_SIGNATURES: &[&str] = &[
    "connection reset",
    "connection refused",
    "connection aborted",
    "broken pipe",
    "timed out",
    "timeout",
    "network is unreachable",
    "host is unreachable",
    "no route to host",
    "connection closed before message completed",
    "couldn't connect",
    "failed to connect",
];

const DNS_SIGNATURES: &[&str] = &[
    "dns error",
    "dns resolution failed",
    "failed to lookup address",
    "name or service not known",
    "nodename nor servname",
    "could not resolve host",
    "no such host",
    "temporary failure in name resolution",
    "getaddrinfo",
];

/// Free-text groups, tried in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextGroup {
    SslConfig,
    Permanent,
    RateLimit,
    Temporary,
}

const TEXT_GROUPS: &[(TextGroup, &[&str])] = &[
    (
        TextGroup::SslConfig,
        &[
            r"\b(ssl|tls)(v\d)?\b",
            r"\bcertificate",
            r"\bhandshake",
            r"\bcipher",
        ],
    ),
    (
        TextGroup::Permanent,
        &[
            r"\b(401|403|404|405|410)\b",
            r"not found",
            r"forbidden",
            r"unauthori[sz]ed",
            r"access denied",
            r"method not allowed",
            r"\bgone\b",
            r"invalid url",
            r"unsupported (url|scheme)",
            r"command not found",
        ],
    ),
    (
        TextGroup::RateLimit,
        &[
            r"\b429\b",
            r"rate[- ]?limit",
            r"too many requests",
            r"throttl",
            r"quota exceeded",
            r"slow down",
        ],
    ),
    (
        TextGroup::Temporary,
        &[
            r"\b5\d\d\b",
            r"temporar(y|ily)",
            r"unavailable",
            r"try again",
            r"timed? ?out",
            r"reset",
            r"refused",
            r"eof",
            r"interrupted",
            r"websocket",
        ],
    ),
];

fn text_groups() -> &'static [(TextGroup, RegexSet)] {
    static COMPILED: OnceLock<Vec<(TextGroup, RegexSet)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        TEXT_GROUPS
            .iter()
            .filter_map(|(group, patterns)| {
                let patterns = patterns.iter().map(|p| format!("(?i){p}"));
                // Patterns are literals above; a failure here is a typo caught by tests.
                RegexSet::new(patterns).ok().map(|set| (*group, set))
            })
            .collect()
    })
}

fn tls_patterns() -> &'static RegexSet {
    static COMPILED: OnceLock<RegexSet> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RegexSet::new(TLS_PATTERNS.iter().map(|p| format!("(?i){p}")))
            .unwrap_or_else(|_| RegexSet::empty())
    })
}

/// Returns true if an error text describes a secure-transport failure,
/// including certificate problems.
pub fn mentions_tls(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    tls_patterns().is_match(&lower)
        || contains_any(&lower, CERTIFICATE_SIGNATURES)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

// ============================================================================
// Error Classifier
// ============================================================================

/// Deterministic failure classifier.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    browser_fallback: String,
}

impl ErrorClassifier {
    /// Creates a classifier suggesting the default browser backend.
    pub fn new() -> Self {
        Self::with_browser_fallback(BROWSER_FALLBACK)
    }

    /// Creates a classifier suggesting a specific browser backend.
    pub fn with_browser_fallback(backend: impl Into<String>) -> Self {
        Self {
            browser_fallback: backend.into(),
        }
    }

    /// Classifies a failure. Never panics.
    pub fn classify(&self, error: &FetchError, url: &str) -> ErrorClassification {
        let message = error.to_string();
        let lower = message.to_ascii_lowercase();

        if let Some(status) = error.status_code() {
            return self.classify_status(status, error.retry_after(), url);
        }

        if let FetchError::Blocked(signal) = error {
            return ErrorClassification::permanent(format!("Blocked by anti-bot page: {signal}"))
                .with_fallback(&self.browser_fallback)
                .with_confidence(0.85)
                .with_cache_duration(BLOCK_CACHE);
        }

        if error.is_transport() {
            // Only the unsorted client error is sorted by its text; the
            // other transport variants were already decided structurally.
            let by_text = matches!(error, FetchError::Tls(_) | FetchError::Http(_));
            if by_text && contains_any(&lower, CERTIFICATE_SIGNATURES) {
                return ErrorClassification::permanent(format!("Invalid certificate: {message}"))
                    .with_fallback(&self.browser_fallback)
                    .with_confidence(0.95)
                    .with_cache_duration(CERT_CACHE);
            }
            if matches!(error, FetchError::Tls(_))
                || (matches!(error, FetchError::Http(_)) && tls_patterns().is_match(&lower))
            {
                return ErrorClassification::ssl_config(format!("TLS failure: {message}"))
                    .with_fallback(&self.browser_fallback)
                    .with_confidence(0.95)
                    .with_cache_duration(TLS_CACHE);
            }
            if matches!(error, FetchError::Connect(_) | FetchError::Timeout(_))
                || contains_any(&lower, CONNECTIVITY_SIGNATURES)
            {
                return ErrorClassification::temporary(
                    format!("Connectivity failure: {message}"),
                    CONNECT_WAIT,
                    CONNECT_RETRIES,
                )
                .with_confidence(0.9);
            }
        }

        if matches!(error, FetchError::Dns(_)) || contains_any(&lower, DNS_SIGNATURES) {
            return ErrorClassification::permanent(format!("Name resolution failed: {message}"))
                .with_confidence(0.9)
                .with_cache_duration(DNS_CACHE);
        }

        if let Some(group) = Self::match_text(&message) {
            return self.classify_text(group, &message);
        }

        ErrorClassification::unknown(
            format!("Unclassified failure: {message}"),
            UNKNOWN_WAIT,
            UNKNOWN_RETRIES,
        )
        .with_confidence(0.5)
    }

    fn classify_status(&self, status: u16, retry_after: Option<u64>, url: &str) -> ErrorClassification {
        let reason = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("");
        let label = format!("HTTP {status} {reason}").trim_end().to_string();

        match status {
            401 | 403 | 404 | 405 | 410 => {
                ErrorClassification::permanent(format!("{label} for {url}"))
                    .with_confidence(0.95)
                    .with_cache_duration(PERMANENT_STATUS_CACHE)
            }
            429 => {
                let wait = retry_after
                    .map(Duration::from_secs)
                    .map_or(RATE_LIMIT_WAIT, |w| w.clamp(RATE_LIMIT_WAIT, RATE_LIMIT_WAIT_MAX));
                ErrorClassification::rate_limit(label, wait, RATE_LIMIT_RETRIES)
                    .with_confidence(0.95)
            }
            503 | 504 => ErrorClassification::temporary(
                format!("{label}: server overloaded or starting"),
                SERVER_ERROR_WAIT,
                SERVER_ERROR_RETRIES,
            )
            .with_fallback(&self.browser_fallback)
            .with_confidence(0.9),
            500..=599 => {
                ErrorClassification::temporary(label, SERVER_ERROR_WAIT, SERVER_ERROR_RETRIES)
                    .with_confidence(0.9)
            }
            _ => ErrorClassification::unknown(label, UNKNOWN_WAIT, 1).with_confidence(0.6),
        }
    }

    fn match_text(message: &str) -> Option<TextGroup> {
        text_groups()
            .iter()
            .find(|(_, set)| set.is_match(message))
            .map(|(group, _)| *group)
    }

    fn classify_text(&self, group: TextGroup, message: &str) -> ErrorClassification {
        match group {
            TextGroup::SslConfig => ErrorClassification::ssl_config(format!("TLS failure: {message}"))
                .with_fallback(&self.browser_fallback)
                .with_confidence(0.85)
                .with_cache_duration(TLS_CACHE),
            TextGroup::Permanent => ErrorClassification::permanent(message)
                .with_confidence(0.85)
                .with_cache_duration(PERMANENT_STATUS_CACHE),
            TextGroup::RateLimit => {
                ErrorClassification::rate_limit(message, RATE_LIMIT_WAIT, RATE_LIMIT_RETRIES)
                    .with_confidence(0.85)
            }
            TextGroup::Temporary => {
                ErrorClassification::temporary(message, SERVER_ERROR_WAIT, SERVER_ERROR_RETRIES)
                    .with_confidence(0.8)
            }
        }
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
