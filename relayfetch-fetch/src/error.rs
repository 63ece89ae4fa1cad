//! Fetch error types.

use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;

use crate::classifier::mentions_tls;

// ============================================================================
// Main Fetch Error
// ============================================================================

/// Error type for a single backend call.
///
/// Variants are deliberately coarse: the classifier works on the variant
/// (is this a transport failure? is there a status code?) and on the
/// rendered message.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("HTTP {status} {reason}")]
    HttpStatus {
        /// Status code.
        status: u16,
        /// Canonical reason phrase.
        reason: String,
        /// `Retry-After` in seconds, if sent.
        retry_after: Option<u64>,
    },

    /// Secure-transport failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Host name could not be resolved.
    #[error("DNS resolution failed: {0}")]
    Dns(String),

    /// Connection refused, reset or unreachable.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// No answer within the call's deadline.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Other HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Content looked like an anti-bot interstitial.
    #[error("Content blocked: {0}")]
    Blocked(String),

    /// The backend returned something unusable.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Core error.
    #[error("Core error: {0}")]
    Core(#[from] relayfetch_core::CoreError),

    /// Process error.
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// Browser automation error.
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Strategy not available.
    #[error("Strategy not available: {0}")]
    StrategyNotAvailable(String),

    /// No backend registered under this name.
    #[error("unknown backend '{0}'")]
    UnknownBackend(String),
}

impl FetchError {
    /// Builds an error for a non-success HTTP status.
    pub fn from_status(status: u16, retry_after: Option<u64>) -> Self {
        let reason = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown Status")
            .to_string();
        Self::HttpStatus {
            status,
            reason,
            retry_after,
        }
    }

    /// Maps a `reqwest` error onto the transport variants.
    ///
    /// `reqwest` hides the interesting part (hyper, rustls, the resolver)
    /// in the source chain, so the whole chain is rendered and inspected.
    /// The request URL is stripped first; it is not part of the failure.
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return Self::from_status(status.as_u16(), None);
        }

        let error = error.without_url();
        let detail = error_chain(&error);
        let lower = detail.to_ascii_lowercase();

        if error.is_timeout() {
            return Self::Timeout(detail);
        }
        if ["dns error", "failed to lookup address", "name or service not known", "no such host"]
            .iter()
            .any(|p| lower.contains(p))
        {
            return Self::Dns(detail);
        }
        if mentions_tls(&lower) {
            return Self::Tls(detail);
        }
        if error.is_connect() {
            return Self::Connect(detail);
        }
        Self::Http(error)
    }

    /// Stable variant name, used as part of cache keys.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::HttpStatus { .. } => "HttpStatus",
            Self::Tls(_) => "Tls",
            Self::Dns(_) => "Dns",
            Self::Connect(_) => "Connect",
            Self::Timeout(_) => "Timeout",
            Self::Http(_) => "Http",
            Self::Blocked(_) => "Blocked",
            Self::InvalidResponse(_) => "InvalidResponse",
            Self::Json(_) => "Json",
            Self::Core(_) => "Core",
            Self::Process(_) => "Process",
            Self::Browser(_) => "Browser",
            Self::StrategyNotAvailable(_) => "StrategyNotAvailable",
            Self::UnknownBackend(_) => "UnknownBackend",
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// `Retry-After` seconds carried by the error, if any.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::HttpStatus { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// True for failures raised by the network stack itself.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Tls(_) | Self::Dns(_) | Self::Connect(_) | Self::Timeout(_) | Self::Http(_)
        )
    }
}

/// Renders an error and all its sources, joined by `": "`.
pub fn error_chain(error: &dyn StdError) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = cause.source();
    }
    out
}

// ============================================================================
// Process Error
// ============================================================================

/// Error type for process operations.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Command not found.
    #[error("Command not found: {0}")]
    NotFound(String),

    /// Command timed out.
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    /// Non-zero exit code.
    #[error("Command exited with code {code}: {stderr}")]
    NonZeroExit {
        /// Exit code from the process.
        code: i32,
        /// Standard error output.
        stderr: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Browser Error
// ============================================================================

/// Error type for browser automation.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The debug or driver endpoint did not answer.
    #[error("Endpoint {endpoint} unreachable: {reason}")]
    Unreachable {
        /// Endpoint URL.
        endpoint: String,
        /// Underlying failure.
        reason: String,
    },

    /// DevTools protocol returned an error or an unexpected message.
    #[error("DevTools protocol error: {0}")]
    Protocol(String),

    /// WebDriver returned an error payload.
    #[error("WebDriver error ({error}): {message}")]
    WebDriver {
        /// W3C error code, e.g. `session not created`.
        error: String,
        /// Driver message.
        message: String,
    },

    /// Websocket transport failure.
    #[error("Websocket error: {0}")]
    Websocket(String),

    /// The page did not finish loading in time.
    #[error("Page load did not complete within {0:?}")]
    LoadTimeout(Duration),
}

// ============================================================================
// Registry Error
// ============================================================================

/// Error type for strategy registration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A strategy with this name is already registered.
    #[error("Strategy already registered: {0}")]
    Duplicate(String),

    /// Base priority collides with the domain-override tier.
    #[error("Strategy {name} has priority {priority}, must be below {max}")]
    PriorityOutOfRange {
        /// Strategy name.
        name: String,
        /// Requested base priority.
        priority: u32,
        /// Exclusive upper bound.
        max: u32,
    },
}

// ============================================================================
// Config Error
// ============================================================================

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An environment override could not be parsed.
    #[error("Invalid value for {key}: {value}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_message() {
        let err = FetchError::from_status(404, None);
        assert_eq!(err.to_string(), "HTTP 404 Not Found");
        assert_eq!(err.status_code(), Some(404));
        assert_eq!(err.kind_name(), "HttpStatus");
        assert!(!err.is_transport());
    }

    #[test]
    fn test_transport_variants() {
        assert!(FetchError::Tls("x".into()).is_transport());
        assert!(FetchError::Timeout("x".into()).is_transport());
        assert!(!FetchError::Blocked("x".into()).is_transport());
    }

    #[test]
    fn test_error_chain_renders_sources() {
        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer reset");
        let outer = ProcessError::Io(inner);
        let chain = error_chain(&outer);
        assert!(chain.contains("peer reset"));
    }
}
