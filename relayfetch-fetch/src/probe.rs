//! Bounded reachability probes.
//!
//! Session-based backends talk to a long-lived local endpoint. Before the
//! first real call the pipeline probes that endpoint with a short timeout so
//! an absent browser costs seconds, not a full connection timeout.

use futures::future::join_all;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{BrowserError, FetchError};
use crate::host::http::HttpClient;

/// Default preflight bound.
pub const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of a probe check.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// Probed URL.
    pub url: String,
    /// Whether the probe succeeded.
    pub success: bool,
    /// Response time.
    pub response_time: Duration,
    /// Status code, if a response arrived.
    pub status_code: Option<u16>,
    /// Error message, if it failed.
    pub error: Option<String>,
}

impl ProbeResult {
    /// Converts a failed probe into a backend error.
    pub fn into_result(self) -> Result<(), FetchError> {
        if self.success {
            return Ok(());
        }
        let reason = self.error.unwrap_or_else(|| match self.status_code {
            Some(code) => format!("status {code}"),
            None => "no response".to_string(),
        });
        Err(BrowserError::Unreachable {
            endpoint: self.url,
            reason,
        }
        .into())
    }
}

/// A GET against an endpoint with a hard deadline.
#[derive(Debug, Clone)]
pub struct Probe {
    /// The URL to probe.
    pub url: String,
    /// Deadline for the whole probe.
    pub timeout: Duration,
}

impl Probe {
    /// Creates a probe with the default preflight bound.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: PREFLIGHT_TIMEOUT,
        }
    }

    /// Sets the deadline for this probe.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Executes the probe.
    pub async fn check(&self, client: &HttpClient) -> ProbeResult {
        let start = Instant::now();
        debug!(url = %self.url, timeout = ?self.timeout, "Running probe");

        let outcome = tokio::time::timeout(self.timeout, client.get(&self.url)).await;
        let response_time = start.elapsed();

        match outcome {
            Ok(Ok(response)) => ProbeResult {
                url: self.url.clone(),
                success: response.status().is_success(),
                response_time,
                status_code: Some(response.status().as_u16()),
                error: None,
            },
            Ok(Err(e)) => ProbeResult {
                url: self.url.clone(),
                success: false,
                response_time,
                status_code: None,
                error: Some(e.to_string()),
            },
            Err(_) => ProbeResult {
                url: self.url.clone(),
                success: false,
                response_time,
                status_code: None,
                error: Some(format!("no answer within {:?}", self.timeout)),
            },
        }
    }
}

/// Runs multiple probes concurrently.
pub async fn run_probes(probes: &[Probe], client: &HttpClient) -> Vec<ProbeResult> {
    join_all(probes.iter().map(|p| p.check(client))).await
}
