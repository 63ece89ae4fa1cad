//! HTTP client with tracing and error mapping.
//!
//! Wraps `reqwest` so every call is traced and every failure comes back as a
//! [`FetchError`] whose variant the classifier understands.

use reqwest::{Client, Response, header, header::HeaderMap};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::FetchError;

/// Default request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default user agent.
pub const USER_AGENT: &str = concat!("relayfetch/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// HTTP Client
// ============================================================================

/// HTTP client wrapper with tracing.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    timeout: Duration,
}

impl HttpClient {
    /// Creates a new HTTP client with default settings.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a new HTTP client with a custom timeout.
    ///
    /// Fails only when the TLS backend cannot be initialized.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let inner = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(FetchError::from_reqwest)?;
        Ok(Self { inner, timeout })
    }

    /// Configured request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Performs a GET request.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get(&self, url: &str) -> Result<Response, FetchError> {
        debug!("GET request");
        let response = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;
        debug!(status = %response.status(), "Response received");
        Ok(response)
    }

    /// Performs a GET request with custom headers and an optional per-call
    /// timeout.
    #[instrument(skip(self, headers), fields(url = %url))]
    pub async fn get_with_headers(
        &self,
        url: &str,
        headers: HeaderMap,
        timeout: Option<Duration>,
    ) -> Result<Response, FetchError> {
        debug!("GET request with headers");
        let mut request = self.inner.get(url).headers(headers);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await.map_err(FetchError::from_reqwest)?;
        debug!(status = %response.status(), "Response received");
        Ok(response)
    }

    /// Performs a PUT request without a body.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn put(&self, url: &str) -> Result<Response, FetchError> {
        debug!("PUT request");
        let response = self
            .inner
            .put(url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;
        debug!(status = %response.status(), "Response received");
        Ok(response)
    }

    /// Performs a DELETE request.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn delete(&self, url: &str) -> Result<Response, FetchError> {
        debug!("DELETE request");
        let response = self
            .inner
            .delete(url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;
        debug!(status = %response.status(), "Response received");
        Ok(response)
    }

    /// Performs a POST request with JSON body.
    #[instrument(skip(self, body), fields(url = %url))]
    pub async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<Response, FetchError> {
        debug!("POST request with JSON");
        let response = self
            .inner
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;
        debug!(status = %response.status(), "Response received");
        Ok(response)
    }
}

// ============================================================================
// Response Extensions
// ============================================================================

/// Extension trait for Response handling.
pub trait ResponseExt: Sized {
    /// Check if the response indicates rate limiting.
    fn is_rate_limited(&self) -> bool;

    /// Get the Retry-After header value in seconds.
    fn retry_after_secs(&self) -> Option<u64>;

    /// Turns a non-success status into [`FetchError::HttpStatus`].
    fn check_status(self) -> Result<Self, FetchError>;
}

impl ResponseExt for Response {
    fn is_rate_limited(&self) -> bool {
        self.status() == reqwest::StatusCode::TOO_MANY_REQUESTS
    }

    fn retry_after_secs(&self) -> Option<u64> {
        self.headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }

    fn check_status(self) -> Result<Self, FetchError> {
        if self.status().is_success() {
            Ok(self)
        } else {
            Err(FetchError::from_status(
                self.status().as_u16(),
                self.retry_after_secs(),
            ))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_check_status_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "120"))
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let response = client
            .get(&format!("{}/limited", server.uri()))
            .await
            .unwrap();
        assert!(response.is_rate_limited());

        let err = response.check_status().unwrap_err();
        assert_eq!(err.status_code(), Some(429));
        assert_eq!(err.retry_after(), Some(120));
    }

    #[tokio::test]
    async fn test_connection_refused_maps_to_transport_error() {
        let client = HttpClient::with_timeout(Duration::from_secs(2)).unwrap();
        // Port 9 (discard) is closed on test machines.
        let err = client.get("http://127.0.0.1:9/").await.unwrap_err();
        assert!(err.is_transport(), "unexpected error: {err}");
    }
}
