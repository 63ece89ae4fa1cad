//! W3C WebDriver client.
//!
//! Sessions attach to an already-running browser through
//! `goog:chromeOptions.debuggerAddress`. Deleting such a session detaches the
//! driver and leaves the browser and its profile alone.

use reqwest::Response;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{BrowserError, FetchError};
use crate::host::http::HttpClient;
use crate::probe::Probe;

/// Default chromedriver endpoint.
pub const DEFAULT_WEBDRIVER_ENDPOINT: &str = "http://127.0.0.1:9515";

/// Client for a WebDriver server.
#[derive(Debug, Clone)]
pub struct WebDriverClient {
    endpoint: String,
    http: HttpClient,
}

impl WebDriverClient {
    /// Creates a client for the given driver endpoint.
    pub fn new(endpoint: impl Into<String>, http: HttpClient) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    /// The endpoint base URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Preflight probe against `/status`.
    pub fn probe(&self, timeout: Duration) -> Probe {
        Probe::new(format!("{}/status", self.endpoint)).with_timeout(timeout)
    }

    /// Creates a session attached to the browser at `debugger_address`
    /// (`host:port`). Returns the session id.
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn new_session(&self, debugger_address: &str) -> Result<String, FetchError> {
        let body = json!({
            "capabilities": {
                "alwaysMatch": {
                    "goog:chromeOptions": { "debuggerAddress": debugger_address }
                }
            }
        });
        let response = self
            .http
            .post_json(&format!("{}/session", self.endpoint), &body)
            .await
            .map_err(|e| BrowserError::Unreachable {
                endpoint: self.endpoint.clone(),
                reason: e.to_string(),
            })?;
        let value = webdriver_value(response).await?;
        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol("session reply without sessionId".to_string()))?;
        debug!(session = %id, "WebDriver session created");
        Ok(id.to_string())
    }

    /// Navigates the session to `url` and waits for the driver's page load.
    #[instrument(skip(self), fields(session = %session))]
    pub async fn navigate(&self, session: &str, url: &str) -> Result<(), FetchError> {
        let response = self
            .http
            .post_json(
                &format!("{}/session/{session}/url", self.endpoint),
                &json!({ "url": url }),
            )
            .await?;
        webdriver_value(response).await.map(|_| ())
    }

    /// Current page source.
    #[instrument(skip(self), fields(session = %session))]
    pub async fn page_source(&self, session: &str) -> Result<String, FetchError> {
        let response = self
            .http
            .get(&format!("{}/session/{session}/source", self.endpoint))
            .await?;
        match webdriver_value(response).await? {
            Value::String(source) => Ok(source),
            other => Err(BrowserError::Protocol(format!("page source was not a string: {other}")).into()),
        }
    }

    /// Deletes the session. Failures are logged, not returned.
    #[instrument(skip(self), fields(session = %session))]
    pub async fn delete_session(&self, session: &str) {
        let url = format!("{}/session/{session}", self.endpoint);
        match self.http.delete(&url).await {
            Ok(response) if response.status().is_success() => debug!("WebDriver session deleted"),
            Ok(response) => warn!(status = %response.status(), "WebDriver session delete refused"),
            Err(e) => warn!(error = %e, "WebDriver session delete failed"),
        }
    }
}

/// Unwraps the `value` member of a WebDriver reply.
///
/// Error replies carry `{ "value": { "error": ..., "message": ... } }`
/// whatever the HTTP status.
async fn webdriver_value(response: Response) -> Result<Value, FetchError> {
    let status = response.status();
    let body: Value = response.json().await.map_err(FetchError::from_reqwest)?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if let Some(error) = value.get("error").and_then(Value::as_str) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(BrowserError::WebDriver {
            error: error.to_string(),
            message,
        }
        .into());
    }
    if !status.is_success() {
        return Err(FetchError::from_status(status.as_u16(), None));
    }
    Ok(value)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client() -> (MockServer, WebDriverClient) {
        let server = MockServer::start().await;
        let client = WebDriverClient::new(server.uri(), HttpClient::new().unwrap());
        (server, client)
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (server, client) = client().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "sessionId": "S1", "capabilities": {} }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/S1/url"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/S1/source"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "value": "<html>ok</html>" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/session/S1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;

        let session = client.new_session("127.0.0.1:9222").await.unwrap();
        client.navigate(&session, "https://example.com").await.unwrap();
        assert_eq!(client.page_source(&session).await.unwrap(), "<html>ok</html>");
        client.delete_session(&session).await;
    }

    #[tokio::test]
    async fn test_driver_error_surfaces_message() {
        let (server, client) = client().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "value": {
                    "error": "session not created",
                    "message": "session not created: This version of ChromeDriver only supports Chrome version 114"
                }
            })))
            .mount(&server)
            .await;

        let err = client.new_session("127.0.0.1:9222").await.unwrap_err();
        match err {
            FetchError::Browser(BrowserError::WebDriver { error, message }) => {
                assert_eq!(error, "session not created");
                assert!(message.contains("only supports Chrome version"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
