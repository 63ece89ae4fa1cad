//! Chromium DevTools endpoint client.
//!
//! Attaches to a browser that is already running with
//! `--remote-debugging-port`. Tabs are opened and closed through the HTTP
//! endpoint; page state is read over the tab's websocket. The browser
//! process itself is never touched.

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, instrument, trace, warn};

use crate::error::{BrowserError, FetchError};
use crate::host::http::{HttpClient, ResponseExt};
use crate::probe::Probe;

/// Default DevTools endpoint.
pub const DEFAULT_DEVTOOLS_ENDPOINT: &str = "http://127.0.0.1:9222";

/// How often `document.readyState` is polled.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Grace period for the websocket close handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// Endpoint Types
// ============================================================================

/// `/json/version` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserVersion {
    /// Browser product string, e.g. `Chrome/124.0.6367.60`.
    #[serde(rename = "Browser")]
    pub browser: String,
    /// DevTools protocol version.
    #[serde(rename = "Protocol-Version", default)]
    pub protocol_version: String,
    /// Browser-level websocket.
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub websocket_url: Option<String>,
}

/// A tab as listed by `/json/new`.
#[derive(Debug, Clone, Deserialize)]
pub struct TabInfo {
    /// Target id.
    pub id: String,
    /// Tab websocket.
    #[serde(rename = "webSocketDebuggerUrl")]
    pub websocket_url: String,
    /// Current URL.
    #[serde(default)]
    pub url: String,
}

// ============================================================================
// DevTools Client
// ============================================================================

/// Client for a DevTools debug endpoint.
#[derive(Debug, Clone)]
pub struct DevToolsClient {
    endpoint: String,
    http: HttpClient,
}

impl DevToolsClient {
    /// Creates a client for the given endpoint.
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

    /// `host:port` of the endpoint, as WebDriver's `debuggerAddress` wants it.
    pub fn debugger_address(&self) -> String {
        let without_scheme = self
            .endpoint
            .split_once("://")
            .map_or(self.endpoint.as_str(), |(_, rest)| rest);
        without_scheme
            .split('/')
            .next()
            .unwrap_or(without_scheme)
            .to_string()
    }

    /// Preflight probe against `/json/version`.
    pub fn probe(&self, timeout: Duration) -> Probe {
        Probe::new(format!("{}/json/version", self.endpoint)).with_timeout(timeout)
    }

    /// Runs the preflight probe and turns a failure into an error.
    pub async fn preflight(&self, timeout: Duration) -> Result<(), FetchError> {
        self.probe(timeout).check(&self.http).await.into_result()
    }

    /// Reads `/json/version`.
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn version(&self) -> Result<BrowserVersion, FetchError> {
        let response = self
            .http
            .get(&format!("{}/json/version", self.endpoint))
            .await
            .map_err(|e| self.unreachable(&e))?
            .check_status()?;
        response.json().await.map_err(FetchError::from_reqwest)
    }

    /// Opens a new tab on `url`. The target travels percent-encoded so its
    /// own query and fragment survive.
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn open_tab(&self, url: &str) -> Result<TabInfo, FetchError> {
        let target: String = url::form_urlencoded::byte_serialize(url.as_bytes()).collect();
        let response = self
            .http
            .put(&format!("{}/json/new?{target}", self.endpoint))
            .await
            .map_err(|e| self.unreachable(&e))?
            .check_status()?;
        let tab: TabInfo = response.json().await.map_err(FetchError::from_reqwest)?;
        debug!(tab = %tab.id, "Opened tab");
        Ok(tab)
    }

    /// Closes one tab. The browser keeps running.
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn close_tab(&self, id: &str) -> Result<(), FetchError> {
        self.http
            .get(&format!("{}/json/close/{id}", self.endpoint))
            .await?
            .check_status()?;
        debug!(tab = %id, "Closed tab");
        Ok(())
    }

    /// Waits for the tab to finish loading and returns its HTML.
    ///
    /// The whole call, every protocol round trip included, finishes within
    /// `budget`. `document.readyState` is polled for the first three
    /// quarters of it; after that whatever the page holds is read.
    #[instrument(skip(self, tab), fields(tab = %tab.id))]
    pub async fn page_html(&self, tab: &TabInfo, budget: Duration) -> Result<String, FetchError> {
        let started = Instant::now();
        let deadline = started + budget;
        let ready_by = started + budget * 3 / 4;

        let connect = PageSession::connect(&tab.websocket_url, deadline);
        let mut session = tokio::time::timeout_at(deadline, connect)
            .await
            .map_err(|_| BrowserError::LoadTimeout(budget))??;

        loop {
            let state = session.evaluate("document.readyState").await?;
            trace!(state = ?state, "Ready state");
            if state.as_str() == Some("complete") {
                break;
            }
            if Instant::now() + READY_POLL_INTERVAL >= ready_by {
                warn!(budget = ?budget, "Page still loading, reading partial document");
                break;
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }

        let html = session
            .evaluate("document.documentElement.outerHTML")
            .await?;
        session.close().await;

        match html {
            Value::String(s) => Ok(s),
            other => Err(BrowserError::Protocol(format!("outerHTML was not a string: {other}")).into()),
        }
    }

    fn unreachable(&self, error: &FetchError) -> FetchError {
        BrowserError::Unreachable {
            endpoint: self.endpoint.clone(),
            reason: error.to_string(),
        }
        .into()
    }
}

// ============================================================================
// Page Session
// ============================================================================

/// Websocket session to one tab.
struct PageSession {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
    /// Calls still waiting for a reply at this instant fail.
    deadline: Instant,
}

impl PageSession {
    async fn connect(ws_url: &str, deadline: Instant) -> Result<Self, FetchError> {
        let (socket, _) = connect_async(ws_url)
            .await
            .map_err(|e| BrowserError::Websocket(e.to_string()))?;
        Ok(Self {
            socket,
            next_id: 1,
            deadline,
        })
    }

    /// Runs `Runtime.evaluate` and returns the by-value result.
    async fn evaluate(&mut self, expression: &str) -> Result<Value, FetchError> {
        let result = self
            .call(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": true }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            return Err(BrowserError::Protocol(format!("evaluation threw: {details}")).into());
        }
        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Sends one command and waits for its reply, bounded by the session
    /// deadline.
    async fn call(&mut self, method: &str, params: Value) -> Result<Value, FetchError> {
        let deadline = self.deadline;
        let budget = deadline.saturating_duration_since(Instant::now());
        tokio::time::timeout_at(deadline, self.round_trip(method, params))
            .await
            .map_err(|_| {
                warn!(method, "No DevTools reply before the deadline");
                BrowserError::LoadTimeout(budget)
            })?
    }

    /// Sends one command and waits for its reply, skipping events.
    async fn round_trip(&mut self, method: &str, params: Value) -> Result<Value, FetchError> {
        let id = self.next_id;
        self.next_id += 1;

        let request = json!({ "id": id, "method": method, "params": params });
        self.socket
            .send(Message::Text(request.to_string()))
            .await
            .map_err(|e| BrowserError::Websocket(e.to_string()))?;

        while let Some(message) = self.socket.next().await {
            let message = message.map_err(|e| BrowserError::Websocket(e.to_string()))?;
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let reply: Value = serde_json::from_str(&text)?;
            if reply.get("id").and_then(Value::as_u64) != Some(id) {
                continue;
            }
            if let Some(error) = reply.get("error") {
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                return Err(BrowserError::Protocol(format!("{method}: {message}")).into());
            }
            return Ok(reply.get("result").cloned().unwrap_or(Value::Null));
        }

        Err(BrowserError::Websocket(format!("socket closed while waiting for {method}")).into())
    }

    async fn close(mut self) {
        match tokio::time::timeout(CLOSE_TIMEOUT, self.socket.close(None)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => trace!(error = %e, "Websocket close failed"),
            Err(_) => trace!("Websocket close timed out"),
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

    fn client(endpoint: &str) -> DevToolsClient {
        DevToolsClient::new(endpoint, HttpClient::new().unwrap())
    }

    #[test]
    fn test_debugger_address() {
        assert_eq!(client("http://127.0.0.1:9222/").debugger_address(), "127.0.0.1:9222");
        assert_eq!(client("localhost:9333").debugger_address(), "localhost:9333");
    }

    #[tokio::test]
    async fn test_version_parses_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Browser": "Chrome/124.0.6367.60",
                "Protocol-Version": "1.3",
                "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/browser/abc"
            })))
            .mount(&server)
            .await;

        let version = client(&server.uri()).version().await.unwrap();
        assert_eq!(version.browser, "Chrome/124.0.6367.60");
        assert_eq!(version.protocol_version, "1.3");
    }

    #[tokio::test]
    async fn test_open_and_close_tab() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/json/new"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "T1",
                "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/T1",
                "url": "https://example.com/"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/json/close/T1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Target is closing"))
            .expect(1)
            .mount(&server)
            .await;

        let devtools = client(&server.uri());
        let tab = devtools.open_tab("https://example.com/").await.unwrap();
        assert_eq!(tab.id, "T1");
        devtools.close_tab(&tab.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_tab_encodes_target() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/json/new"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "T2",
                "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/T2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server.uri())
            .open_tab("https://example.com/search?q=rust&page=2#results")
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(
            requests[0].url.query(),
            Some("https%3A%2F%2Fexample.com%2Fsearch%3Fq%3Drust%26page%3D2%23results")
        );
        assert_eq!(requests[0].url.fragment(), None);
    }

    #[tokio::test]
    async fn test_page_html_gives_up_on_silent_page() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
            // Swallow every command without answering.
            while let Some(Ok(_)) = socket.next().await {}
        });

        let tab = TabInfo {
            id: "T3".to_string(),
            websocket_url: format!("ws://{addr}/devtools/page/T3"),
            url: String::new(),
        };
        let started = std::time::Instant::now();
        let err = client("http://127.0.0.1:9")
            .page_html(&tab, Duration::from_millis(500))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Browser(BrowserError::LoadTimeout(_))));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_preflight_against_mock_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Browser": "Chrome/124" })))
            .mount(&server)
            .await;

        let devtools = client(&server.uri());
        assert!(devtools.preflight(Duration::from_secs(2)).await.is_ok());
        assert!(client("http://127.0.0.1:9").preflight(Duration::from_secs(2)).await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let err = client("http://127.0.0.1:9").version().await.unwrap_err();
        assert!(matches!(err, FetchError::Browser(BrowserError::Unreachable { .. })));
    }
}
