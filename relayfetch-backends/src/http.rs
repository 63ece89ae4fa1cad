//! Direct HTTP backend.

use async_trait::async_trait;
use relayfetch_core::{Capability, FetchContext, FetchedContent};
use relayfetch_fetch::{FetchError, FetchKind, FetchResult, FetchStrategy, HttpClient, ResponseExt};
use reqwest::header::{self, HeaderMap, HeaderValue};
use std::collections::BTreeSet;
use tracing::{debug, instrument};

/// Backend name.
pub const NAME: &str = "http";

/// Fetches with the in-process HTTP client.
///
/// The cheapest backend and the default first choice.
#[derive(Debug, Clone)]
pub struct HttpStrategy {
    client: HttpClient,
}

impl HttpStrategy {
    /// Creates the backend around a client.
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FetchStrategy for HttpStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> FetchKind {
        FetchKind::Http
    }

    fn capabilities(&self) -> BTreeSet<Capability> {
        BTreeSet::from([
            Capability::Fast,
            Capability::Redirects,
            Capability::CustomUserAgent,
        ])
    }

    async fn is_available(&self) -> bool {
        true
    }

    #[instrument(skip(self, ctx), fields(url = %ctx.url))]
    async fn fetch(&self, ctx: &FetchContext) -> Result<FetchResult, FetchError> {
        let mut headers = HeaderMap::new();
        if let Some(ua) = &ctx.user_agent {
            let value = HeaderValue::from_str(ua)
                .map_err(|e| FetchError::InvalidResponse(format!("invalid user agent: {e}")))?;
            headers.insert(header::USER_AGENT, value);
        }

        let response = self
            .client
            .get_with_headers(&ctx.url, headers, ctx.timeout)
            .await?
            .check_status()?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(FetchError::from_reqwest)?;

        debug!(status, bytes = body.len(), "HTTP fetch complete");

        let mut content = FetchedContent::new(body, NAME)
            .with_status(status)
            .with_final_url(final_url);
        if let Some(content_type) = content_type {
            content = content.with_content_type(content_type);
        }
        Ok(FetchResult::new(content))
    }
}
