//! Browser backend over the Chromium DevTools endpoint.
//!
//! Opens a tab in the user's running browser, so cookies and logins of that
//! profile apply. Only the tab is closed afterwards.

use async_trait::async_trait;
use relayfetch_core::{Capability, FetchContext, FetchedContent};
use relayfetch_fetch::probe::PREFLIGHT_TIMEOUT;
use relayfetch_fetch::{DevToolsClient, FetchError, FetchKind, FetchResult, FetchStrategy};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::allowlist::BrowserAllowlist;
use crate::budget::CallBudget;

/// Backend name.
pub const NAME: &str = "cdp";

/// Fetches through a DevTools-enabled browser.
#[derive(Debug, Clone)]
pub struct CdpStrategy {
    devtools: DevToolsClient,
    allowlist: BrowserAllowlist,
    preflight_timeout: Duration,
}

impl CdpStrategy {
    /// Creates the backend.
    pub fn new(devtools: DevToolsClient, allowlist: BrowserAllowlist) -> Self {
        Self {
            devtools,
            allowlist,
            preflight_timeout: PREFLIGHT_TIMEOUT,
        }
    }

    /// Sets the preflight probe bound.
    pub fn with_preflight_timeout(mut self, timeout: Duration) -> Self {
        self.preflight_timeout = timeout;
        self
    }
}

#[async_trait]
impl FetchStrategy for CdpStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> FetchKind {
        FetchKind::SessionBrowser
    }

    fn capabilities(&self) -> BTreeSet<Capability> {
        BTreeSet::from([
            Capability::JavaScript,
            Capability::Redirects,
            Capability::SharedSession,
        ])
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn can_handle(&self, ctx: &FetchContext) -> bool {
        ctx.is_web_url() && self.allowlist.permits(ctx)
    }

    async fn preflight(&self) -> Result<(), FetchError> {
        self.devtools.preflight(self.preflight_timeout).await
    }

    #[instrument(skip(self, ctx), fields(url = %ctx.url))]
    async fn fetch(&self, ctx: &FetchContext) -> Result<FetchResult, FetchError> {
        let budget = CallBudget::start(ctx);

        let tab = budget.run("open tab", self.devtools.open_tab(&ctx.url)).await?;
        let html = self.devtools.page_html(&tab, budget.remaining()).await;

        match tokio::time::timeout(budget.cleanup(), self.devtools.close_tab(&tab.id)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(tab = %tab.id, error = %e, "Failed to close tab"),
            Err(_) => warn!(tab = %tab.id, "Timed out closing tab"),
        }

        let html = html?;
        debug!(bytes = html.len(), "Page captured");

        let content = FetchedContent::new(html, NAME)
            .with_content_type("text/html")
            .with_final_url(ctx.url.clone());
        Ok(FetchResult::new(content))
    }
}
