//! Browser backend over W3C WebDriver.
//!
//! chromedriver attaches to the same running browser as the `cdp` backend
//! (through `debuggerAddress`). Useful when DevTools tab control is locked
//! down but a driver is available. Deleting the session detaches only.

use async_trait::async_trait;
use relayfetch_core::{Capability, FetchContext, FetchedContent};
use relayfetch_fetch::probe::PREFLIGHT_TIMEOUT;
use relayfetch_fetch::{
    DevToolsClient, FetchError, FetchKind, FetchResult, FetchStrategy, HttpClient, WebDriverClient,
    run_probes,
};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::allowlist::BrowserAllowlist;
use crate::budget::CallBudget;

/// Backend name.
pub const NAME: &str = "webdriver";

/// Fetches through chromedriver.
#[derive(Debug, Clone)]
pub struct WebDriverStrategy {
    driver: WebDriverClient,
    devtools: DevToolsClient,
    http: HttpClient,
    allowlist: BrowserAllowlist,
    preflight_timeout: Duration,
}

impl WebDriverStrategy {
    /// Creates the backend.
    pub fn new(
        driver: WebDriverClient,
        devtools: DevToolsClient,
        http: HttpClient,
        allowlist: BrowserAllowlist,
    ) -> Self {
        Self {
            driver,
            devtools,
            http,
            allowlist,
            preflight_timeout: PREFLIGHT_TIMEOUT,
        }
    }

    /// Sets the preflight probe bound.
    pub fn with_preflight_timeout(mut self, timeout: Duration) -> Self {
        self.preflight_timeout = timeout;
        self
    }

    async fn capture(&self, session: &str, url: &str) -> Result<String, FetchError> {
        self.driver.navigate(session, url).await?;
        self.driver.page_source(session).await
    }
}

#[async_trait]
impl FetchStrategy for WebDriverStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> FetchKind {
        FetchKind::SessionBrowser
    }

    fn priority(&self) -> u32 {
        40
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

    /// Both the driver and the browser it attaches to must answer.
    async fn preflight(&self) -> Result<(), FetchError> {
        let probes = [
            self.driver.probe(self.preflight_timeout),
            self.devtools.probe(self.preflight_timeout),
        ];
        for result in run_probes(&probes, &self.http).await {
            result.into_result()?;
        }
        Ok(())
    }

    #[instrument(skip(self, ctx), fields(url = %ctx.url))]
    async fn fetch(&self, ctx: &FetchContext) -> Result<FetchResult, FetchError> {
        let budget = CallBudget::start(ctx);
        let session = budget
            .run(
                "new session",
                self.driver.new_session(&self.devtools.debugger_address()),
            )
            .await?;

        let source = budget.run("capture", self.capture(&session, &ctx.url)).await;
        if tokio::time::timeout(budget.cleanup(), self.driver.delete_session(&session))
            .await
            .is_err()
        {
            warn!(session = %session, "Timed out deleting session");
        }

        let source = source?;
        debug!(bytes = source.len(), "Page source captured");

        let content = FetchedContent::new(source, NAME)
            .with_content_type("text/html")
            .with_final_url(ctx.url.clone());
        Ok(FetchResult::new(content))
    }
}
