//! Wiring from configuration to a ready registry and pipeline.

use relayfetch_fetch::{
    CachedClassifier, ClassificationCache, DevToolsClient, ErrorClassifier, FetchConfig,
    FetchPipeline, FetchStrategy, HttpClient, PipelineSettings, ProcessRunner, StrategyRegistry,
    WebDriverClient,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::allowlist::BrowserAllowlist;
use crate::cdp::{self, CdpStrategy};
use crate::curl::CurlStrategy;
use crate::error::BackendError;
use crate::http::HttpStrategy;
use crate::policy::default_policies;
use crate::webdriver::WebDriverStrategy;

/// Registers every backend the configuration leaves enabled.
pub fn build_registry(config: &FetchConfig) -> Result<StrategyRegistry, BackendError> {
    let client = HttpClient::with_timeout(config.default_timeout())?;
    let allowlist = BrowserAllowlist::from_config(config);
    let preflight = config.preflight_timeout();
    let devtools = DevToolsClient::new(config.devtools_endpoint.clone(), client.clone());

    let candidates: Vec<Arc<dyn FetchStrategy>> = vec![
        Arc::new(HttpStrategy::new(client.clone())),
        Arc::new(CurlStrategy::new(ProcessRunner::new())),
        Arc::new(
            CdpStrategy::new(devtools.clone(), allowlist.clone()).with_preflight_timeout(preflight),
        ),
        Arc::new(
            WebDriverStrategy::new(
                WebDriverClient::new(config.webdriver_endpoint.clone(), client.clone()),
                devtools,
                client,
                allowlist,
            )
            .with_preflight_timeout(preflight),
        ),
    ];

    let mut registry = StrategyRegistry::new(default_policies());
    for strategy in candidates {
        if config.is_disabled(strategy.name()) {
            debug!(backend = %strategy.name(), "Skipping disabled backend");
            continue;
        }
        registry.register(strategy)?;
    }

    info!(backends = ?registry.names(), "Registry built");
    Ok(registry)
}

/// Builds the full pipeline: registry, cached classifier and settings.
pub fn build_pipeline(config: &FetchConfig) -> Result<FetchPipeline, BackendError> {
    let registry = build_registry(config)?;

    let cache = ClassificationCache::new(
        config.cache.max_size,
        Duration::from_secs(config.cache.default_ttl_secs),
    );
    let classifier = CachedClassifier::new(
        ErrorClassifier::with_browser_fallback(cdp::NAME),
        Arc::new(cache),
    );

    Ok(FetchPipeline::new(
        Arc::new(registry),
        Arc::new(classifier),
        PipelineSettings::from_config(config),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_backends_registered_by_default() {
        let registry = build_registry(&FetchConfig::default()).unwrap();
        let mut names = registry.names();
        names.sort_unstable();
        assert_eq!(names, vec!["cdp", "curl", "http", "webdriver"]);
    }

    #[test]
    fn test_disabled_backends_are_skipped() {
        let config = FetchConfig {
            disabled_backends: vec!["webdriver".into(), "CURL".into()],
            ..FetchConfig::default()
        };
        let registry = build_registry(&config).unwrap();
        assert!(registry.get("webdriver").is_none());
        assert!(registry.get("curl").is_none());
        assert!(registry.get("http").is_some());
    }
}
