//! Retry and fallback orchestration.
//!
//! The pipeline drives one [`FetchContext`] through the registry's ordered
//! backend list:
//!
//! 1. Session-based backends get a bounded preflight probe first.
//! 2. Each failure is classified (through the cache) and the classification
//!    decides between waiting and retrying the same backend or moving on.
//! 3. A classification may name a fallback backend; the pipeline jumps to it
//!    at most once per request.
//!
//! Individual failures never escape; the caller gets one [`FetchOutcome`]
//! with the attempt history and diagnostics in its metadata.

use relayfetch_core::{ErrorClassification, FetchAttempt, FetchContext, FetchOutcome, FetchedContent};
use serde_json::{Value, json};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::cache::CachedClassifier;
use crate::error::FetchError;
use crate::registry::StrategyRegistry;
use crate::retry::BackoffPolicy;
use crate::settings::PipelineSettings;
use crate::strategy::FetchStrategy;

/// Metadata keys written into [`FetchOutcome::metadata`].
pub mod keys {
    /// Backend names in the order they were tried.
    pub const BACKENDS_TRIED: &str = "backends_tried";
    /// Backend forced to the front by a domain policy, or null.
    pub const DOMAIN_OVERRIDE: &str = "domain_override";
    /// `"<from>-><to>"` when a classification redirected the request.
    pub const FALLBACK_JUMP: &str = "fallback_jump";
    /// Backend named by the request's `force_backend`.
    pub const FORCED_BACKEND: &str = "forced_backend";
    /// Set when a driver/browser version mismatch was detected.
    pub const VERSION_SKEW: &str = "version_skew";
    /// Per-attempt error records.
    pub const ERRORS: &str = "errors";
    /// Classification cache hit rate (percent) when the request finished.
    pub const CACHE_HIT_RATE: &str = "cache_hit_rate";
}

/// Lower-case fragments of driver errors caused by a driver/browser version
/// mismatch.
const VERSION_SKEW_SIGNATURES: &[&str] = &[
    "only supports chrome version",
    "this version of chromedriver",
    "current browser version is",
    "browser version must be",
    "unsupported devtools protocol version",
];

/// Returns true if a session-backend error means the driver and the browser
/// are incompatible.
pub fn is_version_skew(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    VERSION_SKEW_SIGNATURES.iter().any(|s| lower.contains(s))
        || (lower.contains("session not created") && lower.contains("version"))
}

// ============================================================================
// Request State
// ============================================================================

/// Book-keeping for one `execute` call.
#[derive(Default)]
struct RequestState {
    attempts: Vec<FetchAttempt>,
    tried: Vec<String>,
    errors: Vec<Value>,
    metadata: BTreeMap<String, Value>,
    last_reason: Option<String>,
    jumped: bool,
}

impl RequestState {
    fn record_error(&mut self, backend: &str, attempt: u32, error_type: Option<&str>, error: &str) {
        self.errors.push(json!({
            "backend": backend,
            "attempt": attempt,
            "error_type": error_type,
            "error": error,
        }));
    }
}

/// How one backend's turn ended.
enum BackendTurn {
    Success(FetchedContent),
    Exhausted(ErrorClassification),
}

// ============================================================================
// Fetch Pipeline
// ============================================================================

/// The orchestrator.
///
/// Cheap to share: the registry and classifier are behind `Arc`s and the
/// pipeline holds no per-request state.
#[derive(Debug, Clone)]
pub struct FetchPipeline {
    registry: Arc<StrategyRegistry>,
    classifier: Arc<CachedClassifier>,
    settings: PipelineSettings,
}

impl FetchPipeline {
    /// Creates a pipeline over a fully populated registry.
    pub fn new(
        registry: Arc<StrategyRegistry>,
        classifier: Arc<CachedClassifier>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            registry,
            classifier,
            settings,
        }
    }

    /// The backend registry.
    pub fn registry(&self) -> &Arc<StrategyRegistry> {
        &self.registry
    }

    /// The cached classifier.
    pub fn classifier(&self) -> &Arc<CachedClassifier> {
        &self.classifier
    }

    /// The settings in force.
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Fetches one URL, trying backends until one succeeds.
    #[instrument(skip(self, ctx), fields(url = %ctx.url))]
    pub async fn execute(&self, ctx: &FetchContext) -> FetchOutcome {
        let start = Instant::now();
        let mut state = RequestState::default();

        let domain_override = self
            .registry
            .domain_override(ctx)
            .map(|rule| rule.preferred_backend.clone());
        state.metadata.insert(
            keys::DOMAIN_OVERRIDE.to_string(),
            domain_override.map_or(Value::Null, Value::String),
        );

        let mut queue: VecDeque<Arc<dyn FetchStrategy>> = match &ctx.force_backend {
            Some(name) => {
                state
                    .metadata
                    .insert(keys::FORCED_BACKEND.to_string(), json!(name));
                match self.registry.get(name) {
                    Some(strategy) => VecDeque::from([strategy]),
                    None => {
                        let error = FetchError::UnknownBackend(name.clone());
                        warn!(backend = %name, "Forced backend is not registered");
                        return self.finish_failure(error.to_string(), state, start);
                    }
                }
            }
            None => self.registry.get_suitable_strategies(ctx).await.into(),
        };

        if queue.is_empty() {
            warn!("No backend can handle this request");
            return self.finish_failure(format!("no available backend for {}", ctx.url), state, start);
        }

        info!(count = queue.len(), "Executing fetch pipeline");

        while let Some(strategy) = queue.pop_front() {
            let name = strategy.name().to_string();
            if state.tried.contains(&name) {
                continue;
            }
            state.tried.push(name.clone());

            if strategy.is_session_based() && !self.preflight(strategy.as_ref(), &mut state).await {
                continue;
            }

            match self.run_backend(strategy.as_ref(), ctx, &mut state).await {
                BackendTurn::Success(content) => {
                    info!(backend = %name, "Fetch succeeded");
                    return self.finish_success(content, state, start);
                }
                BackendTurn::Exhausted(classification) => {
                    if ctx.force_backend.is_none() {
                        self.maybe_jump(&name, &classification, ctx, &mut queue, &mut state)
                            .await;
                    }
                }
            }
        }

        let reason = state
            .last_reason
            .clone()
            .unwrap_or_else(|| "all backends failed".to_string());
        warn!(reason = %reason, "All backends failed");
        self.finish_failure(reason, state, start)
    }

    /// Runs the bounded preflight probe. Returns false if the backend must
    /// be skipped.
    async fn preflight(&self, strategy: &dyn FetchStrategy, state: &mut RequestState) -> bool {
        let name = strategy.name();
        let bound = self.settings.preflight_timeout;
        let started = Instant::now();

        let error = match tokio::time::timeout(bound, strategy.preflight()).await {
            Ok(Ok(())) => {
                debug!(backend = %name, elapsed = ?started.elapsed(), "Preflight passed");
                return true;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("preflight gave no answer within {bound:?}"),
        };

        warn!(backend = %name, error = %error, "Preflight failed, skipping backend");
        state.record_error(name, 0, None, &error);
        state.last_reason = Some(format!("{name} unreachable: {error}"));
        state
            .attempts
            .push(FetchAttempt::preflight_failure(name, error, started.elapsed()));
        false
    }

    /// Calls one backend until it succeeds or its classification says stop.
    async fn run_backend(
        &self,
        strategy: &dyn FetchStrategy,
        ctx: &FetchContext,
        state: &mut RequestState,
    ) -> BackendTurn {
        let name = strategy.name();
        let mut attempt: u32 = 0;

        loop {
            let started = Instant::now();
            let result = self.call(strategy, ctx).await;
            let duration = started.elapsed();

            let error = match result {
                Ok(content) => {
                    state.attempts.push(FetchAttempt::success(
                        name,
                        attempt,
                        duration,
                        content.len(),
                    ));
                    return BackendTurn::Success(content);
                }
                Err(error) => error,
            };

            let message = error.to_string();
            let mut classification = self.classifier.classify(&error, &ctx.url);

            if strategy.is_session_based() && is_version_skew(&message) {
                warn!(backend = %name, "Driver and browser versions are incompatible");
                classification = classification
                    .into_non_retryable(format!("{name}: driver/browser version mismatch: {message}"));
                state
                    .metadata
                    .insert(keys::VERSION_SKEW.to_string(), Value::Bool(true));
            }

            let error_type = classification.error_type();
            state.record_error(name, attempt, Some(error_type.display_name()), &message);
            let record = FetchAttempt::failure(name, attempt, &message, error_type, duration);

            if BackoffPolicy::should_retry(&classification, attempt) {
                let wait = self.settings.backoff.delay_for_attempt(&classification, attempt);
                debug!(
                    backend = %name,
                    attempt,
                    error_type = %error_type,
                    wait = ?wait,
                    "Retrying after backoff"
                );
                state.attempts.push(record.with_wait_after(wait));
                tokio::time::sleep(wait).await;
                attempt += 1;
                continue;
            }

            warn!(
                backend = %name,
                attempts = attempt + 1,
                error_type = %error_type,
                reason = %classification.reason(),
                "Backend exhausted"
            );
            state.attempts.push(record);
            state.last_reason = Some(classification.reason().to_string());
            return BackendTurn::Exhausted(classification);
        }
    }

    /// One bounded backend call, with block detection on success.
    async fn call(&self, strategy: &dyn FetchStrategy, ctx: &FetchContext) -> Result<FetchedContent, FetchError> {
        let name = strategy.name();
        let timeout = self.settings.timeout_for(name, ctx);
        let call_ctx = ctx.clone().with_timeout(timeout);

        let result = match tokio::time::timeout(timeout, strategy.fetch(&call_ctx)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(FetchError::Timeout(format!(
                    "{name} gave no answer within {timeout:?}"
                )));
            }
        };

        let mut content = result.content;
        if content.source.is_empty() {
            content.source = name.to_string();
        }
        if let Some(signal) = self.settings.block_detector.inspect(&content).await {
            return Err(FetchError::Blocked(signal));
        }
        Ok(content)
    }

    /// Moves the classification's fallback backend to the front of the
    /// queue, once per request.
    async fn maybe_jump(
        &self,
        from: &str,
        classification: &ErrorClassification,
        ctx: &FetchContext,
        queue: &mut VecDeque<Arc<dyn FetchStrategy>>,
        state: &mut RequestState,
    ) {
        if state.jumped {
            return;
        }
        let Some(target) = classification.fallback_method() else {
            return;
        };
        if state.tried.iter().any(|t| t == target) {
            debug!(target, "Fallback already tried");
            return;
        }
        let Some(strategy) = self.registry.get(target) else {
            debug!(target, "Fallback is not registered");
            return;
        };
        if !strategy.can_handle(ctx) || !strategy.is_available().await {
            debug!(target, "Fallback cannot take this request");
            return;
        }

        queue.retain(|s| s.name() != target);
        queue.push_front(strategy);
        state.jumped = true;
        state
            .metadata
            .insert(keys::FALLBACK_JUMP.to_string(), json!(format!("{from}->{target}")));
        info!(from, to = target, "Jumping to fallback backend");
    }

    fn finish_success(&self, content: FetchedContent, state: RequestState, start: Instant) -> FetchOutcome {
        let metadata = self.finalize_metadata(state.metadata, &state.tried, state.errors);
        FetchOutcome::success(content, state.attempts, start.elapsed(), metadata)
    }

    fn finish_failure(&self, reason: String, state: RequestState, start: Instant) -> FetchOutcome {
        let attempts_made = state.attempts.iter().filter(|a| a.is_fetch()).count();
        let message = format!("{reason} (after {attempts_made} attempts)");
        let metadata = self.finalize_metadata(state.metadata, &state.tried, state.errors);
        FetchOutcome::failure(message, state.attempts, start.elapsed(), metadata)
    }

    fn finalize_metadata(
        &self,
        mut metadata: BTreeMap<String, Value>,
        tried: &[String],
        errors: Vec<Value>,
    ) -> BTreeMap<String, Value> {
        metadata.insert(keys::BACKENDS_TRIED.to_string(), json!(tried));
        metadata.insert(keys::ERRORS.to_string(), Value::Array(errors));
        let hit_rate = (self.classifier.hit_rate() * 100.0).round() / 100.0;
        metadata.insert(keys::CACHE_HIT_RATE.to_string(), json!(hit_rate));
        metadata
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockDetector;
    use crate::error::BrowserError;
    use crate::registry::{DomainPolicies, DomainPolicy};
    use crate::strategy::{FetchKind, FetchResult};
    use async_trait::async_trait;
    use relayfetch_core::{Capability, ErrorType};
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    type Script = Box<dyn Fn(u32) -> Result<FetchResult, FetchError> + Send + Sync>;

    enum Preflight {
        Pass,
        Hang,
    }

    struct Scripted {
        name: &'static str,
        kind: FetchKind,
        priority: u32,
        script: Script,
        preflight: Preflight,
        available: bool,
        handles: bool,
        calls: Arc<AtomicU32>,
    }

    impl Scripted {
        fn new(name: &'static str, priority: u32, script: Script) -> Self {
            Self {
                name,
                kind: FetchKind::Http,
                priority,
                script,
                preflight: Preflight::Pass,
                available: true,
                handles: true,
                calls: Arc::new(AtomicU32::new(0)),
            }
        }

        fn session(mut self) -> Self {
            self.kind = FetchKind::SessionBrowser;
            self
        }

        fn hanging_preflight(mut self) -> Self {
            self.preflight = Preflight::Hang;
            self
        }

        fn unavailable(mut self) -> Self {
            self.available = false;
            self
        }

        fn declining(mut self) -> Self {
            self.handles = false;
            self
        }

        fn counter(&self) -> Arc<AtomicU32> {
            Arc::clone(&self.calls)
        }
    }

    #[async_trait]
    impl FetchStrategy for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> FetchKind {
            self.kind
        }

        fn priority(&self) -> u32 {
            self.priority
        }

        fn capabilities(&self) -> BTreeSet<Capability> {
            BTreeSet::new()
        }

        async fn is_available(&self) -> bool {
            self.available
        }

        fn can_handle(&self, _ctx: &FetchContext) -> bool {
            self.handles
        }

        async fn preflight(&self) -> Result<(), FetchError> {
            match self.preflight {
                Preflight::Pass => Ok(()),
                Preflight::Hang => {
                    tokio::time::sleep(Duration::from_secs(120)).await;
                    Ok(())
                }
            }
        }

        async fn fetch(&self, _ctx: &FetchContext) -> Result<FetchResult, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            (self.script)(call)
        }
    }

    fn ok(name: &'static str) -> Script {
        Box::new(move |_| {
            Ok(FetchResult::new(FetchedContent::new(
                "<html><body>hello</body></html>",
                name,
            )))
        })
    }

    fn status(code: u16) -> Script {
        Box::new(move |_| Err(FetchError::from_status(code, None)))
    }

    fn pipeline(strategies: Vec<Scripted>, policies: DomainPolicies) -> FetchPipeline {
        let mut registry = StrategyRegistry::new(policies);
        for s in strategies {
            registry.register(Arc::new(s)).unwrap();
        }
        FetchPipeline::new(
            Arc::new(registry),
            Arc::new(CachedClassifier::default()),
            PipelineSettings::default(),
        )
    }

    fn ctx() -> FetchContext {
        FetchContext::new("https://example.com/page")
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_backend_success() {
        let p = pipeline(vec![Scripted::new("http", 100, ok("http"))], DomainPolicies::new());
        let outcome = p.execute(&ctx()).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.backend_used.as_deref(), Some("http"));
        assert_eq!(outcome.total_attempts, 1);
        assert_eq!(outcome.metadata[keys::BACKENDS_TRIED], json!(["http"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_attempted_once_then_next_backend() {
        let http = Scripted::new("http", 100, status(404));
        let http_calls = http.counter();
        let curl = Scripted::new("curl", 80, ok("curl"));
        let p = pipeline(vec![http, curl], DomainPolicies::new());

        let outcome = p.execute(&ctx()).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.backend_used.as_deref(), Some("curl"));
        assert_eq!(http_calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.attempts_for("http"), 1);
        assert_eq!(outcome.attempts[0].error_type, Some(ErrorType::Permanent));
    }

    #[tokio::test(start_paused = true)]
    async fn test_404_only_backend_fails_with_status_in_message() {
        let p = pipeline(vec![Scripted::new("http", 100, status(404))], DomainPolicies::new());
        let outcome = p.execute(&ctx()).await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.total_attempts, 1);
        let message = outcome.error_message.unwrap();
        assert!(message.contains("404"), "{message}");
        assert!(message.ends_with("(after 1 attempts)"), "{message}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retried_three_times_with_growing_waits() {
        let http = Scripted::new("http", 100, status(429));
        let calls = http.counter();
        let p = pipeline(vec![http], DomainPolicies::new());

        let outcome = p.execute(&ctx()).await;
        assert!(!outcome.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        let waits: Vec<Duration> = outcome
            .attempts
            .iter()
            .filter_map(|a| a.wait_after)
            .collect();
        assert_eq!(waits.len(), 3);
        assert!(waits.windows(2).all(|w| w[0] <= w[1]));
        assert!(waits[0] >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_temporary_failure_recovers() {
        let flaky: Script = Box::new(|call| {
            if call == 0 {
                Err(FetchError::from_status(502, None))
            } else {
                Ok(FetchResult::new(FetchedContent::new("<p>fine</p>", "http")))
            }
        });
        let p = pipeline(vec![Scripted::new("http", 100, flaky)], DomainPolicies::new());

        let outcome = p.execute(&ctx()).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.total_attempts, 2);
        assert_eq!(outcome.attempts[0].wait_after, Some(Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_session_backend_skipped_within_preflight_bound() {
        let cdp = Scripted::new("cdp", 60, ok("cdp")).session().hanging_preflight();
        let cdp_calls = cdp.counter();
        let policies = DomainPolicies::new()
            .with_rule(DomainPolicy::new("example.com", "cdp", 0, "needs a browser"));
        let p = pipeline(vec![Scripted::new("http", 100, ok("http")), cdp], policies);

        let started = Instant::now();
        let outcome = p.execute(&ctx()).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.backend_used.as_deref(), Some("http"));
        assert_eq!(cdp_calls.load(Ordering::SeqCst), 0);
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(outcome.metadata[keys::DOMAIN_OVERRIDE], json!("cdp"));

        let preflight = &outcome.attempts[0];
        assert!(!preflight.is_fetch());
        assert_eq!(preflight.backend, "cdp");
        assert_eq!(outcome.total_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_version_skew_stops_session_backend() {
        let skew: Script = Box::new(|_| {
            Err(BrowserError::WebDriver {
                error: "session not created".to_string(),
                message: "This version of ChromeDriver only supports Chrome version 114".to_string(),
            }
            .into())
        });
        let webdriver = Scripted::new("webdriver", 40, skew).session();
        let calls = webdriver.counter();
        let p = pipeline(vec![webdriver], DomainPolicies::new());

        let outcome = p.execute(&ctx()).await;
        assert!(!outcome.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.metadata[keys::VERSION_SKEW], json!(true));
        assert!(outcome.error_message.unwrap().contains("version mismatch"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_jump_happens_once() {
        let http = Scripted::new("http", 100, status(503));
        let curl = Scripted::new("curl", 80, status(503));
        let cdp = Scripted::new("cdp", 10, status(503));
        let p = pipeline(vec![http, curl, cdp], DomainPolicies::new());

        let outcome = p.execute(&ctx()).await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.metadata[keys::BACKENDS_TRIED], json!(["http", "cdp", "curl"]));
        assert_eq!(outcome.metadata[keys::FALLBACK_JUMP], json!("http->cdp"));
        // 503 allows two retries per backend.
        assert_eq!(outcome.total_attempts, 9);
    }

    #[tokio::test]
    async fn test_blocked_page_jumps_to_browser() {
        let tiny: Script = Box::new(|_| Ok(FetchResult::new(FetchedContent::new("<p>hi</p>", "http"))));
        let http = Scripted::new("http", 100, tiny);
        let http_calls = http.counter();
        let curl = Scripted::new("curl", 80, ok("curl"));
        let curl_calls = curl.counter();
        let page = format!("<html><body>{}</body></html>", "<p>article text</p>".repeat(20));
        let rendered: Script = Box::new(move |_| Ok(FetchResult::new(FetchedContent::new(page.clone(), "cdp"))));
        let cdp = Scripted::new("cdp", 60, rendered).session();

        let mut registry = StrategyRegistry::new(DomainPolicies::new());
        for s in [http, curl, cdp] {
            registry.register(Arc::new(s)).unwrap();
        }
        let p = FetchPipeline::new(
            Arc::new(registry),
            Arc::new(CachedClassifier::default()),
            PipelineSettings::default()
                .with_block_detector(BlockDetector::new(100))
                .with_backoff(BackoffPolicy::no_wait()),
        );

        let outcome = p.execute(&ctx()).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.backend_used.as_deref(), Some("cdp"));
        assert_eq!(outcome.metadata[keys::FALLBACK_JUMP], json!("http->cdp"));
        assert_eq!(outcome.metadata[keys::BACKENDS_TRIED], json!(["http", "cdp"]));
        assert_eq!(http_calls.load(Ordering::SeqCst), 1);
        assert_eq!(curl_calls.load(Ordering::SeqCst), 0);
        assert!(outcome.errors()[0].contains("too small"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_jump_when_fallback_is_not_registered() {
        let p = pipeline(
            vec![Scripted::new("http", 100, status(503)), Scripted::new("curl", 80, ok("curl"))],
            DomainPolicies::new(),
        );

        let outcome = p.execute(&ctx()).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.backend_used.as_deref(), Some("curl"));
        assert_eq!(outcome.metadata[keys::BACKENDS_TRIED], json!(["http", "curl"]));
        assert!(!outcome.metadata.contains_key(keys::FALLBACK_JUMP));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_jump_to_unavailable_fallback() {
        let cdp = Scripted::new("cdp", 10, ok("cdp")).session().unavailable();
        let cdp_calls = cdp.counter();
        let p = pipeline(
            vec![Scripted::new("http", 100, status(503)), Scripted::new("curl", 80, ok("curl")), cdp],
            DomainPolicies::new(),
        );

        let outcome = p.execute(&ctx()).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.backend_used.as_deref(), Some("curl"));
        assert_eq!(cdp_calls.load(Ordering::SeqCst), 0);
        assert!(!outcome.metadata.contains_key(keys::FALLBACK_JUMP));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_jump_to_fallback_that_declines_url() {
        let cdp = Scripted::new("cdp", 10, ok("cdp")).session().declining();
        let cdp_calls = cdp.counter();
        let p = pipeline(
            vec![Scripted::new("http", 100, status(503)), Scripted::new("curl", 80, ok("curl")), cdp],
            DomainPolicies::new(),
        );

        let outcome = p.execute(&ctx()).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.backend_used.as_deref(), Some("curl"));
        assert_eq!(cdp_calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.metadata[keys::BACKENDS_TRIED], json!(["http", "curl"]));
        assert!(!outcome.metadata.contains_key(keys::FALLBACK_JUMP));
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_backend_tries_only_that_backend() {
        let http = Scripted::new("http", 100, ok("http"));
        let http_calls = http.counter();
        let curl = Scripted::new("curl", 80, status(503));
        let p = pipeline(
            vec![http, curl, Scripted::new("cdp", 60, ok("cdp"))],
            DomainPolicies::new(),
        );

        let outcome = p.execute(&ctx().with_force_backend("curl")).await;
        assert!(!outcome.is_success());
        assert_eq!(http_calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.metadata[keys::BACKENDS_TRIED], json!(["curl"]));
        assert_eq!(outcome.metadata[keys::FORCED_BACKEND], json!("curl"));
        assert!(!outcome.metadata.contains_key(keys::FALLBACK_JUMP));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_forced_backend() {
        let p = pipeline(vec![Scripted::new("http", 100, ok("http"))], DomainPolicies::new());
        let outcome = p.execute(&ctx().with_force_backend("nope")).await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.total_attempts, 0);
        assert!(outcome.error_message.unwrap().starts_with("unknown backend 'nope'"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_is_classified() {
        struct Slow;

        #[async_trait]
        impl FetchStrategy for Slow {
            fn name(&self) -> &str {
                "slow"
            }
            fn kind(&self) -> FetchKind {
                FetchKind::Shell
            }
            fn capabilities(&self) -> BTreeSet<Capability> {
                BTreeSet::new()
            }
            async fn is_available(&self) -> bool {
                true
            }
            async fn fetch(&self, _ctx: &FetchContext) -> Result<FetchResult, FetchError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(FetchError::InvalidResponse("unreachable".to_string()))
            }
        }

        let mut registry = StrategyRegistry::new(DomainPolicies::new());
        registry.register(Arc::new(Slow)).unwrap();
        let p = FetchPipeline::new(
            Arc::new(registry),
            Arc::new(CachedClassifier::default()),
            PipelineSettings::default().with_timeout(Duration::from_secs(1)),
        );

        let outcome = p.execute(&ctx()).await;
        assert!(!outcome.is_success());
        // Connectivity: 1 call + 3 retries
        assert_eq!(outcome.total_attempts, 4);
        assert_eq!(outcome.attempts[0].error_type, Some(ErrorType::Temporary));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_metadata_and_cache_hits() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let script: Script = Box::new(move |call| {
            log.lock().unwrap().push(call);
            Err(FetchError::from_status(500, None))
        });
        let p = pipeline(vec![Scripted::new("http", 100, script)], DomainPolicies::new());

        let outcome = p.execute(&ctx()).await;
        assert_eq!(seen.lock().unwrap().len(), 3);

        let errors = outcome.metadata[keys::ERRORS].as_array().unwrap();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0]["backend"], json!("http"));
        assert_eq!(errors[2]["attempt"], json!(2));
        assert_eq!(errors[0]["error_type"], json!("TEMPORARY"));
        let attempt = serde_json::to_value(&outcome.attempts[0]).unwrap();
        assert_eq!(attempt["error_type"], errors[0]["error_type"]);
        // Identical failures after the first are answered by the cache.
        let rate = outcome.metadata[keys::CACHE_HIT_RATE].as_f64().unwrap();
        assert!((rate - 66.67).abs() < 0.01);
    }

    #[test]
    fn test_version_skew_signatures() {
        assert!(is_version_skew(
            "session not created: This version of ChromeDriver only supports Chrome version 114"
        ));
        assert!(is_version_skew("Current browser version is 124.0.6367.60"));
        assert!(!is_version_skew("session not created: cannot connect to chrome at 127.0.0.1:9222"));
        assert!(!is_version_skew("HTTP 404 Not Found"));
    }
}
