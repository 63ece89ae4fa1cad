//! Fetch strategy trait and types.
//!
//! A strategy is one retrieval backend: the in-process HTTP client, a
//! command-line transport, or a browser automation session. The registry
//! orders them per URL and the pipeline drives them.

use async_trait::async_trait;
use relayfetch_core::{Capability, FetchContext, FetchedContent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::FetchError;

// ============================================================================
// Fetch Kind
// ============================================================================

/// The kind of transport a strategy uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchKind {
    /// In-process HTTP client.
    Http,
    /// External command-line transport (e.g. `curl`).
    Shell,
    /// Attaches to a long-lived browser session over a local endpoint.
    SessionBrowser,
}

impl FetchKind {
    /// Returns the display name for this kind.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Shell => "Shell",
            Self::SessionBrowser => "Session Browser",
        }
    }
}

impl fmt::Display for FetchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ============================================================================
// Fetch Result
// ============================================================================

/// The result of a successful backend call.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// The fetched content.
    pub content: FetchedContent,
    /// The backend that produced it.
    pub backend: String,
}

impl FetchResult {
    /// Creates a new fetch result.
    pub fn new(content: FetchedContent) -> Self {
        Self {
            backend: content.source.clone(),
            content,
        }
    }
}

// ============================================================================
// Fetch Strategy Trait
// ============================================================================

/// A backend for fetching URL content.
///
/// ## Implementing a Strategy
///
/// ```ignore
/// struct CurlStrategy { runner: ProcessRunner }
///
/// #[async_trait]
/// impl FetchStrategy for CurlStrategy {
///     fn name(&self) -> &str {
///         "curl"
///     }
///
///     fn kind(&self) -> FetchKind {
///         FetchKind::Shell
///     }
///
///     async fn is_available(&self) -> bool {
///         self.runner.command_exists("curl")
///     }
///
///     async fn fetch(&self, ctx: &FetchContext) -> Result<FetchResult, FetchError> {
///         let output = self.runner.run("curl", &["-sS", &ctx.url]).await?;
///         // Build FetchedContent from output
///     }
/// }
/// ```
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Unique backend name (e.g. "http", "curl", "cdp").
    fn name(&self) -> &str;

    /// The kind of transport this strategy uses.
    fn kind(&self) -> FetchKind;

    /// Base priority (higher = try first).
    ///
    /// Default priorities:
    /// - HTTP: 100 (cheapest, tried first)
    /// - Shell: 80
    /// - Session browser: 60
    fn priority(&self) -> u32 {
        match self.kind() {
            FetchKind::Http => 100,
            FetchKind::Shell => 80,
            FetchKind::SessionBrowser => 60,
        }
    }

    /// What this backend can do.
    fn capabilities(&self) -> BTreeSet<Capability>;

    /// Check if this strategy can run in the current environment.
    ///
    /// May look at the platform or the PATH. Network reachability of a
    /// browser session belongs in [`preflight`](Self::preflight), which the
    /// pipeline bounds with a short timeout.
    async fn is_available(&self) -> bool;

    /// Whether this strategy wants to handle the given request.
    fn can_handle(&self, ctx: &FetchContext) -> bool {
        ctx.is_web_url()
    }

    /// Whether this strategy attaches to a shared external session.
    fn is_session_based(&self) -> bool {
        self.kind() == FetchKind::SessionBrowser
    }

    /// Cheap reachability check run before the first real call.
    async fn preflight(&self) -> Result<(), FetchError> {
        Ok(())
    }

    /// Fetch the URL using this strategy.
    async fn fetch(&self, ctx: &FetchContext) -> Result<FetchResult, FetchError>;
}

// ============================================================================
// Strategy Info
// ============================================================================

/// Information about a strategy (for reporting).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyInfo {
    /// Strategy name.
    pub name: String,
    /// Strategy kind.
    pub kind: FetchKind,
    /// Capabilities.
    pub capabilities: BTreeSet<Capability>,
    /// Whether the strategy is available.
    pub available: bool,
    /// Base priority.
    pub priority: u32,
    /// Priority after domain policies, when reported for a URL.
    pub effective_priority: Option<u32>,
}

impl StrategyInfo {
    /// Creates strategy info from a strategy implementation.
    pub async fn from_strategy(strategy: &dyn FetchStrategy) -> Self {
        Self {
            name: strategy.name().to_string(),
            kind: strategy.kind(),
            capabilities: strategy.capabilities(),
            available: strategy.is_available().await,
            priority: strategy.priority(),
            effective_priority: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
