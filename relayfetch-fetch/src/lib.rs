// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Relayfetch Fetch
//!
//! The fetch engine: backend registry, failure classification, retry and
//! fallback orchestration, and the host clients backends are built on.
//!
//! ## Host APIs
//!
//! The [`host`] module provides abstractions for system interactions:
//!
//! - [`host::http`] - HTTP client with tracing and error mapping
//! - [`host::process`] - Subprocess execution for command-line transports
//! - [`host::devtools`] - Chromium DevTools endpoint and page sessions
//! - [`host::webdriver`] - W3C WebDriver sessions attached to a running browser
//!
//! ## Fetch Pipeline
//!
//! - [`strategy::FetchStrategy`] - Trait every backend implements
//! - [`registry::StrategyRegistry`] - Orders backends per URL, with domain policies
//! - [`classifier::ErrorClassifier`] - Maps failures to retry/fallback verdicts
//! - [`cache::ClassificationCache`] - LRU + TTL store of verdicts
//! - [`pipeline::FetchPipeline`] - Drives a request to a single outcome
//!
//! ## Example
//!
//! ```ignore
//! use relayfetch_core::FetchContext;
//! use relayfetch_fetch::{CachedClassifier, FetchPipeline, PipelineSettings};
//!
//! let pipeline = FetchPipeline::new(
//!     Arc::new(registry),
//!     Arc::new(CachedClassifier::default()),
//!     PipelineSettings::default(),
//! );
//!
//! let outcome = pipeline.execute(&FetchContext::new("https://example.com")).await;
//! ```

// Core modules
pub mod block;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod error;
pub mod host;
pub mod pipeline;
pub mod probe;
pub mod registry;
pub mod retry;
pub mod settings;
pub mod strategy;

// Re-export key types at crate root

// Errors
pub use error::{BrowserError, ConfigError, FetchError, ProcessError, RegistryError};

// Host APIs
pub use host::{
    devtools::{BrowserVersion, DevToolsClient, TabInfo},
    http::{HttpClient, ResponseExt},
    process::{ProcessOutput, ProcessRunner},
    webdriver::WebDriverClient,
};

// Classification
pub use cache::{CacheEntry, CacheMetrics, CachedClassifier, ClassificationCache};
pub use classifier::ErrorClassifier;

// Strategy & Pipeline
pub use block::BlockDetector;
pub use config::{CacheConfig, FetchConfig, RetryConfig};
pub use pipeline::FetchPipeline;
pub use probe::{Probe, ProbeResult, run_probes};
pub use registry::{DomainPolicies, DomainPolicy, StrategyRegistry};
pub use retry::BackoffPolicy;
pub use settings::PipelineSettings;
pub use strategy::{FetchKind, FetchResult, FetchStrategy, StrategyInfo};
