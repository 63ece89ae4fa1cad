// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Relayfetch Backends
//!
//! The concrete backends behind the fetch engine, plus the default domain
//! policy table and the wiring that turns a [`FetchConfig`] into a ready
//! [`FetchPipeline`].
//!
//! ## Backends
//!
//! | Backend | Kind | Priority | Notes |
//! |---------|------|----------|-------|
//! | `http` | HTTP | 100 | In-process `reqwest` client, the fast default |
//! | `curl` | Shell | 80 | System `curl`, different TLS stack |
//! | `cdp` | Session browser | 60 | Tabs in a running Chromium over DevTools |
//! | `webdriver` | Session browser | 40 | chromedriver attached to the same browser |
//!
//! ## Usage
//!
//! ```ignore
//! use relayfetch_backends::build_pipeline;
//! use relayfetch_core::FetchContext;
//! use relayfetch_fetch::FetchConfig;
//!
//! let pipeline = build_pipeline(&FetchConfig::from_env()?)?;
//! let outcome = pipeline.execute(&FetchContext::new("https://example.com")).await;
//! ```

pub mod allowlist;
mod budget;
pub mod cdp;
pub mod curl;
pub mod error;
pub mod http;
pub mod policy;
pub mod registry;
pub mod webdriver;

pub use allowlist::BrowserAllowlist;
pub use cdp::CdpStrategy;
pub use curl::CurlStrategy;
pub use error::BackendError;
pub use http::HttpStrategy;
pub use policy::default_policies;
pub use registry::{build_pipeline, build_registry};
pub use webdriver::WebDriverStrategy;

// Re-exported for the doc links above.
#[doc(no_inline)]
pub use relayfetch_fetch::{FetchConfig, FetchPipeline};
