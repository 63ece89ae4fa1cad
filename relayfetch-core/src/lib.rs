// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Relayfetch Core
//!
//! Core types shared by every relayfetch crate.
//!
//! This crate holds plain data only. Nothing in here performs I/O; the
//! fetch engine, the backends and the CLI all speak in these types.
//!
//! ## Key Types
//!
//! ### Requests
//! - [`FetchContext`] - One immutable fetch request (URL, timeout, forced backend)
//!
//! ### Failure Classification
//! - [`ErrorType`] - The five-way failure taxonomy
//! - [`ErrorClassification`] - Retry/backoff/fallback verdict for a failure
//!
//! ### Outcomes
//! - [`FetchedContent`] - Opaque content handle plus its provenance
//! - [`FetchAttempt`] - Record of one backend call (or preflight probe)
//! - [`FetchOutcome`] - Aggregated result handed back to the caller
//! - [`Capability`] - What a backend can do

pub mod error;
pub mod models;

// Re-export error types
pub use error::CoreError;

// Re-export all model types
pub use models::{
    // Requests
    FetchContext,
    // Classification
    ErrorClassification,
    ErrorType,
    // Outcomes
    AttemptStage,
    Capability,
    FetchAttempt,
    FetchOutcome,
    FetchedContent,
};
