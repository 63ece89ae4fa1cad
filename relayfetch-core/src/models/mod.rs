//! Domain models for relayfetch.
//!
//! ## Submodules
//!
//! - [`context`] - The per-request [`FetchContext`]
//! - [`classification`] - Failure taxonomy and classification verdicts
//! - [`outcome`] - Attempt records, fetched content and final outcomes

mod classification;
mod context;
mod outcome;

// Re-export everything at the models level
pub use classification::{ErrorClassification, ErrorType};
pub use context::FetchContext;
pub use outcome::{AttemptStage, Capability, FetchAttempt, FetchOutcome, FetchedContent};
