//! JSON output formatting.

use anyhow::Result;
use relayfetch_core::FetchOutcome;
use relayfetch_fetch::StrategyInfo;
use serde::Serialize;

// ============================================================================
// Output Types
// ============================================================================

/// JSON output for a fetch.
#[derive(Debug, Serialize)]
pub struct FetchOutput<'a> {
    #[serde(flatten)]
    pub outcome: &'a FetchOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// JSON output for the backend list.
#[derive(Debug, Serialize)]
pub struct BackendsOutput<'a> {
    pub backends: &'a [StrategyInfo],
    pub domain_override: Option<&'a str>,
}

// ============================================================================
// Formatter
// ============================================================================

/// JSON formatter.
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Formats an outcome; the body is embedded as text when requested.
    pub fn format_outcome(&self, outcome: &FetchOutcome, include_body: bool) -> Result<String> {
        let content = outcome.content.as_ref();
        let output = FetchOutput {
            outcome,
            content_type: content.and_then(|c| c.content_type.as_deref()),
            final_url: content.and_then(|c| c.final_url.as_deref()),
            body: content.filter(|_| include_body).map(|c| c.text_lossy()),
        };
        self.render(&output)
    }

    /// Formats the backend list.
    pub fn format_backends(
        &self,
        backends: &[StrategyInfo],
        domain_override: Option<&str>,
    ) -> Result<String> {
        self.render(&BackendsOutput {
            backends,
            domain_override,
        })
    }

    fn render<T: Serialize>(&self, value: &T) -> Result<String> {
        let out = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(out)
    }
}
