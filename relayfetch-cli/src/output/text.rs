//! Text output formatting with colors.

use relayfetch_core::{AttemptStage, FetchAttempt, FetchOutcome};
use relayfetch_fetch::StrategyInfo;
use relayfetch_fetch::pipeline::keys;
use std::time::Duration;

// ============================================================================
// ANSI Colors
// ============================================================================

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";

/// Text formatter with optional colors.
pub struct TextFormatter {
    use_colors: bool,
}

impl TextFormatter {
    /// Creates a new text formatter.
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// Formats a fetch outcome: a summary line plus one line per attempt.
    pub fn format_outcome(&self, outcome: &FetchOutcome) -> String {
        let mut lines = Vec::new();

        if outcome.success {
            let backend = outcome.backend_used.as_deref().unwrap_or("unknown");
            let bytes = outcome.content.as_ref().map_or(0, |c| c.len());
            lines.push(format!(
                "{} {} via {} ({} bytes, {})",
                self.color(GREEN, "✓"),
                self.bold("Fetched"),
                backend,
                bytes,
                format_duration(outcome.duration)
            ));
        } else {
            let message = outcome.error_message.as_deref().unwrap_or("fetch failed");
            lines.push(format!("{} {}", self.color(RED, "✗"), self.bold(message)));
        }

        for attempt in &outcome.attempts {
            lines.push(self.format_attempt(attempt));
        }

        if let Some(jump) = outcome.metadata.get(keys::FALLBACK_JUMP).and_then(|v| v.as_str()) {
            lines.push(self.dim(&format!("  fallback: {jump}")));
        }
        if outcome
            .metadata
            .get(keys::VERSION_SKEW)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
        {
            lines.push(self.color(
                YELLOW,
                "  browser and driver versions do not match; update chromedriver",
            ));
        }

        lines.join("\n")
    }

    /// Formats one attempt line.
    pub fn format_attempt(&self, attempt: &FetchAttempt) -> String {
        let label = match attempt.stage {
            AttemptStage::Preflight => format!("{} preflight", attempt.backend),
            AttemptStage::Fetch => format!("{} #{}", attempt.backend, attempt.attempt + 1),
        };
        let status = if attempt.success {
            self.color(GREEN, "ok")
        } else {
            let kind = attempt.error_type.map_or("-", |t| t.display_name());
            self.color(RED, kind)
        };

        let mut line = format!("  {label:<18} {status:<10} {}", format_duration(attempt.duration));
        if let Some(error) = &attempt.error {
            line.push_str(&format!("  {}", self.dim(error)));
        }
        if let Some(wait) = attempt.wait_after {
            line.push_str(&format!("  (waiting {})", format_duration(wait)));
        }
        line
    }

    /// Header for the backend table.
    pub fn format_backends_header(&self) -> String {
        self.bold(&format!(
            "{:<12} {:<16} {:>8}  {:<10} {}",
            "Backend", "Kind", "Priority", "Status", "Capabilities"
        ))
    }

    /// One row of the backend table.
    pub fn format_backend_line(&self, info: &StrategyInfo) -> String {
        let priority = info.effective_priority.unwrap_or(info.priority);
        let status = if info.available {
            self.color(GREEN, "available")
        } else {
            self.color(RED, "missing")
        };
        let capabilities = info
            .capabilities
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{:<12} {:<16} {:>8}  {:<10} {}",
            info.name,
            info.kind.display_name(),
            priority,
            status,
            self.dim(&capabilities)
        )
    }

    /// Line for a backend switched off by configuration.
    pub fn format_disabled(&self, name: &str) -> String {
        self.dim(&format!("{name:<12} disabled by configuration"))
    }

    fn bold(&self, s: &str) -> String {
        self.color(BOLD, s)
    }

    fn dim(&self, s: &str) -> String {
        self.color(DIM, s)
    }

    fn color(&self, code: &str, s: &str) -> String {
        if self.use_colors {
            format!("{code}{s}{RESET}")
        } else {
            s.to_string()
        }
    }
}

/// Renders a duration as `850ms` or `2.3s`.
pub fn format_duration(d: Duration) -> String {
    if d < Duration::from_secs(1) {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}
