//! Time budget for one browser-backed call.
//!
//! Browser backends hold remote state (a tab, a driver session) that must be
//! released before the pipeline drops the call future. The work phase ends
//! at three quarters of the call timeout and cleanup gets its own slice
//! after that.

use relayfetch_core::FetchContext;
use relayfetch_fetch::FetchError;
use relayfetch_fetch::settings::DEFAULT_CALL_TIMEOUT;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Deadlines derived from the call timeout.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CallBudget {
    total: Duration,
    deadline: Instant,
    cleanup: Duration,
}

impl CallBudget {
    /// Starts the clock for `ctx`.
    pub(crate) fn start(ctx: &FetchContext) -> Self {
        Self::with_total(ctx.timeout.unwrap_or(DEFAULT_CALL_TIMEOUT))
    }

    pub(crate) fn with_total(total: Duration) -> Self {
        Self {
            total,
            deadline: Instant::now() + total * 3 / 4,
            cleanup: total / 8,
        }
    }

    /// Time left for the work phase.
    pub(crate) fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Window for releasing remote state.
    pub(crate) fn cleanup(&self) -> Duration {
        self.cleanup
    }

    /// Runs `work` until the work deadline, then fails with a timeout.
    pub(crate) async fn run<T>(
        &self,
        step: &str,
        work: impl Future<Output = Result<T, FetchError>>,
    ) -> Result<T, FetchError> {
        tokio::time::timeout_at(self.deadline, work)
            .await
            .map_err(|_| {
                FetchError::Timeout(format!(
                    "{step} did not finish within {:?} of a {:?} call budget",
                    self.total * 3 / 4,
                    self.total
                ))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_split() {
        let budget = CallBudget::with_total(Duration::from_secs(8));
        assert_eq!(budget.cleanup(), Duration::from_secs(1));
        assert!(budget.remaining() <= Duration::from_secs(6));
    }

    #[test]
    fn test_default_budget_without_context_timeout() {
        let budget = CallBudget::start(&FetchContext::new("https://example.com"));
        assert!(budget.remaining() > Duration::from_secs(20));
        assert!(budget.remaining() <= DEFAULT_CALL_TIMEOUT * 3 / 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_at_deadline() {
        let budget = CallBudget::with_total(Duration::from_secs(4));
        let err = budget
            .run("navigate", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Timeout(ref m) if m.contains("navigate")));
    }
}
