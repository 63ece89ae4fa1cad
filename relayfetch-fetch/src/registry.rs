//! Strategy registry and per-domain backend policies.
//!
//! The registry is filled once at startup and only read afterwards, so it
//! is shared behind an `Arc` without any locking. For each request it
//! answers one question: which backends, in which order?

use futures::future::join_all;
use relayfetch_core::FetchContext;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::RegistryError;
use crate::strategy::{FetchStrategy, StrategyInfo};

/// Priority floor for domain overrides; every base priority sits below it.
pub const DOMAIN_OVERRIDE_TIER: u32 = 1_000;

/// Returns true if `host` is `domain` or a subdomain of it.
pub fn host_matches(host: &str, domain: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let domain = domain.trim_start_matches('.').to_ascii_lowercase();
    host == domain || host.ends_with(&format!(".{domain}"))
}

// ============================================================================
// Domain Policies
// ============================================================================

/// Routes one domain suffix to a preferred backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainPolicy {
    /// Domain suffix, matched exactly or as a parent domain.
    pub domain: String,
    /// Backend moved to the front for matching hosts.
    pub preferred_backend: String,
    /// Added on top of [`DOMAIN_OVERRIDE_TIER`].
    pub boost: u32,
    /// Why this domain needs the override.
    pub rationale: String,
}

impl DomainPolicy {
    /// Creates a new policy.
    pub fn new(
        domain: impl Into<String>,
        preferred_backend: impl Into<String>,
        boost: u32,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            preferred_backend: preferred_backend.into(),
            boost,
            rationale: rationale.into(),
        }
    }
}

/// The static domain policy table.
#[derive(Debug, Clone, Default)]
pub struct DomainPolicies {
    rules: Vec<DomainPolicy>,
    fast_path: Vec<String>,
}

impl DomainPolicies {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an override rule.
    pub fn with_rule(mut self, rule: DomainPolicy) -> Self {
        self.rules.push(rule);
        self
    }

    /// Pins a domain to the default backend regardless of other rules.
    pub fn with_fast_path(mut self, domain: impl Into<String>) -> Self {
        self.fast_path.push(domain.into());
        self
    }

    /// All override rules.
    pub fn rules(&self) -> &[DomainPolicy] {
        &self.rules
    }

    /// Returns true if the host is pinned to the default backend.
    pub fn is_fast_path(&self, host: &str) -> bool {
        self.fast_path.iter().any(|d| host_matches(host, d))
    }

    /// The most specific rule matching the host, ignoring the fast path.
    pub fn rule_for(&self, host: &str) -> Option<&DomainPolicy> {
        self.rules
            .iter()
            .filter(|r| host_matches(host, &r.domain))
            .max_by_key(|r| r.domain.trim_start_matches('.').len())
    }

    /// The rule in force for the host: none for fast-path hosts.
    pub fn override_for(&self, host: &str) -> Option<&DomainPolicy> {
        if self.is_fast_path(host) {
            return None;
        }
        self.rule_for(host)
    }
}

// ============================================================================
// Strategy Registry
// ============================================================================

/// All registered backends plus the domain policy table.
pub struct StrategyRegistry {
    strategies: Vec<Arc<dyn FetchStrategy>>,
    policies: DomainPolicies,
}

impl StrategyRegistry {
    /// Creates an empty registry.
    pub fn new(policies: DomainPolicies) -> Self {
        Self {
            strategies: Vec::new(),
            policies,
        }
    }

    /// Registers a backend.
    ///
    /// Names are unique; a second registration under the same name is an
    /// error, not an overwrite.
    pub fn register(&mut self, strategy: Arc<dyn FetchStrategy>) -> Result<(), RegistryError> {
        let name = strategy.name();
        if self.strategies.iter().any(|s| s.name() == name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        if strategy.priority() >= DOMAIN_OVERRIDE_TIER {
            return Err(RegistryError::PriorityOutOfRange {
                name: name.to_string(),
                priority: strategy.priority(),
                max: DOMAIN_OVERRIDE_TIER,
            });
        }
        debug!(strategy = %name, priority = strategy.priority(), "Registered strategy");
        self.strategies.push(strategy);
        Ok(())
    }

    /// Looks up a backend by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn FetchStrategy>> {
        self.strategies.iter().find(|s| s.name() == name).cloned()
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Returns the number of registered backends.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// The domain policy table.
    pub fn policies(&self) -> &DomainPolicies {
        &self.policies
    }

    /// The backend with the highest base priority (first registered on ties).
    pub fn default_backend(&self) -> Option<&str> {
        self.strategies
            .iter()
            .rev()
            .max_by_key(|s| s.priority())
            .map(|s| s.name())
    }

    /// The override rule in force for this request, if any.
    pub fn domain_override(&self, ctx: &FetchContext) -> Option<&DomainPolicy> {
        let host = ctx.host().ok()?;
        self.policies.override_for(&host)
    }

    /// Priority of a backend for one request.
    ///
    /// A backend named by the matching domain policy jumps above every base
    /// priority; fast-path hosts keep plain base priorities.
    pub fn effective_priority(&self, strategy: &dyn FetchStrategy, ctx: &FetchContext) -> u32 {
        match self.domain_override(ctx) {
            Some(rule) if rule.preferred_backend == strategy.name() => {
                DOMAIN_OVERRIDE_TIER.saturating_add(rule.boost)
            }
            _ => strategy.priority(),
        }
    }

    /// Backends worth trying for this request, best first.
    ///
    /// Filters on `can_handle` and `is_available`, then sorts by effective
    /// priority. The sort is stable, so ties keep registration order.
    pub async fn get_suitable_strategies(&self, ctx: &FetchContext) -> Vec<Arc<dyn FetchStrategy>> {
        let handles: Vec<_> = self
            .strategies
            .iter()
            .filter(|s| s.can_handle(ctx))
            .collect();

        let availability = join_all(handles.iter().map(|s| s.is_available())).await;

        let mut ranked: Vec<(u32, Arc<dyn FetchStrategy>)> = handles
            .into_iter()
            .zip(availability)
            .filter_map(|(s, available)| {
                if available {
                    Some((self.effective_priority(s.as_ref(), ctx), Arc::clone(s)))
                } else {
                    trace!(strategy = %s.name(), "Strategy not available, skipping");
                    None
                }
            })
            .collect();

        ranked.sort_by(|a, b| b.0.cmp(&a.0));
        ranked.into_iter().map(|(_, s)| s).collect()
    }

    /// Returns information about all strategies, with effective priorities
    /// when a request is given.
    pub async fn strategy_info(&self, ctx: Option<&FetchContext>) -> Vec<StrategyInfo> {
        let mut info = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            let mut entry = StrategyInfo::from_strategy(strategy.as_ref()).await;
            entry.effective_priority = ctx.map(|c| self.effective_priority(strategy.as_ref(), c));
            info.push(entry);
        }
        info
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .field("policies", &self.policies)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
