//! Default domain policy table.

use relayfetch_fetch::{DomainPolicies, DomainPolicy};

use crate::{cdp, curl};

/// Sites that serve a login wall or empty shell to plain clients.
const SESSION_DOMAINS: &[&str] = &[
    "linkedin.com",
    "x.com",
    "twitter.com",
    "instagram.com",
    "facebook.com",
];

/// Sites kept on the default backend for latency.
const FAST_PATH_DOMAINS: &[&str] = &["wikipedia.org", "github.com", "arxiv.org", "doi.org"];

/// Builds the policy table the registry starts with.
pub fn default_policies() -> DomainPolicies {
    let mut policies = DomainPolicies::new();

    for domain in SESSION_DOMAINS {
        policies = policies.with_rule(DomainPolicy::new(
            *domain,
            cdp::NAME,
            100,
            "needs a logged-in browser session",
        ));
    }

    policies = policies.with_rule(DomainPolicy::new(
        "sec.gov",
        curl::NAME,
        50,
        "rejects the in-process client's TLS fingerprint",
    ));

    for domain in FAST_PATH_DOMAINS {
        policies = policies.with_fast_path(*domain);
    }

    policies
}
