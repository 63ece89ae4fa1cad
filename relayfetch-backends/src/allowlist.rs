//! Domain restriction for browser-backed backends.

use relayfetch_core::FetchContext;
use relayfetch_fetch::FetchConfig;
use relayfetch_fetch::registry::host_matches;

/// Domain suffixes browser backends may visit. `None` allows everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowserAllowlist(Option<Vec<String>>);

impl BrowserAllowlist {
    /// Allows every domain.
    pub fn unrestricted() -> Self {
        Self(None)
    }

    /// Allows only hosts under one of `domains`.
    pub fn only(domains: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(Some(domains.into_iter().map(Into::into).collect()))
    }

    /// Reads the allowlist from the configuration.
    pub fn from_config(config: &FetchConfig) -> Self {
        Self(config.browser_domain_allowlist.clone())
    }

    /// Whether a browser backend may take this request.
    pub fn permits(&self, ctx: &FetchContext) -> bool {
        let Some(domains) = &self.0 else {
            return true;
        };
        ctx.host()
            .is_ok_and(|host| domains.iter().any(|d| host_matches(&host, d)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrestricted_permits_everything() {
        assert!(BrowserAllowlist::unrestricted().permits(&FetchContext::new("https://x.com/a")));
    }

    #[test]
    fn test_suffix_matching() {
        let allow = BrowserAllowlist::only(["gov", "europa.eu"]);
        assert!(allow.permits(&FetchContext::new("https://www.census.gov/data")));
        assert!(allow.permits(&FetchContext::new("https://ec.europa.eu/eurostat")));
        assert!(!allow.permits(&FetchContext::new("https://www.linkedin.com/in/someone")));
        assert!(!allow.permits(&FetchContext::new("not a url")));
    }

    #[test]
    fn test_from_config() {
        assert_eq!(
            BrowserAllowlist::from_config(&FetchConfig::default()),
            BrowserAllowlist::unrestricted()
        );

        let config = FetchConfig {
            browser_domain_allowlist: Some(vec!["gov".into(), "gov.uk".into(), "example.org".into()]),
            ..FetchConfig::default()
        };
        let allow = BrowserAllowlist::from_config(&config);
        assert!(allow.permits(&FetchContext::new("https://www.irs.gov/")));
        assert!(allow.permits(&FetchContext::new("https://www.ons.gov.uk/")));
        assert!(allow.permits(&FetchContext::new("https://docs.example.org/")));
        assert!(!allow.permits(&FetchContext::new("https://www.linkedin.com/")));
    }
}
