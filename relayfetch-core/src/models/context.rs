//! The per-request fetch context.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use crate::error::CoreError;

/// One fetch request.
///
/// A context is built once by the caller and never mutated while the
/// request is in flight. Backends read from it; the pipeline only passes
/// it along.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchContext {
    /// Target URL.
    pub url: String,
    /// User agent override.
    pub user_agent: Option<String>,
    /// Per-call timeout override.
    pub timeout: Option<Duration>,
    /// Restrict the request to a single named backend.
    pub force_backend: Option<String>,
    /// Opaque per-backend settings, keyed by backend name.
    #[serde(default)]
    pub backend_config: BTreeMap<String, serde_json::Value>,
}

impl FetchContext {
    /// Creates a context for the given URL with no overrides.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_agent: None,
            timeout: None,
            force_backend: None,
            backend_config: BTreeMap::new(),
        }
    }

    /// Sets the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Sets the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Forces a single backend.
    pub fn with_force_backend(mut self, backend: impl Into<String>) -> Self {
        self.force_backend = Some(backend.into());
        self
    }

    /// Adds an opaque config value for one backend.
    pub fn with_backend_config(
        mut self,
        backend: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.backend_config.insert(backend.into(), value);
        self
    }

    /// Returns the config value for a backend, if any.
    pub fn config_for(&self, backend: &str) -> Option<&serde_json::Value> {
        self.backend_config.get(backend)
    }

    /// Parses the URL.
    pub fn parsed_url(&self) -> Result<Url, CoreError> {
        Url::parse(&self.url).map_err(|e| CoreError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }

    /// Returns the lower-cased host of the URL.
    pub fn host(&self) -> Result<String, CoreError> {
        let parsed = self.parsed_url()?;
        parsed
            .host_str()
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| CoreError::MissingHost(self.url.clone()))
    }

    /// Returns true if the URL uses http or https.
    pub fn is_web_url(&self) -> bool {
        self.parsed_url()
            .is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_is_lowercased() {
        let ctx = FetchContext::new("https://WWW.Example.ORG/path?q=1");
        assert_eq!(ctx.host().unwrap(), "www.example.org");
    }

    #[test]
    fn test_invalid_url() {
        let ctx = FetchContext::new("not a url");
        assert!(matches!(ctx.host(), Err(CoreError::InvalidUrl { .. })));
        assert!(!ctx.is_web_url());
    }

    #[test]
    fn test_web_url_scheme() {
        assert!(FetchContext::new("http://a.test/").is_web_url());
        assert!(!FetchContext::new("ftp://a.test/file").is_web_url());
    }

    #[test]
    fn test_builder_methods() {
        let ctx = FetchContext::new("https://example.com")
            .with_user_agent("bot/1.0")
            .with_timeout(Duration::from_secs(5))
            .with_force_backend("curl")
            .with_backend_config("curl", serde_json::json!({"insecure": false}));

        assert_eq!(ctx.user_agent.as_deref(), Some("bot/1.0"));
        assert_eq!(ctx.timeout, Some(Duration::from_secs(5)));
        assert_eq!(ctx.force_backend.as_deref(), Some("curl"));
        assert!(ctx.config_for("curl").is_some());
        assert!(ctx.config_for("http").is_none());
    }
}
