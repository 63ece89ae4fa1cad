//! Configuration management.
//!
//! Settings come from a JSON file (missing file means defaults) and are then
//! overlaid with `RELAYFETCH_*` environment variables.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::host::devtools::DEFAULT_DEVTOOLS_ENDPOINT;
use crate::host::webdriver::DEFAULT_WEBDRIVER_ENDPOINT;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "RELAYFETCH_";

/// Government and institutional suffixes used by the gov-only toggle.
pub const GOV_DOMAIN_SUFFIXES: &[&str] = &[
    "gov", "mil", "edu", "int", "gov.uk", "gc.ca", "gov.au", "europa.eu",
];

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Backends never registered.
    #[serde(default)]
    pub disabled_backends: Vec<String>,
    /// When set, browser backends only handle these domain suffixes.
    #[serde(default)]
    pub browser_domain_allowlist: Option<Vec<String>>,
    /// Per-backend call timeout in seconds.
    #[serde(default)]
    pub backend_timeouts_secs: HashMap<String, u64>,
    /// Call timeout when neither the request nor the backend sets one.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// DevTools debug endpoint.
    #[serde(default = "default_devtools_endpoint")]
    pub devtools_endpoint: String,
    /// WebDriver endpoint.
    #[serde(default = "default_webdriver_endpoint")]
    pub webdriver_endpoint: String,
    /// Preflight bound in milliseconds.
    #[serde(default = "default_preflight_ms")]
    pub preflight_timeout_ms: u64,
    /// Bodies smaller than this count as blocked (0 disables).
    #[serde(default)]
    pub min_content_bytes: usize,
    /// Classification cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Backoff settings.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Classification cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum entries.
    #[serde(default = "default_cache_size")]
    pub max_size: usize,
    /// Fallback ttl in seconds.
    #[serde(default = "default_cache_ttl")]
    pub default_ttl_secs: u64,
    /// Background sweep interval in seconds (0 disables).
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

/// Backoff ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Ceiling for attempt-scaled rate-limit waits, in seconds.
    #[serde(default = "default_rate_limit_ceiling")]
    pub rate_limit_ceiling_secs: u64,
    /// Ceiling for any single wait, in seconds.
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_devtools_endpoint() -> String {
    DEFAULT_DEVTOOLS_ENDPOINT.to_string()
}

fn default_webdriver_endpoint() -> String {
    DEFAULT_WEBDRIVER_ENDPOINT.to_string()
}

fn default_preflight_ms() -> u64 {
    2_000
}

fn default_cache_size() -> usize {
    1_000
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_rate_limit_ceiling() -> u64 {
    300
}

fn default_max_wait() -> u64 {
    600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_cache_size(),
            default_ttl_secs: default_cache_ttl(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            rate_limit_ceiling_secs: default_rate_limit_ceiling(),
            max_wait_secs: default_max_wait(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            disabled_backends: Vec::new(),
            browser_domain_allowlist: None,
            backend_timeouts_secs: HashMap::new(),
            default_timeout_secs: default_timeout_secs(),
            devtools_endpoint: default_devtools_endpoint(),
            webdriver_endpoint: default_webdriver_endpoint(),
            preflight_timeout_ms: default_preflight_ms(),
            min_content_bytes: 0,
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl FetchConfig {
    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("relayfetch")
            .join("config.json")
    }

    /// Loads configuration from the default path.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path())
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;

        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        info!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Default configuration overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overlays the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        let vars: HashMap<String, String> = std::env::vars()
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .collect();
        self.apply_env_with(|key| vars.get(key).cloned(), vars.keys().map(String::as_str))
    }

    /// Overlays variables served by `lookup`.
    ///
    /// `keys` lists the variable names present, which is needed for the
    /// per-backend `RELAYFETCH_DISABLE_<NAME>` and `RELAYFETCH_TIMEOUT_<NAME>`
    /// families.
    pub fn apply_env_with<'a, F>(
        &mut self,
        lookup: F,
        keys: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(list) = var("DISABLED_BACKENDS") {
            for name in split_list(&list) {
                self.disable(&name);
            }
        }
        if var("BROWSER_GOV_ONLY").is_some_and(|v| is_truthy(&v)) {
            self.browser_domain_allowlist =
                Some(GOV_DOMAIN_SUFFIXES.iter().map(|s| (*s).to_string()).collect());
        }
        if let Some(list) = var("BROWSER_ALLOWLIST") {
            let mut allow = self.browser_domain_allowlist.take().unwrap_or_default();
            allow.extend(split_list(&list));
            self.browser_domain_allowlist = Some(allow);
        }
        if let Some(url) = var("DEVTOOLS_URL") {
            self.devtools_endpoint = url;
        }
        if let Some(url) = var("WEBDRIVER_URL") {
            self.webdriver_endpoint = url;
        }
        if let Some(ms) = var("PREFLIGHT_MS") {
            self.preflight_timeout_ms = parse_number("PREFLIGHT_MS", &ms)?;
        }

        for key in keys {
            let Some(rest) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            if let Some(name) = rest.strip_prefix("DISABLE_") {
                if lookup(key).is_some_and(|v| is_truthy(&v)) {
                    self.disable(&name.to_ascii_lowercase());
                }
            } else if let Some(name) = rest.strip_prefix("TIMEOUT_") {
                if let Some(value) = lookup(key) {
                    let secs = parse_number(rest, &value)?;
                    self.backend_timeouts_secs
                        .insert(name.to_ascii_lowercase(), secs);
                }
            }
        }
        Ok(())
    }

    fn disable(&mut self, name: &str) {
        if !self.is_disabled(name) {
            debug!(backend = %name, "Backend disabled by configuration");
            self.disabled_backends.push(name.to_string());
        }
    }

    /// Whether a backend is switched off.
    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled_backends
            .iter()
            .any(|d| d.eq_ignore_ascii_case(name))
    }

    /// Call timeout configured for one backend.
    pub fn backend_timeout(&self, name: &str) -> Option<Duration> {
        self.backend_timeouts_secs
            .get(name)
            .map(|secs| Duration::from_secs(*secs))
    }

    /// Default call timeout.
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// Preflight bound.
    pub fn preflight_timeout(&self) -> Duration {
        Duration::from_millis(self.preflight_timeout_ms)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_number(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: format!("{ENV_PREFIX}{key}"),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn apply(vars: &[(&str, &str)]) -> Result<FetchConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut config = FetchConfig::default();
        config.apply_env_with(|k| map.get(k).cloned(), map.keys().map(String::as_str))?;
        Ok(config)
    }

    #[test]
    fn test_defaults() {
        let config = FetchConfig::default();
        assert_eq!(config.default_timeout(), Duration::from_secs(30));
        assert_eq!(config.preflight_timeout(), Duration::from_secs(2));
        assert_eq!(config.cache.max_size, 1000);
        assert_eq!(config.retry.max_wait_secs, 600);
        assert!(config.browser_domain_allowlist.is_none());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = FetchConfig::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, FetchConfig::default());
    }

    #[test]
    fn test_save_and_load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = FetchConfig::default();
        config.disabled_backends.push("curl".to_string());
        config.save_to(&path).unwrap();
        assert_eq!(FetchConfig::load_from(&path).unwrap(), config);

        std::fs::write(&path, r#"{ "default_timeout_secs": 5 }"#).unwrap();
        let partial = FetchConfig::load_from(&path).unwrap();
        assert_eq!(partial.default_timeout_secs, 5);
        assert_eq!(partial.preflight_timeout_ms, 2_000);
    }

    #[test]
    fn test_env_disables_backends() {
        let config = apply(&[
            ("RELAYFETCH_DISABLED_BACKENDS", "curl, WebDriver"),
            ("RELAYFETCH_DISABLE_CDP", "1"),
            ("RELAYFETCH_DISABLE_HTTP", "0"),
        ])
        .unwrap();
        assert!(config.is_disabled("curl"));
        assert!(config.is_disabled("webdriver"));
        assert!(config.is_disabled("cdp"));
        assert!(!config.is_disabled("http"));
    }

    #[test]
    fn test_env_gov_only_allowlist() {
        let config = apply(&[
            ("RELAYFETCH_BROWSER_GOV_ONLY", "true"),
            ("RELAYFETCH_BROWSER_ALLOWLIST", "example.org"),
        ])
        .unwrap();
        let allow = config.browser_domain_allowlist.unwrap();
        assert_eq!(allow.len(), GOV_DOMAIN_SUFFIXES.len() + 1);
        assert!(allow.iter().any(|d| d == "gov.uk"));
        assert_eq!(allow.last().map(String::as_str), Some("example.org"));
    }

    #[test]
    fn test_env_timeouts_and_endpoints() {
        let config = apply(&[
            ("RELAYFETCH_TIMEOUT_CDP", "90"),
            ("RELAYFETCH_DEVTOOLS_URL", "http://10.0.0.2:9222"),
            ("RELAYFETCH_PREFLIGHT_MS", "500"),
        ])
        .unwrap();
        assert_eq!(config.backend_timeout("cdp"), Some(Duration::from_secs(90)));
        assert_eq!(config.devtools_endpoint, "http://10.0.0.2:9222");
        assert_eq!(config.preflight_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_env_rejects_bad_numbers() {
        let err = apply(&[("RELAYFETCH_TIMEOUT_HTTP", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
