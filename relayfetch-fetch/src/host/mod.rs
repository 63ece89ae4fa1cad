//! Host APIs for relayfetch backends.
//!
//! This module provides the clients backends use to reach the outside world:
//!
//! - [`http`] - HTTP client with tracing and error mapping
//! - [`process`] - Subprocess execution for command-line transports
//! - [`devtools`] - Chromium DevTools endpoint and page sessions
//! - [`webdriver`] - W3C WebDriver sessions attached to a running browser

pub mod devtools;
pub mod http;
pub mod process;
pub mod webdriver;

// Re-export key types
pub use devtools::{BrowserVersion, DevToolsClient, TabInfo};
pub use http::{HttpClient, ResponseExt};
pub use process::{ProcessOutput, ProcessRunner};
pub use webdriver::WebDriverClient;
