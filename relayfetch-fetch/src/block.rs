//! Anti-bot block detection on fetched content.
//!
//! A 200 response can still be a challenge page. The detector looks for tiny
//! bodies and for well-known interstitial markers in small documents. The
//! marker scan is CPU-bound, so it runs on the blocking pool with a hard
//! deadline; a scan that overruns is dropped and counts as "no signal".

use bytes::Bytes;
use relayfetch_core::FetchedContent;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default scan bound.
pub const DEFAULT_SCAN_DEADLINE: Duration = Duration::from_millis(250);

/// Bytes inspected at most.
pub const DEFAULT_SCAN_LIMIT: usize = 256 * 1024;

/// Documents at or above this size are not checked for markers.
pub const DEFAULT_MARKER_MAX_BYTES: usize = 64 * 1024;

const CHUNK: usize = 16 * 1024;

/// Lower-case markers of anti-bot interstitials.
const BLOCK_MARKERS: &[&str] = &[
    "captcha",
    "cf-chl-",
    "attention required",
    "access denied",
    "enable javascript and cookies",
    "unusual traffic",
    "are you a robot",
    "request unsuccessful. incapsula",
];

/// Detects anti-bot pages.
#[derive(Debug, Clone)]
pub struct BlockDetector {
    /// Bodies smaller than this are treated as blocked (0 disables).
    pub min_content_bytes: usize,
    /// Only documents below this size are scanned for markers.
    pub marker_max_bytes: usize,
    /// Bytes inspected at most.
    pub scan_limit: usize,
    /// Wall-clock bound on the scan.
    pub scan_deadline: Duration,
}

impl BlockDetector {
    /// Creates a detector with the default bounds.
    pub fn new(min_content_bytes: usize) -> Self {
        Self {
            min_content_bytes,
            marker_max_bytes: DEFAULT_MARKER_MAX_BYTES,
            scan_limit: DEFAULT_SCAN_LIMIT,
            scan_deadline: DEFAULT_SCAN_DEADLINE,
        }
    }

    /// Sets the scan deadline.
    pub fn with_scan_deadline(mut self, deadline: Duration) -> Self {
        self.scan_deadline = deadline;
        self
    }

    /// Returns a description of the block signal, if any.
    pub async fn inspect(&self, content: &FetchedContent) -> Option<String> {
        let len = content.len();
        if self.min_content_bytes > 0 && len < self.min_content_bytes {
            return Some(format!(
                "content too small ({len} bytes, expected at least {})",
                self.min_content_bytes
            ));
        }
        if len == 0 || len >= self.marker_max_bytes {
            return None;
        }

        let body = content.body.slice(..len.min(self.scan_limit));
        let deadline = self.scan_deadline;
        let scan = tokio::task::spawn_blocking(move || scan_markers(&body, Instant::now() + deadline));

        match tokio::time::timeout(deadline, scan).await {
            Ok(Ok(ScanResult::Found(marker))) => {
                debug!(marker, "Block marker found");
                Some(format!("page contains '{marker}'"))
            }
            Ok(Ok(ScanResult::Clean)) => None,
            Ok(Ok(ScanResult::DeadlineExceeded)) | Err(_) => {
                debug!(bytes = len, "Block scan abandoned at deadline");
                None
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Block scan task failed");
                None
            }
        }
    }
}

impl Default for BlockDetector {
    fn default() -> Self {
        Self::new(0)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ScanResult {
    Found(&'static str),
    Clean,
    DeadlineExceeded,
}

/// Scans in chunks, checking the deadline between chunks. Consecutive
/// chunks overlap so markers straddling a boundary are still seen.
fn scan_markers(body: &Bytes, deadline: Instant) -> ScanResult {
    let overlap = BLOCK_MARKERS.iter().map(|m| m.len()).max().unwrap_or(0);
    let mut start = 0;

    while start < body.len() {
        if Instant::now() >= deadline {
            return ScanResult::DeadlineExceeded;
        }
        let end = (start + CHUNK + overlap).min(body.len());
        let window = String::from_utf8_lossy(&body[start..end]).to_ascii_lowercase();
        if let Some(marker) = BLOCK_MARKERS.iter().find(|m| window.contains(*m)) {
            return ScanResult::Found(marker);
        }
        start += CHUNK;
    }
    ScanResult::Clean
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: impl Into<Bytes>) -> FetchedContent {
        FetchedContent::new(body, "http")
    }

    #[tokio::test]
    async fn test_clean_page() {
        let detector = BlockDetector::default();
        let content = page("<html><body><h1>Quarterly report</h1></body></html>");
        assert!(detector.inspect(&content).await.is_none());
    }

    #[tokio::test]
    async fn test_challenge_page_is_flagged() {
        let detector = BlockDetector::default();
        let content = page("<html><title>Attention Required! | Cloudflare</title></html>");
        let signal = detector.inspect(&content).await.unwrap();
        assert!(signal.contains("attention required"));
    }

    #[tokio::test]
    async fn test_small_content_threshold() {
        let detector = BlockDetector::new(100);
        let signal = detector.inspect(&page("tiny")).await.unwrap();
        assert!(signal.contains("too small"));
        assert!(BlockDetector::default().inspect(&page("tiny")).await.is_none());
    }

    #[tokio::test]
    async fn test_large_documents_skip_markers() {
        let mut body = "x".repeat(DEFAULT_MARKER_MAX_BYTES);
        body.push_str("captcha");
        assert!(BlockDetector::default().inspect(&page(body)).await.is_none());
    }

    #[test]
    fn test_marker_across_chunk_boundary() {
        let mut body = "a".repeat(CHUNK - 3);
        body.push_str("Unusual Traffic detected");
        let result = scan_markers(&Bytes::from(body), Instant::now() + Duration::from_secs(5));
        assert_eq!(result, ScanResult::Found("unusual traffic"));
    }

    #[test]
    fn test_expired_deadline_abandons_scan() {
        let body = Bytes::from("captcha".repeat(10));
        let result = scan_markers(&body, Instant::now());
        assert_eq!(result, ScanResult::DeadlineExceeded);
    }
}
