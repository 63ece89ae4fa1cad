//! Shell transport backend using the system `curl`.
//!
//! `curl` links a different TLS stack than the in-process client, which
//! gets through some servers the HTTP backend cannot negotiate with.

use async_trait::async_trait;
use relayfetch_core::{Capability, FetchContext, FetchedContent};
use relayfetch_fetch::{FetchError, FetchKind, FetchResult, FetchStrategy, ProcessError, ProcessRunner};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, instrument};

/// Backend name.
pub const NAME: &str = "curl";

const CURL: &str = "curl";

/// Written after the body: status, content type and final URL, one per line.
const WRITE_OUT: &str = "\\n%{http_code}\\n%{content_type}\\n%{url_effective}";

/// Default `--max-time`.
const DEFAULT_MAX_TIME: Duration = Duration::from_secs(30);

/// Fetches by running `curl`.
#[derive(Debug, Clone, Default)]
pub struct CurlStrategy {
    runner: ProcessRunner,
}

impl CurlStrategy {
    /// Creates the backend.
    pub fn new(runner: ProcessRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl FetchStrategy for CurlStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> FetchKind {
        FetchKind::Shell
    }

    fn capabilities(&self) -> BTreeSet<Capability> {
        BTreeSet::from([
            Capability::Redirects,
            Capability::CustomUserAgent,
            Capability::AlternateTls,
        ])
    }

    async fn is_available(&self) -> bool {
        self.runner.command_exists(CURL)
    }

    #[instrument(skip(self, ctx), fields(url = %ctx.url))]
    async fn fetch(&self, ctx: &FetchContext) -> Result<FetchResult, FetchError> {
        let max_time = ctx.timeout.unwrap_or(DEFAULT_MAX_TIME);
        let max_time_arg = max_time.as_secs().max(1).to_string();

        let mut args = vec![
            "--silent",
            "--show-error",
            "--location",
            "--compressed",
            "--max-time",
            max_time_arg.as_str(),
            "--write-out",
            WRITE_OUT,
        ];
        if let Some(ua) = &ctx.user_agent {
            args.extend(["--user-agent", ua.as_str()]);
        }
        args.push(ctx.url.as_str());

        // Leave curl room to report its own timeout.
        let deadline = max_time + Duration::from_secs(5);
        let output = self
            .runner
            .run_with_timeout(CURL, &args, deadline)
            .await
            .map_err(|e| match e {
                ProcessError::Timeout(t) => FetchError::Timeout(format!("curl killed after {t:?}")),
                other => FetchError::Process(other),
            })?;

        if !output.success() {
            return Err(map_exit(output.exit_code, output.stderr.trim()));
        }

        let parsed = parse_output(&output.stdout)?;
        debug!(status = parsed.status, bytes = parsed.body.len(), "curl fetch complete");

        if !(200..300).contains(&parsed.status) {
            return Err(FetchError::from_status(parsed.status, None));
        }

        let mut content = FetchedContent::new(parsed.body, NAME)
            .with_status(parsed.status)
            .with_final_url(parsed.final_url);
        if !parsed.content_type.is_empty() {
            content = content.with_content_type(parsed.content_type);
        }
        Ok(FetchResult::new(content))
    }
}

/// Maps curl's exit codes onto transport errors.
fn map_exit(code: i32, stderr: &str) -> FetchError {
    let message = if stderr.is_empty() {
        format!("curl exited with code {code}")
    } else {
        stderr.to_string()
    };
    match code {
        6 => FetchError::Dns(message),
        7 => FetchError::Connect(message),
        28 => FetchError::Timeout(message),
        35 | 60 => FetchError::Tls(message),
        _ => FetchError::Process(ProcessError::NonZeroExit {
            code,
            stderr: message,
        }),
    }
}

struct CurlOutput {
    body: Vec<u8>,
    status: u16,
    content_type: String,
    final_url: String,
}

/// Splits the write-out trailer off the body.
fn parse_output(stdout: &[u8]) -> Result<CurlOutput, FetchError> {
    let mut parts = stdout.rsplitn(4, |b| *b == b'\n');
    let final_url = parts.next().unwrap_or_default();
    let content_type = parts.next().unwrap_or_default();
    let status = parts.next().unwrap_or_default();
    let Some(body) = parts.next() else {
        return Err(FetchError::InvalidResponse(
            "curl output is missing the status trailer".to_string(),
        ));
    };

    let status = String::from_utf8_lossy(status)
        .trim()
        .parse()
        .map_err(|_| FetchError::InvalidResponse("curl reported no status code".to_string()))?;

    Ok(CurlOutput {
        body: body.to_vec(),
        status,
        content_type: String::from_utf8_lossy(content_type).trim().to_string(),
        final_url: String::from_utf8_lossy(final_url).trim().to_string(),
    })
}
