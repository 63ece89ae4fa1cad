//! Fetch command - run one request through the pipeline.

use anyhow::{Context, Result};
use relayfetch_backends::build_pipeline;
use relayfetch_core::FetchContext;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use super::load_config;
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the fetch command.
#[derive(clap::Args, Debug, Default)]
pub struct FetchArgs {
    /// URL to fetch.
    pub url: String,

    /// Only try this backend.
    #[arg(long, short)]
    pub backend: Option<String>,

    /// Per-call timeout in seconds.
    #[arg(long, short)]
    pub timeout: Option<u64>,

    /// User agent to send.
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Write the body to a file instead of stdout.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

impl FetchArgs {
    fn context(&self) -> FetchContext {
        let mut ctx = FetchContext::new(&self.url);
        if let Some(backend) = &self.backend {
            ctx = ctx.with_force_backend(backend);
        }
        if let Some(secs) = self.timeout {
            ctx = ctx.with_timeout(Duration::from_secs(secs));
        }
        if let Some(ua) = &self.user_agent {
            ctx = ctx.with_user_agent(ua);
        }
        ctx
    }
}

/// Runs the fetch command.
pub async fn run(args: &FetchArgs, cli: &Cli) -> Result<ExitCode> {
    info!(url = %args.url, "Fetching");

    let config = load_config(cli)?;
    let pipeline = build_pipeline(&config)?;

    let cleanup = (config.cache.cleanup_interval_secs > 0).then(|| {
        pipeline
            .classifier()
            .cache()
            .clone()
            .spawn_cleanup(Duration::from_secs(config.cache.cleanup_interval_secs))
    });

    let outcome = pipeline.execute(&args.context()).await;

    if let Some(handle) = cleanup {
        handle.abort();
    }

    if let (Some(path), Some(content)) = (&args.output, &outcome.content) {
        std::fs::write(path, &content.body)
            .with_context(|| format!("failed to write {}", path.display()))?;
        debug!(path = %path.display(), bytes = content.len(), "Body written");
    }

    match cli.format {
        OutputFormat::Text => {
            if !cli.quiet || !outcome.success {
                eprintln!("{}", TextFormatter::new(!cli.no_color).format_outcome(&outcome));
            }
            if args.output.is_none() {
                if let Some(content) = &outcome.content {
                    std::io::stdout()
                        .write_all(&content.body)
                        .context("failed to write body to stdout")?;
                }
            }
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!("{}", formatter.format_outcome(&outcome, args.output.is_none())?);
        }
    }

    Ok(if outcome.success {
        ExitCode::Success
    } else {
        ExitCode::FetchFailed
    })
}
