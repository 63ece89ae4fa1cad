// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! relayfetch CLI - fetch a URL through every backend it takes.
//!
//! # Examples
//!
//! ```bash
//! # Fetch a page, body to stdout
//! relayfetch fetch https://example.com
//!
//! # Force one backend
//! relayfetch fetch https://example.com --backend curl
//!
//! # Save the body, print the outcome as JSON
//! relayfetch fetch https://example.com --output page.html --format json --pretty
//!
//! # List backends and their priority for a URL
//! relayfetch backends --url https://www.linkedin.com/in/someone
//! ```

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use commands::{backends, fetch};

// ============================================================================
// CLI Definition
// ============================================================================

/// relayfetch CLI - resilient multi-backend fetching.
#[derive(Parser)]
#[command(name = "relayfetch")]
#[command(about = "Fetch URLs through HTTP, curl and browser backends with automatic fallback")]
#[command(long_about = r#"
relayfetch retrieves a URL by trying its backends in priority order,
classifying every failure and retrying or falling back as appropriate.

Backends:
  • http       in-process HTTP client
  • curl       system curl
  • cdp        running Chromium over DevTools
  • webdriver  chromedriver attached to the same browser

Examples:
  relayfetch fetch https://example.com
  relayfetch fetch https://example.com --backend cdp
  relayfetch backends --url https://x.com/someone
"#)]
#[command(version)]
#[command(author = "Relayfetch Contributors")]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Quiet mode (minimal output).
    #[arg(long, short, global = true)]
    pub quiet: bool,

    /// Configuration file (defaults to the user config directory).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Fetch a URL.
    #[command(visible_alias = "f")]
    Fetch(fetch::FetchArgs),

    /// List registered backends.
    #[command(visible_alias = "b")]
    Backends(backends::BackendsArgs),
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text with colors.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error.
    Error = 1,
    /// Every backend failed.
    FetchFailed = 2,
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let default = if verbose {
        "relayfetch=debug,info"
    } else {
        "relayfetch=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Fetch(args) => fetch::run(args, &cli).await,
        Commands::Backends(args) => backends::run(args, &cli).await,
    };

    match result {
        Ok(code) => {
            if !matches!(code, ExitCode::Success) {
                std::process::exit(code as i32);
            }
        }
        Err(e) => {
            if !cli.quiet {
                eprintln!("Error: {e:#}");
            }
            std::process::exit(ExitCode::Error as i32);
        }
    }

    Ok(())
}
