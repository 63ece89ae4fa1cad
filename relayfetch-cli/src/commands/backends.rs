//! Backends command - list registered backends.

use anyhow::Result;
use relayfetch_backends::build_registry;
use relayfetch_core::FetchContext;
use tracing::info;

use super::load_config;
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the backends command.
#[derive(clap::Args, Debug, Default)]
pub struct BackendsArgs {
    /// Show effective priorities for this URL.
    #[arg(long, short)]
    pub url: Option<String>,
}

/// Runs the backends command.
pub async fn run(args: &BackendsArgs, cli: &Cli) -> Result<ExitCode> {
    info!("Listing backends");

    let config = load_config(cli)?;
    let registry = build_registry(&config)?;
    let ctx = args.url.as_deref().map(FetchContext::new);

    let mut infos = registry.strategy_info(ctx.as_ref()).await;
    infos.sort_by_key(|i| std::cmp::Reverse(i.effective_priority.unwrap_or(i.priority)));

    let domain_override = ctx
        .as_ref()
        .and_then(|c| registry.domain_override(c))
        .map(|rule| (rule.preferred_backend.clone(), rule.rationale.clone()));

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            println!("{}", formatter.format_backends_header());
            println!("{}", "─".repeat(70));
            for info in &infos {
                println!("{}", formatter.format_backend_line(info));
            }
            if let Some((backend, rationale)) = &domain_override {
                println!();
                println!("Domain override: {backend} ({rationale})");
            }
            for name in &config.disabled_backends {
                println!("{}", formatter.format_disabled(name));
            }
        }
        OutputFormat::Json => {
            let formatter = JsonFormatter::new(cli.pretty);
            println!(
                "{}",
                formatter.format_backends(&infos, domain_override.as_ref().map(|(b, _)| b.as_str()))?
            );
        }
    }

    Ok(ExitCode::Success)
}
