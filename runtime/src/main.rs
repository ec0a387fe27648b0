// Copyright 2026 Scout Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{Parser, Subcommand};
use scout_runtime::cli;
use scout_runtime::config::DEFAULT_TIMEOUT_MS;

#[derive(Parser)]
#[command(
    name = "scout",
    about = "Scout: crawl a page and discover the APIs it calls",
    version,
    subcommand_negates_reqs = true,
    after_help = "OPTIONS is a JSON object, e.g. '{\"discoverApis\": true, \"waitFor\": \"networkidle0\"}'.\nSet SCOUT_LOG to override the log filter."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Page to crawl
    #[arg(required = true)]
    url: Option<String>,

    /// Crawl options as a JSON object
    options: Option<String>,

    /// Enable verbose/debug logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one JavaScript bundle and list the endpoint literals in it
    ScanBundle {
        /// Bundle URL
        url: String,

        /// Request timeout in milliseconds
        #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli::logging::init(cli.verbose);

    let result = match &cli.command {
        Some(Commands::ScanBundle { url, timeout }) => {
            cli::scan_bundle_cmd::run(url, *timeout).await
        }
        // clap rejects a missing URL when no subcommand is given
        None => {
            let url = cli.url.as_deref().unwrap_or_default();
            cli::crawl_cmd::run(url, cli.options.as_deref()).await
        }
    };

    // Exit codes: 0=success, 1=error, 2=usage (from clap)
    if let Err(e) = &result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}
