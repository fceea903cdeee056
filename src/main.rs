use std::path::PathBuf;

use clap::{Parser, Subcommand};

use akiyacrawl::cli::commands::{cmd_backfill, cmd_cleanup, cmd_crawl, cmd_status};
use akiyacrawl::config::load_settings;
use akiyacrawl::logging;

#[derive(Parser)]
#[command(name = "akiya", version, about = "Japanese real-estate listing crawler")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the data directory.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl index pages and store new listings.
    Crawl {
        /// Site to crawl (hatomark, nifty, nifty_rental, sumai). All
        /// sites when omitted.
        site: Option<String>,
        /// Stop each scope after this many pages.
        #[arg(long)]
        max_pages: Option<u32>,
    },
    /// Revisit records missing a contact number or gallery.
    Backfill {
        /// Site to backfill. All sites when omitted.
        site: Option<String>,
    },
    /// Remove records whose source pages are gone.
    Cleanup {
        /// Site to sweep. All sites when omitted.
        site: Option<String>,
    },
    /// Show stored record counts.
    Status,
}

impl Commands {
    /// Log-file job name, e.g. `crawl_nifty`.
    fn job_name(&self) -> String {
        let (verb, site) = match self {
            Commands::Crawl { site, .. } => ("crawl", site.as_deref()),
            Commands::Backfill { site } => ("backfill", site.as_deref()),
            Commands::Cleanup { site } => ("cleanup", site.as_deref()),
            Commands::Status => ("status", None),
        };
        match site {
            Some(site) => format!("{verb}_{site}"),
            None => verb.to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref(), cli.data_dir.clone());

    settings.ensure_directories()?;
    let _log_guards = logging::init(&settings.logs_dir, &cli.command.job_name())?;

    match &cli.command {
        Commands::Crawl { site, max_pages } => {
            cmd_crawl(&settings, site.as_deref(), *max_pages).await
        }
        Commands::Backfill { site } => cmd_backfill(&settings, site.as_deref()).await,
        Commands::Cleanup { site } => cmd_cleanup(&settings, site.as_deref()).await,
        Commands::Status => cmd_status(&settings).await,
    }
}
