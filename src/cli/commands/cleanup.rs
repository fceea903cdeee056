//! Cleanup command.

use std::sync::Arc;
use std::time::Duration;

use console::style;

use crate::cleanup::CleanupSweep;
use crate::cli::helpers::parse_sites;
use crate::config::Settings;
use crate::fetch::{BackoffPolicy, Fetcher};
use crate::images::ImageStore;
use crate::repository::{create_pool, ListingRepository};

/// Remove records whose source pages are gone.
pub async fn cmd_cleanup(settings: &Settings, site: Option<&str>) -> anyhow::Result<()> {
    let sites = parse_sites(site)?;
    settings.ensure_directories()?;

    let pool = create_pool(&settings.database_path()).await?;
    let repo = ListingRepository::new(pool);
    let images = ImageStore::new(settings.images_root());

    for site in sites {
        // Single attempt on a short timeout: a liveness check only needs
        // to see headers. and a definitive 404 must not be retried.
        let fetcher = Arc::new(Fetcher::new(
            &settings.user_agent,
            Duration::from_secs(settings.sweep_timeout),
            BackoffPolicy::single_attempt(),
        )?);

        println!("{} Sweeping {}", style("→").cyan(), style(site).bold());

        let sweep = CleanupSweep::new(
            site,
            fetcher,
            repo.clone(),
            images.clone(),
            settings.backfill_workers,
        );
        let summary = sweep.run().await?;

        println!(
            "{} {}: {} records checked, {} removed, {} unreachable",
            if summary.failed > 0 {
                style("!").yellow()
            } else {
                style("✓").green()
            },
            site,
            summary.examined,
            summary.removed,
            summary.failed
        );
    }

    Ok(())
}
