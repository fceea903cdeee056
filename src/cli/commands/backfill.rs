//! Backfill command.

use console::style;

use crate::backfill::BackfillRunner;
use crate::cli::helpers::{detail_fetcher, parse_sites};
use crate::config::Settings;
use crate::images::ImageStore;
use crate::repository::{create_pool, ListingRepository};
use crate::scrape::adapter_for;

/// Revisit deficient records and fill in missing contacts and galleries.
pub async fn cmd_backfill(settings: &Settings, site: Option<&str>) -> anyhow::Result<()> {
    let sites = parse_sites(site)?;
    settings.ensure_directories()?;

    let pool = create_pool(&settings.database_path()).await?;
    let repo = ListingRepository::new(pool);
    let images = ImageStore::new(settings.images_root());

    for site in sites {
        let adapter = adapter_for(site);
        if !adapter.has_detail_pages() {
            println!(
                "{} {}: records carry no detail page, nothing to revisit",
                style("·").dim(),
                site
            );
            continue;
        }
        let fetcher = detail_fetcher(settings, adapter.as_ref())?;

        println!("{} Backfilling {}", style("→").cyan(), style(site).bold());

        let runner = BackfillRunner::new(
            adapter,
            fetcher,
            repo.clone(),
            images.clone(),
            settings.backfill_workers,
        );
        let summary = runner.run().await?;

        println!(
            "{} {}: {} records examined, {} contacts set, {} galleries filled, {} failed",
            if summary.failed > 0 {
                style("!").yellow()
            } else {
                style("✓").green()
            },
            site,
            summary.examined,
            summary.contacts_set,
            summary.galleries_filled,
            summary.failed
        );
    }

    Ok(())
}
