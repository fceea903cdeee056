//! Crawl command.

use std::sync::Arc;

use console::style;

use crate::cli::helpers::{backoff_policy, build_fetcher, build_translator, parse_sites};
use crate::config::Settings;
use crate::crawl::CrawlDriver;
use crate::fetch::{BackoffPolicy, Fetch};
use crate::images::ImageStore;
use crate::repository::{create_pool, ListingRepository};
use crate::scrape::adapter_for;
use crate::translate::{ExchangeRateClient, RateProvider};

/// Crawl one site, or all of them, storing new listings.
pub async fn cmd_crawl(
    settings: &Settings,
    site: Option<&str>,
    max_pages: Option<u32>,
) -> anyhow::Result<()> {
    let sites = parse_sites(site)?;
    settings.ensure_directories()?;

    let pool = create_pool(&settings.database_path()).await?;
    let repo = ListingRepository::new(pool);
    let images = ImageStore::new(settings.images_root());
    let translator = build_translator(settings);
    let rates: Arc<dyn RateProvider> = Arc::new(ExchangeRateClient::new());

    for site in sites {
        let adapter = adapter_for(site);
        let policy = if adapter.fast_backoff() {
            BackoffPolicy::fast()
        } else {
            backoff_policy(settings)
        };
        let fetcher: Arc<dyn Fetch> = Arc::new(build_fetcher(settings, policy)?);

        println!("{} Crawling {}", style("→").cyan(), style(site).bold());

        let mut driver = CrawlDriver::new(
            adapter,
            fetcher,
            translator.clone(),
            rates.clone(),
            repo.clone(),
            images.clone(),
            settings.crawl_workers,
        );
        if let Some(pages) = max_pages {
            driver = driver.with_max_pages(pages);
        }

        let summary = driver.run().await;
        if summary.failed_scopes > 0 {
            println!(
                "{} {}: {} new listings, {} skipped, {} of {} scopes failed",
                style("!").yellow(),
                site,
                summary.inserted,
                summary.skipped_listings,
                summary.failed_scopes,
                summary.scopes
            );
        } else {
            println!(
                "{} {}: {} new listings across {} scopes",
                style("✓").green(),
                site,
                summary.inserted,
                summary.scopes
            );
        }
    }

    Ok(())
}
