//! Shared construction helpers for CLI commands.

use std::sync::Arc;
use std::time::Duration;

use console::style;

use crate::config::{Settings, DEEPL_KEY_ENV, RENDER_KEY_ENV};
use crate::fetch::{BackoffPolicy, Fetch, Fetcher, RenderClient};
use crate::models::Site;
use crate::scrape::SiteAdapter;
use crate::translate::{DeeplClient, PassthroughTranslator, TextTranslator};

pub fn backoff_policy(settings: &Settings) -> BackoffPolicy {
    BackoffPolicy {
        max_attempts: settings.max_attempts,
        initial_backoff: Duration::from_secs(settings.initial_backoff_secs),
    }
}

pub fn build_fetcher(settings: &Settings, policy: BackoffPolicy) -> anyhow::Result<Fetcher> {
    let fetcher = Fetcher::new(
        &settings.user_agent,
        Duration::from_secs(settings.request_timeout),
        policy,
    )?;
    Ok(fetcher)
}

/// Detail-page fetcher for a backfill: routed through the rendering proxy
/// when the adapter needs rendered pages and a key is configured, direct
/// otherwise.
pub fn detail_fetcher(
    settings: &Settings,
    adapter: &dyn SiteAdapter,
) -> anyhow::Result<Arc<dyn Fetch>> {
    // Backfill hits the same detail endpoints as a crawl and keeps the
    // configured backoff. The proxy path retries quickly; the upstream
    // meters rendering itself.
    let direct = build_fetcher(settings, backoff_policy(settings))?;

    if adapter.backfill_via_proxy() {
        match &settings.render_api_key {
            Some(key) => {
                let render = RenderClient::new(
                    settings.render_api_url.clone(),
                    key.clone(),
                    direct,
                    BackoffPolicy::fast(),
                )?;
                return Ok(Arc::new(render));
            }
            None => {
                println!(
                    "{} {} detail pages are rendered client-side; set {} to fetch them through the proxy",
                    style("!").yellow(),
                    adapter.site(),
                    RENDER_KEY_ENV
                );
            }
        }
    }

    Ok(Arc::new(direct))
}

pub fn build_translator(settings: &Settings) -> Arc<dyn TextTranslator> {
    match &settings.deepl_api_key {
        Some(key) => Arc::new(DeeplClient::new(key.clone())),
        None => {
            println!(
                "{} {} is not set, field text will be stored untranslated",
                style("!").yellow(),
                DEEPL_KEY_ENV
            );
            Arc::new(PassthroughTranslator)
        }
    }
}

/// Resolve an optional site argument to the list of sites to operate on.
pub fn parse_sites(site: Option<&str>) -> anyhow::Result<Vec<Site>> {
    match site {
        None => Ok(Site::all().to_vec()),
        Some(name) => Site::from_str(name).map(|s| vec![s]).ok_or_else(|| {
            let known = Site::all().map(|s| s.as_str()).join(", ");
            anyhow::anyhow!("unknown site '{name}'; expected one of: {known}")
        }),
    }
}
