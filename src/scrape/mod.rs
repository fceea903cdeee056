//! Per-site extraction: locating listing blocks on index pages and pulling
//! record fields out of site-specific markup.
//!
//! Parsing is synchronous over `&str` (parsed DOM handles are not `Send`
//! and must never be held across an await); all fetching happens in the
//! crawl driver.

mod hatomark;
mod nifty;
mod nifty_rental;
mod sumai;

pub use hatomark::HatomarkAdapter;
pub use nifty::NiftyAdapter;
pub use nifty_rental::NiftyRentalAdapter;
pub use sumai::SumaiAdapter;

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{ElementRef, Selector};

use crate::error::{Error, ExtractError};
use crate::fetch::Fetch;
use crate::models::{CrawlScope, DetailPage, DuplicatePolicy, IndexBlock, Site};

/// Site-specific extraction capability. One implementation per source
/// site; the duplicate-gate and page-loop logic live in the crawl driver
/// and are shared across all adapters.
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    fn site(&self) -> Site;

    /// What the duplicate gate does when it hits a known link.
    fn duplicate_policy(&self) -> DuplicatePolicy;

    /// The enumerated sub-scopes this site is crawled by.
    fn scopes(&self) -> Vec<CrawlScope>;

    /// Expand a configured scope into the concrete page sequences to walk.
    /// Sites with a second enumeration level (a city list per prefecture)
    /// fetch it here; everything else pages the scope directly.
    async fn discover_scopes(
        &self,
        _fetch: &dyn Fetch,
        scope: &CrawlScope,
    ) -> Result<Vec<CrawlScope>, Error> {
        Ok(vec![scope.clone()])
    }

    /// Index page URL for a scope and 1-based page number.
    fn page_url(&self, scope: &CrawlScope, page: u32) -> String;

    /// Locate listing blocks on a fetched index page. Blocks missing their
    /// link anchor are dropped (logged), not errors; an absent listing
    /// container is a page-level extraction error.
    fn parse_index(&self, html: &str) -> Result<Vec<IndexBlock>, ExtractError>;

    /// Extract detail-only fields (contact number, full gallery, field
    /// table) from a listing's own page. `link` is passed because some
    /// feeds mix listings hosted on different partner domains.
    fn parse_detail(&self, link: &str, html: &str) -> Result<DetailPage, ExtractError>;

    /// Whether listings on this site have a detail page of their own.
    /// When false the index block carries everything, `parse_detail` is
    /// never called, and there is nothing for a backfill to revisit.
    fn has_detail_pages(&self) -> bool {
        true
    }

    /// Whether crawls of this site use the short retry backoff instead of
    /// the configured production one.
    fn fast_backoff(&self) -> bool {
        false
    }

    /// Whether backfill re-fetches of this site's detail pages must go
    /// through the rendering proxy.
    fn backfill_via_proxy(&self) -> bool {
        false
    }
}

/// The adapter for a site.
pub fn adapter_for(site: Site) -> Arc<dyn SiteAdapter> {
    match site {
        Site::Hatomark => Arc::new(HatomarkAdapter),
        Site::Nifty => Arc::new(NiftyAdapter),
        Site::NiftyRental => Arc::new(NiftyRentalAdapter),
        Site::Sumai => Arc::new(SumaiAdapter),
    }
}

/// Parse a selector that is fixed at compile time.
pub(crate) fn sel(selector: &'static str) -> Selector {
    Selector::parse(selector).expect("static selector")
}

/// All text under an element, whitespace-collapsed.
pub(crate) fn text_of(el: ElementRef) -> String {
    el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text under an element excluding anything inside `<a>` descendants,
/// for blocks where the anchor text is navigation noise.
pub(crate) fn text_without_links(el: ElementRef) -> String {
    let mut out = String::new();
    collect_text_without_links(el, &mut out);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_text_without_links(el: ElementRef, out: &mut String) {
    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            if child_el.value().name() != "a" {
                collect_text_without_links(child_el, out);
            }
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        }
    }
}

/// Resolve a possibly relative href against the site origin. Absolute
/// hrefs (partner-domain listings) pass through untouched.
pub(crate) fn absolutize(origin: &str, href: &str) -> String {
    match url::Url::parse(origin).and_then(|base| base.join(href)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => href.to_string(),
    }
}

/// Remove duplicate URLs while preserving first-seen order.
pub(crate) fn dedupe_urls(urls: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    urls.into_iter().filter(|u| seen.insert(u.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn text_without_links_drops_anchor_text() {
        let html = Html::parse_fragment(
            r#"<div class="addr"> 北海道札幌市 <a href="/map">地図を見る</a> 中央区 </div>"#,
        );
        let div = html.select(&sel("div.addr")).next().unwrap();
        assert_eq!(text_without_links(div), "北海道札幌市 中央区");
    }

    #[test]
    fn dedupe_keeps_first_seen_order() {
        let urls = vec![
            "b.jpg".to_string(),
            "a.jpg".to_string(),
            "b.jpg".to_string(),
            "c.jpg".to_string(),
            "a.jpg".to_string(),
        ];
        assert_eq!(dedupe_urls(urls), vec!["b.jpg", "a.jpg", "c.jpg"]);
    }

    #[test]
    fn absolutize_only_touches_relative_hrefs() {
        assert_eq!(
            absolutize("https://myhome.nifty.com", "/bukken/1"),
            "https://myhome.nifty.com/bukken/1"
        );
        assert_eq!(
            absolutize("https://myhome.nifty.com", "https://www.pitat.com/x"),
            "https://www.pitat.com/x"
        );
    }
}
