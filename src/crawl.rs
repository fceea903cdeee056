//! Crawl driver: walks every scope of a site adapter page by page, gates
//! each listing on the (site, link) duplicate key, normalizes the draft
//! fields and stores new records with their images.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{Error, ExtractError};
use crate::fetch::Fetch;
use crate::images::ImageStore;
use crate::models::{CrawlScope, DraftFields, DuplicatePolicy, FieldText, IndexBlock, Listing};
use crate::repository::ListingRepository;
use crate::scrape::SiteAdapter;
use crate::translate::{convert_to_usd, derive_prefecture, RateProvider, TextTranslator};

/// Hard upper bound on pages per scope, in case a site starts serving the
/// same non-empty page forever.
const MAX_PAGES_CEILING: u32 = 10_000;

/// Aggregated result of one crawl run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CrawlSummary {
    pub scopes: usize,
    pub failed_scopes: usize,
    pub inserted: usize,
    pub skipped_listings: usize,
}

#[derive(Debug, Default)]
struct ScopeResult {
    inserted: usize,
    skipped: usize,
    failed: bool,
}

enum ItemOutcome {
    Inserted,
    AlreadyStored,
}

#[derive(Clone)]
pub struct CrawlDriver {
    adapter: Arc<dyn SiteAdapter>,
    fetcher: Arc<dyn Fetch>,
    translator: Arc<dyn TextTranslator>,
    rates: Arc<dyn RateProvider>,
    repo: ListingRepository,
    images: ImageStore,
    workers: usize,
    max_pages: u32,
}

impl CrawlDriver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        adapter: Arc<dyn SiteAdapter>,
        fetcher: Arc<dyn Fetch>,
        translator: Arc<dyn TextTranslator>,
        rates: Arc<dyn RateProvider>,
        repo: ListingRepository,
        images: ImageStore,
        workers: usize,
    ) -> Self {
        CrawlDriver {
            adapter,
            fetcher,
            translator,
            rates,
            repo,
            images,
            workers: workers.max(1),
            max_pages: MAX_PAGES_CEILING,
        }
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.clamp(1, MAX_PAGES_CEILING);
        self
    }

    /// Crawl every scope of the site, at most `workers` scopes in flight.
    pub async fn run(&self) -> CrawlSummary {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        for scope in self.adapter.scopes() {
            let driver = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("crawl semaphore closed");

                // Sites with a second enumeration level expand the scope
                // here; the expanded page sequences run back to back under
                // the same permit.
                let concrete = match driver
                    .adapter
                    .discover_scopes(driver.fetcher.as_ref(), &scope)
                    .await
                {
                    Ok(scopes) => scopes,
                    Err(e) => {
                        error!(
                            site = %driver.adapter.site(),
                            scope = %scope.name,
                            error = %e,
                            "scope discovery failed"
                        );
                        return ScopeResult {
                            failed: true,
                            ..ScopeResult::default()
                        };
                    }
                };

                let mut result = ScopeResult::default();
                for scope in &concrete {
                    let part = driver.crawl_scope(scope).await;
                    result.inserted += part.inserted;
                    result.skipped += part.skipped;
                    result.failed |= part.failed;
                }
                result
            });
        }

        let mut summary = CrawlSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    summary.scopes += 1;
                    summary.inserted += result.inserted;
                    summary.skipped_listings += result.skipped;
                    if result.failed {
                        summary.failed_scopes += 1;
                    }
                }
                Err(e) => {
                    error!(site = %self.adapter.site(), error = %e, "scope task panicked");
                    summary.scopes += 1;
                    summary.failed_scopes += 1;
                }
            }
        }

        info!(
            site = %self.adapter.site(),
            scopes = summary.scopes,
            failed = summary.failed_scopes,
            inserted = summary.inserted,
            "crawl finished"
        );
        summary
    }

    async fn crawl_scope(&self, scope: &CrawlScope) -> ScopeResult {
        let site = self.adapter.site();
        let mut result = ScopeResult::default();

        let mut page = 0;
        'pages: loop {
            page += 1;
            if page > self.max_pages {
                if self.max_pages == MAX_PAGES_CEILING {
                    // A scope should always end on an empty page or a
                    // known link; reaching the ceiling means the adapter
                    // is broken or the site serves endless pages.
                    error!(%site, scope = %scope.name, ceiling = self.max_pages, "page ceiling hit");
                    result.failed = true;
                } else {
                    debug!(%site, scope = %scope.name, limit = self.max_pages, "page limit reached");
                }
                break;
            }

            let url = self.adapter.page_url(scope, page);
            let fetched = match self.fetcher.fetch(&url).await {
                Ok(page) => page,
                Err(e) => {
                    error!(%site, scope = %scope.name, page, error = %e, "index fetch failed");
                    result.failed = true;
                    break;
                }
            };

            let blocks = match self.adapter.parse_index(&fetched.body) {
                Ok(blocks) if blocks.is_empty() => {
                    debug!(%site, scope = %scope.name, page, "empty index page, scope done");
                    break;
                }
                Ok(blocks) => blocks,
                // Past-the-end pages drop the listing container entirely.
                Err(ExtractError::MissingElement(what)) => {
                    debug!(%site, scope = %scope.name, page, what, "no index container, scope done");
                    break;
                }
                Err(e @ ExtractError::Schema(_)) => {
                    error!(%site, scope = %scope.name, page, error = %e, "index markup changed");
                    result.failed = true;
                    break;
                }
            };

            for block in blocks {
                match self.process_listing(scope, block).await {
                    Ok(ItemOutcome::Inserted) => result.inserted += 1,
                    Ok(ItemOutcome::AlreadyStored) => {
                        match self.adapter.duplicate_policy() {
                            DuplicatePolicy::StopScope => {
                                debug!(%site, scope = %scope.name, page, "known listing, scope done");
                                break 'pages;
                            }
                            DuplicatePolicy::SkipListing => result.skipped += 1,
                        }
                    }
                    Err(e) if e.is_schema_change() => {
                        error!(%site, scope = %scope.name, error = %e, "listing markup changed");
                        result.failed = true;
                        break 'pages;
                    }
                    Err(Error::Translate(e)) => {
                        warn!(%site, scope = %scope.name, error = %e, "translation failed, listing dropped");
                        result.skipped += 1;
                    }
                    Err(Error::Extract(e)) => {
                        warn!(%site, scope = %scope.name, error = %e, "unusable detail page, listing dropped");
                        result.skipped += 1;
                    }
                    // One dead detail page or one failed write drops that
                    // listing alone; the rest of the page still runs.
                    Err(Error::Fetch(e)) => {
                        warn!(%site, scope = %scope.name, error = %e, "detail fetch failed, listing dropped");
                        result.skipped += 1;
                    }
                    Err(Error::Repository(e)) => {
                        warn!(%site, scope = %scope.name, error = %e, "listing not stored");
                        result.skipped += 1;
                    }
                }
            }
        }

        info!(
            %site,
            scope = %scope.name,
            inserted = result.inserted,
            skipped = result.skipped,
            failed = result.failed,
            "scope finished"
        );
        result
    }

    async fn process_listing(
        &self,
        scope: &CrawlScope,
        block: IndexBlock,
    ) -> Result<ItemOutcome, Error> {
        let site = self.adapter.site();
        let IndexBlock {
            link,
            fields,
            image_urls,
        } = block;
        if self.repo.link_exists(site, &link).await? {
            return Ok(ItemOutcome::AlreadyStored);
        }

        let (fields, contact_number, image_urls) = if self.adapter.has_detail_pages() {
            let detail_page = self.fetcher.fetch(&link).await?;
            let detail = self.adapter.parse_detail(&link, &detail_page.body)?;
            let mut fields = fields;
            fields.merge_missing(detail.fields);
            (fields, detail.contact_number, detail.image_urls)
        } else {
            // Everything this site publishes is on the index block.
            (fields, None, image_urls)
        };

        let mut listing = self.normalize(scope, link, fields).await?;
        listing.contact_number = contact_number;
        listing.images = self
            .images
            .save_all(self.fetcher.as_ref(), &image_urls, site, listing.id)
            .await;

        if self.repo.insert_if_new(site, &listing).await? {
            debug!(%site, link = %listing.link, "stored new listing");
            Ok(ItemOutcome::Inserted)
        } else {
            // Lost a race against another worker; the unique index held.
            Ok(ItemOutcome::AlreadyStored)
        }
    }

    /// Translate the raw fields, normalize the price to USD and resolve the
    /// prefecture token.
    async fn normalize(
        &self,
        scope: &CrawlScope,
        link: String,
        fields: DraftFields,
    ) -> Result<Listing, Error> {
        let mut listing = Listing::new(link);

        listing.property_type = self.finalize(fields.property_type).await?;
        listing.sale_price_yen = self.finalize(fields.price).await?;
        listing.location = self.finalize(fields.location).await?;
        listing.transportation = self.finalize(fields.transportation).await?;
        listing.layout = self.finalize(fields.layout).await?;
        listing.building_area = self.finalize(fields.building_area).await?;
        listing.land_area = self.finalize(fields.land_area).await?;
        listing.construction_date = self.finalize(fields.construction_date).await?;
        listing.structure = self.finalize(fields.structure).await?;
        listing.description = self.finalize(fields.description).await?;

        if let Some(price) = &listing.sale_price_yen {
            listing.sale_price_usd = convert_to_usd(price, self.rates.as_ref())
                .await
                .map_err(Error::Translate)?;
        }

        listing.prefecture = scope
            .prefecture
            .or_else(|| {
                listing
                    .location
                    .as_deref()
                    .and_then(derive_prefecture)
            })
            .map(str::to_string);

        Ok(listing)
    }

    async fn finalize(&self, field: Option<FieldText>) -> Result<Option<String>, Error> {
        match field {
            None => Ok(None),
            Some(FieldText::Final(text)) => Ok(Some(text)),
            Some(FieldText::Raw(text)) => {
                let translated = self
                    .translator
                    .translate(&text)
                    .await
                    .map_err(Error::Translate)?;
                Ok(Some(translated))
            }
        }
    }
}
