//! Backfill pass: revisits stored records that are missing a contact
//! number or hold only their cover image, and completes them from the
//! detail page. Sites whose galleries are assembled client-side get their
//! pages through the rendering proxy; the caller picks the fetcher.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::fetch::Fetch;
use crate::images::ImageStore;
use crate::models::Listing;
use crate::repository::ListingRepository;
use crate::scrape::SiteAdapter;

/// Aggregated result of one backfill run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackfillSummary {
    pub examined: usize,
    pub contacts_set: usize,
    pub galleries_filled: usize,
    pub failed: usize,
}

pub struct BackfillRunner {
    adapter: Arc<dyn SiteAdapter>,
    fetcher: Arc<dyn Fetch>,
    repo: ListingRepository,
    images: ImageStore,
    workers: usize,
    /// Random pause before each detail fetch, to spread the burst of
    /// requests a backfill otherwise fires at once. Zeroed in tests.
    pause: Duration,
}

#[derive(Debug, Default)]
struct RecordResult {
    contact_set: bool,
    gallery_filled: bool,
}

impl BackfillRunner {
    pub fn new(
        adapter: Arc<dyn SiteAdapter>,
        fetcher: Arc<dyn Fetch>,
        repo: ListingRepository,
        images: ImageStore,
        workers: usize,
    ) -> Self {
        BackfillRunner {
            adapter,
            fetcher,
            repo,
            images,
            workers: workers.max(1),
            pause: Duration::from_secs(2),
        }
    }

    pub fn without_pause(mut self) -> Self {
        self.pause = Duration::ZERO;
        self
    }

    pub async fn run(&self) -> Result<BackfillSummary, Error> {
        let site = self.adapter.site();
        let deficient = self.repo.find_deficient(site).await?;
        info!(%site, records = deficient.len(), "backfill starting");

        let mut summary = BackfillSummary {
            examined: deficient.len(),
            ..Default::default()
        };

        let mut results = stream::iter(deficient)
            .map(|record| async move {
                let link = record.link.clone();
                (link, self.revisit(record).await)
            })
            .buffer_unordered(self.workers);

        while let Some((link, outcome)) = results.next().await {
            match outcome {
                Ok(result) => {
                    if result.contact_set {
                        summary.contacts_set += 1;
                    }
                    if result.gallery_filled {
                        summary.galleries_filled += 1;
                    }
                }
                Err(e) if e.is_schema_change() => {
                    error!(%site, %link, error = %e, "detail markup changed, backfill aborted");
                    return Err(e);
                }
                Err(e) => {
                    warn!(%site, %link, error = %e, "backfill failed for record");
                    summary.failed += 1;
                }
            }
        }

        info!(
            %site,
            contacts = summary.contacts_set,
            galleries = summary.galleries_filled,
            failed = summary.failed,
            "backfill finished"
        );
        Ok(summary)
    }

    async fn revisit(&self, record: Listing) -> Result<RecordResult, Error> {
        if !self.pause.is_zero() {
            let jittered = self.pause.mul_f64(0.5 + rand::random::<f64>());
            tokio::time::sleep(jittered).await;
        }

        let site = self.adapter.site();
        let page = self.fetcher.fetch(&record.link).await?;
        let detail = self.adapter.parse_detail(&record.link, &page.body)?;

        let mut result = RecordResult::default();

        let contact_missing = record
            .contact_number
            .as_deref()
            .map_or(true, str::is_empty);
        if contact_missing {
            if let Some(contact) = &detail.contact_number {
                result.contact_set = self.repo.set_contact_if_missing(record.id, contact).await?;
            }
        }

        // A single stored image is the cover shot the index page carried;
        // the rest of the gallery starts at the second URL.
        if record.images.len() == 1 && detail.image_urls.len() > 1 {
            let rest = &detail.image_urls[1..];
            let paths = self
                .images
                .save_all(self.fetcher.as_ref(), rest, site, record.id)
                .await;
            if !paths.is_empty() {
                let appended = self.repo.append_images(record.id, &paths).await?;
                result.gallery_filled = appended > 0;
            }
        }

        debug!(
            %site,
            link = %record.link,
            contact = result.contact_set,
            gallery = result.gallery_filled,
            "record revisited"
        );
        Ok(result)
    }
}
