//! Liveness sweep: re-checks every stored record against its source page
//! and removes records whose pages are gone, along with their images.
//! Fetches are single-attempt so a definitive 404 is seen as such instead
//! of being retried into a timeout.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::error::{Error, FetchError};
use crate::fetch::Fetch;
use crate::images::ImageStore;
use crate::models::{Listing, Site};
use crate::repository::ListingRepository;

/// Statuses that mean the listing no longer exists upstream. Transient
/// server errors and rate limiting do not qualify.
const GONE_STATUSES: [u16; 2] = [404, 410];

/// Aggregated result of one cleanup run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupSummary {
    pub examined: usize,
    pub removed: usize,
    pub failed: usize,
}

pub struct CleanupSweep {
    site: Site,
    fetcher: Arc<dyn Fetch>,
    repo: ListingRepository,
    images: ImageStore,
    workers: usize,
}

impl CleanupSweep {
    pub fn new(
        site: Site,
        fetcher: Arc<dyn Fetch>,
        repo: ListingRepository,
        images: ImageStore,
        workers: usize,
    ) -> Self {
        CleanupSweep {
            site,
            fetcher,
            repo,
            images,
            workers: workers.max(1),
        }
    }

    pub async fn run(&self) -> Result<CleanupSummary, Error> {
        let records = self.repo.all(self.site).await?;
        info!(site = %self.site, records = records.len(), "cleanup starting");

        let mut summary = CleanupSummary {
            examined: records.len(),
            ..Default::default()
        };

        let mut results = stream::iter(records)
            .map(|record| async move {
                let link = record.link.clone();
                (link, self.check(record).await)
            })
            .buffer_unordered(self.workers);

        while let Some((link, outcome)) = results.next().await {
            match outcome {
                Ok(true) => summary.removed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(site = %self.site, %link, error = %e, "liveness check failed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            site = %self.site,
            removed = summary.removed,
            failed = summary.failed,
            "cleanup finished"
        );
        Ok(summary)
    }

    /// Returns true when the record was removed.
    async fn check(&self, record: Listing) -> Result<bool, Error> {
        match self.fetcher.fetch(&record.link).await {
            Ok(_) => Ok(false),
            Err(e) if is_gone(&e) => {
                self.images.remove_listing_dir(self.site, record.id).await;
                self.repo.delete(record.id).await?;
                debug!(site = %self.site, link = %record.link, "removed dead listing");
                Ok(true)
            }
            Err(e) => Err(Error::Fetch(e)),
        }
    }
}

fn is_gone(e: &FetchError) -> bool {
    e.last_status().is_some_and(|s| GONE_STATUSES.contains(&s))
}
