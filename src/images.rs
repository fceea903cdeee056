//! Image acquisition: download discovered URLs into per-listing storage
//! paths. Individual failures are logged and tolerated; a listing keeps
//! whatever images did succeed.

use std::path::PathBuf;

use tracing::warn;
use uuid::Uuid;

use crate::fetch::Fetch;
use crate::models::Site;

/// Filesystem image store rooted at the data directory. Stored paths are
/// relative (`images/<site>/<listing-id>/<name>.jpg`) so they can be served
/// verbatim by a static file server later.
#[derive(Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: PathBuf) -> Self {
        ImageStore { root }
    }

    /// Download one image into the listing's directory. Returns the stored
    /// relative path, or `None` on any failure (logged, never fatal).
    pub async fn save(
        &self,
        fetch: &dyn Fetch,
        url: &str,
        site: Site,
        listing_id: Uuid,
    ) -> Option<String> {
        let relative = format!("images/{}/{}/{}.jpg", site, listing_id, Uuid::new_v4());
        let absolute = self.root.join(&relative);

        let bytes = match fetch.fetch_bytes(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(url, error = %e, "image download failed");
                return None;
            }
        };

        if let Some(parent) = absolute.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(path = %parent.display(), error = %e, "could not create image directory");
                return None;
            }
        }

        if let Err(e) = tokio::fs::write(&absolute, &bytes).await {
            warn!(path = %absolute.display(), error = %e, "could not write image");
            return None;
        }

        Some(relative)
    }

    /// Remove a listing's image directory. Missing directories are fine;
    /// other failures are logged and left behind.
    pub async fn remove_listing_dir(&self, site: Site, listing_id: Uuid) {
        let dir = self.root.join(format!("images/{}/{}", site, listing_id));
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %dir.display(), error = %e, "could not remove image directory"),
        }
    }

    /// Download a batch in source order, keeping only the successes.
    pub async fn save_all(
        &self,
        fetch: &dyn Fetch,
        urls: &[String],
        site: Site,
        listing_id: Uuid,
    ) -> Vec<String> {
        let mut paths = Vec::with_capacity(urls.len());
        for url in urls {
            if let Some(path) = self.save(fetch, url, site, listing_id).await {
                paths.push(path);
            }
        }
        paths
    }
}
