//! Listing CRUD over SQLite, scoped to site partitions.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

use super::Result;
use crate::models::{Listing, Site};

/// Row type for listing query mapping.
#[derive(sqlx::FromRow)]
struct ListingRow {
    id: String,
    link: String,
    property_type: Option<String>,
    sale_price_usd: Option<f64>,
    sale_price_yen: Option<String>,
    location: Option<String>,
    prefecture: Option<String>,
    transportation: Option<String>,
    layout: Option<String>,
    building_area: Option<String>,
    land_area: Option<String>,
    construction_date: Option<String>,
    structure: Option<String>,
    contact_number: Option<String>,
    description: Option<String>,
    created_at: String,
}

impl ListingRow {
    fn into_listing(self, images: Vec<String>) -> Listing {
        Listing {
            id: Uuid::parse_str(&self.id).unwrap_or_else(|_| Uuid::nil()),
            link: self.link,
            property_type: self.property_type,
            sale_price_usd: self.sale_price_usd,
            sale_price_yen: self.sale_price_yen,
            location: self.location,
            prefecture: self.prefecture,
            transportation: self.transportation,
            layout: self.layout,
            building_area: self.building_area,
            land_area: self.land_area,
            construction_date: self.construction_date,
            structure: self.structure,
            contact_number: self.contact_number,
            description: self.description,
            images,
            created_at: DateTime::parse_from_rfc3339(&self.created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        }
    }
}

const SELECT_COLUMNS: &str = "id, link, property_type, sale_price_usd, sale_price_yen, \
     location, prefecture, transportation, layout, building_area, land_area, \
     construction_date, structure, contact_number, description, created_at";

/// SQLite-backed repository for listing records.
#[derive(Clone)]
pub struct ListingRepository {
    pool: SqlitePool,
}

impl ListingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The duplicate gate: insert the record only if no record with the
    /// same link exists in this site partition. Returns whether a row was
    /// actually created. The check-then-insert is not transactional across
    /// concurrent driver runs, but the unique index makes the race lose a
    /// row rather than duplicate one.
    pub async fn insert_if_new(&self, site: Site, listing: &Listing) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let id = listing.id.to_string();
        let created_at = listing.created_at.to_rfc3339();
        let result = sqlx::query(
            r#"INSERT OR IGNORE INTO listings (
                id, site, link, property_type, sale_price_usd, sale_price_yen,
                location, prefecture, transportation, layout, building_area,
                land_area, construction_date, structure, contact_number,
                description, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(site.as_str())
        .bind(&listing.link)
        .bind(&listing.property_type)
        .bind(listing.sale_price_usd)
        .bind(&listing.sale_price_yen)
        .bind(&listing.location)
        .bind(&listing.prefecture)
        .bind(&listing.transportation)
        .bind(&listing.layout)
        .bind(&listing.building_area)
        .bind(&listing.land_area)
        .bind(&listing.construction_date)
        .bind(&listing.structure)
        .bind(&listing.contact_number)
        .bind(&listing.description)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            for (position, path) in listing.images.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO listing_images (listing_id, position, path) VALUES (?, ?, ?)",
                )
                .bind(&id)
                .bind(position as i64)
                .bind(path)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Whether a link is already known within the site partition.
    pub async fn link_exists(&self, site: Site, link: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM listings WHERE site = ? AND link = ?")
                .bind(site.as_str())
                .bind(link)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Listing>> {
        let id = id.to_string();
        let row: Option<ListingRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM listings WHERE id = ?"
        ))
        .bind(&id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let images = self.load_images(&row.id).await?;
                Ok(Some(row.into_listing(images)))
            }
            None => Ok(None),
        }
    }

    /// All records in a partition, newest first. Used by the liveness
    /// cleanup sweep.
    pub async fn all(&self, site: Site) -> Result<Vec<Listing>> {
        let rows: Vec<ListingRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM listings WHERE site = ? ORDER BY created_at DESC"
        ))
        .bind(site.as_str())
        .fetch_all(&self.pool)
        .await?;

        self.with_images(rows).await
    }

    /// Backfill candidates: contact number missing or empty, or exactly one
    /// stored image. Newest first, like the source feeds.
    pub async fn find_deficient(&self, site: Site) -> Result<Vec<Listing>> {
        let rows: Vec<ListingRow> = sqlx::query_as(&format!(
            r#"SELECT {SELECT_COLUMNS} FROM listings l
               WHERE l.site = ?
                 AND (l.contact_number IS NULL OR l.contact_number = ''
                      OR (SELECT COUNT(*) FROM listing_images i
                          WHERE i.listing_id = l.id) = 1)
               ORDER BY l.created_at DESC"#
        ))
        .bind(site.as_str())
        .fetch_all(&self.pool)
        .await?;

        self.with_images(rows).await
    }

    /// Append stored image paths after the existing ones, preserving order.
    /// Paths already present on the record are skipped, so re-running a
    /// backfill cannot duplicate entries.
    pub async fn append_images(&self, id: Uuid, paths: &[String]) -> Result<usize> {
        let id = id.to_string();
        let mut tx = self.pool.begin().await?;

        let existing: Vec<String> = sqlx::query_scalar(
            "SELECT path FROM listing_images WHERE listing_id = ? ORDER BY position",
        )
        .bind(&id)
        .fetch_all(&mut *tx)
        .await?;

        let mut position = existing.len() as i64;
        let mut appended = 0;
        for path in paths {
            if existing.iter().any(|p| p == path) {
                continue;
            }
            sqlx::query(
                "INSERT INTO listing_images (listing_id, position, path) VALUES (?, ?, ?)",
            )
            .bind(&id)
            .bind(position)
            .bind(path)
            .execute(&mut *tx)
            .await?;
            position += 1;
            appended += 1;
        }

        tx.commit().await?;
        Ok(appended)
    }

    /// Set the contact number only when the record has none. Never
    /// overwrites a present value.
    pub async fn set_contact_if_missing(&self, id: Uuid, contact: &str) -> Result<bool> {
        let id = id.to_string();
        let result = sqlx::query(
            r#"UPDATE listings SET contact_number = ?
               WHERE id = ? AND (contact_number IS NULL OR contact_number = '')"#,
        )
        .bind(contact)
        .bind(&id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let id = id.to_string();
        sqlx::query("DELETE FROM listings WHERE id = ?")
            .bind(&id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count(&self, site: Site) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM listings WHERE site = ?")
            .bind(site.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count_deficient(&self, site: Site) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM listings l
               WHERE l.site = ?
                 AND (l.contact_number IS NULL OR l.contact_number = ''
                      OR (SELECT COUNT(*) FROM listing_images i
                          WHERE i.listing_id = l.id) = 1)"#,
        )
        .bind(site.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn load_images(&self, listing_id: &str) -> Result<Vec<String>> {
        let paths: Vec<String> = sqlx::query_scalar(
            "SELECT path FROM listing_images WHERE listing_id = ? ORDER BY position",
        )
        .bind(listing_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(paths)
    }

    async fn with_images(&self, rows: Vec<ListingRow>) -> Result<Vec<Listing>> {
        let mut listings = Vec::with_capacity(rows.len());
        for row in rows {
            let images = self.load_images(&row.id).await?;
            listings.push(row.into_listing(images));
        }
        Ok(listings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory_pool;

    fn listing(link: &str) -> Listing {
        let mut l = Listing::new(link.to_string());
        l.location = Some("Shibuya, Tokyo".into());
        l.images = vec!["images/sumai/x/0.jpg".into()];
        l
    }

    #[tokio::test]
    async fn insert_is_gated_on_link() {
        let repo = ListingRepository::new(memory_pool().await);

        let first = listing("https://example.com/1");
        assert!(repo.insert_if_new(Site::Sumai, &first).await.unwrap());
        assert!(repo.link_exists(Site::Sumai, &first.link).await.unwrap());

        // Same link, different generated id: the gate rejects it.
        let second = listing("https://example.com/1");
        assert!(!repo.insert_if_new(Site::Sumai, &second).await.unwrap());
        assert_eq!(repo.count(Site::Sumai).await.unwrap(), 1);

        // Same link under a different partition is a different record.
        assert!(repo.insert_if_new(Site::Nifty, &second).await.unwrap());
    }

    #[tokio::test]
    async fn images_append_preserves_order_and_dedupes() {
        let repo = ListingRepository::new(memory_pool().await);
        let l = listing("https://example.com/2");
        repo.insert_if_new(Site::Sumai, &l).await.unwrap();

        let appended = repo
            .append_images(
                l.id,
                &[
                    "images/sumai/x/1.jpg".to_string(),
                    "images/sumai/x/2.jpg".to_string(),
                    // already stored at creation, must not duplicate
                    "images/sumai/x/0.jpg".to_string(),
                ],
            )
            .await
            .unwrap();
        assert_eq!(appended, 2);

        let stored = repo.get(l.id).await.unwrap().unwrap();
        assert_eq!(
            stored.images,
            vec!["images/sumai/x/0.jpg", "images/sumai/x/1.jpg", "images/sumai/x/2.jpg"]
        );
    }

    #[tokio::test]
    async fn contact_is_never_overwritten() {
        let repo = ListingRepository::new(memory_pool().await);
        let l = listing("https://example.com/3");
        repo.insert_if_new(Site::Nifty, &l).await.unwrap();

        assert!(repo.set_contact_if_missing(l.id, "03-1111-2222").await.unwrap());
        assert!(!repo.set_contact_if_missing(l.id, "03-9999-9999").await.unwrap());

        let stored = repo.get(l.id).await.unwrap().unwrap();
        assert_eq!(stored.contact_number.as_deref(), Some("03-1111-2222"));
    }

    #[tokio::test]
    async fn deficiency_query_matches_predicate() {
        let repo = ListingRepository::new(memory_pool().await);

        // one image, no contact: deficient
        let a = listing("https://example.com/a");
        repo.insert_if_new(Site::Sumai, &a).await.unwrap();

        // two images and a contact: complete
        let mut b = listing("https://example.com/b");
        b.images.push("images/sumai/y/1.jpg".into());
        b.contact_number = Some("03-0000-0000".into());
        repo.insert_if_new(Site::Sumai, &b).await.unwrap();

        let deficient = repo.find_deficient(Site::Sumai).await.unwrap();
        assert_eq!(deficient.len(), 1);
        assert_eq!(deficient[0].link, a.link);
        assert_eq!(repo.count_deficient(Site::Sumai).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_cascades_to_images() {
        let repo = ListingRepository::new(memory_pool().await);
        let l = listing("https://example.com/4");
        repo.insert_if_new(Site::Hatomark, &l).await.unwrap();

        repo.delete(l.id).await.unwrap();
        assert!(repo.get(l.id).await.unwrap().is_none());
        assert_eq!(repo.count(Site::Hatomark).await.unwrap(), 0);
    }
}
