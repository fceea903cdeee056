//! SQLite persistence for listing records, partitioned by source site.

mod listing;

pub use listing::ListingRepository;

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T, E = RepositoryError> = std::result::Result<T, E>;

/// Open (creating if needed) the database at `path` and initialize the
/// schema. Every worker checks its own connection out of this pool; a
/// handle is never shared across workers mid-request.
pub async fn create_pool(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}

async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS listings (
            id TEXT PRIMARY KEY,
            site TEXT NOT NULL,
            link TEXT NOT NULL,
            property_type TEXT,
            sale_price_usd REAL,
            sale_price_yen TEXT,
            location TEXT,
            prefecture TEXT,
            transportation TEXT,
            layout TEXT,
            building_area TEXT,
            land_area TEXT,
            construction_date TEXT,
            structure TEXT,
            contact_number TEXT,
            description TEXT,
            created_at TEXT NOT NULL,
            UNIQUE(site, link)
        );

        CREATE TABLE IF NOT EXISTS listing_images (
            listing_id TEXT NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            path TEXT NOT NULL,
            PRIMARY KEY (listing_id, position)
        );

        CREATE INDEX IF NOT EXISTS idx_listings_site_created
            ON listings(site, created_at);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    use std::str::FromStr;

    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();
    pool
}
