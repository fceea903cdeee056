//! Error types for the crawl pipeline.

use thiserror::Error;

/// Failure while fetching a page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),

    /// All retry attempts were consumed. `last_status` carries the final
    /// HTTP status when the upstream answered at all.
    #[error("retries exhausted after {attempts} attempts for {url}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_status: Option<u16>,
    },

    #[error("rendering proxy returned an unusable response for {url}: {reason}")]
    Render { url: String, reason: String },
}

impl FetchError {
    /// The last HTTP status observed before giving up, if any.
    pub fn last_status(&self) -> Option<u16> {
        match self {
            FetchError::RetriesExhausted { last_status, .. } => *last_status,
            _ => None,
        }
    }
}

/// A source-site label fell outside the closed mapping tables. This means
/// the upstream markup changed and the adapter needs updating. It is never
/// swallowed at the listing level.
#[derive(Debug, Error)]
#[error("unknown field label {label:?} in {table} table")]
pub struct SchemaError {
    pub table: &'static str,
    pub label: String,
}

/// Failure while extracting a record from fetched markup.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// An element essential to the whole page is absent.
    #[error("expected element not found: {0}")]
    MissingElement(&'static str),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Failure from an external translation or FX-rate service.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("translation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("translation service returned no result")]
    EmptyResponse,

    #[error("rate service had no {0} rate")]
    MissingRate(String),
}

/// Umbrella error for crawl and backfill workers.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error(transparent)]
    Repository(#[from] crate::repository::RepositoryError),
}

impl Error {
    /// True when the underlying cause is an un-mapped source label,
    /// i.e. an upstream schema change that must surface loudly.
    pub fn is_schema_change(&self) -> bool {
        matches!(self, Error::Extract(ExtractError::Schema(_)))
    }
}
