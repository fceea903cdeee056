//! Crawl, normalize and store Japanese real-estate listings from several
//! source sites into one SQLite database, with image downloads, a backfill
//! pass for incomplete records, and a liveness sweep for dead ones.

pub mod backfill;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod crawl;
pub mod error;
pub mod fetch;
pub mod images;
pub mod logging;
pub mod models;
pub mod repository;
pub mod scrape;
pub mod translate;
