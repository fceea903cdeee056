//! CLI command implementations.

mod backfill;
mod cleanup;
mod crawl;
mod status;

pub use backfill::cmd_backfill;
pub use cleanup::cmd_cleanup;
pub use crawl::cmd_crawl;
pub use status::cmd_status;
