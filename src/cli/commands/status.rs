//! Status command.

use console::style;

use crate::config::Settings;
use crate::models::Site;
use crate::repository::{create_pool, ListingRepository};

/// Show stored record counts per site.
pub async fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    let db_path = settings.database_path();
    if !db_path.exists() {
        println!(
            "{} No database at {}. Run 'akiya crawl' first.",
            style("!").yellow(),
            db_path.display()
        );
        return Ok(());
    }

    let pool = create_pool(&db_path).await?;
    let repo = ListingRepository::new(pool);

    println!("\n{}", style("Stored Listings").bold());
    println!("{}", "-".repeat(44));
    println!("{:<12} {:>10} {:>12}", "Site", "Records", "Deficient");
    println!("{}", "-".repeat(44));

    let mut total = 0;
    for site in Site::all() {
        let count = repo.count(site).await?;
        let deficient = repo.count_deficient(site).await?;
        total += count;
        println!("{:<12} {:>10} {:>12}", site.as_str(), count, deficient);
    }

    println!("{}", "-".repeat(44));
    println!("{:<12} {:>10}", "total", total);

    Ok(())
}
