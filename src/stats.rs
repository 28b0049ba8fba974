//! Database statistics overview for `emissions stats`.

use anyhow::Result;

use emissions_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

struct CacheStats {
    entries: i64,
    unbounded: i64,
    bytes: i64,
    oldest: Option<i64>,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let summary = store.stats().await?;

    let (entries, unbounded, bytes, oldest): (i64, i64, Option<i64>, Option<i64>) =
        sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(CASE WHEN covered_begin IS NULL OR covered_end IS NULL THEN 1 END),
                SUM(LENGTH(payload)),
                MIN(created_at)
            FROM response_cache
            "#,
        )
        .fetch_one(&pool)
        .await?;
    let cache = CacheStats {
        entries,
        unbounded,
        bytes: bytes.unwrap_or(0),
        oldest,
    };

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Emissions API: Database Stats");
    println!("=============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Points:      {}", summary.points);
    println!("  Files:       {}", summary.imported_files);
    match (summary.earliest, summary.latest) {
        (Some(first), Some(last)) => println!(
            "  Time range:  {} .. {}",
            first.format("%Y-%m-%d %H:%M:%S"),
            last.format("%Y-%m-%d %H:%M:%S")
        ),
        _ => println!("  Time range:  (empty)"),
    }
    println!();
    println!(
        "  Cache:       {} entries ({} open-ended), {}{}",
        cache.entries,
        cache.unbounded,
        format_bytes(cache.bytes.max(0) as u64),
        if config.cache.enabled { "" } else { " [disabled]" }
    );
    if let Some(ts) = cache.oldest {
        println!("  Oldest:      {}", format_ts(ts));
    }
    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
