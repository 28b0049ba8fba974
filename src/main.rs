//! # Emissions CLI (`emissions`)
//!
//! The `emissions` binary initializes the database, imports measurement
//! files, runs queries, and starts the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! emissions --config ./config/emissions.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `emissions init` | Create the SQLite database and run schema migrations |
//! | `emissions import <csv>...` | Import measurement files (each at most once) |
//! | `emissions points` | Print matching points as GeoJSON |
//! | `emissions daily` | Print daily averages |
//! | `emissions statistics --interval <g>` | Print statistics per interval |
//! | `emissions invalidate --earliest <t> --latest <t>` | Drop overlapping cache entries |
//! | `emissions stats` | Show database and cache statistics |
//! | `emissions serve` | Start the HTTP server |

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use emissions_api::config::{self, Config};
use emissions_api::params::{parse_datetime, IntervalParam, QueryParams};
use emissions_api::server::{self, build_service};
use emissions_api::sqlite_cache::SqliteCache;
use emissions_api::{db, import, migrate, stats, telemetry};
use emissions_core::cache::ResponseCache;

/// Emissions API CLI: a geospatial time-series store for satellite
/// emission measurements.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "emissions",
    about = "Emissions API: store, query and serve satellite emission measurements",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/emissions.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Import CSV files of `value,longitude,latitude,timestamp` rows.
    ///
    /// A file whose name is already in the import ledger is skipped.
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print points matching the filter as a GeoJSON FeatureCollection.
    Points {
        #[command(flatten)]
        params: QueryParams,
    },

    /// Print daily averages over the matching points.
    Daily {
        #[command(flatten)]
        params: QueryParams,
    },

    /// Print statistics grouped by a truncation interval.
    Statistics {
        /// microseconds, milliseconds, second, minute, hour, day, week,
        /// month, quarter, year, decade, century or millennium.
        #[arg(long, default_value = "day")]
        interval: String,

        #[command(flatten)]
        params: QueryParams,
    },

    /// Drop cache entries overlapping `[earliest, latest]`.
    Invalidate {
        #[arg(long)]
        earliest: String,

        #[arg(long)]
        latest: String,
    },

    /// Show database and cache statistics.
    Stats,

    /// Start the HTTP server.
    Serve,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    telemetry::init(&cfg.logging);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { files } => {
            with_service(&cfg, |service| async move {
                import::run_import(&service, &files).await
            })
            .await?;
        }
        Commands::Points { params } => {
            let filter = params.filter()?;
            let page = params.pagination()?;
            with_service(&cfg, |service| async move {
                print_json(&service.points(&filter, &page).await?)
            })
            .await?;
        }
        Commands::Daily { params } => {
            let filter = params.filter()?;
            let page = params.pagination()?;
            with_service(&cfg, |service| async move {
                print_json(&service.daily_averages(&filter, &page).await?)
            })
            .await?;
        }
        Commands::Statistics { interval, params } => {
            let granularity = IntervalParam {
                interval: Some(interval),
            }
            .granularity()?;
            let filter = params.filter()?;
            let page = params.pagination()?;
            with_service(&cfg, |service| async move {
                print_json(&service.statistics(&filter, granularity, &page).await?)
            })
            .await?;
        }
        Commands::Invalidate { earliest, latest } => {
            let earliest = parse_datetime("earliest", &earliest)?;
            let latest = parse_datetime("latest", &latest)?;
            if earliest > latest {
                bail!("--earliest must not be after --latest");
            }
            let pool = db::connect(&cfg).await?;
            let removed = SqliteCache::new(pool.clone())
                .invalidate(earliest, latest)
                .await?;
            pool.close().await;
            println!("Removed {} cache entries.", removed);
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

/// Opens the pool, runs `f` against the configured service, and closes the
/// pool whether or not `f` succeeded.
async fn with_service<F, Fut>(cfg: &Config, f: F) -> Result<()>
where
    F: FnOnce(server::AppService) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let pool = db::connect(cfg).await?;
    let result = f(build_service(pool.clone(), cfg)).await;
    pool.close().await;
    result
}
