//! # Emissions API
//!
//! A geospatial time-series store for satellite emission measurements,
//! with a cached HTTP query API.
//!
//! Points are imported from CSV files into SQLite, queried by region and
//! time window, and aggregated into daily averages or per-interval
//! statistics. Responses are memoized in a response cache whose entries are
//! invalidated whenever an import touches the time window they cover.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌───────────────────────┐
//! │ CSV files  │──▶│ QueryService │──▶│ SQLite                │
//! │ (import)   │   │   ::ingest   │   │ measurements          │
//! └────────────┘   └──────┬───────┘   │ imported_files        │
//!                         │           │ response_cache        │
//!              invalidate │           └──────────┬────────────┘
//!                         ▼                      │
//!                 ┌──────────────┐               │
//!                 │ ResponseCache│◀── lookup ────┤
//!                 └──────────────┘               │
//!                      ┌─────────────────────────┤
//!                      ▼                         ▼
//!                 ┌───────────┐            ┌──────────┐
//!                 │    CLI    │            │   HTTP   │
//!                 │(emissions)│            │ /api/v1  │
//!                 └───────────┘            └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! emissions init                          # create database
//! emissions import data/2019-02-*.csv     # load measurements
//! emissions points --country DE --begin 2019-02-01 --end 2019-02-02
//! emissions statistics --interval week --country DE
//! emissions serve                         # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`telemetry`] | Logging setup |
//! | [`db`] | Database connection pool |
//! | [`migrate`] | Schema migrations |
//! | [`session`] | Scoped transactions |
//! | [`sqlite_store`] | SQLite [`Store`](emissions_core::store::Store) |
//! | [`sqlite_cache`] | SQLite [`ResponseCache`](emissions_core::cache::ResponseCache) |
//! | [`params`] | Request parameter parsing |
//! | [`import`] | CSV import driver |
//! | [`server`] | HTTP server |
//! | [`stats`] | Database statistics |

pub mod config;
pub mod db;
pub mod import;
pub mod migrate;
pub mod params;
pub mod server;
pub mod session;
pub mod sqlite_cache;
pub mod sqlite_store;
pub mod stats;
pub mod telemetry;
