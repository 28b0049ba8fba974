//! # Emissions Core
//!
//! Storage-agnostic logic for the Emissions API: data models, the filter
//! builder, aggregation, request fingerprints, and the [`store::Store`] and
//! [`cache::ResponseCache`] abstractions that the read and ingest paths
//! run through.
//!
//! This crate contains no sqlx, tokio, or HTTP dependencies. The SQLite
//! adapters, configuration, CLI, and server live in the `emissions-api`
//! package.
//!
//! ## Read path
//!
//! ```text
//! request ─▶ Fingerprint ─▶ ResponseCache::lookup ──hit──▶ decode payload
//!                                   │
//!                                  miss
//!                                   ▼
//!                 Store::query_points / Store::aggregate
//!                                   │
//!                                   ▼
//!              ResponseCache::store(fingerprint, covered interval)
//! ```
//!
//! ## Write path
//!
//! `Store::ingest` commits points and the ledger mark, then
//! `ResponseCache::invalidate` drops every entry whose covered interval
//! overlaps the batch. See [`service::QueryService`].

pub mod aggregate;
pub mod cache;
pub mod error;
pub mod filter;
pub mod fingerprint;
pub mod geometry;
pub mod models;
pub mod regions;
pub mod service;
pub mod store;

pub use error::{Error, Result};
