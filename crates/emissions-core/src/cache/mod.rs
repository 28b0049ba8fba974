//! Response cache abstraction.
//!
//! A [`ResponseCache`] memoizes encoded responses under a
//! [`Fingerprint`], each tagged with the [`CoveredInterval`] of timestamps
//! it was computed from. Writes to the store call
//! [`invalidate`](ResponseCache::invalidate) with the span they touched,
//! which removes every entry whose interval overlaps it.
//!
//! Entries move `absent → present → absent`: `store` is an atomic conditional upsert,
//! `invalidate` an atomic delete. There is no TTL and no background sweep.
//!
//! Every `invalidate` also advances the cache's [`Generation`]. A reader
//! reads the generation before it computes a response and hands it back to
//! `store`, which writes nothing if an invalidation ran in between. A
//! response computed from data older than a committed write therefore
//! never lands in the cache.
//!
//! Backends report failures as [`Error::CacheUnavailable`]; the
//! [`QueryService`](crate::service::QueryService) turns them into misses.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::filter::TimeRange;
use crate::fingerprint::Fingerprint;

/// Timestamp range a cached response depends on, `[begin, end)`.
/// `None` is unbounded on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoveredInterval {
    pub begin: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl CoveredInterval {
    pub fn new(begin: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { begin, end }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Whether a write touching `[earliest, latest]` may affect this entry.
    ///
    /// Disjoint only when the entry provably ends at or before `earliest`
    /// or begins after `latest`. An unbounded side never proves
    /// disjointness.
    pub fn overlaps(&self, earliest: DateTime<Utc>, latest: DateTime<Utc>) -> bool {
        let before = self.end.is_some_and(|end| end <= earliest);
        let after = self.begin.is_some_and(|begin| begin > latest);
        !(before || after)
    }
}

impl From<&TimeRange> for CoveredInterval {
    fn from(range: &TimeRange) -> Self {
        Self {
            begin: range.begin(),
            end: range.end(),
        }
    }
}

/// Invalidation counter of a [`ResponseCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn new(value: u64) -> Self {
        Generation(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Generation(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque encoded response. The cache never looks inside; encoding and
/// decoding belong to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload(Vec<u8>);

impl Payload {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Payload(bytes)
    }

    /// JSON-encodes a response value.
    pub fn encode<T: Serialize>(value: &T) -> Result<Self> {
        serde_json::to_vec(value)
            .map(Payload)
            .map_err(|e| Error::cache(format!("failed to encode payload: {}", e)))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.0)
            .map_err(|e| Error::cache(format!("failed to decode payload: {}", e)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Storage for memoized responses.
///
/// | Method | Effect |
/// |--------|--------|
/// | [`lookup`](ResponseCache::lookup) | payload for a fingerprint, if present |
/// | [`generation`](ResponseCache::generation) | current invalidation counter |
/// | [`store`](ResponseCache::store) | insert or replace an entry unless invalidated since |
/// | [`invalidate`](ResponseCache::invalidate) | delete entries overlapping a write |
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<Payload>>;

    async fn generation(&self) -> Result<Generation>;

    /// Inserts or replaces the entry for `fingerprint`, provided the
    /// generation is still `seen`. Returns `false`, writing nothing, when
    /// an invalidation has run since `seen` was read. The check and the
    /// write are one atomic step.
    async fn store(
        &self,
        fingerprint: &Fingerprint,
        covered: CoveredInterval,
        payload: Payload,
        seen: Generation,
    ) -> Result<bool>;

    /// Deletes every entry overlapping `[earliest, latest]`, advances the
    /// generation, and returns how many entries were removed. The set of
    /// entries left behind is the same however often it runs.
    async fn invalidate(&self, earliest: DateTime<Utc>, latest: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
impl<T: ResponseCache + ?Sized> ResponseCache for Arc<T> {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<Payload>> {
        (**self).lookup(fingerprint).await
    }

    async fn generation(&self) -> Result<Generation> {
        (**self).generation().await
    }

    async fn store(
        &self,
        fingerprint: &Fingerprint,
        covered: CoveredInterval,
        payload: Payload,
        seen: Generation,
    ) -> Result<bool> {
        (**self).store(fingerprint, covered, payload, seen).await
    }

    async fn invalidate(&self, earliest: DateTime<Utc>, latest: DateTime<Utc>) -> Result<u64> {
        (**self).invalidate(earliest, latest).await
    }
}

/// A cache that never holds anything. Selected by `[cache] enabled = false`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledCache;

#[async_trait]
impl ResponseCache for DisabledCache {
    async fn lookup(&self, _fingerprint: &Fingerprint) -> Result<Option<Payload>> {
        Ok(None)
    }

    async fn generation(&self) -> Result<Generation> {
        Ok(Generation::default())
    }

    async fn store(
        &self,
        _fingerprint: &Fingerprint,
        _covered: CoveredInterval,
        _payload: Payload,
        _seen: Generation,
    ) -> Result<bool> {
        Ok(false)
    }

    async fn invalidate(&self, _earliest: DateTime<Utc>, _latest: DateTime<Utc>) -> Result<u64> {
        Ok(0)
    }
}
