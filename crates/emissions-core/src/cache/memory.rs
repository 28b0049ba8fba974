//! In-memory [`ResponseCache`] for tests and single-process embedding.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;

use super::{CoveredInterval, Generation, Payload, ResponseCache};

struct Entry {
    covered: CoveredInterval,
    payload: Payload,
}

#[derive(Default)]
struct State {
    entries: HashMap<Fingerprint, Entry>,
    generation: Generation,
}

/// `HashMap` behind a `RwLock`; invalidation scans every entry. The
/// generation lives under the same lock, so a conditional `store` and an
/// `invalidate` never interleave.
#[derive(Default)]
pub struct InMemoryCache {
    state: RwLock<State>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.state
            .read()
            .map(|s| s.entries.contains_key(fingerprint))
            .unwrap_or(false)
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::cache("in-memory cache lock poisoned")
}

#[async_trait]
impl ResponseCache for InMemoryCache {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<Payload>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.entries.get(fingerprint).map(|e| e.payload.clone()))
    }

    async fn generation(&self) -> Result<Generation> {
        Ok(self.state.read().map_err(poisoned)?.generation)
    }

    async fn store(
        &self,
        fingerprint: &Fingerprint,
        covered: CoveredInterval,
        payload: Payload,
        seen: Generation,
    ) -> Result<bool> {
        let mut state = self.state.write().map_err(poisoned)?;
        if state.generation != seen {
            return Ok(false);
        }
        state
            .entries
            .insert(fingerprint.clone(), Entry { covered, payload });
        Ok(true)
    }

    async fn invalidate(&self, earliest: DateTime<Utc>, latest: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.generation = state.generation.next();
        let before = state.entries.len();
        state
            .entries
            .retain(|_, e| !e.covered.overlaps(earliest, latest));
        Ok((before - state.entries.len()) as u64)
    }
}
