// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Bounded, TTL-expiring, LRU-evicting store of fetched payloads

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::{CacheConfig, CacheEntry, CacheKey, CacheMetrics, Clock, SystemClock};
use crate::error::ConfigError;
use crate::scope::{is_superset, FetchParams, Scope, ScopeLevel};

/// What a [`CacheStore::set`] call changed besides inserting the entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetReport {
    pub key: CacheKey,
    /// Entry evicted to make room, if the store was full
    pub evicted: Option<CacheKey>,
    /// Expired entries dropped while making room
    pub expired: usize,
    /// Narrower entries now covered by the new one
    pub redundant: Vec<CacheKey>,
    /// False when nothing was written: caching is disabled, or the write was
    /// issued before an invalidation
    pub stored: bool,
}

impl SetReport {
    fn skipped(key: CacheKey) -> Self {
        Self {
            key,
            evicted: None,
            expired: 0,
            redundant: Vec::new(),
            stored: false,
        }
    }
}

struct StoreState<T> {
    entries: HashMap<CacheKey, CacheEntry<T>>,
    metrics: CacheMetrics,
    next_sequence: u64,
    generation: u64,
}

impl<T> StoreState<T> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            metrics: CacheMetrics::default(),
            next_sequence: 0,
            generation: 0,
        }
    }

    fn sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    fn sync_size(&mut self) {
        self.metrics.size = self.entries.len();
    }

    fn remove_expired(&mut self, now: Instant, config: &CacheConfig) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.is_expired(now, config.max_age));
        let removed = before - self.entries.len();
        self.metrics.expirations += removed as u64;
        removed
    }

    /// Evict the least recently accessed entry, earliest insertion on ties
    fn evict_lru(&mut self) -> Option<CacheKey> {
        let key = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| (entry.last_accessed_at, entry.sequence))
            .map(|(key, _)| key.clone())?;

        self.entries.remove(&key);
        self.metrics.evictions += 1;
        Some(key)
    }
}

/// Keyed store of cache entries for one payload type
///
/// All entries and counters sit behind one mutex, so every read-modify-write
/// sequence (lookup plus expiry delete, insert plus eviction plus redundancy
/// cleanup) is atomic. No method awaits.
pub struct CacheStore<T> {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<StoreState<T>>,
}

impl<T: Clone> CacheStore<T> {
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            config,
            clock,
            state: Mutex::new(StoreState::new()),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Current invalidation generation, bumped by every `invalidate` and `clear`
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Insert or overwrite the entry for `(scope, params)`
    ///
    /// A full store first drops expired entries, then evicts the least
    /// recently accessed one. Entries whose scope is strictly narrower and
    /// whose range is contained by `params` are removed afterwards.
    pub fn set(&self, scope: &Scope, params: &FetchParams, payload: T) -> SetReport {
        self.insert(scope, params, payload, None)
    }

    /// Like [`set`](Self::set), but writes nothing if the store was
    /// invalidated since `generation` was read
    pub fn set_if_current(
        &self,
        scope: &Scope,
        params: &FetchParams,
        payload: T,
        generation: u64,
    ) -> SetReport {
        self.insert(scope, params, payload, Some(generation))
    }

    fn insert(
        &self,
        scope: &Scope,
        params: &FetchParams,
        payload: T,
        generation: Option<u64>,
    ) -> SetReport {
        let key = CacheKey::new(scope, params);
        if !self.config.enabled {
            return SetReport::skipped(key);
        }

        let now = self.clock.now();
        let mut state = self.state.lock();
        if generation.is_some_and(|generation| generation != state.generation) {
            drop(state);
            log::debug!("Discarded write for {}: invalidated while in flight", key);
            return SetReport::skipped(key);
        }

        let mut report = SetReport::skipped(key.clone());
        report.stored = true;

        if !state.entries.contains_key(&key) && state.entries.len() >= self.config.max_entries {
            report.expired = state.remove_expired(now, &self.config);
            if state.entries.len() >= self.config.max_entries {
                report.evicted = state.evict_lru();
            }
        }

        let sequence = state.sequence();
        state.entries.insert(
            key,
            CacheEntry::new(payload, scope.clone(), params.clone(), now, sequence),
        );

        let redundant: Vec<CacheKey> = state
            .entries
            .iter()
            .filter(|(_, entry)| {
                is_superset(scope, &entry.scope)
                    && params.same_filters(&entry.params)
                    && params.contains(&entry.params)
            })
            .map(|(key, _)| key.clone())
            .collect();

        for redundant_key in &redundant {
            state.entries.remove(redundant_key);
        }
        state.metrics.evictions += redundant.len() as u64;
        state.sync_size();
        drop(state);

        if let Some(evicted) = &report.evicted {
            log::debug!("Evicted least recently used cache entry {}", evicted);
        }
        if !redundant.is_empty() {
            log::debug!(
                "Removed {} cache entries covered by {}",
                redundant.len(),
                report.key
            );
        }
        report.redundant = redundant;
        report
    }

    /// Exact lookup, touching the entry on a live hit
    pub fn get(&self, scope: &Scope, params: &FetchParams) -> Option<T> {
        self.lookup(scope, params).map(CacheEntry::into_payload)
    }

    /// Exact lookup returning the whole entry snapshot
    pub fn lookup(&self, scope: &Scope, params: &FetchParams) -> Option<CacheEntry<T>> {
        if !self.config.enabled {
            return None;
        }

        let key = CacheKey::new(scope, params);
        let now = self.clock.now();
        let mut state = self.state.lock();

        let expired = state.entries.get(&key)?.is_expired(now, self.config.max_age);
        if expired {
            state.entries.remove(&key);
            state.metrics.expirations += 1;
            state.sync_size();
            log::debug!("Cache entry {} expired", key);
            return None;
        }

        let entry = state.entries.get_mut(&key)?;
        entry.touch(now);
        Some(entry.clone())
    }

    /// Exact lookup of a live entry that neither touches it nor expires it
    pub fn peek(&self, scope: &Scope, params: &FetchParams) -> Option<T> {
        let key = CacheKey::new(scope, params);
        let now = self.clock.now();
        self.state
            .lock()
            .entries
            .get(&key)
            .filter(|entry| !entry.is_expired(now, self.config.max_age))
            .map(|entry| entry.payload.clone())
    }

    /// Mark the live entry for `(scope, params)` as accessed
    pub fn touch(&self, scope: &Scope, params: &FetchParams) -> bool {
        let key = CacheKey::new(scope, params);
        let now = self.clock.now();
        let mut state = self.state.lock();
        match state.entries.get_mut(&key) {
            Some(entry) if !entry.is_expired(now, self.config.max_age) => {
                entry.touch(now);
                true
            }
            _ => false,
        }
    }

    /// Whether a live entry exists for `(scope, params)`, without touching it
    pub fn contains(&self, scope: &Scope, params: &FetchParams) -> bool {
        let key = CacheKey::new(scope, params);
        let now = self.clock.now();
        self.state
            .lock()
            .entries
            .get(&key)
            .is_some_and(|entry| !entry.is_expired(now, self.config.max_age))
    }

    /// Find a live entry whose scope strictly contains `scope` and whose range
    /// contains the requested range
    ///
    /// Among several candidates the narrowest wins: lowest level, then shortest
    /// date span, then earliest insertion. The entry is not touched; callers
    /// [`touch`](Self::touch) it once it actually answered a request.
    pub fn find_superset(&self, scope: &Scope, params: &FetchParams) -> Option<CacheEntry<T>> {
        if !self.config.enabled || scope.level() == ScopeLevel::Account {
            return None;
        }

        let now = self.clock.now();
        let state = self.state.lock();

        state
            .entries
            .values()
            .filter(|entry| {
                !entry.is_expired(now, self.config.max_age)
                    && is_superset(&entry.scope, scope)
                    && entry.params.same_filters(params)
                    && entry.params.contains(params)
            })
            .min_by_key(|entry| {
                (
                    entry.scope.level().ordinal(),
                    entry.params.span_days(),
                    entry.sequence,
                )
            })
            .cloned()
    }

    /// Find a live entry whose scope is strictly narrower than `scope` and
    /// whose range overlaps the requested range
    ///
    /// Only a hint that a broader fetch may pay off; the entry is not touched.
    pub fn find_overlapping_subset(
        &self,
        scope: &Scope,
        params: &FetchParams,
    ) -> Option<CacheEntry<T>> {
        if !self.config.enabled || scope.level() == ScopeLevel::Keyset {
            return None;
        }

        let now = self.clock.now();
        let state = self.state.lock();

        state
            .entries
            .values()
            .filter(|entry| {
                !entry.is_expired(now, self.config.max_age)
                    && is_superset(scope, &entry.scope)
                    && entry.params.same_filters(params)
                    && entry.params.overlaps(params)
            })
            .min_by_key(|entry| entry.sequence)
            .cloned()
    }

    /// Remove entries related to `scope`, or everything when `None`
    ///
    /// Restricted to the scope's account: an Account scope drops all of the
    /// account's entries, an App scope drops the app and its keysets, a Keyset
    /// scope drops that keyset. Broader entries that embed the invalidated node
    /// are dropped too. Returns the number of entries removed.
    ///
    /// Bumps the generation, so writes guarded by an older one are discarded.
    pub fn invalidate(&self, scope: Option<&Scope>) -> usize {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.generation += 1;

        match scope {
            None => state.entries.clear(),
            Some(target) => state
                .entries
                .retain(|_, entry| !invalidated_by(target, &entry.scope)),
        }

        let removed = before - state.entries.len();
        state.sync_size();
        drop(state);

        match scope {
            Some(target) => log::info!("Invalidated {} cache entries for {}", removed, target),
            None => log::info!("Invalidated all {} cache entries", removed),
        }
        removed
    }

    pub fn clear(&self) {
        self.invalidate(None);
    }

    /// Drop every expired entry, returning how many were removed
    pub fn prune_expired(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let removed = state.remove_expired(now, &self.config);
        state.sync_size();
        removed
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries in insertion order, for diagnostics
    pub fn snapshot(&self) -> Vec<CacheEntry<T>> {
        let state = self.state.lock();
        let mut entries: Vec<CacheEntry<T>> = state.entries.values().cloned().collect();
        entries.sort_by_key(|entry| entry.sequence);
        entries
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.state.lock().metrics
    }

    /// Zero every counter; `size` keeps tracking the live entry count
    pub fn reset_metrics(&self) {
        let mut state = self.state.lock();
        state.metrics = CacheMetrics::default();
        state.sync_size();
    }

    pub(crate) fn update_metrics<F: FnOnce(&mut CacheMetrics)>(&self, update: F) {
        update(&mut self.state.lock().metrics);
    }
}

fn invalidated_by(target: &Scope, candidate: &Scope) -> bool {
    if candidate.account_id() != target.account_id() {
        return false;
    }

    let matches = match target.level() {
        ScopeLevel::Account => true,
        ScopeLevel::App => candidate.app_id() == target.app_id(),
        ScopeLevel::Keyset => candidate.key_id() == target.key_id(),
    };

    matches || is_superset(candidate, target)
}
