// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Hierarchy-aware caching
//!
//! This module provides:
//! - A bounded, TTL-expiring, LRU-evicting store of fetched payloads
//! - Hierarchy-aware lookup (exact hit, derivable from a superset, miss)
//! - Pluggable derivation strategies per payload category
//! - Process-lifetime metrics and a bounded event log

pub mod cache_config;
pub mod clock;
pub mod derivation;
pub mod hierarchy;
pub mod metrics;
pub mod store;

pub use cache_config::CacheConfig;
pub use clock::{Clock, ManualClock, SystemClock};
pub use derivation::{DerivationStrategy, IdentityFilter, NoDerivation, ScopedList};
pub use hierarchy::{CacheEvent, CacheHierarchyManager, CacheStrategy, StrategyCheck};
pub use metrics::CacheMetrics;
pub use store::{CacheStore, SetReport};

use std::fmt;
use std::time::{Duration, Instant};

use crate::scope::{FetchParams, Scope};

/// Deterministic exact-match key for a (scope, params) pair
///
/// Filters are rendered in sorted order, so identical requests always produce
/// identical keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(scope: &Scope, params: &FetchParams) -> Self {
        let mut key = format!(
            "{}|{}|{}|{}|{}",
            scope.level(),
            scope.account_id(),
            scope.app_id().unwrap_or("-"),
            scope.key_id().unwrap_or("-"),
            params.range_label(),
        );

        for (name, value) in params.filters() {
            key.push('|');
            key.push_str(name);
            key.push('=');
            key.push_str(value);
        }

        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cached payload with its bookkeeping
///
/// Owned by [`CacheStore`]; callers only ever see clones.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub(crate) payload: T,
    pub(crate) scope: Scope,
    pub(crate) params: FetchParams,
    pub(crate) fetched_at: Instant,
    pub(crate) last_accessed_at: Instant,
    pub(crate) access_count: u64,
    pub(crate) sequence: u64,
}

impl<T> CacheEntry<T> {
    pub(crate) fn new(
        payload: T,
        scope: Scope,
        params: FetchParams,
        now: Instant,
        sequence: u64,
    ) -> Self {
        Self {
            payload,
            scope,
            params,
            fetched_at: now,
            last_accessed_at: now,
            access_count: 0,
            sequence,
        }
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_payload(self) -> T {
        self.payload
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn params(&self) -> &FetchParams {
        &self.params
    }

    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    pub fn last_accessed_at(&self) -> Instant {
        self.last_accessed_at
    }

    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::new(&self.scope, &self.params)
    }

    pub fn is_expired(&self, now: Instant, max_age: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) > max_age
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_accessed_at = now;
        self.access_count += 1;
    }
}
