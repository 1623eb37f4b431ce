// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Hierarchy-aware lookup on top of a [`CacheStore`]

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::{
    CacheConfig, CacheEntry, CacheKey, CacheMetrics, CacheStore, Clock, DerivationStrategy,
    SetReport,
};
use crate::error::ConfigError;
use crate::fetch::InFlightRequestRegistry;
use crate::payload::Payload;
use crate::scope::{FetchParams, Scope};

/// How a request can be answered from the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheStrategy {
    /// Exact live entry
    Hit,
    /// A broader live entry covers the request; derivation may still decline
    Derivable,
    /// A narrower entry overlaps the request; a broader fetch could pay off
    SupersetNeeded,
    Miss,
}

impl CacheStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStrategy::Hit => "hit",
            CacheStrategy::Derivable => "derivable",
            CacheStrategy::SupersetNeeded => "superset_needed",
            CacheStrategy::Miss => "miss",
        }
    }
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a request plus the entry it matched
///
/// `entry` is the exact entry for `Hit`, the superset for `Derivable`, the
/// overlapping subset for `SupersetNeeded` and `None` for `Miss`.
#[derive(Debug, Clone)]
pub struct StrategyCheck<T> {
    pub strategy: CacheStrategy,
    pub entry: Option<CacheEntry<T>>,
}

/// Cache events for monitoring and debugging
#[derive(Debug, Clone)]
pub enum CacheEvent {
    Hit {
        key: CacheKey,
        timestamp: Instant,
    },
    Derivable {
        key: CacheKey,
        superset: CacheKey,
        timestamp: Instant,
    },
    DerivationDeclined {
        key: CacheKey,
        strategy: &'static str,
        timestamp: Instant,
    },
    SupersetNeeded {
        key: CacheKey,
        subset: CacheKey,
        timestamp: Instant,
    },
    Miss {
        key: CacheKey,
        timestamp: Instant,
    },
    Stored {
        key: CacheKey,
        evicted: Option<CacheKey>,
        redundant: usize,
        timestamp: Instant,
    },
    Invalidation {
        scope: Option<Scope>,
        affected_entries: usize,
        timestamp: Instant,
    },
}

/// Wraps a store with superset reasoning and a derivation strategy
///
/// Also owns the in-flight registry for fetches filling this store, so every
/// orchestrator over one manager collapses identical concurrent fetches.
pub struct CacheHierarchyManager<T> {
    store: CacheStore<T>,
    strategy: Arc<dyn DerivationStrategy<T>>,
    inflight: Arc<InFlightRequestRegistry<T>>,
    events: Mutex<VecDeque<CacheEvent>>,
    max_events: usize,
}

impl<T: Payload> CacheHierarchyManager<T> {
    /// Manager using the payload category's own derivation strategy
    pub fn for_payload(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        let store = CacheStore::with_clock(config, clock)?;
        Ok(Self::new(store, T::derivation_strategy()))
    }
}

impl<T: Clone> CacheHierarchyManager<T> {
    pub fn new(store: CacheStore<T>, strategy: Arc<dyn DerivationStrategy<T>>) -> Self {
        let max_events = store.config().max_events;
        Self {
            store,
            strategy,
            inflight: Arc::new(InFlightRequestRegistry::new()),
            events: Mutex::new(VecDeque::with_capacity(max_events.min(1024))),
            max_events,
        }
    }

    pub fn cache(&self) -> &CacheStore<T> {
        &self.store
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn inflight(&self) -> &Arc<InFlightRequestRegistry<T>> {
        &self.inflight
    }

    pub fn generation(&self) -> u64 {
        self.store.generation()
    }

    /// Classify a request against the cache
    ///
    /// Counts a hit, a derivation, or a miss. `SupersetNeeded` is resolved by a
    /// real fetch and is counted as a miss.
    pub fn check_strategy(&self, scope: &Scope, params: &FetchParams) -> StrategyCheck<T> {
        let key = CacheKey::new(scope, params);
        let timestamp = self.store.now();

        if let Some(entry) = self.store.lookup(scope, params) {
            self.store.update_metrics(|m| m.hits += 1);
            self.record_event(CacheEvent::Hit { key, timestamp });
            return StrategyCheck {
                strategy: CacheStrategy::Hit,
                entry: Some(entry),
            };
        }

        if let Some(superset) = self.store.find_superset(scope, params) {
            self.store.update_metrics(|m| m.derivations += 1);
            log::debug!("{} derivable from {}", key, superset.key());
            self.record_event(CacheEvent::Derivable {
                key,
                superset: superset.key(),
                timestamp,
            });
            return StrategyCheck {
                strategy: CacheStrategy::Derivable,
                entry: Some(superset),
            };
        }

        self.store.update_metrics(|m| m.misses += 1);

        if let Some(subset) = self.store.find_overlapping_subset(scope, params) {
            log::debug!(
                "{} overlaps narrower entry {}, a broader fetch may be preferable",
                key,
                subset.key()
            );
            self.record_event(CacheEvent::SupersetNeeded {
                key,
                subset: subset.key(),
                timestamp,
            });
            return StrategyCheck {
                strategy: CacheStrategy::SupersetNeeded,
                entry: Some(subset),
            };
        }

        self.record_event(CacheEvent::Miss { key, timestamp });
        StrategyCheck {
            strategy: CacheStrategy::Miss,
            entry: None,
        }
    }

    /// Try to answer `scope` from a superset entry
    ///
    /// The superset is touched only when the derivation succeeds.
    pub fn derive(&self, scope: &Scope, superset: &CacheEntry<T>) -> Option<T> {
        let derived = self.strategy.derive(scope, superset);
        if derived.is_some() {
            self.store.touch(superset.scope(), superset.params());
        } else {
            self.store.update_metrics(|m| m.derivations_declined += 1);
            log::debug!(
                "{} declined to derive {} from {}",
                self.strategy.name(),
                scope,
                superset.scope()
            );
            self.record_event(CacheEvent::DerivationDeclined {
                key: CacheKey::new(scope, superset.params()),
                strategy: self.strategy.name(),
                timestamp: self.store.now(),
            });
        }
        derived
    }

    /// Exact hit or successful derivation
    ///
    /// Moves no counters and leaves entries untouched, expired ones included.
    pub fn peek(&self, scope: &Scope, params: &FetchParams) -> Option<T> {
        if let Some(payload) = self.store.peek(scope, params) {
            return Some(payload);
        }

        let superset = self.store.find_superset(scope, params)?;
        self.strategy.derive(scope, &superset)
    }

    /// Store a fetched payload, dropping the narrower entries it covers
    pub fn store(&self, scope: &Scope, params: &FetchParams, payload: T) -> SetReport {
        let report = self.store.set(scope, params, payload);
        self.record_store(&report);
        report
    }

    /// Store a payload fetched at `generation`, unless invalidated since
    pub fn store_fetched(
        &self,
        scope: &Scope,
        params: &FetchParams,
        payload: T,
        generation: u64,
    ) -> SetReport {
        let report = self.store.set_if_current(scope, params, payload, generation);
        self.record_store(&report);
        report
    }

    fn record_store(&self, report: &SetReport) {
        if report.stored {
            self.record_event(CacheEvent::Stored {
                key: report.key.clone(),
                evicted: report.evicted.clone(),
                redundant: report.redundant.len(),
                timestamp: self.store.now(),
            });
        }
    }

    pub fn invalidate(&self, scope: Option<&Scope>) -> usize {
        let affected_entries = self.store.invalidate(scope);
        self.record_event(CacheEvent::Invalidation {
            scope: scope.cloned(),
            affected_entries,
            timestamp: self.store.now(),
        });
        affected_entries
    }

    /// Drop every entry and the event log
    pub fn clear(&self) {
        self.store.clear();
        self.events.lock().clear();
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.store.metrics()
    }

    pub fn reset_metrics(&self) {
        self.store.reset_metrics();
    }

    /// Most recent events first
    pub fn recent_events(&self, limit: Option<usize>) -> Vec<CacheEvent> {
        let events = self.events.lock();
        let limit = limit.unwrap_or(100).min(events.len());
        events.iter().rev().take(limit).cloned().collect()
    }

    fn record_event(&self, event: CacheEvent) {
        if self.max_events == 0 {
            return;
        }

        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::payload::{AppList, AppRecord, KeySetList, KeySetRecord, UsageSeries};

    fn manager<T: Payload>() -> CacheHierarchyManager<T> {
        CacheHierarchyManager::for_payload(CacheConfig::default(), Arc::new(ManualClock::new()))
            .unwrap()
    }

    fn january() -> FetchParams {
        FetchParams::parse("2024-01-01", "2024-01-31").unwrap()
    }

    fn inside() -> FetchParams {
        FetchParams::parse("2024-01-05", "2024-01-10").unwrap()
    }

    #[test]
    fn test_hit_then_miss_counts() {
        let manager = manager::<AppList>();
        let scope = Scope::account("7");

        assert_eq!(manager.check_strategy(&scope, &january()).strategy, CacheStrategy::Miss);
        manager.store(&scope, &january(), AppList::default());
        assert_eq!(manager.check_strategy(&scope, &january()).strategy, CacheStrategy::Hit);

        let metrics = manager.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.hit_rate(), 0.5);
    }

    #[test]
    fn test_keyset_superset_is_derivable() {
        let manager = manager::<KeySetList>();
        let keysets = KeySetList::new(vec![
            KeySetRecord::new("k1", "41", "one"),
            KeySetRecord::new("k2", "42", "two"),
            KeySetRecord::new("k3", "43", "three"),
        ]);
        manager.store(&Scope::account("7"), &january(), keysets);

        let request = Scope::keyset("7", "42", "k2");
        let check = manager.check_strategy(&request, &inside());
        assert_eq!(check.strategy, CacheStrategy::Derivable);

        let derived = manager.derive(&request, &check.entry.unwrap()).unwrap();
        assert_eq!(derived.keysets, vec![KeySetRecord::new("k2", "42", "two")]);
        assert_eq!(manager.metrics().derivations, 1);
    }

    #[test]
    fn test_usage_superset_never_derives() {
        let manager = manager::<UsageSeries>();
        manager.store(&Scope::account("7"), &january(), UsageSeries::default());

        for request in [Scope::app("7", "1"), Scope::keyset("7", "1", "k1")] {
            let check = manager.check_strategy(&request, &inside());
            assert_eq!(check.strategy, CacheStrategy::Derivable);
            assert!(manager.derive(&request, &check.entry.unwrap()).is_none());
            assert!(manager.peek(&request, &inside()).is_none());
        }

        let metrics = manager.metrics();
        assert_eq!(metrics.derivations, 2);
        assert_eq!(metrics.derivations_declined, 2);
    }

    #[test]
    fn test_overlapping_subset_reports_superset_needed() {
        let manager = manager::<AppList>();
        manager.store(&Scope::app("7", "1"), &inside(), AppList::default());

        let check = manager.check_strategy(&Scope::account("7"), &january());
        assert_eq!(check.strategy, CacheStrategy::SupersetNeeded);
        assert_eq!(check.entry.unwrap().scope(), &Scope::app("7", "1"));
        assert_eq!(manager.metrics().misses, 1);
    }

    #[test]
    fn test_peek_does_not_count() {
        let manager = manager::<AppList>();
        let apps = AppList::new(vec![AppRecord::new("1", "web")]);
        manager.store(&Scope::account("7"), &january(), apps);

        let derived = manager.peek(&Scope::app("7", "1"), &inside()).unwrap();
        assert_eq!(derived.apps.len(), 1);
        assert!(manager.peek(&Scope::app("7", "2"), &inside()).is_none());

        let metrics = manager.metrics();
        assert_eq!(metrics.hits + metrics.misses + metrics.derivations, 0);
    }

    #[test]
    fn test_peek_leaves_entries_untouched() {
        let manager = manager::<AppList>();
        let apps = AppList::new(vec![AppRecord::new("1", "web")]);
        manager.store(&Scope::account("7"), &january(), apps);

        assert!(manager.peek(&Scope::account("7"), &january()).is_some());
        assert!(manager.peek(&Scope::app("7", "1"), &inside()).is_some());
        assert_eq!(manager.cache().snapshot()[0].access_count(), 0);
    }

    #[test]
    fn test_superset_touched_only_when_derivation_succeeds() {
        let clock = Arc::new(ManualClock::new());
        let usage: CacheHierarchyManager<UsageSeries> =
            CacheHierarchyManager::for_payload(CacheConfig::default(), clock.clone()).unwrap();
        let keysets: CacheHierarchyManager<KeySetList> =
            CacheHierarchyManager::for_payload(CacheConfig::default(), clock.clone()).unwrap();
        usage.store(&Scope::account("7"), &january(), UsageSeries::default());
        keysets.store(
            &Scope::account("7"),
            &january(),
            KeySetList::new(vec![KeySetRecord::new("k1", "1", "one")]),
        );
        clock.advance(std::time::Duration::from_secs(5));

        let request = Scope::app("7", "1");
        let check = usage.check_strategy(&request, &inside());
        assert!(usage.derive(&request, &check.entry.unwrap()).is_none());
        assert_eq!(usage.cache().snapshot()[0].access_count(), 0);

        let check = keysets.check_strategy(&request, &inside());
        assert!(keysets.derive(&request, &check.entry.unwrap()).is_some());
        let entry = &keysets.cache().snapshot()[0];
        assert_eq!(entry.access_count(), 1);
        assert!(entry.last_accessed_at() > entry.fetched_at());
    }

    #[test]
    fn test_store_fetched_respects_invalidation() {
        let manager = manager::<AppList>();
        let generation = manager.generation();
        manager.invalidate(Some(&Scope::account("7")));

        let report = manager.store_fetched(&Scope::account("7"), &january(), AppList::default(), generation);
        assert!(!report.stored);
        assert!(manager.peek(&Scope::account("7"), &january()).is_none());
        assert!(matches!(
            manager.recent_events(Some(1))[0],
            CacheEvent::Invalidation { .. }
        ));
    }

    #[test]
    fn test_events_are_bounded() {
        let config = CacheConfig {
            max_events: 2,
            ..CacheConfig::default()
        };
        let manager: CacheHierarchyManager<AppList> =
            CacheHierarchyManager::for_payload(config, Arc::new(ManualClock::new())).unwrap();

        manager.check_strategy(&Scope::account("7"), &january());
        manager.store(&Scope::account("7"), &january(), AppList::default());
        manager.check_strategy(&Scope::account("7"), &january());

        let events = manager.recent_events(None);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], CacheEvent::Hit { .. }));
        assert!(matches!(events[1], CacheEvent::Stored { .. }));
    }
}
