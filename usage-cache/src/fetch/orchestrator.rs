// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Per-category fetch orchestration: consult the cache, derive, or fetch

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use super::inflight::{InFlightRequestRegistry, SharedFetch};
use super::source::{DataSource, Session};
use crate::cache::{CacheHierarchyManager, CacheKey, CacheMetrics, CacheStrategy};
use crate::error::{FetchError, FetchResult};
use crate::payload::Payload;
use crate::scope::{FetchParams, Scope};

/// Session shared by the orchestrators of one facade
pub type SharedSession = Arc<RwLock<Session>>;

/// Per-call fetch options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Bypass the cache lookup; the fetched payload is still stored
    pub force: bool,
    /// Fail with [`FetchError::NoSession`] instead of skipping
    pub require_session: bool,
}

impl FetchOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    pub fn requiring_session(mut self) -> Self {
        self.require_session = true;
        self
    }
}

/// How a fetch was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    Hit,
    Derived,
    /// A superset was cached but the derivation declined, so a fetch was issued
    DerivationDeclined,
    SupersetNeeded,
    Miss,
    Forced,
    /// No session; nothing was fetched
    Skipped,
}

impl FetchStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            FetchStrategy::Hit => "hit",
            FetchStrategy::Derived => "derived",
            FetchStrategy::DerivationDeclined => "derivation_declined",
            FetchStrategy::SupersetNeeded => "superset_needed",
            FetchStrategy::Miss => "miss",
            FetchStrategy::Forced => "forced",
            FetchStrategy::Skipped => "skipped",
        }
    }
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome<T> {
    pub payload: T,
    /// True when no remote call was made for this request
    pub from_cache: bool,
    pub strategy: FetchStrategy,
}

impl<T> FetchOutcome<T> {
    fn cached(payload: T, strategy: FetchStrategy) -> Self {
        Self {
            payload,
            from_cache: true,
            strategy,
        }
    }

    fn fetched(payload: T, strategy: FetchStrategy) -> Self {
        Self {
            payload,
            from_cache: false,
            strategy,
        }
    }
}

/// Fetches one payload category through its cache
///
/// Orchestrators built over the same manager share its in-flight registry, so
/// identical concurrent fetches issue one remote call between them.
pub struct FetchOrchestrator<T> {
    manager: Arc<CacheHierarchyManager<T>>,
    source: Arc<dyn DataSource>,
    session: SharedSession,
}

impl<T: Payload> FetchOrchestrator<T> {
    pub fn new(
        manager: Arc<CacheHierarchyManager<T>>,
        source: Arc<dyn DataSource>,
        session: SharedSession,
    ) -> Self {
        Self {
            manager,
            source,
            session,
        }
    }

    pub fn manager(&self) -> &Arc<CacheHierarchyManager<T>> {
        &self.manager
    }

    pub fn registry(&self) -> &Arc<InFlightRequestRegistry<T>> {
        self.manager.inflight()
    }

    /// Answer a request from the cache when possible, otherwise fetch it
    pub async fn fetch(
        &self,
        scope: &Scope,
        params: &FetchParams,
        options: FetchOptions,
    ) -> FetchResult<FetchOutcome<T>> {
        let token = self.session.read().token().map(str::to_owned);
        let Some(token) = token else {
            if options.require_session {
                return Err(FetchError::NoSession);
            }
            log::debug!("Skipping {} fetch for {}: no session", T::KIND, scope);
            return Ok(FetchOutcome::fetched(T::default(), FetchStrategy::Skipped));
        };

        if options.force {
            log::debug!("Forced {} fetch for {}", T::KIND, scope);
            let payload = self.fetch_remote(token, scope, params).await?;
            return Ok(FetchOutcome::fetched(payload, FetchStrategy::Forced));
        }

        let check = self.manager.check_strategy(scope, params);
        let strategy = match (check.strategy, check.entry) {
            (CacheStrategy::Hit, Some(entry)) => {
                return Ok(FetchOutcome::cached(entry.into_payload(), FetchStrategy::Hit));
            }
            (CacheStrategy::Derivable, Some(superset)) => {
                if let Some(derived) = self.manager.derive(scope, &superset) {
                    return Ok(FetchOutcome::cached(derived, FetchStrategy::Derived));
                }
                FetchStrategy::DerivationDeclined
            }
            (CacheStrategy::SupersetNeeded, _) => FetchStrategy::SupersetNeeded,
            _ => FetchStrategy::Miss,
        };

        log::debug!("{} fetch for {} ({})", T::KIND, scope, strategy);
        let payload = self.fetch_remote(token, scope, params).await?;
        Ok(FetchOutcome::fetched(payload, strategy))
    }

    /// Exact hit or derivation without fetching or counting
    pub fn get_cached_only(&self, scope: &Scope, params: &FetchParams) -> Option<T> {
        self.manager.peek(scope, params)
    }

    pub fn invalidate(&self, scope: Option<&Scope>) -> usize {
        self.manager.invalidate(scope)
    }

    pub fn clear_all(&self) {
        self.manager.clear();
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.manager.metrics()
    }

    pub fn hit_rate(&self) -> f64 {
        self.manager.metrics().hit_rate()
    }

    /// Request part of the key under which identical concurrent fetches are
    /// collapsed
    pub fn dedupe_key(scope: &Scope, params: &FetchParams) -> String {
        format!("{}:{}", T::KIND, CacheKey::new(scope, params))
    }

    /// Fetches started after an invalidation never join, or write back for,
    /// one started before it
    fn fetch_remote(&self, token: String, scope: &Scope, params: &FetchParams) -> SharedFetch<T> {
        let generation = self.manager.generation();
        let key = format!("{}@{}", Self::dedupe_key(scope, params), generation);
        let manager = Arc::clone(&self.manager);
        let source = Arc::clone(&self.source);
        let scope = scope.clone();
        let params = params.clone();

        self.manager.inflight().dedupe(key, move || async move {
            match T::request(source.as_ref(), &token, &scope, &params).await {
                Ok(payload) => {
                    manager.store_fetched(&scope, &params, payload.clone(), generation);
                    Ok(payload)
                }
                Err(err) => {
                    log::warn!("Remote {} fetch for {} failed: {}", T::KIND, scope, err);
                    Err(FetchError::from(err))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{AppList, KeySetList};

    #[test]
    fn test_dedupe_key_is_namespaced_by_kind() {
        let scope = Scope::app("7", "1");
        let params = FetchParams::parse("2024-01-01", "2024-01-31").unwrap();

        let apps = FetchOrchestrator::<AppList>::dedupe_key(&scope, &params);
        let keysets = FetchOrchestrator::<KeySetList>::dedupe_key(&scope, &params);

        assert!(apps.starts_with("apps:"));
        assert!(keysets.starts_with("keysets:"));
        assert_ne!(apps, keysets);
    }

    #[test]
    fn test_fetch_options() {
        let options = FetchOptions::forced().requiring_session();
        assert!(options.force && options.require_session);
        assert_eq!(FetchOptions::default(), FetchOptions { force: false, require_session: false });
    }

    #[test]
    fn test_strategy_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&FetchStrategy::DerivationDeclined).unwrap(),
            "\"derivation_declined\""
        );
        assert_eq!(FetchStrategy::Skipped.to_string(), "skipped");
    }
}
