// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Facade owning the orchestrators of every payload category

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use super::orchestrator::{FetchOrchestrator, SharedSession};
use super::source::{DataSource, Session};
use crate::cache::{CacheConfig, CacheHierarchyManager, CacheMetrics, Clock, SystemClock};
use crate::error::ConfigError;
use crate::payload::{AppList, KeySetList, Payload, UsageSeries};
use crate::scope::Scope;

/// Metrics of each category's cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryMetrics {
    pub usage: CacheMetrics,
    pub apps: CacheMetrics,
    pub keysets: CacheMetrics,
}

/// Hit rate of each category's cache, 0 when it served no requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HitRates {
    pub usage: f64,
    pub apps: f64,
    pub keysets: f64,
}

/// Usage, apps and keysets caches behind one session and one clock
pub struct DataCache {
    session: SharedSession,
    usage: FetchOrchestrator<UsageSeries>,
    apps: FetchOrchestrator<AppList>,
    keysets: FetchOrchestrator<KeySetList>,
}

impl DataCache {
    pub fn new(config: CacheConfig, source: Arc<dyn DataSource>) -> Result<Self, ConfigError> {
        Self::with_clock(config, source, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: CacheConfig,
        source: Arc<dyn DataSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let session: SharedSession = Arc::new(RwLock::new(Session::anonymous()));

        log::debug!(
            "Creating data cache (enabled: {}, max_entries: {}, max_age: {:?})",
            config.enabled,
            config.max_entries,
            config.max_age
        );

        Ok(Self {
            usage: orchestrator(&config, &clock, &source, &session)?,
            apps: orchestrator(&config, &clock, &source, &session)?,
            keysets: orchestrator(&config, &clock, &source, &session)?,
            session,
        })
    }

    pub fn usage(&self) -> &FetchOrchestrator<UsageSeries> {
        &self.usage
    }

    pub fn apps(&self) -> &FetchOrchestrator<AppList> {
        &self.apps
    }

    pub fn keysets(&self) -> &FetchOrchestrator<KeySetList> {
        &self.keysets
    }

    /// Replace the session used by subsequent fetches
    pub fn set_session(&self, session: Session) {
        log::info!(
            "Session updated (authenticated: {})",
            session.is_authenticated()
        );
        *self.session.write() = session;
    }

    pub fn clear_session(&self) {
        log::info!("Session cleared");
        *self.session.write() = Session::anonymous();
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.read().is_authenticated()
    }

    /// Invalidate `scope` in every category, or everything with `None`
    pub fn invalidate(&self, scope: Option<&Scope>) -> usize {
        self.usage.invalidate(scope) + self.apps.invalidate(scope) + self.keysets.invalidate(scope)
    }

    pub fn clear_all(&self) {
        self.usage.clear_all();
        self.apps.clear_all();
        self.keysets.clear_all();
        log::info!("All caches cleared");
    }

    pub fn metrics(&self) -> CategoryMetrics {
        CategoryMetrics {
            usage: self.usage.metrics(),
            apps: self.apps.metrics(),
            keysets: self.keysets.metrics(),
        }
    }

    pub fn hit_rates(&self) -> HitRates {
        HitRates {
            usage: self.usage.hit_rate(),
            apps: self.apps.hit_rate(),
            keysets: self.keysets.hit_rate(),
        }
    }

    /// Release every cached entry and forget the session
    ///
    /// Fetches already in flight still complete for callers holding their
    /// handles.
    pub fn dispose(self) {
        self.clear_all();
        *self.session.write() = Session::anonymous();
        log::info!("Data cache disposed");
    }
}

fn orchestrator<T: Payload>(
    config: &CacheConfig,
    clock: &Arc<dyn Clock>,
    source: &Arc<dyn DataSource>,
    session: &SharedSession,
) -> Result<FetchOrchestrator<T>, ConfigError> {
    let manager = CacheHierarchyManager::for_payload(config.clone(), Arc::clone(clock))?;
    Ok(FetchOrchestrator::new(
        Arc::new(manager),
        Arc::clone(source),
        Arc::clone(session),
    ))
}
