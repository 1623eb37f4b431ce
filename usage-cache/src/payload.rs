// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Payload categories served by the cache
//!
//! Each category names the remote call that produces it and the derivation
//! strategy that may answer narrower requests from a broader cached entry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::cache::derivation::{DerivationStrategy, IdentityFilter, NoDerivation, ScopedList};
use crate::error::RemoteError;
use crate::fetch::DataSource;
use crate::scope::{FetchParams, Scope, ScopeLevel};

/// Payload category, used for dedupe keys and per-category metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Usage,
    Apps,
    #[serde(rename = "keysets")]
    KeySets,
}

impl PayloadKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PayloadKind::Usage => "usage",
            PayloadKind::Apps => "apps",
            PayloadKind::KeySets => "keysets",
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cacheable payload category
///
/// `Default` is the empty payload returned when fetching is skipped.
pub trait Payload: Clone + Default + fmt::Debug + Send + Sync + 'static {
    const KIND: PayloadKind;

    fn derivation_strategy() -> Arc<dyn DerivationStrategy<Self>>;

    /// Issue the remote call producing this payload
    fn request<'a>(
        source: &'a dyn DataSource,
        token: &'a str,
        scope: &'a Scope,
        params: &'a FetchParams,
    ) -> BoxFuture<'a, Result<Self, RemoteError>>;
}

/// One day of usage counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePoint {
    pub date: NaiveDate,
    /// Metric name → count for that day
    pub counts: BTreeMap<String, u64>,
}

impl UsagePoint {
    pub fn new(date: NaiveDate, counts: BTreeMap<String, u64>) -> Self {
        Self { date, counts }
    }

    pub fn count(&self, metric: &str) -> u64 {
        self.counts.get(metric).copied().unwrap_or(0)
    }
}

/// Daily usage series, pre-aggregated upstream for the requested scope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageSeries {
    pub points: Vec<UsagePoint>,
}

impl UsageSeries {
    pub fn new(points: Vec<UsagePoint>) -> Self {
        Self { points }
    }

    /// Sum of `metric` over the whole series
    pub fn total(&self, metric: &str) -> u64 {
        self.points.iter().map(|point| point.count(metric)).sum()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl Payload for UsageSeries {
    const KIND: PayloadKind = PayloadKind::Usage;

    fn derivation_strategy() -> Arc<dyn DerivationStrategy<Self>> {
        Arc::new(NoDerivation)
    }

    fn request<'a>(
        source: &'a dyn DataSource,
        token: &'a str,
        scope: &'a Scope,
        params: &'a FetchParams,
    ) -> BoxFuture<'a, Result<Self, RemoteError>> {
        source.fetch_account_usage(token, scope, params)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRecord {
    pub id: String,
    pub name: String,
}

impl AppRecord {
    pub fn new<I: Into<String>, N: Into<String>>(id: I, name: N) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Applications of an account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppList {
    pub apps: Vec<AppRecord>,
}

impl AppList {
    pub fn new(apps: Vec<AppRecord>) -> Self {
        Self { apps }
    }
}

impl ScopedList for AppList {
    fn narrow_to(&self, scope: &Scope) -> Self {
        if scope.level() == ScopeLevel::Account {
            return self.clone();
        }

        let apps = self
            .apps
            .iter()
            .filter(|app| scope.app_id() == Some(app.id.as_str()))
            .cloned()
            .collect();
        Self { apps }
    }

    fn item_count(&self) -> usize {
        self.apps.len()
    }
}

impl Payload for AppList {
    const KIND: PayloadKind = PayloadKind::Apps;

    fn derivation_strategy() -> Arc<dyn DerivationStrategy<Self>> {
        Arc::new(IdentityFilter)
    }

    fn request<'a>(
        source: &'a dyn DataSource,
        token: &'a str,
        scope: &'a Scope,
        params: &'a FetchParams,
    ) -> BoxFuture<'a, Result<Self, RemoteError>> {
        source.fetch_apps(token, scope, params)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySetRecord {
    pub id: String,
    /// Application owning the keyset
    pub app_id: String,
    pub name: String,
}

impl KeySetRecord {
    pub fn new<I, A, N>(id: I, app_id: A, name: N) -> Self
    where
        I: Into<String>,
        A: Into<String>,
        N: Into<String>,
    {
        Self {
            id: id.into(),
            app_id: app_id.into(),
            name: name.into(),
        }
    }
}

/// Keysets of an account or application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeySetList {
    pub keysets: Vec<KeySetRecord>,
}

impl KeySetList {
    pub fn new(keysets: Vec<KeySetRecord>) -> Self {
        Self { keysets }
    }
}

impl ScopedList for KeySetList {
    fn narrow_to(&self, scope: &Scope) -> Self {
        let keysets = self
            .keysets
            .iter()
            .filter(|keyset| match scope.level() {
                ScopeLevel::Account => true,
                ScopeLevel::App => scope.app_id() == Some(keyset.app_id.as_str()),
                ScopeLevel::Keyset => {
                    scope.app_id() == Some(keyset.app_id.as_str())
                        && scope.key_id() == Some(keyset.id.as_str())
                }
            })
            .cloned()
            .collect();
        Self { keysets }
    }

    fn item_count(&self) -> usize {
        self.keysets.len()
    }
}

impl Payload for KeySetList {
    const KIND: PayloadKind = PayloadKind::KeySets;

    fn derivation_strategy() -> Arc<dyn DerivationStrategy<Self>> {
        Arc::new(IdentityFilter)
    }

    fn request<'a>(
        source: &'a dyn DataSource,
        token: &'a str,
        scope: &'a Scope,
        params: &'a FetchParams,
    ) -> BoxFuture<'a, Result<Self, RemoteError>> {
        source.fetch_keys(token, scope, params)
    }
}
