//! Test utilities for usage-cache integration tests
//!
//! `MockSource` is a counting `DataSource` with a configurable delay and an
//! optional injected failure.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use usage_cache::{
    AppList, AppRecord, CacheConfig, DataCache, DataSource, FetchParams, KeySetList, KeySetRecord,
    ManualClock, RemoteError, Scope, ScopeLevel, Session, UsagePoint, UsageSeries,
};

pub const TOKEN: &str = "test-token";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn params(start: &str, end: &str) -> FetchParams {
    FetchParams::parse(start, end).expect("valid test params")
}

/// Account 7 with apps 1 and 2; app 2 owns k2 and k3
pub fn sample_apps() -> AppList {
    AppList::new(vec![AppRecord::new("1", "web"), AppRecord::new("2", "mobile")])
}

pub fn sample_keysets() -> KeySetList {
    KeySetList::new(vec![
        KeySetRecord::new("k1", "1", "web-prod"),
        KeySetRecord::new("k2", "2", "mobile-prod"),
        KeySetRecord::new("k3", "2", "mobile-staging"),
    ])
}

#[derive(Default)]
pub struct MockSource {
    usage_calls: AtomicUsize,
    app_calls: AtomicUsize,
    keyset_calls: AtomicUsize,
    delay: Duration,
    failure: Mutex<Option<RemoteError>>,
    tokens: Mutex<Vec<String>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `delay` before answering
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn fail_with(&self, error: RemoteError) {
        *self.failure.lock() = Some(error);
    }

    pub fn succeed(&self) {
        *self.failure.lock() = None;
    }

    pub fn usage_calls(&self) -> usize {
        self.usage_calls.load(Ordering::SeqCst)
    }

    pub fn app_calls(&self) -> usize {
        self.app_calls.load(Ordering::SeqCst)
    }

    pub fn keyset_calls(&self) -> usize {
        self.keyset_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.usage_calls() + self.app_calls() + self.keyset_calls()
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        self.tokens.lock().clone()
    }

    async fn answer<T>(&self, counter: &AtomicUsize, token: &str, payload: T) -> Result<T, RemoteError> {
        counter.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().push(token.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failure = self.failure.lock().clone();
        match failure {
            Some(error) => Err(error),
            None => Ok(payload),
        }
    }
}

#[async_trait]
impl DataSource for MockSource {
    async fn fetch_account_usage(
        &self,
        token: &str,
        scope: &Scope,
        params: &FetchParams,
    ) -> Result<UsageSeries, RemoteError> {
        let per_day = match scope.level() {
            ScopeLevel::Account => 30,
            ScopeLevel::App => 20,
            ScopeLevel::Keyset => 10,
        };
        let points = params
            .start_date()
            .iter_days()
            .take_while(|day| *day <= params.end_date())
            .map(|day| UsagePoint::new(day, [("calls".to_string(), per_day)].into_iter().collect()))
            .collect();
        self.answer(&self.usage_calls, token, UsageSeries::new(points)).await
    }

    async fn fetch_apps(
        &self,
        token: &str,
        scope: &Scope,
        _params: &FetchParams,
    ) -> Result<AppList, RemoteError> {
        let apps = match scope.app_id() {
            Some(app_id) => AppList::new(
                sample_apps()
                    .apps
                    .into_iter()
                    .filter(|app| app.id == app_id)
                    .collect(),
            ),
            None => sample_apps(),
        };
        self.answer(&self.app_calls, token, apps).await
    }

    async fn fetch_keys(
        &self,
        token: &str,
        scope: &Scope,
        _params: &FetchParams,
    ) -> Result<KeySetList, RemoteError> {
        let keysets = KeySetList::new(
            sample_keysets()
                .keysets
                .into_iter()
                .filter(|keyset| scope.app_id().map_or(true, |app_id| keyset.app_id == app_id))
                .filter(|keyset| scope.key_id().map_or(true, |key_id| keyset.id == key_id))
                .collect(),
        );
        self.answer(&self.keyset_calls, token, keysets).await
    }
}

/// Authenticated cache over `source` driven by a manual clock
pub fn cache_with(source: Arc<MockSource>, config: CacheConfig) -> (DataCache, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let cache = DataCache::with_clock(config, source, clock.clone()).expect("valid cache config");
    cache.set_session(Session::with_token(TOKEN));
    (cache, clock)
}
