// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Scenario replay against a fixture data source

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use usage_cache::cache::ScopedList;
use usage_cache::{
    AppList, CacheConfig, CategoryMetrics, ConfigError, DataCache, DataSource, FetchError,
    FetchOptions, FetchParams, FetchStrategy, HitRates, KeySetList, ManualClock, PayloadKind,
    RemoteError, Scope, Session, UsagePoint, UsageSeries,
};

use super::commands::OutputFormat;
use super::output::ReplayFormatter;

/// A scripted sequence of cache operations
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Session token in effect before the first step
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub config: CacheConfig,
    /// Inline dataset, replaced by `--dataset` when given
    #[serde(default)]
    pub dataset: Option<Dataset>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Fetch {
        category: PayloadKind,
        scope: Scope,
        params: FetchParams,
        #[serde(default)]
        force: bool,
    },
    Invalidate {
        #[serde(default)]
        scope: Option<Scope>,
    },
    Clear,
    Advance {
        seconds: u64,
    },
    Login {
        token: String,
    },
    Logout,
}

impl Step {
    fn action(&self) -> &'static str {
        match self {
            Step::Fetch { .. } => "fetch",
            Step::Invalidate { .. } => "invalidate",
            Step::Clear => "clear",
            Step::Advance { .. } => "advance",
            Step::Login { .. } => "login",
            Step::Logout => "logout",
        }
    }

    fn target(&self) -> String {
        match self {
            Step::Fetch {
                category,
                scope,
                params,
                force,
            } => {
                let mut target = format!(
                    "{} {} {}..{}",
                    category,
                    scope,
                    params.start_date(),
                    params.end_date()
                );
                if *force {
                    target.push_str(" (forced)");
                }
                target
            }
            Step::Invalidate { scope: Some(scope) } => scope.to_string(),
            Step::Invalidate { scope: None } => "all".to_string(),
            Step::Advance { seconds } => format!("+{}s", seconds),
            Step::Clear | Step::Login { .. } | Step::Logout => String::new(),
        }
    }
}

/// Apps and keysets known to the fixture source, per account id
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountFixture>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountFixture {
    #[serde(default)]
    pub apps: AppList,
    #[serde(default)]
    pub keysets: KeySetList,
}

/// Daily calls attributed to each keyset in scope
const CALLS_PER_KEYSET: u64 = 100;

/// Data source answering from a [`Dataset`] and counting remote calls
pub struct FixtureSource {
    dataset: Dataset,
    calls: AtomicUsize,
}

impl FixtureSource {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            dataset,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn account(&self, scope: &Scope) -> Result<&AccountFixture, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.dataset
            .accounts
            .get(scope.account_id())
            .ok_or_else(|| {
                RemoteError::with_status(404, format!("unknown account {}", scope.account_id()))
            })
    }
}

#[async_trait]
impl DataSource for FixtureSource {
    async fn fetch_account_usage(
        &self,
        _token: &str,
        scope: &Scope,
        params: &FetchParams,
    ) -> Result<UsageSeries, RemoteError> {
        let account = self.account(scope)?;
        let keysets = account.keysets.narrow_to(scope).item_count() as u64;

        let points = params
            .start_date()
            .iter_days()
            .take_while(|day| *day <= params.end_date())
            .map(|day| {
                let counts = [("calls".to_string(), keysets * CALLS_PER_KEYSET)]
                    .into_iter()
                    .collect();
                UsagePoint::new(day, counts)
            })
            .collect();
        Ok(UsageSeries::new(points))
    }

    async fn fetch_apps(
        &self,
        _token: &str,
        scope: &Scope,
        _params: &FetchParams,
    ) -> Result<AppList, RemoteError> {
        Ok(self.account(scope)?.apps.narrow_to(scope))
    }

    async fn fetch_keys(
        &self,
        _token: &str,
        scope: &Scope,
        _params: &FetchParams,
    ) -> Result<KeySetList, RemoteError> {
        Ok(self.account(scope)?.keysets.narrow_to(scope))
    }
}

/// What happened at one scenario step
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub action: String,
    pub target: String,
    pub strategy: Option<FetchStrategy>,
    pub from_cache: Option<bool>,
    /// Items returned by a fetch, or entries removed by an invalidation
    pub items: Option<usize>,
    pub remote_calls: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub steps: Vec<StepReport>,
    pub remote_calls: usize,
    pub metrics: CategoryMetrics,
    pub hit_rates: HitRates,
}

struct FetchSummary {
    strategy: FetchStrategy,
    from_cache: bool,
    items: usize,
}

async fn fetch(
    cache: &DataCache,
    category: PayloadKind,
    scope: &Scope,
    params: &FetchParams,
    options: FetchOptions,
) -> Result<FetchSummary, FetchError> {
    let summary = match category {
        PayloadKind::Usage => {
            let outcome = cache.usage().fetch(scope, params, options).await?;
            FetchSummary {
                strategy: outcome.strategy,
                from_cache: outcome.from_cache,
                items: outcome.payload.len(),
            }
        }
        PayloadKind::Apps => {
            let outcome = cache.apps().fetch(scope, params, options).await?;
            FetchSummary {
                strategy: outcome.strategy,
                from_cache: outcome.from_cache,
                items: outcome.payload.item_count(),
            }
        }
        PayloadKind::KeySets => {
            let outcome = cache.keysets().fetch(scope, params, options).await?;
            FetchSummary {
                strategy: outcome.strategy,
                from_cache: outcome.from_cache,
                items: outcome.payload.item_count(),
            }
        }
    };
    Ok(summary)
}

/// Run every step of `scenario` through a fresh cache
pub async fn replay(scenario: &Scenario, dataset: Dataset) -> Result<ReplayReport, ConfigError> {
    let source = Arc::new(FixtureSource::new(dataset));
    let clock = Arc::new(ManualClock::new());
    let cache = DataCache::with_clock(scenario.config.clone(), source.clone(), clock.clone())?;

    if let Some(token) = &scenario.session {
        cache.set_session(Session::with_token(token.clone()));
    }

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let calls_before = source.calls();
        let mut report = StepReport {
            index: index + 1,
            action: step.action().to_string(),
            target: step.target(),
            strategy: None,
            from_cache: None,
            items: None,
            remote_calls: 0,
            error: None,
        };

        match step {
            Step::Fetch {
                category,
                scope,
                params,
                force,
            } => {
                let options = FetchOptions {
                    force: *force,
                    require_session: false,
                };
                match fetch(&cache, *category, scope, params, options).await {
                    Ok(summary) => {
                        report.strategy = Some(summary.strategy);
                        report.from_cache = Some(summary.from_cache);
                        report.items = Some(summary.items);
                    }
                    Err(err) => report.error = Some(err.to_string()),
                }
            }
            Step::Invalidate { scope } => {
                report.items = Some(cache.invalidate(scope.as_ref()));
            }
            Step::Clear => cache.clear_all(),
            Step::Advance { seconds } => clock.advance(Duration::from_secs(*seconds)),
            Step::Login { token } => cache.set_session(Session::with_token(token.clone())),
            Step::Logout => cache.clear_session(),
        }

        report.remote_calls = source.calls() - calls_before;
        log::debug!(
            "Step {} {} {}: {:?}",
            report.index,
            report.action,
            report.target,
            report.strategy
        );
        steps.push(report);
    }

    let report = ReplayReport {
        steps,
        remote_calls: source.calls(),
        metrics: cache.metrics(),
        hit_rates: cache.hit_rates(),
    };
    cache.dispose();
    Ok(report)
}

pub fn load_scenario(path: &Path) -> Result<Scenario, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read scenario {}: {}", path.display(), e))?;
    let scenario = serde_json::from_str(&text)
        .map_err(|e| format!("Invalid scenario {}: {}", path.display(), e))?;
    Ok(scenario)
}

pub fn load_dataset(path: &Path) -> Result<Dataset, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read dataset {}: {}", path.display(), e))?;
    let dataset = serde_json::from_str(&text)
        .map_err(|e| format!("Invalid dataset {}: {}", path.display(), e))?;
    Ok(dataset)
}

/// Handle the replay command
pub fn handle_replay(
    scenario_path: PathBuf,
    dataset_path: Option<PathBuf>,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut scenario = load_scenario(&scenario_path)?;
    let dataset = match dataset_path {
        Some(path) => load_dataset(&path)?,
        None => scenario.dataset.take().unwrap_or_default(),
    };

    log::info!(
        "Replaying {} steps from {}",
        scenario.steps.len(),
        scenario_path.display()
    );

    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(replay(&scenario, dataset))?;
    print!("{}", ReplayFormatter::format(&report, format));
    Ok(())
}
