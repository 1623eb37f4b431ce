// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! usage-cache - Hierarchical cache and fetch orchestrator for usage metrics
//!
//! Usage series, application lists and keyset lists are fetched per scope
//! (account, app within an account, keyset within an app) and date range.
//!
//! # Features
//!
//! - **Scope algebra**: superset/subset reasoning over scopes and date ranges
//! - **Bounded store**: TTL expiry, LRU eviction and redundant-subset cleanup
//! - **Derivation**: narrow list requests are served from a cached broader list
//! - **Deduplication**: concurrent identical fetches share one remote call
//! - **Metrics**: hits, misses, derivations and evictions per category
//!
//! # Usage
//!
//! ```ignore
//! let cache = DataCache::new(CacheConfig::default(), Arc::new(my_source))?;
//! cache.set_session(Session::with_token(token));
//!
//! let params = FetchParams::parse("2024-01-01", "2024-01-31")?;
//! let outcome = cache
//!     .keysets()
//!     .fetch(&Scope::app("7", "42"), &params, FetchOptions::default())
//!     .await?;
//! ```

pub mod cache;
pub mod error;
pub mod fetch;
pub mod payload;
pub mod scope;

pub use cache::{CacheConfig, CacheMetrics, CacheStrategy, Clock, ManualClock, SystemClock};
pub use error::{ConfigError, FetchError, FetchResult, RemoteError, ScopeError};
pub use fetch::{
    CategoryMetrics, DataCache, DataSource, FetchOptions, FetchOrchestrator, FetchOutcome,
    FetchStrategy, HitRates, InFlightRequestRegistry, Session,
};
pub use payload::{
    AppList, AppRecord, KeySetList, KeySetRecord, Payload, PayloadKind, UsagePoint, UsageSeries,
};
pub use scope::{FetchParams, Scope, ScopeLevel};

/// usage-cache version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
