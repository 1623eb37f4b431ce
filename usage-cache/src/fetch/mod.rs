// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Remote fetching: data source, request dedupe and orchestration

pub mod hub;
pub mod inflight;
pub mod orchestrator;
pub mod source;

pub use hub::{CategoryMetrics, DataCache, HitRates};
pub use inflight::{InFlightRequestRegistry, SharedFetch};
pub use orchestrator::{FetchOptions, FetchOrchestrator, FetchOutcome, FetchStrategy, SharedSession};
pub use source::{DataSource, Session};
