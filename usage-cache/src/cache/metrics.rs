// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Process-lifetime cache counters

use serde::Serialize;

/// Cache counters for one store
///
/// Every counter accumulates until [`CacheStore::reset_metrics`]
/// except `size`, which tracks the current entry count.
///
/// [`CacheStore::reset_metrics`]: super::CacheStore::reset_metrics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub derivations: u64,
    pub derivations_declined: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub size: usize,
}

impl CacheMetrics {
    /// `hits / (hits + misses)`, 0 when nothing was requested yet
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses + self.derivations
    }
}
