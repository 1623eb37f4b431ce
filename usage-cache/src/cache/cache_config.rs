// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cache configuration and presets

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_MAX_ENTRIES: usize = 100;
const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30 * 60);
const DEFAULT_MAX_EVENTS: usize = 256;

/// Configuration shared by every store in a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable/disable caching entirely
    pub enabled: bool,

    /// Maximum number of entries per store before LRU eviction
    pub max_entries: usize,

    /// Age after which an entry is treated as expired
    pub max_age: Duration,

    /// Size of the recent-event ring kept by each hierarchy manager
    pub max_events: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: DEFAULT_MAX_ENTRIES,
            max_age: DEFAULT_MAX_AGE,
            max_events: DEFAULT_MAX_EVENTS,
        }
    }
}

impl CacheConfig {
    /// Create configuration for memory-constrained environments
    pub fn memory_constrained() -> Self {
        Self {
            max_entries: 25,
            max_events: 64,
            ..Self::default()
        }
    }

    /// Create configuration for dashboards left open for long sessions
    pub fn long_lived() -> Self {
        Self {
            max_age: Duration::from_secs(2 * 60 * 60), // 2 hours
            ..Self::default()
        }
    }

    /// A configuration that stores nothing
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }

        if self.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "max_entries must be greater than 0".to_string(),
            ));
        }

        if self.max_age.is_zero() {
            return Err(ConfigError::Invalid(
                "max_age must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
