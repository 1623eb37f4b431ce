// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! CLI module for usage-cache
//!
//! Replays JSON scenarios through a `DataCache` backed by fixture data and
//! prints what the cache decided at each step.

pub mod commands;
pub mod output;
pub mod replay;

pub use commands::{Cli, Commands};
pub use replay::handle_replay;
