// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! usage-cache CLI entry point

use clap::Parser;
use colored::Colorize;

mod cli;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // -v/--verbose takes precedence over --log-level
    let log_level = if cli.verbose {
        log::LevelFilter::Debug
    } else if let Some(level) = cli.log_level {
        level.to_level_filter()
    } else {
        log::LevelFilter::Warn
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    match cli.command {
        Commands::Version => {
            println!("{} {}", "usage-cache".bold().green(), usage_cache::VERSION);
            println!("Hierarchical cache and fetch orchestrator for usage metrics");
            Ok(())
        }

        Commands::Replay {
            scenario,
            dataset,
            format,
        } => cli::handle_replay(scenario, dataset, format),
    }
}
