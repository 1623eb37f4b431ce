// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Replay report formatting for CLI output

use colored::*;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use usage_cache::{CacheMetrics, FetchStrategy};

use super::commands::OutputFormat;
use super::replay::{ReplayReport, StepReport};

/// Report formatter for the supported output formats
pub struct ReplayFormatter;

impl ReplayFormatter {
    pub fn format(report: &ReplayReport, format: OutputFormat) -> String {
        match format {
            OutputFormat::Table => Self::format_table(report),
            OutputFormat::Json => Self::format_json(report),
        }
    }

    fn format_table(report: &ReplayReport) -> String {
        let mut output = String::new();

        output.push_str(&format!("{}\n", "Scenario Replay".bold().green()));
        output.push_str(&format!(
            "Steps: {}, remote calls: {}\n\n",
            report.steps.len(),
            report.remote_calls
        ));

        let mut steps = Table::new();
        steps.load_preset(UTF8_FULL);
        steps.set_header(
            ["#", "Action", "Target", "Strategy", "Cached", "Items", "Remote calls"]
                .into_iter()
                .map(|title| Cell::new(title).fg(Color::Green)),
        );
        for step in &report.steps {
            steps.add_row(Self::step_row(step));
        }
        output.push_str(&steps.to_string());
        output.push('\n');

        let errors: Vec<&StepReport> = report.steps.iter().filter(|s| s.error.is_some()).collect();
        if !errors.is_empty() {
            output.push_str(&format!("\n{}\n", "Errors:".bold().red()));
            for step in errors {
                if let Some(error) = &step.error {
                    output.push_str(&format!("  step {}: {}\n", step.index, error.red()));
                }
            }
        }

        output.push_str(&format!("\n{}\n", "Cache Metrics".bold().green()));
        let mut metrics = Table::new();
        metrics.load_preset(UTF8_FULL);
        metrics.set_header(
            [
                "Category",
                "Hits",
                "Misses",
                "Derivations",
                "Declined",
                "Evictions",
                "Expirations",
                "Size",
                "Hit rate",
            ]
            .into_iter()
            .map(|title| Cell::new(title).fg(Color::Green)),
        );
        for (category, values) in [
            ("usage", &report.metrics.usage),
            ("apps", &report.metrics.apps),
            ("keysets", &report.metrics.keysets),
        ] {
            metrics.add_row(Self::metrics_row(category, values));
        }
        output.push_str(&metrics.to_string());
        output.push('\n');

        output
    }

    fn step_row(step: &StepReport) -> Vec<Cell> {
        let strategy = match (&step.strategy, &step.error) {
            (Some(strategy), _) => Cell::new(strategy).fg(Self::strategy_color(*strategy)),
            (None, Some(_)) => Cell::new("error").fg(Color::Red),
            (None, None) => Cell::new("-"),
        };

        vec![
            Cell::new(step.index),
            Cell::new(&step.action),
            Cell::new(&step.target),
            strategy,
            Cell::new(Self::optional(step.from_cache)),
            Cell::new(Self::optional(step.items)),
            Cell::new(step.remote_calls),
        ]
    }

    fn metrics_row(category: &str, metrics: &CacheMetrics) -> Vec<Cell> {
        vec![
            Cell::new(category),
            Cell::new(metrics.hits),
            Cell::new(metrics.misses),
            Cell::new(metrics.derivations),
            Cell::new(metrics.derivations_declined),
            Cell::new(metrics.evictions),
            Cell::new(metrics.expirations),
            Cell::new(metrics.size),
            Cell::new(format!("{:.1}%", metrics.hit_rate() * 100.0)),
        ]
    }

    fn strategy_color(strategy: FetchStrategy) -> Color {
        match strategy {
            FetchStrategy::Hit | FetchStrategy::Derived => Color::Green,
            FetchStrategy::Forced => Color::Cyan,
            FetchStrategy::Skipped => Color::DarkGrey,
            FetchStrategy::Miss
            | FetchStrategy::SupersetNeeded
            | FetchStrategy::DerivationDeclined => Color::Yellow,
        }
    }

    fn optional<T: ToString>(value: Option<T>) -> String {
        value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
    }

    fn format_json(report: &ReplayReport) -> String {
        let mut json = serde_json::to_string_pretty(report).unwrap_or_else(|_| {
            "{\"status\": \"error\", \"error\": \"Could not serialize report to JSON\"}".to_string()
        });
        json.push('\n');
        json
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usage_cache::CategoryMetrics;

    fn report() -> ReplayReport {
        ReplayReport {
            steps: vec![StepReport {
                index: 1,
                action: "fetch".to_string(),
                target: "apps account:7 2024-01-01..2024-01-31".to_string(),
                strategy: Some(FetchStrategy::Miss),
                from_cache: Some(false),
                items: Some(2),
                remote_calls: 1,
                error: None,
            }],
            remote_calls: 1,
            metrics: CategoryMetrics::default(),
            hit_rates: Default::default(),
        }
    }

    #[test]
    fn test_table_lists_steps_and_categories() {
        let table = ReplayFormatter::format(&report(), OutputFormat::Table);
        assert!(table.contains("account:7"));
        assert!(table.contains("miss"));
        assert!(table.contains("keysets"));
    }

    #[test]
    fn test_json_is_parseable() {
        let json = ReplayFormatter::format(&report(), OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["steps"][0]["strategy"], "miss");
        assert_eq!(value["metrics"]["apps"]["hits"], 0);
    }
}
