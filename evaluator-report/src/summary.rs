// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Human-readable run summary.

use std::fmt::Write as _;
use std::io::Write;

use evaluator_core::{IterationStatus, LatencyStats, RunOutcome};

use crate::{ReporterError, ResultsReporter};

/// Prints a box-drawn table to stdout.
#[derive(Debug, Default)]
pub struct SummaryReporter;

impl SummaryReporter {
    pub fn new() -> Self {
        Self
    }

    /// Render the summary table, one row per instance type in run order.
    pub fn render(outcome: &RunOutcome) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "╔══════════════════════════════════════════════════════════════════════════════╗");
        let _ = writeln!(out, "║                            INFERENCE COST SUMMARY                            ║");
        let _ = writeln!(out, "╠═════════════════╦═════════════╦═════════════╦════════════════════════════════╣");
        let _ = writeln!(out, "║ Instance        ║ Avg Latency ║ p95         ║ Cost / Inference (USD)         ║");
        let _ = writeln!(out, "╠═════════════════╬═════════════╬═════════════╬════════════════════════════════╣");

        for entry in &outcome.entries {
            let (avg, p95, cost) = match &entry.status {
                IterationStatus::Succeeded(result) => (
                    LatencyStats::format_latency(result.avg_latency_s),
                    LatencyStats::format_latency(result.latency.p95_s),
                    format!("${:.10}", result.cost_per_inference_usd),
                ),
                IterationStatus::Failed(failure) => {
                    ("-".to_string(), "-".to_string(), format!("FAILED: {}", failure.kind))
                }
                IterationStatus::Skipped { .. } => {
                    ("-".to_string(), "-".to_string(), "SKIPPED".to_string())
                }
            };

            let _ = writeln!(
                out,
                "║ {:<15} ║ {:<11} ║ {:<11} ║ {:<30} ║",
                entry.instance_type.as_str(),
                avg,
                p95,
                cost
            );
        }

        let _ = writeln!(out, "╚═════════════════╩═════════════╩═════════════╩════════════════════════════════╝");

        let failures: Vec<_> = outcome.failures().collect();
        if !failures.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Failures:");
            for (instance_type, failure) in failures {
                let _ = writeln!(
                    out,
                    "  - {} [{} in {}]: {}",
                    instance_type, failure.kind, failure.stage, failure.message
                );
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Run {}: {}/{} instance type(s) succeeded, {} run(s) each{}",
            outcome.run_id,
            outcome.success_count(),
            outcome.entries.len(),
            outcome.runs_per_instance,
            if outcome.cancelled { " (cancelled)" } else { "" }
        );

        out
    }
}

impl ResultsReporter for SummaryReporter {
    fn report(&self, outcome: &RunOutcome) -> Result<(), ReporterError> {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(Self::render(outcome).as_bytes())?;
        stdout.flush()?;
        Ok(())
    }
}
