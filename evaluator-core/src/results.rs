// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Aggregated results handed to reporters.
//!
//! Entries appear in the configured instance-type order, failed and skipped
//! iterations included in place.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::stats::LatencyStats;
use crate::types::InstanceType;

/// Outcome of one successful instance-type iteration. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub instance_type: InstanceType,
    /// Average round-trip latency in seconds.
    pub avg_latency_s: f64,
    /// Cost of a single inference in USD.
    pub cost_per_inference_usd: f64,
    pub runs: u32,
    pub latency: LatencyStats,
}

/// Why an iteration did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationFailure {
    pub kind: ErrorKind,
    /// State the iteration was in when it failed.
    pub stage: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum IterationStatus {
    Succeeded(BenchmarkResult),
    Failed(IterationFailure),
    /// Never started: the run was aborted or cancelled first.
    Skipped { reason: String },
}

/// Per-instance-type entry of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationOutcome {
    pub instance_type: InstanceType,
    /// Instance launched for this iteration, if any.
    pub instance_id: Option<String>,
    pub elapsed_s: f64,
    pub status: IterationStatus,
}

impl IterationOutcome {
    pub fn result(&self) -> Option<&BenchmarkResult> {
        match &self.status {
            IterationStatus::Succeeded(result) => Some(result),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&IterationFailure> {
        match &self.status {
            IterationStatus::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// When the whole run counts as successful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessCriteria {
    /// At least one instance type produced a result.
    #[default]
    Any,
    /// Every configured instance type produced a result.
    All,
}

/// Ordered outcome of a full run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub runs_per_instance: u32,
    pub cancelled: bool,
    pub entries: Vec<IterationOutcome>,
}

impl RunOutcome {
    /// Successful results in configured order.
    pub fn results(&self) -> impl Iterator<Item = &BenchmarkResult> {
        self.entries.iter().filter_map(IterationOutcome::result)
    }

    /// Failed iterations with their instance type, in configured order.
    pub fn failures(&self) -> impl Iterator<Item = (&InstanceType, &IterationFailure)> {
        self.entries
            .iter()
            .filter_map(|e| e.failure().map(|f| (&e.instance_type, f)))
    }

    pub fn success_count(&self) -> usize {
        self.results().count()
    }

    pub fn succeeded(&self, criteria: SuccessCriteria) -> bool {
        let successes = self.success_count();
        match criteria {
            SuccessCriteria::Any => successes > 0,
            SuccessCriteria::All => !self.entries.is_empty() && successes == self.entries.len(),
        }
    }
}
