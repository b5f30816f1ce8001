// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Evaluator Reporting
//!
//! Consumers of a finished [`RunOutcome`]:
//!
//! - **Summary**: box-drawn table of latency and cost per instance type
//! - **JSON**: timestamped machine-readable report files
//! - **Chart**: SVG bar chart comparing instance types

use evaluator_core::RunOutcome;
use thiserror::Error;

pub mod chart;
pub mod reporter;
pub mod summary;

pub use chart::ChartReporter;
pub use reporter::{JsonReporter, RunReport};
pub use summary::SummaryReporter;

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("Failed to write report output: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON report error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to render chart: {0}")]
    Chart(String),
}

/// Anything that consumes the ordered outcome of a run.
pub trait ResultsReporter {
    fn report(&self, outcome: &RunOutcome) -> Result<(), ReporterError>;
}
