// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! JSON report generation for evaluator runs.
//!
//! Each run is saved to its own timestamped file so earlier runs are kept.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use evaluator_core::{IterationOutcome, RunOutcome};
use serde::{Deserialize, Serialize};

use crate::{ReporterError, ResultsReporter};

/// Envelope written to disk around a run's entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub suite: String,
    pub version: String,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub runs_per_instance: u32,
    pub cancelled: bool,
    pub entries: Vec<IterationOutcome>,
}

impl RunReport {
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        Self {
            suite: "ai-evaluator".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            run_id: outcome.run_id.clone(),
            timestamp: Utc::now(),
            runs_per_instance: outcome.runs_per_instance,
            cancelled: outcome.cancelled,
            entries: outcome.entries.clone(),
        }
    }
}

/// JSON reporter for evaluator runs.
pub struct JsonReporter {
    output_dir: PathBuf,
}

impl JsonReporter {
    /// Create a reporter writing into `output_dir`, creating it if needed.
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self, ReporterError> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    /// Save a run report; returns the path of the created file.
    pub fn save(&self, report: &RunReport) -> Result<PathBuf, ReporterError> {
        let timestamp = report.timestamp.format("%Y-%m-%dT%H-%M-%SZ");
        let short_id: String = report.run_id.chars().take(8).collect();
        let filepath = self
            .output_dir
            .join(format!("evaluator_{}_{}.json", timestamp, short_id));

        let writer = BufWriter::new(File::create(&filepath)?);
        serde_json::to_writer_pretty(writer, report)?;

        Ok(filepath)
    }

    /// All report files in the output directory, oldest first.
    pub fn list_reports(&self) -> Result<Vec<PathBuf>, ReporterError> {
        let mut reports = Vec::new();
        for entry in fs::read_dir(&self.output_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                reports.push(path);
            }
        }
        reports.sort();
        Ok(reports)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<RunReport, ReporterError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }
}

impl ResultsReporter for JsonReporter {
    fn report(&self, outcome: &RunOutcome) -> Result<(), ReporterError> {
        let path = self.save(&RunReport::from_outcome(outcome))?;
        tracing::info!(path = %path.display(), "Wrote JSON report");
        Ok(())
    }
}
