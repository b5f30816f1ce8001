// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! SVG bar charts comparing instance types.

use std::path::{Path, PathBuf};

use evaluator_core::{BenchmarkResult, RunOutcome};
use plotters::prelude::*;

use crate::{ReporterError, ResultsReporter};

/// Renders cost per inference and average latency side by side.
pub struct ChartReporter {
    path: PathBuf,
}

impl ChartReporter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn render(&self, results: &[&BenchmarkResult]) -> Result<(), ReporterError> {
        let chart_err = |e: &dyn std::fmt::Display| ReporterError::Chart(e.to_string());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let root = SVGBackend::new(&self.path, (1400, 700)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| chart_err(&e))?;
        let (left, right) = root.split_horizontally(700);

        let names: Vec<String> = results
            .iter()
            .map(|r| r.instance_type.to_string())
            .collect();

        let costs: Vec<f64> = results
            .iter()
            .map(|r| r.cost_per_inference_usd * 1e6)
            .collect();
        draw_bars(
            &left,
            "Cost per Inference",
            "USD per million inferences",
            &names,
            &costs,
            &BLUE,
        )
        .map_err(|e| chart_err(&e))?;

        let latencies: Vec<f64> = results.iter().map(|r| r.avg_latency_s * 1e3).collect();
        draw_bars(
            &right,
            "Average Latency",
            "Milliseconds",
            &names,
            &latencies,
            &RED,
        )
        .map_err(|e| chart_err(&e))?;

        root.present().map_err(|e| chart_err(&e))?;
        Ok(())
    }
}

/// One bar per instance type, labelled on the x axis.
fn draw_bars<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    caption: &str,
    y_desc: &str,
    names: &[String],
    values: &[f64],
    color: &RGBColor,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    let max = values.iter().copied().fold(0.0_f64, f64::max);
    let y_top = if max > 0.0 { max * 1.2 } else { 1.0 };

    let mut chart = ChartBuilder::on(area)
        .caption(caption, ("sans-serif", 28))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d((0..names.len() as i32).into_segmented(), 0f64..y_top)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(names.len() + 1)
        .x_label_formatter(&|x| match x {
            SegmentValue::CenterOf(i) => names.get(*i as usize).cloned().unwrap_or_default(),
            _ => String::new(),
        })
        .y_desc(y_desc)
        .y_label_formatter(&|y| format!("{:.3}", y))
        .draw()?;

    chart.draw_series(values.iter().enumerate().map(|(i, v)| {
        let i = i as i32;
        Rectangle::new(
            [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), *v)],
            color.mix(0.7).filled(),
        )
    }))?;

    Ok(())
}

impl ResultsReporter for ChartReporter {
    fn report(&self, outcome: &RunOutcome) -> Result<(), ReporterError> {
        let results: Vec<&BenchmarkResult> = outcome.results().collect();
        if results.is_empty() {
            tracing::info!("No successful results; skipping chart");
            return Ok(());
        }

        self.render(&results)?;
        tracing::info!(path = %self.path.display(), "Wrote chart");
        Ok(())
    }
}
