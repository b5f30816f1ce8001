// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `evaluator run` command - Benchmark every configured instance type once.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use evaluator_core::{
    BenchmarkOrchestrator, CancelHandle, CancelSignal, ConfigLoader, Payload, RunOutcome,
};
use evaluator_report::{ChartReporter, JsonReporter, ResultsReporter, SummaryReporter};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::aws::AwsCliProvider;
use crate::http::{HttpHealthProbe, HttpInferenceClient};

/// Options from the command line that override or extend the config file.
pub struct RunOptions {
    pub instances: Option<Vec<String>>,
    pub runs: Option<u32>,
    pub output: Option<PathBuf>,
    pub chart: Option<PathBuf>,
}

/// Returns whether the run met the configured success criteria.
pub async fn execute(config_path: &str, options: RunOptions) -> anyhow::Result<bool> {
    let mut config = ConfigLoader::load_file(config_path)
        .with_context(|| format!("loading configuration from {}", config_path))?;
    config.apply_overrides(options.instances, options.runs)?;

    let payload = read_payload(&config.service.payload_path, &config.service.payload_encoding)
        .await?;

    let run_id = Uuid::new_v4().to_string();
    println!("Run:               {}", run_id);
    println!(
        "Instances:         {}",
        config
            .benchmark
            .instance_types
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("Runs per instance: {}", config.benchmark.runs);
    println!();

    let orchestrator = BenchmarkOrchestrator::from_config(
        &config,
        Arc::new(AwsCliProvider::new(&config.provider)),
        Arc::new(HttpHealthProbe::new().context("building health probe client")?),
        Arc::new(HttpInferenceClient::new().context("building inference client")?),
    );

    let (handle, signal) = CancelSignal::channel();
    let watcher = spawn_cancel_watcher(handle, config.timeouts.run_deadline);

    let outcome = orchestrator
        .run(
            &config.benchmark.instance_types,
            config.benchmark.runs,
            &payload,
            &run_id,
            &signal,
        )
        .await;
    watcher.abort();
    let outcome = outcome?;

    publish(&outcome, options.output.as_deref(), options.chart.as_deref());

    Ok(outcome.succeeded(config.benchmark.success_criteria))
}

async fn read_payload(
    path: &Path,
    encoding: &evaluator_core::PayloadEncoding,
) -> anyhow::Result<Payload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading inference payload {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "payload".to_string());

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "Loaded payload");
    Ok(Payload::new(bytes, file_name, encoding.clone()))
}

/// Fire cancellation on Ctrl-C or when the whole-run deadline passes.
fn spawn_cancel_watcher(
    handle: CancelHandle,
    run_deadline: Option<std::time::Duration>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let deadline = async {
            match run_deadline {
                Some(deadline) => tokio::time::sleep(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::warn!(error = %e, "Cannot listen for Ctrl-C; interrupts will not release instances");
                    return;
                }
                tracing::warn!("Interrupt received; releasing the in-flight instance before exit");
            }
            _ = deadline => {
                tracing::warn!("Run deadline reached; cancelling remaining work");
            }
        }
        handle.cancel();
    })
}

/// Hand the outcome to every enabled reporter. A failing reporter does not
/// stop the others.
fn publish(outcome: &RunOutcome, output: Option<&Path>, chart: Option<&Path>) {
    let mut reporters: Vec<Box<dyn ResultsReporter>> = vec![Box::new(SummaryReporter::new())];

    if let Some(dir) = output {
        match JsonReporter::new(dir) {
            Ok(reporter) => reporters.push(Box::new(reporter)),
            Err(e) => tracing::error!(dir = %dir.display(), error = %e, "Cannot create report directory"),
        }
    }
    if let Some(path) = chart {
        reporters.push(Box::new(ChartReporter::new(path)));
    }

    for reporter in &reporters {
        if let Err(e) = reporter.report(outcome) {
            tracing::error!(error = %e, "Reporter failed");
        }
    }
}
