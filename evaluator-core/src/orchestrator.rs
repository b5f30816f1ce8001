// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Sequential benchmark orchestrator.
//!
//! For each configured instance type, in order: acquire an instance, wait for
//! it to run, resolve its address, wait for the service, measure latency and
//! derive cost. The instance is released after every iteration that acquired
//! one, whatever happened in between. Failures are recorded against their
//! instance type and the run moves on unless the failure policy says abort.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelSignal;
use crate::config::Config;
use crate::error::{ErrorKind, EvalError, EvalResult};
use crate::health::{HealthCheckConfig, HealthProbe, ServiceHealthWaiter};
use crate::inference::{average_latency, InferenceBenchmarker, InferenceClient, Payload};
use crate::pricing::CostModel;
use crate::provider::{InstanceHandle, InstanceLifecycle, InstanceProvider, LaunchTemplate};
use crate::results::{
    BenchmarkResult, IterationFailure, IterationOutcome, IterationStatus, RunOutcome,
};
use crate::state::{Completion, IterationState, IterationStateMachine};
use crate::stats::LatencyStats;
use crate::types::{InstanceId, InstanceType};

/// What to do with the remaining instance types after one fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and move on to the next instance type.
    #[default]
    Continue,
    /// Record the failure and skip every remaining instance type.
    Abort,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub instance_ready_timeout: Duration,
    pub instance_poll_interval: Duration,
    pub failure_policy: FailurePolicy,
}

pub struct BenchmarkOrchestrator {
    lifecycle: InstanceLifecycle,
    health: ServiceHealthWaiter,
    health_config: HealthCheckConfig,
    benchmarker: InferenceBenchmarker,
    cost_model: CostModel,
    launch: LaunchTemplate,
    settings: OrchestratorSettings,
}

impl BenchmarkOrchestrator {
    /// Wire the collaborators described by `config` around the given
    /// provider and HTTP implementations.
    pub fn from_config(
        config: &Config,
        provider: Arc<dyn InstanceProvider>,
        probe: Arc<dyn HealthProbe>,
        client: Arc<dyn InferenceClient>,
    ) -> Self {
        let settings = config.orchestrator_settings();
        Self {
            lifecycle: InstanceLifecycle::new(provider, settings.instance_poll_interval),
            health: ServiceHealthWaiter::new(probe),
            health_config: config.health_check(),
            benchmarker: InferenceBenchmarker::new(client, config.inference()),
            cost_model: config.cost_model(),
            launch: config.provider.launch.clone(),
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Benchmark every instance type in order and collect one entry per type.
    ///
    /// Only an invalid `runs` fails the call itself; everything that goes
    /// wrong inside an iteration is recorded in that iteration's entry.
    pub async fn run(
        &self,
        instance_types: &[InstanceType],
        runs: u32,
        payload: &Payload,
        run_id: &str,
        cancel: &CancelSignal,
    ) -> EvalResult<RunOutcome> {
        if runs == 0 {
            return Err(EvalError::InvalidArgument {
                field: "runs",
                reason: "Run count must be at least 1".to_string(),
            });
        }

        tracing::info!(
            run_id,
            instance_types = instance_types.len(),
            runs,
            "Starting benchmark run"
        );

        let mut entries = Vec::with_capacity(instance_types.len());
        let mut skip_reason: Option<String> = None;
        let mut cancelled = false;

        for instance_type in instance_types {
            if skip_reason.is_none() && cancel.is_cancelled() {
                skip_reason = Some("run cancelled".to_string());
                cancelled = true;
            }

            if let Some(reason) = &skip_reason {
                tracing::warn!(instance_type = %instance_type, reason = %reason, "Skipping instance type");
                entries.push(IterationOutcome {
                    instance_type: instance_type.clone(),
                    instance_id: None,
                    elapsed_s: 0.0,
                    status: IterationStatus::Skipped {
                        reason: reason.clone(),
                    },
                });
                continue;
            }

            let entry = self
                .run_iteration(instance_type, runs, payload, run_id, cancel)
                .await;

            if let Some(failure) = entry.failure() {
                if failure.kind == ErrorKind::Cancelled {
                    cancelled = true;
                    skip_reason = Some("run cancelled".to_string());
                } else if self.settings.failure_policy == FailurePolicy::Abort {
                    skip_reason = Some(format!("aborted after {} failed", instance_type));
                }
            }

            entries.push(entry);
        }

        let outcome = RunOutcome {
            run_id: run_id.to_string(),
            runs_per_instance: runs,
            cancelled,
            entries,
        };

        tracing::info!(
            run_id,
            succeeded = outcome.success_count(),
            total = outcome.entries.len(),
            cancelled = outcome.cancelled,
            "Benchmark run finished"
        );

        Ok(outcome)
    }

    /// One full iteration. Never fails: errors become a `Failed` entry.
    async fn run_iteration(
        &self,
        instance_type: &InstanceType,
        runs: u32,
        payload: &Payload,
        run_id: &str,
        cancel: &CancelSignal,
    ) -> IterationOutcome {
        let mut machine = IterationStateMachine::new(instance_type.clone());
        let mut instance_id: Option<InstanceId> = None;

        let result = self
            .execute(&mut machine, &mut instance_id, runs, payload, run_id, cancel)
            .await;

        let released = IterationState::Released(Completion::Success);
        let status = match result {
            Ok(result) => match machine.transition_to(released) {
                Ok(()) => IterationStatus::Succeeded(result),
                Err(e) => record_failure(&mut machine, e.into()),
            },
            Err(e) => record_failure(&mut machine, e),
        };

        IterationOutcome {
            instance_type: instance_type.clone(),
            instance_id: instance_id.map(String::from),
            elapsed_s: machine.elapsed().as_secs_f64(),
            status,
        }
    }

    /// Acquire, measure, release. Release runs for every acquired instance.
    async fn execute(
        &self,
        machine: &mut IterationStateMachine,
        instance_id: &mut Option<InstanceId>,
        runs: u32,
        payload: &Payload,
        run_id: &str,
        cancel: &CancelSignal,
    ) -> EvalResult<BenchmarkResult> {
        let instance_type = machine.instance_type().clone();

        // Unpriced types would waste a full launch before failing at cost time.
        if !self.cost_model.prices().contains(&instance_type) {
            return Err(EvalError::UnknownInstanceType(instance_type));
        }
        cancel.check("acquiring instance")?;

        let spec = self.launch.spec_for(&instance_type, run_id);
        let mut handle = self.lifecycle.acquire(&spec).await?;
        *instance_id = Some(handle.id().clone());

        let measured = self
            .measure(machine, &mut handle, runs, payload, cancel)
            .await;
        self.lifecycle.release(handle).await;
        measured
    }

    async fn measure(
        &self,
        machine: &mut IterationStateMachine,
        handle: &mut InstanceHandle,
        runs: u32,
        payload: &Payload,
        cancel: &CancelSignal,
    ) -> EvalResult<BenchmarkResult> {
        machine.transition_to(IterationState::AwaitingReady)?;
        self.lifecycle
            .await_ready(handle, self.settings.instance_ready_timeout, cancel)
            .await?;

        machine.transition_to(IterationState::ResolvingAddress)?;
        cancel.check("resolving address")?;
        let address = self.lifecycle.resolve_address(handle).await?;

        machine.transition_to(IterationState::AwaitingHealthy)?;
        self.health
            .wait_until_healthy(&address, &self.health_config, cancel)
            .await?;

        machine.transition_to(IterationState::Benchmarking)?;
        let samples = self.benchmarker.run(&address, payload, runs, cancel).await?;

        machine.transition_to(IterationState::ComputingCost)?;
        let (avg_latency_s, latency) = average_latency(&samples)
            .zip(LatencyStats::from_samples(&samples))
            .ok_or_else(|| EvalError::InvalidArgument {
                field: "samples",
                reason: "Benchmark returned no samples".to_string(),
            })?;

        tracing::info!(
            "Avg latency on {}: {:.4}s over {} runs",
            address,
            avg_latency_s,
            runs
        );

        let instance_type = handle.instance_type().clone();
        let cost_per_inference_usd =
            self.cost_model
                .cost_per_inference(&instance_type, avg_latency_s, runs)?;

        tracing::info!(
            instance_type = %instance_type,
            avg_latency_s,
            p95_s = latency.p95_s,
            cost_per_inference_usd,
            "Benchmark iteration complete"
        );

        Ok(BenchmarkResult {
            instance_type,
            avg_latency_s,
            cost_per_inference_usd,
            runs,
            latency,
        })
    }
}

/// Move the machine to Released(Failure) and describe where it failed.
fn record_failure(machine: &mut IterationStateMachine, error: EvalError) -> IterationStatus {
    let stage = machine.fail().unwrap_or_else(|_| machine.state());

    tracing::error!(
        instance_type = %machine.instance_type(),
        stage = stage.name(),
        kind = error.kind().name(),
        error = %error,
        "Benchmark iteration failed"
    );

    IterationStatus::Failed(IterationFailure {
        kind: error.kind(),
        stage: stage.name().to_string(),
        message: error.to_string(),
    })
}
