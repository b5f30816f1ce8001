// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Inference latency measurement.
//!
//! Sends the same payload `runs` times and records each round trip. Any
//! failed request aborts the run: a latency figure built from a partial run
//! would not be comparable across instance types.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::cancel::CancelSignal;
use crate::error::{EvalError, EvalResult, TransportError};
use crate::types::{LatencySample, Port};

/// How the payload is put on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum PayloadEncoding {
    /// Multipart form upload with the payload as a single file field.
    Multipart { field: String },
    /// Payload bytes as the raw request body.
    Raw,
}

impl Default for PayloadEncoding {
    fn default() -> Self {
        Self::Multipart {
            field: "data".to_string(),
        }
    }
}

/// Opaque request body sent to the inference endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub encoding: PayloadEncoding,
}

impl Payload {
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>, encoding: PayloadEncoding) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
            encoding,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Sends one inference request; returns the HTTP status.
/// Serialization of the payload happens inside and is part of the measured time.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn infer(
        &self,
        url: &str,
        payload: &Payload,
        timeout: Duration,
    ) -> Result<u16, TransportError>;
}

/// Statuses below 400 are successful responses.
pub fn is_success_status(status: u16) -> bool {
    status < 400
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    pub port: Port,
    pub model: String,
    pub request_timeout: Duration,
    /// Untimed requests issued before measurement.
    pub warmup_runs: u32,
}

impl InferenceConfig {
    pub fn url(&self, address: &str) -> String {
        format!("http://{}:{}/predictions/{}", address, self.port, self.model)
    }
}

pub struct InferenceBenchmarker {
    client: Arc<dyn InferenceClient>,
    config: InferenceConfig,
}

impl InferenceBenchmarker {
    pub fn new(client: Arc<dyn InferenceClient>, config: InferenceConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Issue `runs` requests and return every latency in order.
    ///
    /// Fails with `InvalidArgument` when `runs == 0` and with
    /// `InferenceRequest` on the first failed request; no partial samples are
    /// returned in that case.
    pub async fn run(
        &self,
        address: &str,
        payload: &Payload,
        runs: u32,
        cancel: &CancelSignal,
    ) -> EvalResult<Vec<LatencySample>> {
        const STAGE: &str = "benchmarking";

        if runs == 0 {
            return Err(EvalError::InvalidArgument {
                field: "runs",
                reason: "Run count must be at least 1".to_string(),
            });
        }

        let url = self.config.url(address);

        if self.config.warmup_runs > 0 {
            tracing::debug!(url = %url, warmup_runs = self.config.warmup_runs, "Warming up");
            for _ in 0..self.config.warmup_runs {
                cancel.check(STAGE)?;
                self.send(&url, payload, 0, cancel).await?;
            }
        }

        let mut samples = Vec::with_capacity(runs as usize);
        for iteration in 1..=runs {
            cancel.check(STAGE)?;

            let start = Instant::now();
            self.send(&url, payload, iteration, cancel).await?;
            samples.push(LatencySample::new(start.elapsed()));
        }

        tracing::debug!(url = %url, runs, "Benchmark run complete");
        Ok(samples)
    }

    /// One bounded request. `iteration` 0 denotes a warm-up request.
    async fn send(
        &self,
        url: &str,
        payload: &Payload,
        iteration: u32,
        cancel: &CancelSignal,
    ) -> EvalResult<()> {
        let timeout = self.config.request_timeout;
        let request = tokio::time::timeout(timeout, self.client.infer(url, payload, timeout));

        match cancel.run("benchmarking", request).await? {
            Ok(Ok(status)) if is_success_status(status) => Ok(()),
            Ok(Ok(status)) => Err(EvalError::InferenceRequest {
                iteration,
                reason: format!("HTTP status {}", status),
            }),
            Ok(Err(e)) => Err(EvalError::InferenceRequest {
                iteration,
                reason: e.to_string(),
            }),
            Err(_) => Err(EvalError::InferenceRequest {
                iteration,
                reason: TransportError::TimedOut { after: timeout }.to_string(),
            }),
        }
    }
}

/// Arithmetic mean latency in seconds; `None` for an empty run.
pub fn average_latency(samples: &[LatencySample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let sum: f64 = samples.iter().map(LatencySample::seconds).sum();
    Some(sum / samples.len() as f64)
}
