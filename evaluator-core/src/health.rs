// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Application-level readiness: poll the service's health endpoint until it
//! answers 200 or the deadline passes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::cancel::CancelSignal;
use crate::error::{EvalError, EvalResult, TransportError};
use crate::types::Port;

/// Only this status counts as healthy.
const HEALTHY_STATUS: u16 = 200;

/// Health endpoint polling parameters. Pure value.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthCheckConfig {
    pub port: Port,
    pub path: String,
    pub poll_interval: Duration,
    /// Wall-clock budget measured from the start of the wait.
    pub deadline: Duration,
    /// Upper bound for a single probe.
    pub probe_timeout: Duration,
}

impl HealthCheckConfig {
    pub fn url(&self, address: &str) -> String {
        format!("http://{}:{}{}", address, self.port, self.path)
    }
}

/// One lightweight health request; returns the HTTP status.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, url: &str, timeout: Duration) -> Result<u16, TransportError>;
}

pub struct ServiceHealthWaiter {
    probe: Arc<dyn HealthProbe>,
}

impl ServiceHealthWaiter {
    pub fn new(probe: Arc<dyn HealthProbe>) -> Self {
        Self { probe }
    }

    /// Probe every `poll_interval` until one probe returns 200.
    ///
    /// Transport errors and non-200 statuses count as "not ready yet". Fails
    /// with `ServiceUnavailable` once `deadline` has elapsed without success.
    /// Returns the number of probes issued.
    pub async fn wait_until_healthy(
        &self,
        address: &str,
        config: &HealthCheckConfig,
        cancel: &CancelSignal,
    ) -> EvalResult<u32> {
        const STAGE: &str = "awaiting service health";

        let url = config.url(address);
        let start = Instant::now();
        let mut attempts: u32 = 0;

        tracing::info!(url = %url, "Waiting for service health endpoint...");

        while start.elapsed() < config.deadline {
            cancel.check(STAGE)?;
            attempts += 1;

            let probe = tokio::time::timeout(
                config.probe_timeout,
                self.probe.probe(&url, config.probe_timeout),
            );
            match cancel.run(STAGE, probe).await? {
                Ok(Ok(HEALTHY_STATUS)) => {
                    tracing::info!(
                        url = %url,
                        attempts,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Service is ready"
                    );
                    return Ok(attempts);
                }
                Ok(Ok(status)) => {
                    tracing::debug!(url = %url, status, attempts, "Health probe not ready");
                }
                Ok(Err(e)) => {
                    tracing::debug!(url = %url, error = %e, attempts, "Health probe failed");
                }
                Err(_) => {
                    tracing::debug!(url = %url, attempts, "Health probe timed out");
                }
            }

            cancel.sleep(config.poll_interval, STAGE).await?;
        }

        Err(EvalError::ServiceUnavailable {
            url,
            deadline: config.deadline,
            attempts,
        })
    }
}
