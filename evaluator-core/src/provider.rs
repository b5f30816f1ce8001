// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Compute instance lifecycle on top of a minimal provider API.
//!
//! The provider only needs create / describe / terminate. `InstanceLifecycle`
//! adds polling until ready, address resolution and best-effort teardown.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::cancel::CancelSignal;
use crate::error::{EvalError, EvalResult, ProviderError};
use crate::types::{InstanceId, InstanceType};

/// Tag key carrying the per-run identifier on every launched instance.
pub const RUN_ID_TAG: &str = "evaluator-run-id";

/// Everything the provider needs to create one instance. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub instance_type: InstanceType,
    pub image_id: String,
    pub user_data: String,
    pub tags: BTreeMap<String, String>,
    pub key_name: Option<String>,
    pub subnet_id: Option<String>,
    pub security_group_ids: Vec<String>,
}

/// Instance creation parameters shared by every instance type in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchTemplate {
    pub image_id: String,
    pub user_data: String,
    pub tags: BTreeMap<String, String>,
    pub key_name: Option<String>,
    pub subnet_id: Option<String>,
    pub security_group_ids: Vec<String>,
}

impl LaunchTemplate {
    /// Build the launch request for one instance type, tagged with the run identifier.
    pub fn spec_for(&self, instance_type: &InstanceType, run_id: &str) -> InstanceSpec {
        let mut tags = self.tags.clone();
        tags.insert(RUN_ID_TAG.to_string(), run_id.to_string());

        InstanceSpec {
            instance_type: instance_type.clone(),
            image_id: self.image_id.clone(),
            user_data: self.user_data.clone(),
            tags,
            key_name: self.key_name.clone(),
            subnet_id: self.subnet_id.clone(),
            security_group_ids: self.security_group_ids.clone(),
        }
    }
}

/// Provider-reported instance state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
    Other(String),
}

impl InstanceState {
    /// Parse the provider's state name (`pending`, `running`, `shutting-down`, ...).
    pub fn from_provider(name: &str) -> Self {
        match name {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "shutting-down" => Self::ShuttingDown,
            "terminated" => Self::Terminated,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Other(name) => name,
        }
    }

    /// States an instance never comes back from while we wait for it.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::ShuttingDown | Self::Terminated | Self::Stopping | Self::Stopped
        )
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Result of a provider `describe` call.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceDescription {
    pub state: InstanceState,
    pub public_dns_name: Option<String>,
    pub public_ip: Option<String>,
    /// Provider status checks; `None` when the provider does not report them.
    pub checks_passed: Option<bool>,
}

impl InstanceDescription {
    /// Running, and not failing any reported status check.
    pub fn is_ready(&self) -> bool {
        self.state == InstanceState::Running && self.checks_passed != Some(false)
    }

    /// Public DNS name if assigned, otherwise the public IP.
    pub fn address(&self) -> Option<&str> {
        fn non_empty(s: &Option<String>) -> Option<&str> {
            s.as_deref().filter(|v| !v.trim().is_empty())
        }
        non_empty(&self.public_dns_name).or_else(|| non_empty(&self.public_ip))
    }
}

/// Minimal cloud provider instance API.
#[async_trait]
pub trait InstanceProvider: Send + Sync {
    /// Request creation of one instance; returns as soon as an ID is assigned.
    async fn create(&self, spec: &InstanceSpec) -> Result<InstanceId, ProviderError>;

    /// Current state and network identity of an instance.
    async fn describe(&self, id: &InstanceId) -> Result<InstanceDescription, ProviderError>;

    /// Request termination. Unknown IDs should yield `ProviderError::NotFound`.
    async fn terminate(&self, id: &InstanceId) -> Result<(), ProviderError>;
}

/// An acquired instance. Must be handed back to [`InstanceLifecycle::release`].
#[derive(Debug)]
#[must_use = "acquired instances must be released"]
pub struct InstanceHandle {
    id: InstanceId,
    instance_type: InstanceType,
    ready: bool,
    address: Option<String>,
}

impl InstanceHandle {
    pub fn id(&self) -> &InstanceId {
        &self.id
    }

    pub fn instance_type(&self) -> &InstanceType {
        &self.instance_type
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Resolved address; only set once the instance was confirmed ready.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }
}

/// Wraps provider calls into acquire / await-ready / resolve / release.
pub struct InstanceLifecycle {
    provider: Arc<dyn InstanceProvider>,
    poll_interval: Duration,
}

impl InstanceLifecycle {
    pub fn new(provider: Arc<dyn InstanceProvider>, poll_interval: Duration) -> Self {
        Self {
            provider,
            poll_interval,
        }
    }

    /// Request an instance. The returned handle has no address yet.
    pub async fn acquire(&self, spec: &InstanceSpec) -> EvalResult<InstanceHandle> {
        tracing::info!(
            instance_type = %spec.instance_type,
            image_id = %spec.image_id,
            "Launching instance"
        );

        let id = self.provider.create(spec).await?;

        tracing::info!(instance_id = %id, instance_type = %spec.instance_type, "Instance created");

        Ok(InstanceHandle {
            id,
            instance_type: spec.instance_type.clone(),
            ready: false,
            address: None,
        })
    }

    /// Poll until the provider reports the instance running and healthy.
    ///
    /// `NotFound` right after creation is treated as not-yet-visible and
    /// polled again. A terminal provider state fails immediately.
    pub async fn await_ready(
        &self,
        handle: &mut InstanceHandle,
        timeout: Duration,
        cancel: &CancelSignal,
    ) -> EvalResult<()> {
        tracing::info!(instance_id = %handle.id, "Waiting for instance to enter 'running' state...");
        let start = Instant::now();

        let poll = self.poll_until_ready(&handle.id, cancel);
        let polls = match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(EvalError::Timeout {
                    stage: "instance ready",
                    waited: timeout,
                })
            }
        };

        handle.ready = true;
        tracing::info!(
            instance_id = %handle.id,
            polls,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Instance is running"
        );
        Ok(())
    }

    async fn poll_until_ready(&self, id: &InstanceId, cancel: &CancelSignal) -> EvalResult<u32> {
        const STAGE: &str = "awaiting instance ready";
        let mut polls: u32 = 0;

        loop {
            cancel.check(STAGE)?;
            polls += 1;

            match cancel.run(STAGE, self.provider.describe(id)).await? {
                Ok(description) if description.is_ready() => return Ok(polls),
                Ok(description) if description.state.is_failure() => {
                    return Err(ProviderError::FailedState {
                        instance_id: id.clone(),
                        state: description.state.to_string(),
                    }
                    .into());
                }
                Ok(description) => {
                    tracing::debug!(
                        instance_id = %id,
                        state = %description.state,
                        checks_passed = ?description.checks_passed,
                        polls,
                        "Instance not ready yet"
                    );
                }
                Err(ProviderError::NotFound { .. }) => {
                    tracing::debug!(instance_id = %id, polls, "Instance not visible yet");
                }
                Err(e) => return Err(e.into()),
            }

            cancel.sleep(self.poll_interval, STAGE).await?;
        }
    }

    /// Fetch the public address of a ready instance (DNS name preferred).
    pub async fn resolve_address(&self, handle: &mut InstanceHandle) -> EvalResult<String> {
        if !handle.ready {
            return Err(EvalError::AddressUnavailable {
                instance_id: handle.id.clone(),
                reason: "instance has not been confirmed ready".to_string(),
            });
        }

        let description = self.provider.describe(&handle.id).await?;
        let address = description
            .address()
            .map(str::to_string)
            .ok_or_else(|| EvalError::AddressUnavailable {
                instance_id: handle.id.clone(),
                reason: "neither public DNS name nor public IP assigned".to_string(),
            })?;

        tracing::info!(instance_id = %handle.id, address = %address, "Resolved instance address");
        handle.address = Some(address.clone());
        Ok(address)
    }

    /// Terminate the instance. Never fails: provider errors are logged only,
    /// so teardown cannot mask the error that led here.
    pub async fn release(&self, handle: InstanceHandle) {
        match self.provider.terminate(&handle.id).await {
            Ok(()) => {
                tracing::info!(
                    instance_id = %handle.id,
                    instance_type = %handle.instance_type,
                    "Instance terminated"
                );
            }
            Err(ProviderError::NotFound { .. }) => {
                tracing::debug!(instance_id = %handle.id, "Instance already gone");
            }
            Err(e) => {
                tracing::error!(
                    instance_id = %handle.id,
                    instance_type = %handle.instance_type,
                    error = %e,
                    "Failed to terminate instance; it may still be running"
                );
            }
        }
    }
}
