// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! EC2 instance provider backed by the `aws` command-line tool.
//!
//! Every call shells out once with `--output json` and parses the response.
//! Credentials and retries are left to the CLI's own configuration.

use std::collections::BTreeMap;

use async_trait::async_trait;
use evaluator_core::config::ProviderConfig;
use evaluator_core::provider::RUN_ID_TAG;
use evaluator_core::{
    InstanceDescription, InstanceId, InstanceProvider, InstanceSpec, InstanceState, ProviderError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;

/// Error code the EC2 API returns for unknown or already-purged instances.
const NOT_FOUND_CODE: &str = "InvalidInstanceID.NotFound";

/// Failure of one CLI invocation.
#[derive(Debug, Error)]
enum CliFailure {
    /// The binary could not be started.
    #[error("failed to run aws cli: {0}")]
    Spawn(#[source] std::io::Error),

    /// Non-zero exit; carries stderr.
    #[error("{}", .0.trim())]
    Exit(String),
}

impl CliFailure {
    fn is_not_found(&self) -> bool {
        matches!(self, Self::Exit(stderr) if stderr.contains(NOT_FOUND_CODE))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RunInstancesOutput {
    instances: Vec<LaunchedInstance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LaunchedInstance {
    instance_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesOutput {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<DescribedInstance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribedInstance {
    #[serde(default)]
    instance_id: Option<String>,
    state: StateName,
    #[serde(default)]
    public_dns_name: Option<String>,
    #[serde(default)]
    public_ip_address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StateName {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStatusOutput {
    #[serde(default)]
    instance_statuses: Vec<InstanceStatusEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceStatusEntry {
    instance_status: StatusSummary,
    system_status: StatusSummary,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatusSummary {
    status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TagSpecification<'a> {
    resource_type: &'static str,
    tags: Vec<Tag<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Tag<'a> {
    key: &'a str,
    value: &'a str,
}

/// `--tag-specifications` argument applying `tags` to the instance.
fn tag_specifications(tags: &BTreeMap<String, String>) -> serde_json::Result<String> {
    let spec = [TagSpecification {
        resource_type: "instance",
        tags: tags
            .iter()
            .map(|(key, value)| Tag { key, value })
            .collect(),
    }];
    serde_json::to_string(&spec)
}

fn parse_run_instances(stdout: &str) -> Result<String, ProviderError> {
    let output: RunInstancesOutput =
        serde_json::from_str(stdout).map_err(|e| ProviderError::MalformedResponse {
            reason: format!("run-instances: {}", e),
        })?;
    output
        .instances
        .into_iter()
        .next()
        .map(|i| i.instance_id)
        .ok_or_else(|| ProviderError::MalformedResponse {
            reason: "run-instances returned no instances".to_string(),
        })
}

/// `None` when the response lists no instance.
fn parse_describe_instances(stdout: &str) -> Result<Option<InstanceDescription>, ProviderError> {
    let output: DescribeInstancesOutput =
        serde_json::from_str(stdout).map_err(|e| ProviderError::MalformedResponse {
            reason: format!("describe-instances: {}", e),
        })?;

    Ok(output
        .reservations
        .into_iter()
        .flat_map(|r| r.instances)
        .next()
        .map(|i| InstanceDescription {
            state: InstanceState::from_provider(&i.state.name),
            public_dns_name: i.public_dns_name,
            public_ip: i.public_ip_address,
            checks_passed: None,
        }))
}

/// IDs of every instance listed in a `describe-instances` response.
fn parse_instance_ids(stdout: &str) -> Result<Vec<String>, ProviderError> {
    let output: DescribeInstancesOutput =
        serde_json::from_str(stdout).map_err(|e| ProviderError::MalformedResponse {
            reason: format!("describe-instances: {}", e),
        })?;

    Ok(output
        .reservations
        .into_iter()
        .flat_map(|r| r.instances)
        .filter_map(|i| i.instance_id)
        .collect())
}

/// Both system and instance checks report `ok`. No entry yet means not passed.
fn parse_status_checks(stdout: &str) -> Result<bool, ProviderError> {
    let output: DescribeStatusOutput =
        serde_json::from_str(stdout).map_err(|e| ProviderError::MalformedResponse {
            reason: format!("describe-instance-status: {}", e),
        })?;

    Ok(output
        .instance_statuses
        .first()
        .is_some_and(|s| s.instance_status.status == "ok" && s.system_status.status == "ok"))
}

/// Instance provider driving EC2 through the `aws` CLI.
pub struct AwsCliProvider {
    cli: String,
    region: String,
    profile: Option<String>,
    require_status_checks: bool,
}

impl AwsCliProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            cli: config.aws_cli.clone(),
            region: config.region.clone(),
            profile: config.profile.clone(),
            require_status_checks: config.require_status_checks,
        }
    }

    /// Common leading arguments: region, profile and JSON output.
    fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "--region".to_string(),
            self.region.clone(),
            "--output".to_string(),
            "json".to_string(),
        ];
        if let Some(profile) = &self.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        args
    }

    async fn exec(&self, args: Vec<String>) -> Result<String, CliFailure> {
        let subcommand = args.get(1).cloned().unwrap_or_default();
        tracing::debug!(cli = %self.cli, subcommand = %subcommand, "Invoking aws cli");

        let output = Command::new(&self.cli)
            .args(self.base_args())
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(CliFailure::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            tracing::debug!(subcommand = %subcommand, stderr = %stderr.trim(), "aws cli failed");
            return Err(CliFailure::Exit(stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn instance_args(subcommand: &str, id: &InstanceId) -> Vec<String> {
        vec![
            "ec2".to_string(),
            subcommand.to_string(),
            "--instance-ids".to_string(),
            id.to_string(),
        ]
    }

    /// Live instances of `spec`'s type carrying its run tag. `None` without a run tag.
    fn tagged_instances_args(spec: &InstanceSpec) -> Option<Vec<String>> {
        let run_id = spec.tags.get(RUN_ID_TAG)?;
        Some(vec![
            "ec2".to_string(),
            "describe-instances".to_string(),
            "--filters".to_string(),
            format!("Name=tag:{},Values={}", RUN_ID_TAG, run_id),
            format!("Name=instance-type,Values={}", spec.instance_type),
            "Name=instance-state-name,Values=pending,running".to_string(),
        ])
    }

    /// Terminate instances launched for `spec` whose ID never reached us.
    async fn terminate_untracked(&self, spec: &InstanceSpec) {
        let run_id = spec.tags.get(RUN_ID_TAG).map(String::as_str).unwrap_or("<none>");
        let Some(args) = Self::tagged_instances_args(spec) else {
            tracing::error!(
                instance_type = %spec.instance_type,
                "Launched instance has no run tag; find and terminate it manually"
            );
            return;
        };

        let ids = match self.exec(args).await {
            Ok(stdout) => parse_instance_ids(&stdout),
            Err(e) => Err(ProviderError::MalformedResponse {
                reason: e.to_string(),
            }),
        };
        let ids = match ids {
            Ok(ids) if !ids.is_empty() => ids,
            Ok(_) => {
                tracing::warn!(run_id, instance_type = %spec.instance_type, "No tagged instance found to clean up");
                return;
            }
            Err(e) => {
                tracing::error!(
                    run_id,
                    instance_type = %spec.instance_type,
                    error = %e,
                    "Cannot look up launched instance; terminate instances tagged {}={} manually",
                    RUN_ID_TAG,
                    run_id
                );
                return;
            }
        };

        let mut args = vec![
            "ec2".to_string(),
            "terminate-instances".to_string(),
            "--instance-ids".to_string(),
        ];
        args.extend(ids.iter().cloned());
        match self.exec(args).await {
            Ok(_) => tracing::warn!(run_id, ids = ?ids, "Terminated untracked instances"),
            Err(e) => tracing::error!(
                run_id,
                ids = ?ids,
                error = %e,
                "Failed to terminate untracked instances; they may still be running"
            ),
        }
    }

    fn run_instances_args(spec: &InstanceSpec) -> Result<Vec<String>, ProviderError> {
        let tags = tag_specifications(&spec.tags).map_err(|e| ProviderError::CreateRejected {
            instance_type: spec.instance_type.clone(),
            reason: format!("invalid tags: {}", e),
        })?;

        let mut args = vec![
            "ec2".to_string(),
            "run-instances".to_string(),
            "--image-id".to_string(),
            spec.image_id.clone(),
            "--instance-type".to_string(),
            spec.instance_type.to_string(),
            "--count".to_string(),
            "1".to_string(),
            "--tag-specifications".to_string(),
            tags,
        ];
        if !spec.user_data.is_empty() {
            args.push("--user-data".to_string());
            args.push(spec.user_data.clone());
        }
        if let Some(key_name) = &spec.key_name {
            args.push("--key-name".to_string());
            args.push(key_name.clone());
        }
        if let Some(subnet_id) = &spec.subnet_id {
            args.push("--subnet-id".to_string());
            args.push(subnet_id.clone());
        }
        if !spec.security_group_ids.is_empty() {
            args.push("--security-group-ids".to_string());
            args.extend(spec.security_group_ids.iter().cloned());
        }
        Ok(args)
    }
}

#[async_trait]
impl InstanceProvider for AwsCliProvider {
    async fn create(&self, spec: &InstanceSpec) -> Result<InstanceId, ProviderError> {
        let stdout = self
            .exec(Self::run_instances_args(spec)?)
            .await
            .map_err(|e| ProviderError::CreateRejected {
                instance_type: spec.instance_type.clone(),
                reason: e.to_string(),
            })?;

        let parsed = parse_run_instances(&stdout).and_then(|raw_id| {
            InstanceId::new(raw_id).map_err(|e| ProviderError::MalformedResponse {
                reason: e.to_string(),
            })
        });
        if parsed.is_err() {
            self.terminate_untracked(spec).await;
        }
        parsed
    }

    async fn describe(&self, id: &InstanceId) -> Result<InstanceDescription, ProviderError> {
        let map_failure = |e: CliFailure| {
            if e.is_not_found() {
                ProviderError::NotFound {
                    instance_id: id.clone(),
                }
            } else {
                ProviderError::DescribeFailed {
                    instance_id: id.clone(),
                    reason: e.to_string(),
                }
            }
        };

        let stdout = self
            .exec(Self::instance_args("describe-instances", id))
            .await
            .map_err(map_failure)?;
        let mut description =
            parse_describe_instances(&stdout)?.ok_or_else(|| ProviderError::NotFound {
                instance_id: id.clone(),
            })?;

        if self.require_status_checks && description.state == InstanceState::Running {
            let stdout = self
                .exec(Self::instance_args("describe-instance-status", id))
                .await
                .map_err(map_failure)?;
            description.checks_passed = Some(parse_status_checks(&stdout)?);
        }

        Ok(description)
    }

    async fn terminate(&self, id: &InstanceId) -> Result<(), ProviderError> {
        self.exec(Self::instance_args("terminate-instances", id))
            .await
            .map(|_| ())
            .map_err(|e| {
                if e.is_not_found() {
                    ProviderError::NotFound {
                        instance_id: id.clone(),
                    }
                } else {
                    ProviderError::TerminateFailed {
                        instance_id: id.clone(),
                        reason: e.to_string(),
                    }
                }
            })
    }
}
