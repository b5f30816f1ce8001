// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict schema validation.
//!
//! Every section is optional except `provider.image_id`. Any invalid field
//! results in a HardValidationError before a single instance is launched.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, EvalResult, HardValidationError};
use crate::health::HealthCheckConfig;
use crate::inference::{InferenceConfig, PayloadEncoding};
use crate::orchestrator::{FailurePolicy, OrchestratorSettings};
use crate::pricing::{CostModel, PriceTable};
use crate::provider::LaunchTemplate;
use crate::results::SuccessCriteria;
use crate::types::{InstanceType, Port};

/// Raw provider section as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProviderConfig {
    #[serde(default = "default_region")]
    region: String,
    #[serde(default)]
    profile: Option<String>,
    #[serde(default = "default_aws_cli")]
    aws_cli: String,
    image_id: String,
    #[serde(default)]
    user_data: Option<String>,
    #[serde(default)]
    user_data_path: Option<PathBuf>,
    #[serde(default = "default_tags")]
    tags: BTreeMap<String, String>,
    #[serde(default)]
    key_name: Option<String>,
    #[serde(default)]
    subnet_id: Option<String>,
    #[serde(default)]
    security_group_ids: Vec<String>,
    #[serde(default)]
    require_status_checks: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_aws_cli() -> String {
    "aws".to_string()
}

fn default_tags() -> BTreeMap<String, String> {
    BTreeMap::from([("Name".to_string(), "ai-evaluator".to_string())])
}

/// Raw service section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawServiceConfig {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_health_path")]
    health_path: String,
    #[serde(default = "default_model")]
    model: String,
    #[serde(default = "default_payload_path")]
    payload_path: PathBuf,
    #[serde(default)]
    payload_encoding: PayloadEncoding,
}

fn default_port() -> u16 {
    8080
}

fn default_health_path() -> String {
    "/ping".to_string()
}

fn default_model() -> String {
    "resnet50".to_string()
}

fn default_payload_path() -> PathBuf {
    PathBuf::from("sample.png")
}

impl Default for RawServiceConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            health_path: default_health_path(),
            model: default_model(),
            payload_path: default_payload_path(),
            payload_encoding: PayloadEncoding::default(),
        }
    }
}

/// Raw timeouts section, all in seconds.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTimeoutConfig {
    #[serde(default = "default_instance_ready_secs")]
    instance_ready_secs: u64,
    #[serde(default = "default_instance_poll_interval_secs")]
    instance_poll_interval_secs: u64,
    #[serde(default = "default_health_deadline_secs")]
    health_deadline_secs: u64,
    #[serde(default = "default_health_poll_interval_secs")]
    health_poll_interval_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    probe_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
    #[serde(default)]
    run_deadline_secs: Option<u64>,
}

fn default_instance_ready_secs() -> u64 {
    600
}

fn default_instance_poll_interval_secs() -> u64 {
    15
}

fn default_health_deadline_secs() -> u64 {
    300
}

fn default_health_poll_interval_secs() -> u64 {
    5
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for RawTimeoutConfig {
    fn default() -> Self {
        Self {
            instance_ready_secs: default_instance_ready_secs(),
            instance_poll_interval_secs: default_instance_poll_interval_secs(),
            health_deadline_secs: default_health_deadline_secs(),
            health_poll_interval_secs: default_health_poll_interval_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            run_deadline_secs: None,
        }
    }
}

/// Raw benchmark section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBenchmarkConfig {
    #[serde(default = "default_instance_types")]
    instance_types: Vec<String>,
    #[serde(default = "default_runs")]
    runs: u32,
    #[serde(default)]
    warmup_runs: u32,
    #[serde(default)]
    failure_policy: FailurePolicy,
    #[serde(default)]
    success_criteria: SuccessCriteria,
}

fn default_instance_types() -> Vec<String> {
    vec!["t3.medium".to_string(), "g4dn.xlarge".to_string()]
}

fn default_runs() -> u32 {
    100
}

impl Default for RawBenchmarkConfig {
    fn default() -> Self {
        Self {
            instance_types: default_instance_types(),
            runs: default_runs(),
            warmup_runs: 0,
            failure_policy: FailurePolicy::default(),
            success_criteria: SuccessCriteria::default(),
        }
    }
}

fn default_pricing() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("t3.medium".to_string(), 0.0416),
        ("g4dn.xlarge".to_string(), 0.526),
    ])
}

/// Raw root configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    provider: RawProviderConfig,
    #[serde(default)]
    service: RawServiceConfig,
    #[serde(default)]
    timeouts: RawTimeoutConfig,
    #[serde(default = "default_pricing")]
    pricing: BTreeMap<String, f64>,
    #[serde(default)]
    benchmark: RawBenchmarkConfig,
}

/// Validated provider configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderConfig {
    pub region: String,
    pub profile: Option<String>,
    pub aws_cli: String,
    pub launch: LaunchTemplate,
    pub require_status_checks: bool,
}

/// Validated inference service configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceConfig {
    pub port: Port,
    pub health_path: String,
    pub model: String,
    /// Resolved against the config file's directory.
    pub payload_path: PathBuf,
    pub payload_encoding: PayloadEncoding,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeoutConfig {
    pub instance_ready: Duration,
    pub instance_poll_interval: Duration,
    pub health_deadline: Duration,
    pub health_poll_interval: Duration,
    pub probe_timeout: Duration,
    pub request_timeout: Duration,
    /// Whole-run budget; cancels the run when exceeded.
    pub run_deadline: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkConfig {
    pub instance_types: Vec<InstanceType>,
    pub runs: u32,
    pub warmup_runs: u32,
    pub failure_policy: FailurePolicy,
    pub success_criteria: SuccessCriteria,
}

/// Complete validated configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub provider: ProviderConfig,
    pub service: ServiceConfig,
    pub timeouts: TimeoutConfig,
    pub pricing: PriceTable,
    pub benchmark: BenchmarkConfig,
}

impl Config {
    pub fn health_check(&self) -> HealthCheckConfig {
        HealthCheckConfig {
            port: self.service.port,
            path: self.service.health_path.clone(),
            poll_interval: self.timeouts.health_poll_interval,
            deadline: self.timeouts.health_deadline,
            probe_timeout: self.timeouts.probe_timeout,
        }
    }

    pub fn inference(&self) -> InferenceConfig {
        InferenceConfig {
            port: self.service.port,
            model: self.service.model.clone(),
            request_timeout: self.timeouts.request_timeout,
            warmup_runs: self.benchmark.warmup_runs,
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            instance_ready_timeout: self.timeouts.instance_ready,
            instance_poll_interval: self.timeouts.instance_poll_interval,
            failure_policy: self.benchmark.failure_policy,
        }
    }

    pub fn cost_model(&self) -> CostModel {
        CostModel::new(self.pricing.clone())
    }

    /// Configured instance types with no hourly rate.
    pub fn unpriced_instance_types(&self) -> Vec<&InstanceType> {
        self.benchmark
            .instance_types
            .iter()
            .filter(|t| !self.pricing.contains(t))
            .collect()
    }

    /// Replace the instance list and/or run count, validating the new values
    /// the same way the file values are validated.
    pub fn apply_overrides(
        &mut self,
        instance_types: Option<Vec<String>>,
        runs: Option<u32>,
    ) -> EvalResult<()> {
        if let Some(types) = instance_types {
            self.benchmark.instance_types = ConfigLoader::validate_instance_types(types)?;
        }
        if let Some(runs) = runs {
            self.benchmark.runs = ConfigLoader::validate_runs(runs)?;
        }
        ConfigLoader::warn_unpriced(self);
        Ok(())
    }
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file. Relative paths inside
    /// the file are resolved against the file's directory.
    pub fn load_file(path: impl AsRef<Path>) -> EvalResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(EvalError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| EvalError::Io {
            context: "reading config file",
            source: e,
        })?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        Self::load_string_in(&content, base_dir)
    }

    /// Load and validate configuration from a YAML string. Relative paths stay
    /// relative to the working directory.
    pub fn load_string(content: &str) -> EvalResult<Config> {
        Self::load_string_in(content, Path::new(""))
    }

    fn load_string_in(content: &str, base_dir: &Path) -> EvalResult<Config> {
        let raw: RawConfig =
            serde_yaml::from_str(content).map_err(|e| EvalError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?;

        let config = Self::validate(raw, base_dir)?;
        Self::warn_unpriced(&config);
        Ok(config)
    }

    /// Validate raw configuration and convert to validated types.
    fn validate(raw: RawConfig, base_dir: &Path) -> EvalResult<Config> {
        let provider = Self::validate_provider(raw.provider, base_dir)?;
        let service = Self::validate_service(raw.service, base_dir)?;
        let timeouts = Self::validate_timeouts(raw.timeouts)?;

        let mut pricing = PriceTable::new();
        for (name, rate) in raw.pricing {
            pricing.insert(InstanceType::new(name)?, rate)?;
        }

        let benchmark = BenchmarkConfig {
            instance_types: Self::validate_instance_types(raw.benchmark.instance_types)?,
            runs: Self::validate_runs(raw.benchmark.runs)?,
            warmup_runs: raw.benchmark.warmup_runs,
            failure_policy: raw.benchmark.failure_policy,
            success_criteria: raw.benchmark.success_criteria,
        };

        Ok(Config {
            provider,
            service,
            timeouts,
            pricing,
            benchmark,
        })
    }

    fn validate_provider(raw: RawProviderConfig, base_dir: &Path) -> EvalResult<ProviderConfig> {
        if raw.image_id.trim().is_empty() {
            return Err(HardValidationError::MissingRequiredField {
                field: "image_id",
                context: "provider".to_string(),
            }
            .into());
        }

        if raw.region.trim().is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "region",
                value: raw.region,
                reason: "Region cannot be empty".to_string(),
            }
            .into());
        }

        let user_data = match (raw.user_data, raw.user_data_path) {
            (Some(_), Some(_)) => {
                return Err(HardValidationError::SchemaValidation {
                    message: "provider.user_data and provider.user_data_path are mutually exclusive"
                        .to_string(),
                }
                .into());
            }
            (Some(inline), None) => inline,
            (None, Some(path)) => {
                std::fs::read_to_string(base_dir.join(path)).map_err(|e| EvalError::Io {
                    context: "reading user data file",
                    source: e,
                })?
            }
            (None, None) => String::new(),
        };

        for key in raw.tags.keys() {
            if key.trim().is_empty() {
                return Err(HardValidationError::InvalidFieldValue {
                    field: "tags",
                    value: key.clone(),
                    reason: "Tag keys cannot be empty".to_string(),
                }
                .into());
            }
        }

        Ok(ProviderConfig {
            region: raw.region,
            profile: raw.profile,
            aws_cli: raw.aws_cli,
            launch: LaunchTemplate {
                image_id: raw.image_id,
                user_data,
                tags: raw.tags,
                key_name: raw.key_name,
                subnet_id: raw.subnet_id,
                security_group_ids: raw.security_group_ids,
            },
            require_status_checks: raw.require_status_checks,
        })
    }

    fn validate_service(raw: RawServiceConfig, base_dir: &Path) -> EvalResult<ServiceConfig> {
        let port = Port::new(raw.port)?;

        if !raw.health_path.starts_with('/') {
            return Err(HardValidationError::InvalidFieldValue {
                field: "health_path",
                value: raw.health_path,
                reason: "Must start with '/'".to_string(),
            }
            .into());
        }

        if raw.model.is_empty() || raw.model.contains(['/', '?', '#', ' ']) {
            return Err(HardValidationError::InvalidFieldValue {
                field: "model",
                value: raw.model,
                reason: "Model name must be a non-empty URL path segment".to_string(),
            }
            .into());
        }

        if let PayloadEncoding::Multipart { field } = &raw.payload_encoding {
            if field.is_empty() {
                return Err(HardValidationError::InvalidFieldValue {
                    field: "payload_encoding.field",
                    value: String::new(),
                    reason: "Multipart field name cannot be empty".to_string(),
                }
                .into());
            }
        }

        Ok(ServiceConfig {
            port,
            health_path: raw.health_path,
            model: raw.model,
            payload_path: base_dir.join(raw.payload_path),
            payload_encoding: raw.payload_encoding,
        })
    }

    fn validate_timeouts(raw: RawTimeoutConfig) -> EvalResult<TimeoutConfig> {
        let secs = |field: &'static str, value: u64| -> Result<Duration, HardValidationError> {
            if value == 0 {
                return Err(HardValidationError::InvalidFieldValue {
                    field,
                    value: "0".to_string(),
                    reason: "Must be greater than 0".to_string(),
                });
            }
            Ok(Duration::from_secs(value))
        };

        let run_deadline = raw
            .run_deadline_secs
            .map(|v| secs("run_deadline_secs", v))
            .transpose()?;

        Ok(TimeoutConfig {
            instance_ready: secs("instance_ready_secs", raw.instance_ready_secs)?,
            instance_poll_interval: secs(
                "instance_poll_interval_secs",
                raw.instance_poll_interval_secs,
            )?,
            health_deadline: secs("health_deadline_secs", raw.health_deadline_secs)?,
            health_poll_interval: secs("health_poll_interval_secs", raw.health_poll_interval_secs)?,
            probe_timeout: secs("probe_timeout_secs", raw.probe_timeout_secs)?,
            request_timeout: secs("request_timeout_secs", raw.request_timeout_secs)?,
            run_deadline,
        })
    }

    fn validate_instance_types(names: Vec<String>) -> EvalResult<Vec<InstanceType>> {
        if names.is_empty() {
            return Err(HardValidationError::SchemaValidation {
                message: "At least one instance type must be configured".to_string(),
            }
            .into());
        }

        let mut seen = HashSet::new();
        let mut types = Vec::with_capacity(names.len());
        for name in names {
            let instance_type = InstanceType::new(name)?;
            if !seen.insert(instance_type.clone()) {
                return Err(HardValidationError::DuplicateInstanceType {
                    instance_type: instance_type.to_string(),
                }
                .into());
            }
            types.push(instance_type);
        }
        Ok(types)
    }

    fn validate_runs(runs: u32) -> EvalResult<u32> {
        if runs == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "runs",
                value: "0".to_string(),
                reason: "Run count must be at least 1".to_string(),
            }
            .into());
        }
        Ok(runs)
    }

    /// Unpriced types are not a config error; they fail their own iteration.
    fn warn_unpriced(config: &Config) {
        for instance_type in config.unpriced_instance_types() {
            tracing::warn!(
                instance_type = %instance_type,
                "No pricing info configured; this instance type will fail before launch"
            );
        }
    }
}
