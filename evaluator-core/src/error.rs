// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for the evaluator.
//!
//! Every failure inside one instance-type iteration is an `EvalError`. The
//! orchestrator records it against that instance type via [`EvalError::kind`]
//! and moves on; nothing below the orchestrator swallows errors except
//! teardown, which only logs.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{InstanceId, InstanceType};

/// Top-level error type for the evaluator core.
#[derive(Debug, Error)]
pub enum EvalError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Instance Lifecycle Errors
    // =========================================================================
    #[error("Provision error: {0}")]
    Provision(#[from] ProviderError),

    #[error("Timed out after {}s waiting for {stage}", waited.as_secs_f64())]
    Timeout {
        stage: &'static str,
        waited: Duration,
    },

    #[error("No network address available for instance {instance_id}: {reason}")]
    AddressUnavailable {
        instance_id: InstanceId,
        reason: String,
    },

    // =========================================================================
    // Service Errors
    // =========================================================================
    #[error("Service at {url} not healthy within {}s ({attempts} probes)", deadline.as_secs_f64())]
    ServiceUnavailable {
        url: String,
        deadline: Duration,
        attempts: u32,
    },

    #[error("Inference request {iteration} failed: {reason}")]
    InferenceRequest { iteration: u32, reason: String },

    // =========================================================================
    // Cost Model / Argument Errors
    // =========================================================================
    #[error("No pricing info for instance type: {0}")]
    UnknownInstanceType(InstanceType),

    #[error("Invalid argument: {field} - {reason}")]
    InvalidArgument {
        field: &'static str,
        reason: String,
    },

    // =========================================================================
    // Control Flow
    // =========================================================================
    #[error("Cancelled while {stage}")]
    Cancelled { stage: &'static str },

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(#[from] StateTransitionError),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl EvalError {
    /// Classify this error for per-instance-type reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::HardValidation(_) | Self::ConfigNotFound { .. } | Self::ConfigParse { .. } => {
                ErrorKind::Config
            }
            Self::Provision(_) => ErrorKind::Provision,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::AddressUnavailable { .. } => ErrorKind::AddressUnavailable,
            Self::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            Self::InferenceRequest { .. } => ErrorKind::InferenceRequest,
            Self::UnknownInstanceType(_) => ErrorKind::UnknownInstanceType,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::InvalidStateTransition(_) | Self::Io { .. } => ErrorKind::Internal,
        }
    }
}

/// Serializable classification of an [`EvalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Provision,
    Timeout,
    AddressUnavailable,
    ServiceUnavailable,
    InferenceRequest,
    UnknownInstanceType,
    InvalidArgument,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Config => "ConfigError",
            Self::Provision => "ProvisionError",
            Self::Timeout => "TimeoutError",
            Self::AddressUnavailable => "AddressUnavailableError",
            Self::ServiceUnavailable => "ServiceUnavailableError",
            Self::InferenceRequest => "InferenceRequestError",
            Self::UnknownInstanceType => "UnknownInstanceType",
            Self::InvalidArgument => "InvalidArgument",
            Self::Cancelled => "Cancelled",
            Self::Internal => "InternalError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Hard validation errors reject a configuration before any instance is launched.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Missing required field: {field} in {context}")]
    MissingRequiredField {
        field: &'static str,
        context: String,
    },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid port: {port} - {reason}")]
    InvalidPort { port: u16, reason: String },

    #[error("Duplicate instance type: {instance_type}")]
    DuplicateInstanceType { instance_type: String },

    #[error("Schema validation failed: {message}")]
    SchemaValidation { message: String },
}

/// Failures reported by (or while talking to) the cloud provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider rejected instance creation for {instance_type}: {reason}")]
    CreateRejected {
        instance_type: InstanceType,
        reason: String,
    },

    #[error("Failed to describe instance {instance_id}: {reason}")]
    DescribeFailed {
        instance_id: InstanceId,
        reason: String,
    },

    #[error("Failed to terminate instance {instance_id}: {reason}")]
    TerminateFailed {
        instance_id: InstanceId,
        reason: String,
    },

    #[error("Instance {instance_id} not found")]
    NotFound { instance_id: InstanceId },

    #[error("Instance {instance_id} entered failure state '{state}'")]
    FailedState {
        instance_id: InstanceId,
        state: String,
    },

    #[error("Malformed provider response: {reason}")]
    MalformedResponse { reason: String },
}

/// Transport-level failure of a single health probe or inference request.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection failed: {reason}")]
    Connect { reason: String },

    #[error("request timed out after {}ms", after.as_millis())]
    TimedOut { after: Duration },

    #[error("request failed: {reason}")]
    Request { reason: String },
}

/// State transition errors for the per-iteration state machine.
#[derive(Debug, Error)]
pub enum StateTransitionError {
    #[error("Cannot transition from {from} to {to} for instance type {instance_type}")]
    InvalidTransition {
        instance_type: InstanceType,
        from: &'static str,
        to: &'static str,
    },

    #[error("Iteration for {instance_type} is already in terminal state: {state}")]
    TerminalState {
        instance_type: InstanceType,
        state: &'static str,
    },
}

/// Result type alias using EvalError.
pub type EvalResult<T> = Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_validation_error_display() {
        let err = HardValidationError::MissingRequiredField {
            field: "image_id",
            context: "provider section".to_string(),
        };
        assert!(err.to_string().contains("image_id"));
        assert!(err.to_string().contains("provider section"));
    }

    #[test]
    fn test_error_chain() {
        let provider_err = ProviderError::NotFound {
            instance_id: InstanceId::new("i-0abc").unwrap(),
        };
        let eval_err: EvalError = provider_err.into();
        assert!(matches!(eval_err, EvalError::Provision(_)));
        assert_eq!(eval_err.kind(), ErrorKind::Provision);
    }

    #[test]
    fn test_kind_names_match_reported_kinds() {
        let err = EvalError::ServiceUnavailable {
            url: "http://host:8080/ping".to_string(),
            deadline: Duration::from_secs(300),
            attempts: 60,
        };
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
        assert_eq!(err.kind().to_string(), "ServiceUnavailableError");

        let err = EvalError::Timeout {
            stage: "instance ready",
            waited: Duration::from_secs(600),
        };
        assert_eq!(err.kind().name(), "TimeoutError");
        assert!(err.to_string().contains("600"));
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::UnknownInstanceType).unwrap();
        assert_eq!(json, "\"unknown_instance_type\"");
    }
}
