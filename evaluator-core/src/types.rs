// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! All types validate their invariants at creation time, so a value that
//! exists is a value the provider and the price table can be asked about.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::HardValidationError;

/// Longest identifier accepted for instance types and instance IDs.
const MAX_IDENTIFIER_LEN: usize = 64;

fn validate_identifier(
    field: &'static str,
    value: String,
    allowed: impl Fn(char) -> bool,
) -> Result<String, HardValidationError> {
    if value.is_empty() {
        return Err(HardValidationError::InvalidFieldValue {
            field,
            value,
            reason: "Identifier cannot be empty".to_string(),
        });
    }

    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(HardValidationError::InvalidFieldValue {
            field,
            value: value.clone(),
            reason: format!(
                "Identifier too long: {} chars (max {})",
                value.len(),
                MAX_IDENTIFIER_LEN
            ),
        });
    }

    if !value.chars().all(allowed) {
        return Err(HardValidationError::InvalidFieldValue {
            field,
            value,
            reason: "Identifier contains invalid characters".to_string(),
        });
    }

    Ok(value)
}

/// Validated cloud instance type identifier, e.g. `g4dn.xlarge`.
/// Alphanumeric plus `.`, `-` and `_`, max 64 chars.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceType(String);

impl InstanceType {
    /// Create a new InstanceType with validation.
    pub fn new(instance_type: impl Into<String>) -> Result<Self, HardValidationError> {
        let value = validate_identifier("instance_type", instance_type.into(), |c| {
            c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_'
        })?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for InstanceType {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<InstanceType> for String {
    fn from(instance_type: InstanceType) -> Self {
        instance_type.0
    }
}

/// Provider-assigned instance identifier, e.g. `i-0123456789abcdef0`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Result<Self, HardValidationError> {
        let value = validate_identifier("instance_id", id.into(), |c| {
            c.is_ascii_alphanumeric() || c == '-' || c == '_'
        })?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for InstanceId {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<InstanceId> for String {
    fn from(id: InstanceId) -> Self {
        id.0
    }
}

/// Validated network port.
/// Must be in range 1-65535 (0 is reserved).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Port(u16);

impl Port {
    pub fn new(port: u16) -> Result<Self, HardValidationError> {
        if port == 0 {
            return Err(HardValidationError::InvalidPort {
                port,
                reason: "Port 0 is reserved and cannot be used".to_string(),
            });
        }
        Ok(Self(port))
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for Port {
    type Error = HardValidationError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Port> for u16 {
    fn from(port: Port) -> Self {
        port.0
    }
}

/// One measured round-trip duration of a single inference request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LatencySample(Duration);

impl LatencySample {
    pub fn new(elapsed: Duration) -> Self {
        Self(elapsed)
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self(Duration::from_secs_f64(secs.max(0.0)))
    }

    pub fn duration(&self) -> Duration {
        self.0
    }

    /// Latency in seconds, always non-negative.
    pub fn seconds(&self) -> f64 {
        self.0.as_secs_f64()
    }
}

impl fmt::Display for LatencySample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}s", self.seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_type_valid() {
        assert!(InstanceType::new("t3.medium").is_ok());
        assert!(InstanceType::new("g4dn.xlarge").is_ok());
        assert!(InstanceType::new("small").is_ok());
        assert!(InstanceType::new("n2-standard_4").is_ok());
    }

    #[test]
    fn test_instance_type_invalid() {
        assert!(InstanceType::new("").is_err());
        assert!(InstanceType::new("a".repeat(65)).is_err());
        assert!(InstanceType::new("t3 medium").is_err());
        assert!(InstanceType::new("t3/medium").is_err());
    }

    #[test]
    fn test_instance_id() {
        assert!(InstanceId::new("i-0123456789abcdef0").is_ok());
        assert!(InstanceId::new("").is_err());
        assert!(InstanceId::new("i-01.23").is_err());
    }

    #[test]
    fn test_port() {
        assert!(Port::new(8080).is_ok());
        assert!(Port::new(65535).is_ok());
        assert!(Port::new(0).is_err());
    }

    #[test]
    fn test_instance_type_deserialize_validates() {
        let ok: Result<InstanceType, _> = serde_yaml::from_str("g4dn.xlarge");
        assert!(ok.is_ok());
        let bad: Result<InstanceType, _> = serde_yaml::from_str("\"bad type\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_latency_sample_seconds() {
        let sample = LatencySample::new(Duration::from_millis(120));
        assert!((sample.seconds() - 0.12).abs() < 1e-12);
        assert_eq!(LatencySample::from_secs_f64(-1.0).seconds(), 0.0);
        assert_eq!(sample.to_string(), "0.1200s");
    }
}
