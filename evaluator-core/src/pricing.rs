// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Static price table and the cost-per-inference model.
//!
//! cost = hourly_rate * (avg_latency * runs / 3600) / runs
//!
//! The price table is injected configuration; nothing here fetches pricing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, EvalResult, HardValidationError};
use crate::types::InstanceType;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Mapping from instance type to on-demand hourly rate in USD.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceTable {
    rates: BTreeMap<InstanceType, f64>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the hourly rate for an instance type.
    /// Rates must be finite and non-negative.
    pub fn insert(
        &mut self,
        instance_type: InstanceType,
        hourly_usd: f64,
    ) -> Result<(), HardValidationError> {
        if !hourly_usd.is_finite() || hourly_usd < 0.0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "pricing",
                value: format!("{} = {}", instance_type, hourly_usd),
                reason: "Hourly rate must be a finite, non-negative number".to_string(),
            });
        }
        self.rates.insert(instance_type, hourly_usd);
        Ok(())
    }

    /// Builder-style insert for fixtures and defaults.
    pub fn with_rate(
        mut self,
        instance_type: InstanceType,
        hourly_usd: f64,
    ) -> Result<Self, HardValidationError> {
        self.insert(instance_type, hourly_usd)?;
        Ok(self)
    }

    pub fn hourly_rate(&self, instance_type: &InstanceType) -> Option<f64> {
        self.rates.get(instance_type).copied()
    }

    pub fn contains(&self, instance_type: &InstanceType) -> bool {
        self.rates.contains_key(instance_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InstanceType, f64)> {
        self.rates.iter().map(|(k, v)| (k, *v))
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Derives the monetary cost of one inference from a measured latency.
#[derive(Debug, Clone)]
pub struct CostModel {
    prices: PriceTable,
}

impl CostModel {
    pub fn new(prices: PriceTable) -> Self {
        Self { prices }
    }

    pub fn prices(&self) -> &PriceTable {
        &self.prices
    }

    /// Cost in USD attributable to a single inference.
    ///
    /// Fails with `InvalidArgument` for `runs == 0` or a negative / non-finite
    /// latency, and with `UnknownInstanceType` when no rate is configured.
    pub fn cost_per_inference(
        &self,
        instance_type: &InstanceType,
        avg_latency_secs: f64,
        runs: u32,
    ) -> EvalResult<f64> {
        if runs == 0 {
            return Err(EvalError::InvalidArgument {
                field: "runs",
                reason: "Run count must be at least 1".to_string(),
            });
        }

        if !avg_latency_secs.is_finite() || avg_latency_secs < 0.0 {
            return Err(EvalError::InvalidArgument {
                field: "avg_latency_secs",
                reason: format!("Latency must be finite and non-negative, got {}", avg_latency_secs),
            });
        }

        let rate = self
            .prices
            .hourly_rate(instance_type)
            .ok_or_else(|| EvalError::UnknownInstanceType(instance_type.clone()))?;

        let runs = f64::from(runs);
        let total_time = avg_latency_secs * runs;
        Ok(rate * (total_time / SECONDS_PER_HOUR) / runs)
    }
}
