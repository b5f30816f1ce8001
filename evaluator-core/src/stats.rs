// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Latency statistics over one benchmark run.

use serde::{Deserialize, Serialize};

use crate::types::LatencySample;

/// Latency distribution in seconds, computed once per successful iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub samples: usize,
    pub min_s: f64,
    pub max_s: f64,
    pub mean_s: f64,
    pub median_s: f64,
    pub p95_s: f64,
    pub p99_s: f64,
    pub std_dev_s: f64,
}

impl LatencyStats {
    /// Calculate statistics from an ordered sample sequence.
    /// Returns `None` for an empty sequence.
    pub fn from_samples(samples: &[LatencySample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut secs: Vec<f64> = samples.iter().map(LatencySample::seconds).collect();
        secs.sort_by(f64::total_cmp);
        let len = secs.len();

        let mean_s = secs.iter().sum::<f64>() / len as f64;
        let variance = secs
            .iter()
            .map(|&x| {
                let diff = x - mean_s;
                diff * diff
            })
            .sum::<f64>()
            / len as f64;

        let percentile = |p: f64| secs[((len as f64 * p) as usize).min(len - 1)];

        Some(Self {
            samples: len,
            min_s: secs[0],
            max_s: secs[len - 1],
            mean_s,
            median_s: secs[len / 2],
            p95_s: percentile(0.95),
            p99_s: percentile(0.99),
            std_dev_s: variance.sqrt(),
        })
    }

    /// Format a latency in human-readable form (auto-selects μs/ms/s).
    pub fn format_latency(secs: f64) -> String {
        if secs < 1e-3 {
            format!("{:.1}μs", secs * 1e6)
        } else if secs < 1.0 {
            format!("{:.2}ms", secs * 1e3)
        } else {
            format!("{:.3}s", secs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(secs: &[f64]) -> Vec<LatencySample> {
        secs.iter().copied().map(LatencySample::from_secs_f64).collect()
    }

    #[test]
    fn test_stats_from_samples() {
        let stats = LatencyStats::from_samples(&samples(&[
            0.10, 0.20, 0.30, 0.40, 0.50, 0.60, 0.70, 0.80, 0.90, 1.00,
        ]))
        .unwrap();

        assert_eq!(stats.samples, 10);
        assert!((stats.min_s - 0.10).abs() < 1e-9);
        assert!((stats.max_s - 1.00).abs() < 1e-9);
        assert!((stats.median_s - 0.60).abs() < 1e-9);
        assert!((stats.mean_s - 0.55).abs() < 1e-9);
        assert!((stats.p99_s - 1.00).abs() < 1e-9);
        assert!(stats.std_dev_s > 0.0);
    }

    #[test]
    fn test_single_sample() {
        let stats = LatencyStats::from_samples(&samples(&[0.25])).unwrap();
        assert_eq!(stats.samples, 1);
        assert_eq!(stats.min_s, stats.max_s);
        assert_eq!(stats.p95_s, stats.median_s);
        assert_eq!(stats.std_dev_s, 0.0);
    }

    #[test]
    fn test_empty() {
        assert!(LatencyStats::from_samples(&[]).is_none());
    }

    #[test]
    fn test_format_latency() {
        assert_eq!(LatencyStats::format_latency(0.0005), "500.0μs");
        assert_eq!(LatencyStats::format_latency(0.11), "110.00ms");
        assert_eq!(LatencyStats::format_latency(1.5), "1.500s");
    }
}
