//! Evaluator Core Library
//!
//! Benchmarks a model-serving endpoint across cloud instance types and turns
//! the measured latency into cost per inference. Provides the instance
//! lifecycle, health waiting, latency measurement, the cost model, the
//! per-iteration state machine and the sequential orchestrator.

pub mod cancel;
pub mod config;
pub mod error;
pub mod health;
pub mod inference;
pub mod orchestrator;
pub mod pricing;
pub mod provider;
pub mod results;
pub mod state;
pub mod stats;
pub mod types;

// Re-export commonly used types
pub use cancel::{CancelHandle, CancelSignal};
pub use config::{Config, ConfigLoader};
pub use error::{
    ErrorKind, EvalError, EvalResult, HardValidationError, ProviderError, TransportError,
};
pub use health::{HealthCheckConfig, HealthProbe, ServiceHealthWaiter};
pub use inference::{InferenceBenchmarker, InferenceClient, Payload, PayloadEncoding};
pub use orchestrator::{BenchmarkOrchestrator, FailurePolicy};
pub use pricing::{CostModel, PriceTable};
pub use provider::{InstanceDescription, InstanceLifecycle, InstanceProvider, InstanceSpec, InstanceState};
pub use results::{BenchmarkResult, IterationOutcome, IterationStatus, RunOutcome, SuccessCriteria};
pub use stats::LatencyStats;
pub use types::{InstanceId, InstanceType, LatencySample, Port};
