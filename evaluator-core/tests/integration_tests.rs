// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! End-to-end orchestrator tests.
//!
//! These drive the full acquire → measure → release flow against scripted
//! provider and HTTP fakes on tokio's paused clock.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use evaluator_core::provider::RUN_ID_TAG;
use evaluator_core::{
    BenchmarkOrchestrator, CancelHandle, CancelSignal, Config, ConfigLoader, ErrorKind, HealthProbe,
    InferenceClient, InstanceDescription, InstanceId, InstanceProvider, InstanceSpec,
    InstanceState, InstanceType, IterationStatus, Payload, PayloadEncoding, ProviderError,
    SuccessCriteria, TransportError,
};

/// Fake cloud: instances of types in `never_ready` stay pending forever,
/// everything else is running on first describe. Types in `no_address` run
/// without a public DNS name or IP.
#[derive(Default)]
struct FakeCloud {
    never_ready: HashSet<String>,
    no_address: HashSet<String>,
    terminate_fails: bool,
    cancel_on_terminate: Mutex<Option<CancelHandle>>,
    launched: Mutex<Vec<InstanceSpec>>,
    types_by_id: Mutex<HashMap<InstanceId, InstanceType>>,
    terminated: Mutex<Vec<InstanceId>>,
}

impl FakeCloud {
    fn new(never_ready: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            never_ready: never_ready.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        })
    }

    /// Every terminate call is recorded, then rejected.
    fn with_failing_terminate() -> Arc<Self> {
        Arc::new(Self {
            terminate_fails: true,
            ..Default::default()
        })
    }

    fn without_address(no_address: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            no_address: no_address.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        })
    }

    fn launched_types(&self) -> Vec<String> {
        self.launched
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.instance_type.to_string())
            .collect()
    }

    fn terminated(&self) -> Vec<InstanceId> {
        self.terminated.lock().unwrap().clone()
    }
}

#[async_trait]
impl InstanceProvider for FakeCloud {
    async fn create(&self, spec: &InstanceSpec) -> Result<InstanceId, ProviderError> {
        let mut launched = self.launched.lock().unwrap();
        launched.push(spec.clone());
        let id = InstanceId::new(format!("i-{:04}", launched.len())).unwrap();
        self.types_by_id
            .lock()
            .unwrap()
            .insert(id.clone(), spec.instance_type.clone());
        Ok(id)
    }

    async fn describe(&self, id: &InstanceId) -> Result<InstanceDescription, ProviderError> {
        let instance_type = self
            .types_by_id
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound {
                instance_id: id.clone(),
            })?;

        if self.never_ready.contains(instance_type.as_str()) {
            return Ok(InstanceDescription {
                state: InstanceState::Pending,
                public_dns_name: None,
                public_ip: None,
                checks_passed: None,
            });
        }

        if self.no_address.contains(instance_type.as_str()) {
            return Ok(InstanceDescription {
                state: InstanceState::Running,
                public_dns_name: Some(String::new()),
                public_ip: None,
                checks_passed: Some(true),
            });
        }

        Ok(InstanceDescription {
            state: InstanceState::Running,
            public_dns_name: Some(format!("{}.compute.example", instance_type)),
            public_ip: Some("203.0.113.10".to_string()),
            checks_passed: Some(true),
        })
    }

    async fn terminate(&self, id: &InstanceId) -> Result<(), ProviderError> {
        self.terminated.lock().unwrap().push(id.clone());
        if let Some(handle) = self.cancel_on_terminate.lock().unwrap().take() {
            handle.cancel();
        }
        if self.terminate_fails {
            return Err(ProviderError::TerminateFailed {
                instance_id: id.clone(),
                reason: "UnauthorizedOperation".to_string(),
            });
        }
        Ok(())
    }
}

/// Replays scripted probe results, then answers 200.
struct FakeProbe {
    script: Mutex<VecDeque<Result<u16, TransportError>>>,
    probes: Mutex<u32>,
}

impl FakeProbe {
    fn new(script: Vec<Result<u16, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            probes: Mutex::new(0),
        })
    }

    fn healthy() -> Arc<Self> {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl HealthProbe for FakeProbe {
    async fn probe(&self, _url: &str, _timeout: Duration) -> Result<u16, TransportError> {
        *self.probes.lock().unwrap() += 1;
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(200))
    }
}

/// Sleeps for each scripted latency, then answers 200. Defaults to 100ms.
/// Calls listed in `errors` (1-based) answer 500 instead.
struct FakeModelServer {
    latencies: Mutex<VecDeque<Duration>>,
    urls: Mutex<Vec<String>>,
    errors: HashSet<usize>,
}

impl FakeModelServer {
    fn new(latencies_ms: &[u64]) -> Arc<Self> {
        Arc::new(Self {
            latencies: Mutex::new(latencies_ms.iter().map(|ms| Duration::from_millis(*ms)).collect()),
            urls: Mutex::new(Vec::new()),
            errors: HashSet::new(),
        })
    }

    fn failing_on(calls: &[usize]) -> Arc<Self> {
        Arc::new(Self {
            latencies: Mutex::new(VecDeque::new()),
            urls: Mutex::new(Vec::new()),
            errors: calls.iter().copied().collect(),
        })
    }

    fn calls(&self) -> usize {
        self.urls.lock().unwrap().len()
    }
}

#[async_trait]
impl InferenceClient for FakeModelServer {
    async fn infer(
        &self,
        url: &str,
        _payload: &Payload,
        _timeout: Duration,
    ) -> Result<u16, TransportError> {
        let call = {
            let mut urls = self.urls.lock().unwrap();
            urls.push(url.to_string());
            urls.len()
        };
        let latency = self
            .latencies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Duration::from_millis(100));
        tokio::time::sleep(latency).await;
        if self.errors.contains(&call) {
            return Ok(500);
        }
        Ok(200)
    }
}

fn config_yaml(instance_types: &[&str], failure_policy: &str) -> String {
    format!(
        r#"
provider:
  image_id: ami-test
service:
  port: 8080
  model: resnet50
timeouts:
  instance_ready_secs: 60
  instance_poll_interval_secs: 15
  health_deadline_secs: 30
  health_poll_interval_secs: 5
  probe_timeout_secs: 2
  request_timeout_secs: 10
pricing:
  t3.small: 0.05
  t3.medium: 0.0416
  g4dn.xlarge: 0.526
benchmark:
  instance_types: [{}]
  runs: 3
  failure_policy: {}
"#,
        instance_types.join(", "),
        failure_policy
    )
}

fn load(instance_types: &[&str], failure_policy: &str) -> Config {
    ConfigLoader::load_string(&config_yaml(instance_types, failure_policy)).unwrap()
}

fn payload() -> Payload {
    Payload::new(b"\x89PNG".to_vec(), "sample.png", PayloadEncoding::default())
}

fn orchestrator(
    config: &Config,
    cloud: Arc<FakeCloud>,
    probe: Arc<FakeProbe>,
    server: Arc<FakeModelServer>,
) -> BenchmarkOrchestrator {
    BenchmarkOrchestrator::from_config(config, cloud, probe, server)
}

#[tokio::test(start_paused = true)]
async fn test_single_instance_end_to_end() {
    let config = load(&["t3.small"], "continue");
    let cloud = FakeCloud::new(&[]);
    let probe = FakeProbe::new(vec![Err(TransportError::Connect {
        reason: "connection refused".to_string(),
    })]);
    let server = FakeModelServer::new(&[100, 120, 110]);
    let orch = orchestrator(&config, cloud.clone(), probe.clone(), server.clone());

    let outcome = orch
        .run(
            &config.benchmark.instance_types,
            3,
            &payload(),
            "run-e2e",
            &CancelSignal::never(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.entries.len(), 1);
    let result = outcome.entries[0].result().expect("iteration should succeed");
    assert_eq!(result.instance_type.as_str(), "t3.small");
    assert_eq!(result.runs, 3);
    assert!((result.avg_latency_s - 0.11).abs() < 1e-3);
    let expected_cost = 0.05 * (0.11 * 3.0 / 3600.0) / 3.0;
    assert!((result.cost_per_inference_usd - expected_cost).abs() / expected_cost < 0.01);
    assert!((result.latency.max_s - 0.12).abs() < 1e-3);

    // Health succeeded on the second probe; all requests hit the DNS name.
    assert_eq!(*probe.probes.lock().unwrap(), 2);
    let urls = server.urls.lock().unwrap().clone();
    assert_eq!(urls.len(), 3);
    assert_eq!(urls[0], "http://t3.small.compute.example:8080/predictions/resnet50");

    // Exactly one launch, tagged with the run id, and exactly one release.
    let launched = cloud.launched.lock().unwrap().clone();
    assert_eq!(launched.len(), 1);
    assert_eq!(launched[0].tags.get(RUN_ID_TAG).map(String::as_str), Some("run-e2e"));
    assert_eq!(cloud.terminated(), vec![InstanceId::new("i-0001").unwrap()]);

    assert!(outcome.succeeded(SuccessCriteria::All));
    assert_eq!(outcome.entries[0].instance_id.as_deref(), Some("i-0001"));
}

#[tokio::test(start_paused = true)]
async fn test_ready_timeout_is_recorded_and_run_continues() {
    let config = load(&["g4dn.xlarge", "t3.medium"], "continue");
    let cloud = FakeCloud::new(&["g4dn.xlarge"]);
    let orch = orchestrator(
        &config,
        cloud.clone(),
        FakeProbe::healthy(),
        FakeModelServer::new(&[]),
    );

    let outcome = orch
        .run(
            &config.benchmark.instance_types,
            3,
            &payload(),
            "run-timeout",
            &CancelSignal::never(),
        )
        .await
        .unwrap();

    let failure = outcome.entries[0].failure().expect("first type should fail");
    assert_eq!(failure.kind, ErrorKind::Timeout);
    assert_eq!(failure.stage, "AwaitingReady");
    assert!(outcome.entries[1].result().is_some());

    // Both instances launched, both released exactly once.
    assert_eq!(cloud.launched_types(), vec!["g4dn.xlarge", "t3.medium"]);
    assert_eq!(cloud.terminated().len(), 2);

    assert!(outcome.succeeded(SuccessCriteria::Any));
    assert!(!outcome.succeeded(SuccessCriteria::All));
}

#[tokio::test(start_paused = true)]
async fn test_entries_follow_configured_order() {
    // m5.large has no price: it fails before launch, in place.
    let yaml = config_yaml(&["t3.medium", "m5.large", "t3.small"], "continue");
    let config = ConfigLoader::load_string(&yaml).unwrap();
    let cloud = FakeCloud::new(&[]);
    let orch = orchestrator(
        &config,
        cloud.clone(),
        FakeProbe::healthy(),
        FakeModelServer::new(&[]),
    );

    let outcome = orch
        .run(
            &config.benchmark.instance_types,
            2,
            &payload(),
            "run-order",
            &CancelSignal::never(),
        )
        .await
        .unwrap();

    let order: Vec<_> = outcome
        .entries
        .iter()
        .map(|e| e.instance_type.as_str())
        .collect();
    assert_eq!(order, vec!["t3.medium", "m5.large", "t3.small"]);

    let failure = outcome.entries[1].failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::UnknownInstanceType);
    assert_eq!(failure.stage, "Acquiring");
    assert!(outcome.entries[1].instance_id.is_none());

    assert_eq!(cloud.launched_types(), vec!["t3.medium", "t3.small"]);
    assert_eq!(cloud.terminated().len(), 2);
    assert_eq!(outcome.success_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_abort_policy_skips_remaining_types() {
    let config = load(&["g4dn.xlarge", "t3.medium", "t3.small"], "abort");
    let cloud = FakeCloud::new(&["g4dn.xlarge"]);
    let orch = orchestrator(
        &config,
        cloud.clone(),
        FakeProbe::healthy(),
        FakeModelServer::new(&[]),
    );

    let outcome = orch
        .run(
            &config.benchmark.instance_types,
            3,
            &payload(),
            "run-abort",
            &CancelSignal::never(),
        )
        .await
        .unwrap();

    assert!(outcome.entries[0].failure().is_some());
    for entry in &outcome.entries[1..] {
        assert!(matches!(entry.status, IterationStatus::Skipped { .. }));
    }
    assert_eq!(cloud.launched_types(), vec!["g4dn.xlarge"]);
    assert_eq!(cloud.terminated().len(), 1);
    assert!(!outcome.succeeded(SuccessCriteria::Any));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_releases_in_flight_instance() {
    let config = load(&["g4dn.xlarge", "t3.medium"], "continue");
    let cloud = FakeCloud::new(&["g4dn.xlarge"]);
    let orch = orchestrator(
        &config,
        cloud.clone(),
        FakeProbe::healthy(),
        FakeModelServer::new(&[]),
    );

    let (handle, signal) = CancelSignal::channel();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(20)).await;
        handle.cancel();
    });

    let outcome = orch
        .run(
            &config.benchmark.instance_types,
            3,
            &payload(),
            "run-cancel",
            &signal,
        )
        .await
        .unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.entries[0].failure().unwrap().kind, ErrorKind::Cancelled);
    assert!(matches!(
        outcome.entries[1].status,
        IterationStatus::Skipped { .. }
    ));
    assert_eq!(cloud.launched_types(), vec!["g4dn.xlarge"]);
    assert_eq!(cloud.terminated().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_after_last_iteration_is_not_cancellation() {
    let config = load(&["t3.medium"], "continue");
    let cloud = FakeCloud::new(&[]);
    let (handle, signal) = CancelSignal::channel();
    *cloud.cancel_on_terminate.lock().unwrap() = Some(handle);
    let orch = orchestrator(
        &config,
        cloud.clone(),
        FakeProbe::healthy(),
        FakeModelServer::new(&[]),
    );

    let outcome = orch
        .run(
            &config.benchmark.instance_types,
            3,
            &payload(),
            "run-late-interrupt",
            &signal,
        )
        .await
        .unwrap();

    assert!(signal.is_cancelled());
    assert!(!outcome.cancelled);
    assert!(outcome.entries[0].result().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_abort_is_not_reported_as_cancellation() {
    let config = load(&["g4dn.xlarge", "t3.medium"], "abort");
    let cloud = FakeCloud::new(&["g4dn.xlarge"]);
    let orch = orchestrator(
        &config,
        cloud.clone(),
        FakeProbe::healthy(),
        FakeModelServer::new(&[]),
    );

    let outcome = orch
        .run(
            &config.benchmark.instance_types,
            3,
            &payload(),
            "run-abort-flag",
            &CancelSignal::never(),
        )
        .await
        .unwrap();

    assert!(!outcome.cancelled);
    assert!(matches!(
        outcome.entries[1].status,
        IterationStatus::Skipped { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_health_deadline_fails_iteration() {
    let config = load(&["t3.medium"], "continue");
    let cloud = FakeCloud::new(&[]);
    let refused = || {
        Err(TransportError::Connect {
            reason: "connection refused".to_string(),
        })
    };
    let probe = FakeProbe::new((0..10).map(|_| refused()).collect());
    let orch = orchestrator(&config, cloud.clone(), probe, FakeModelServer::new(&[]));

    let outcome = orch
        .run(
            &config.benchmark.instance_types,
            3,
            &payload(),
            "run-health",
            &CancelSignal::never(),
        )
        .await
        .unwrap();

    let failure = outcome.entries[0].failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::ServiceUnavailable);
    assert_eq!(failure.stage, "AwaitingHealthy");
    assert_eq!(cloud.terminated().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_release_keeps_inference_error() {
    let config = load(&["t3.medium"], "continue");
    let cloud = FakeCloud::with_failing_terminate();
    let server = FakeModelServer::failing_on(&[3]);
    let orch = orchestrator(&config, cloud.clone(), FakeProbe::healthy(), server.clone());

    let outcome = orch
        .run(
            &config.benchmark.instance_types,
            5,
            &payload(),
            "run-release",
            &CancelSignal::never(),
        )
        .await
        .unwrap();

    let failure = outcome.entries[0].failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::InferenceRequest);
    assert_eq!(failure.stage, "Benchmarking");
    assert!(!failure.message.contains("terminate"));
    assert_eq!(server.calls(), 3);
    assert_eq!(cloud.terminated().len(), 1);
    assert_eq!(outcome.entries[0].instance_id.as_deref(), Some("i-0001"));
}

#[tokio::test(start_paused = true)]
async fn test_missing_address_fails_and_releases() {
    let config = load(&["t3.small", "t3.medium"], "continue");
    let cloud = FakeCloud::without_address(&["t3.small"]);
    let server = FakeModelServer::new(&[]);
    let orch = orchestrator(&config, cloud.clone(), FakeProbe::healthy(), server.clone());

    let outcome = orch
        .run(
            &config.benchmark.instance_types,
            3,
            &payload(),
            "run-address",
            &CancelSignal::never(),
        )
        .await
        .unwrap();

    let failure = outcome.entries[0].failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::AddressUnavailable);
    assert_eq!(failure.stage, "ResolvingAddress");
    assert!(outcome.entries[1].result().is_some());
    assert_eq!(server.calls(), 3);
    assert_eq!(cloud.terminated().len(), 2);
}

#[tokio::test]
async fn test_zero_runs_rejected_before_launch() {
    let config = load(&["t3.medium"], "continue");
    let cloud = FakeCloud::new(&[]);
    let orch = orchestrator(
        &config,
        cloud.clone(),
        FakeProbe::healthy(),
        FakeModelServer::new(&[]),
    );

    let err = orch
        .run(
            &config.benchmark.instance_types,
            0,
            &payload(),
            "run-zero",
            &CancelSignal::never(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(cloud.launched_types().is_empty());
}

#[test]
fn test_config_file_round_trip_into_orchestrator() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("evaluator.yaml");
    std::fs::write(&path, config_yaml(&["t3.small", "t3.medium"], "continue")).unwrap();

    let mut config = ConfigLoader::load_file(&path).unwrap();
    config
        .apply_overrides(Some(vec!["t3.medium".to_string()]), Some(5))
        .unwrap();

    let orch = BenchmarkOrchestrator::from_config(
        &config,
        FakeCloud::new(&[]),
        FakeProbe::healthy(),
        FakeModelServer::new(&[]),
    );
    assert_eq!(orch.settings().instance_ready_timeout, Duration::from_secs(60));
    assert_eq!(config.benchmark.runs, 5);
    assert_eq!(config.service.payload_path, dir.path().join("sample.png"));
}
