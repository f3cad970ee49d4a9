use crate::integration::mocks::{network_config, Script, ScriptedFactory};
use chain_sentinel::{
	models::{Liveness, NetworkId, ResourceLimit},
	services::{
		blockchain::ConnectionRegistry,
		events::EventBus,
		health::{HeartbeatMonitor, LivenessPolicy, ProbeOutcome, Reconnector},
		ratelimit::{rpc_key, RateGovernor},
	},
	utils::{metrics::MetricsAggregator, BackoffPolicy},
};
use chrono::Utc;
use std::{collections::HashMap, sync::Arc, time::Duration};

const URL: &str = "https://a.example";

struct Harness {
	script: Arc<Script>,
	registry: Arc<ConnectionRegistry>,
	governor: Arc<RateGovernor>,
	metrics: Arc<MetricsAggregator>,
	reconnector: Arc<Reconnector>,
	monitor: Arc<HeartbeatMonitor>,
}

fn harness_with(limits: HashMap<String, ResourceLimit>) -> Harness {
	let script = Script::new(&[URL]);
	let governor = Arc::new(RateGovernor::new(limits));
	let registry = Arc::new(
		ConnectionRegistry::new(
			vec![network_config(NetworkId::Ethereum, &[URL])],
			ScriptedFactory::new(script.clone()),
			governor.clone(),
			Duration::from_secs(1),
		)
		.unwrap(),
	);
	let metrics = Arc::new(MetricsAggregator::new().unwrap());
	// Long backoff keeps a triggered reconnection parked in its first delay
	let reconnector = Arc::new(Reconnector::new(
		registry.clone(),
		EventBus::new(16, metrics.clone()),
		BackoffPolicy::new(3, Duration::from_secs(60), Duration::from_secs(60)),
	));
	let monitor = HeartbeatMonitor::new(
		registry.clone(),
		governor.clone(),
		metrics.clone(),
		reconnector.clone(),
		LivenessPolicy::new(Duration::from_secs(30), Duration::from_millis(200)),
		Duration::from_secs(60),
	);

	Harness {
		script,
		registry,
		governor,
		metrics,
		reconnector,
		monitor,
	}
}

fn harness() -> Harness {
	harness_with(HashMap::new())
}

#[test]
fn test_liveness_windows() {
	let policy = LivenessPolicy::new(Duration::from_secs(30), Duration::from_secs(10));
	assert_eq!(policy.staleness_window(), Duration::from_secs(50));
	assert_eq!(policy.sweep_window(), Duration::from_secs(60));
}

#[tokio::test]
async fn test_probe_skipped_without_connection() {
	let harness = harness();
	assert_eq!(
		harness.monitor.probe(NetworkId::Ethereum).await,
		ProbeOutcome::Skipped
	);
	assert_eq!(
		harness.monitor.probe(NetworkId::Polygon).await,
		ProbeOutcome::Skipped
	);
}

#[tokio::test]
async fn test_healthy_probe_keeps_connection_alive() {
	let harness = harness();
	harness
		.registry
		.get_or_connect(NetworkId::Ethereum)
		.await
		.unwrap();
	let before = harness
		.registry
		.status(NetworkId::Ethereum)
		.await
		.unwrap()
		.last_ping_time
		.unwrap();

	let outcome = harness.monitor.probe(NetworkId::Ethereum).await;
	assert!(matches!(outcome, ProbeOutcome::Healthy(_)));

	let status = harness.registry.status(NetworkId::Ethereum).await.unwrap();
	assert_eq!(status.liveness, Liveness::Alive);
	assert_eq!(status.consecutive_failures, 0);
	assert!(status.last_ping_time.unwrap() >= before);
}

#[tokio::test]
async fn test_two_failures_declare_dead_and_reconnect() {
	let harness = harness();
	harness
		.registry
		.get_or_connect(NetworkId::Ethereum)
		.await
		.unwrap();
	harness.script.set_healthy(&[]);

	assert_eq!(
		harness.monitor.probe(NetworkId::Ethereum).await,
		ProbeOutcome::Failed {
			liveness: Liveness::Suspect,
			reconnecting: false,
		}
	);
	assert_eq!(
		harness.monitor.probe(NetworkId::Ethereum).await,
		ProbeOutcome::Failed {
			liveness: Liveness::Dead,
			reconnecting: true,
		}
	);

	let status = harness.registry.status(NetworkId::Ethereum).await.unwrap();
	assert!(status.is_reconnecting);
	assert_eq!(status.consecutive_failures, 2);
	assert!(harness.reconnector.is_running(NetworkId::Ethereum));

	// Probes stand down while the reconnection runs
	assert_eq!(
		harness.monitor.probe(NetworkId::Ethereum).await,
		ProbeOutcome::Skipped
	);
	assert_eq!(
		harness
			.metrics
			.snapshot()
			.network(NetworkId::Ethereum)
			.unwrap()
			.errors["heartbeat"],
		2
	);

	harness.reconnector.shutdown().await;
}

#[tokio::test]
async fn test_saturated_endpoint_skips_probe() {
	let harness = harness_with(HashMap::from([(
		rpc_key(NetworkId::Ethereum),
		ResourceLimit {
			max_requests: 1,
			interval: Duration::from_secs(3600),
			max_queue: 0,
			timeout: Duration::from_millis(10),
			error_on_limit: true,
		},
	)]));
	// Verification consumes the only token
	harness
		.registry
		.get_or_connect(NetworkId::Ethereum)
		.await
		.unwrap();
	assert_eq!(
		harness.governor.resources(),
		vec![rpc_key(NetworkId::Ethereum)]
	);

	assert_eq!(
		harness.monitor.probe(NetworkId::Ethereum).await,
		ProbeOutcome::Skipped
	);
	let status = harness.registry.status(NetworkId::Ethereum).await.unwrap();
	assert_eq!(status.liveness, Liveness::Alive);
}

async fn age_last_ping(harness: &Harness) {
	harness
		.registry
		.update_status(NetworkId::Ethereum, |status| {
			status.last_ping_time = Some(Utc::now() - chrono::Duration::minutes(10));
		})
		.await;
}

#[tokio::test]
async fn test_sweep_declares_stale_connections_dead() {
	let harness = harness();
	harness
		.registry
		.get_or_connect(NetworkId::Ethereum)
		.await
		.unwrap();
	harness.monitor.start(NetworkId::Ethereum);

	assert!(harness.monitor.sweep_once().await.is_empty());

	age_last_ping(&harness).await;

	assert_eq!(harness.monitor.sweep_once().await, vec![NetworkId::Ethereum]);
	let status = harness.registry.status(NetworkId::Ethereum).await.unwrap();
	assert_eq!(status.liveness, Liveness::Dead);
	assert!(status.is_reconnecting);

	// A reconnecting network is never swept again
	assert!(harness.monitor.sweep_once().await.is_empty());
	harness.reconnector.shutdown().await;
}

#[tokio::test]
async fn test_sweep_ignores_networks_without_heartbeat() {
	let harness = harness();
	harness
		.registry
		.get_or_connect(NetworkId::Ethereum)
		.await
		.unwrap();
	harness.monitor.start(NetworkId::Ethereum);
	harness.monitor.stop(NetworkId::Ethereum);
	age_last_ping(&harness).await;

	assert!(harness.monitor.sweep_once().await.is_empty());
	let status = harness.registry.status(NetworkId::Ethereum).await.unwrap();
	assert_eq!(status.liveness, Liveness::Alive);
	assert!(!status.is_reconnecting);
	assert!(!harness.reconnector.is_running(NetworkId::Ethereum));
}

#[tokio::test]
async fn test_rearm_only_restarts_running_loops() {
	let harness = harness();
	assert!(!harness.monitor.rearm(NetworkId::Ethereum));
	assert!(!harness.monitor.is_running(NetworkId::Ethereum));

	harness.monitor.start(NetworkId::Ethereum);
	assert!(harness.monitor.rearm(NetworkId::Ethereum));
	assert!(harness.monitor.is_running(NetworkId::Ethereum));
}

#[tokio::test]
async fn test_stopping_last_loop_stops_sweep() {
	let harness = harness();
	harness.monitor.start(NetworkId::Ethereum);
	harness.monitor.start_sweep();
	assert!(harness.monitor.is_sweep_running());

	harness.monitor.stop(NetworkId::Ethereum);
	assert!(!harness.monitor.is_sweep_running());
	assert!(harness.monitor.running_networks().is_empty());
}

async fn exhausted_harness() -> Harness {
	let harness = harness();
	harness
		.registry
		.get_or_connect(NetworkId::Ethereum)
		.await
		.unwrap();
	harness
		.registry
		.update_status(NetworkId::Ethereum, |status| {
			status.mark_disconnected(Some("gave up".to_string()));
			status.reconnect_exhausted = true;
		})
		.await;
	harness
}

#[tokio::test]
async fn test_recovered_endpoint_restarts_exhausted_network() {
	let harness = exhausted_harness().await;

	let outcome = harness.monitor.probe(NetworkId::Ethereum).await;
	assert!(matches!(outcome, ProbeOutcome::Healthy(_)));

	let status = harness.registry.status(NetworkId::Ethereum).await.unwrap();
	assert!(!status.reconnect_exhausted);
	assert!(status.is_reconnecting);
	assert!(harness.reconnector.is_running(NetworkId::Ethereum));
	harness.reconnector.shutdown().await;
}

#[tokio::test]
async fn test_failed_ping_leaves_exhausted_network_alone() {
	let harness = exhausted_harness().await;
	harness.script.set_healthy(&[]);

	assert_eq!(
		harness.monitor.probe(NetworkId::Ethereum).await,
		ProbeOutcome::Failed {
			liveness: Liveness::Dead,
			reconnecting: false,
		}
	);
	let status = harness.registry.status(NetworkId::Ethereum).await.unwrap();
	assert!(status.reconnect_exhausted);
	assert!(!status.is_reconnecting);
	assert!(!harness.reconnector.is_running(NetworkId::Ethereum));
}

#[tokio::test]
async fn test_start_and_stop_probe_loops() {
	let harness = harness();
	harness.monitor.start(NetworkId::Ethereum);
	assert!(harness.monitor.is_running(NetworkId::Ethereum));

	assert!(harness.monitor.stop(NetworkId::Ethereum));
	assert!(!harness.monitor.stop(NetworkId::Ethereum));
	assert!(!harness.monitor.is_running(NetworkId::Ethereum));
}
