use crate::integration::mocks::{
	network_config, MockChainClient, MockClientFactory, Script, ScriptedFactory,
};
use chain_sentinel::{
	models::{Liveness, NetworkId, ResourceLimit},
	services::{
		blockchain::{BlockChainError, ChainClient, ConnectionRegistry},
		ratelimit::{rpc_key, RateGovernor},
	},
};
use std::{collections::HashMap, sync::Arc, time::Duration};

fn registry(script: &Arc<Script>, urls: &[&str]) -> ConnectionRegistry {
	ConnectionRegistry::new(
		vec![network_config(NetworkId::Ethereum, urls)],
		ScriptedFactory::new(script.clone()),
		Arc::new(RateGovernor::new(HashMap::new())),
		Duration::from_secs(1),
	)
	.unwrap()
}

#[tokio::test]
async fn test_lazy_connect_skips_unhealthy_endpoints() {
	let script = Script::new(&["https://b.example"]);
	let registry = registry(&script, &["https://a.example", "https://b.example"]);

	assert!(registry.get(NetworkId::Ethereum).await.is_none());
	let handle = registry.get_or_connect(NetworkId::Ethereum).await.unwrap();
	assert_eq!(handle.endpoint(), "https://b.example");
	assert_eq!(script.connects(), vec!["https://a.example", "https://b.example"]);
	// the rejected handle is closed after failing verification
	assert_eq!(script.closed.load(std::sync::atomic::Ordering::SeqCst), 1);

	let status = registry.status(NetworkId::Ethereum).await.unwrap();
	assert!(status.connected);
	assert_eq!(status.liveness, Liveness::Alive);
	assert_eq!(status.active_url.as_deref(), Some("https://b.example"));
	assert_eq!(
		registry
			.endpoints(NetworkId::Ethereum)
			.unwrap()
			.get_active_url()
			.await,
		"https://b.example"
	);

	let again = registry.get_or_connect(NetworkId::Ethereum).await.unwrap();
	assert!(Arc::ptr_eq(&handle, &again));
	assert_eq!(script.connects().len(), 2);
}

#[tokio::test]
async fn test_concurrent_first_use_connects_once() {
	let script = Script::new(&["https://a.example"]);
	let registry = Arc::new(registry(&script, &["https://a.example"]));

	let tasks: Vec<_> = (0..8)
		.map(|_| {
			let registry = registry.clone();
			tokio::spawn(async move { registry.get_or_connect(NetworkId::Ethereum).await })
		})
		.collect();
	for task in tasks {
		assert!(task.await.unwrap().is_ok());
	}
	assert_eq!(script.connects().len(), 1);
}

#[tokio::test]
async fn test_all_endpoints_down() {
	let script = Script::new(&[]);
	let registry = registry(&script, &["https://a.example", "https://b.example"]);

	let error = registry.get_or_connect(NetworkId::Ethereum).await.err().unwrap();
	assert!(error.is_transport());
	let status = registry.status(NetworkId::Ethereum).await.unwrap();
	assert!(!status.connected);
	assert!(status.last_error.is_some());
	assert!(registry.get(NetworkId::Ethereum).await.is_none());
}

#[tokio::test]
async fn test_unconfigured_network() {
	let script = Script::new(&["https://a.example"]);
	let registry = registry(&script, &["https://a.example"]);

	assert!(!registry.is_supported(NetworkId::Bsc));
	assert!(registry.get_or_connect(NetworkId::Bsc).await.is_err());
	assert!(registry.status(NetworkId::Bsc).await.is_none());
	assert_eq!(registry.networks(), vec![NetworkId::Ethereum]);
}

#[tokio::test]
async fn test_connect_is_refused_while_reconnecting() {
	let script = Script::new(&["https://a.example"]);
	let registry = registry(&script, &["https://a.example"]);

	assert!(registry.begin_reconnect(NetworkId::Ethereum).await);
	assert!(!registry.begin_reconnect(NetworkId::Ethereum).await);
	assert!(registry.get_or_connect(NetworkId::Ethereum).await.is_err());
	assert!(script.connects().is_empty());

	registry.end_reconnect(NetworkId::Ethereum).await;
	assert!(registry.get_or_connect(NetworkId::Ethereum).await.is_ok());
}

#[tokio::test]
async fn test_failed_verification_closes_handle() {
	let mut silent = MockChainClient::new();
	silent
		.expect_get_block_number()
		.times(1)
		.returning(|| Err(BlockChainError::timeout("no answer")));
	silent.expect_close().times(1).return_const(());
	let silent: Arc<dyn ChainClient> = Arc::new(silent);

	let mut factory = MockClientFactory::new();
	factory
		.expect_connect()
		.times(1)
		.returning(move |_, _| Ok(silent.clone()));

	let registry = ConnectionRegistry::new(
		vec![network_config(NetworkId::Ethereum, &["https://silent.example"])],
		Arc::new(factory),
		Arc::new(RateGovernor::new(HashMap::new())),
		Duration::from_millis(50),
	)
	.unwrap();

	let error = registry.get_or_connect(NetworkId::Ethereum).await.err().unwrap();
	assert!(matches!(error, BlockChainError::Timeout(_)));
	assert!(registry.get(NetworkId::Ethereum).await.is_none());
}

#[tokio::test]
async fn test_verification_respects_rate_limit() {
	let script = Script::new(&["https://a.example"]);
	let governor = Arc::new(RateGovernor::new(HashMap::from([(
		rpc_key(NetworkId::Ethereum),
		ResourceLimit {
			max_requests: 1,
			interval: Duration::from_secs(3600),
			max_queue: 0,
			timeout: Duration::from_millis(10),
			error_on_limit: false,
		},
	)])));
	let registry = ConnectionRegistry::new(
		vec![network_config(NetworkId::Ethereum, &["https://a.example"])],
		ScriptedFactory::new(script.clone()),
		governor.clone(),
		Duration::from_secs(1),
	)
	.unwrap();

	// consume the only token
	governor
		.acquire(&rpc_key(NetworkId::Ethereum), "test")
		.await
		.unwrap();

	let error = registry.get_or_connect(NetworkId::Ethereum).await.err().unwrap();
	assert!(matches!(error, BlockChainError::RateLimited(_)));
	assert!(!error.is_transport());
}

#[tokio::test]
async fn test_replace_and_close_all() {
	let script = Script::new(&["https://a.example", "https://b.example"]);
	let registry = registry(&script, &["https://a.example", "https://b.example"]);

	let first = registry.get_or_connect(NetworkId::Ethereum).await.unwrap();
	let second = registry
		.connect_endpoint(NetworkId::Ethereum, "https://b.example")
		.await
		.unwrap();
	let retired = registry
		.replace(NetworkId::Ethereum, second.clone())
		.await
		.unwrap()
		.unwrap();
	assert!(Arc::ptr_eq(&retired, &first));
	assert_eq!(
		registry
			.status(NetworkId::Ethereum)
			.await
			.unwrap()
			.active_url
			.as_deref(),
		Some("https://b.example")
	);
	assert!(registry.install(NetworkId::Ethereum, first).await.is_err());

	registry.close_all().await;
	assert!(registry.get(NetworkId::Ethereum).await.is_none());
	let status = registry.status(NetworkId::Ethereum).await.unwrap();
	assert!(!status.connected);
	assert_eq!(status.liveness, Liveness::Dead);
}
