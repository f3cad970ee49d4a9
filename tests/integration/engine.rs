use crate::integration::mocks::{
	batch_log, erc721_log, network_config, quiet_config, Script, ScriptedFactory, CONTRACT, OTHER,
	OWNER,
};
use chain_sentinel::{
	models::{
		AddressOptions, BalanceKind, CollectionOptions, MonitorConfig, MonitorEvent, NetworkId,
		NftOptions, NftStandard, OwnershipDirection,
	},
	services::{
		blockchain::BlockHeader,
		monitor::{MonitorError, MonitoringEngine},
	},
};
use rust_decimal::Decimal;
use std::{
	sync::{atomic::Ordering, Arc},
	time::Duration,
};
use tokio::sync::{broadcast, Notify};

const PRIMARY: &str = "https://eth-a.example";
const BACKUP: &str = "https://eth-b.example";
const SOLANA: &str = "https://sol.example";
const SOLANA_OWNER: &str = "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T";

fn engine(script: &Arc<Script>) -> Arc<MonitoringEngine> {
	engine_with(script, quiet_config())
}

fn engine_with(script: &Arc<Script>, config: MonitorConfig) -> Arc<MonitoringEngine> {
	MonitoringEngine::new_with_factory(
		config,
		vec![
			network_config(NetworkId::Ethereum, &[PRIMARY, BACKUP]),
			network_config(NetworkId::Solana, &[SOLANA]),
		],
		ScriptedFactory::new(script.clone()),
	)
	.unwrap()
}

/// Lets the first tick of freshly spawned loops run
async fn settle() {
	tokio::time::sleep(Duration::from_millis(20)).await;
}

/// Collects events until `count` of them matched `keep` or two seconds passed
async fn collect(
	events: &mut broadcast::Receiver<MonitorEvent>,
	count: usize,
	keep: impl Fn(&MonitorEvent) -> bool,
) -> Vec<MonitorEvent> {
	let mut kept = Vec::new();
	let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
	while kept.len() < count {
		match tokio::time::timeout_at(deadline, events.recv()).await {
			Ok(Ok(event)) if keep(&event) => kept.push(event),
			Ok(Ok(_)) => {}
			_ => break,
		}
	}
	kept
}

fn is_balance_change(event: &MonitorEvent) -> bool {
	matches!(event, MonitorEvent::BalanceChange(_))
}

fn is_nft_event(event: &MonitorEvent) -> bool {
	matches!(
		event,
		MonitorEvent::NftTransfer(_) | MonitorEvent::NftOwnershipChange(_)
	)
}

#[tokio::test]
async fn test_balance_changes_follow_observations() {
	let script = Script::new(&[PRIMARY, BACKUP]);
	script.push_balances(&[10, 10, 15, 15, 7]);
	let engine = engine(&script);
	let mut events = engine.subscribe();

	engine
		.monitor_address(NetworkId::Ethereum, OWNER, AddressOptions::default())
		.unwrap();
	for _ in 0..5 {
		engine.check_network(NetworkId::Ethereum).await.unwrap();
	}

	let changes = collect(&mut events, 2, is_balance_change).await;
	let changes: Vec<_> = changes
		.into_iter()
		.filter_map(|event| match event {
			MonitorEvent::BalanceChange(change) => Some(change),
			_ => None,
		})
		.collect();
	assert_eq!(changes.len(), 2);

	assert_eq!(changes[0].kind, BalanceKind::Native);
	assert_eq!(changes[0].symbol, "ETH");
	assert_eq!(changes[0].previous_balance, "10");
	assert_eq!(changes[0].new_balance, "15");
	assert_eq!(changes[0].change, Decimal::from(5));
	assert_eq!(changes[1].previous_balance, "15");
	assert_eq!(changes[1].new_balance, "7");
	assert_eq!(changes[1].change, Decimal::from(-8));

	assert_eq!(
		engine
			.last_balance(NetworkId::Ethereum, OWNER, "native")
			.as_deref(),
		Some("7")
	);
	let metrics = engine.metrics();
	assert_eq!(
		metrics.network(NetworkId::Ethereum).unwrap().events["balanceChange"],
		2
	);
	assert!(metrics.network(NetworkId::Ethereum).unwrap().latency["getBalance"].count >= 5);

	engine.destroy().await;
}

#[tokio::test]
async fn test_token_balances_are_tracked_per_symbol() {
	let script = Script::new(&[PRIMARY]);
	let engine = engine(&script);

	engine
		.monitor_address(
			NetworkId::Ethereum,
			OWNER,
			AddressOptions {
				track_balance: false,
				tokens: vec!["usdc".to_string(), "DOGE".to_string()],
			},
		)
		.unwrap();
	engine.check_network(NetworkId::Ethereum).await.unwrap();

	assert_eq!(
		engine.last_balance(NetworkId::Ethereum, OWNER, "USDC").as_deref(),
		Some("1.5")
	);
	assert!(engine
		.last_balance(NetworkId::Ethereum, OWNER, "native")
		.is_none());
	assert_eq!(script.balance_calls.load(Ordering::SeqCst), 0);
	assert!(engine
		.metrics()
		.network(NetworkId::Ethereum)
		.unwrap()
		.errors
		.contains_key("unknown_token"));

	engine.destroy().await;
}

#[tokio::test]
async fn test_registration_is_idempotent() {
	let script = Script::new(&[PRIMARY]);
	let engine = engine(&script);

	engine
		.monitor_address(NetworkId::Ethereum, OWNER, AddressOptions::default())
		.unwrap();
	// Same address after normalization
	engine
		.monitor_address(
			NetworkId::Ethereum,
			&format!("  {}  ", OWNER),
			AddressOptions::default(),
		)
		.unwrap();

	assert_eq!(
		engine.active_tasks(),
		vec!["balance_ethereum".to_string(), "blocks_ethereum".to_string()]
	);
	assert_eq!(engine.monitored_addresses(NetworkId::Ethereum).len(), 1);
	assert!(engine.heartbeat().is_running(NetworkId::Ethereum));

	engine.destroy().await;
}

#[tokio::test]
async fn test_stop_tears_down_idle_networks() {
	let script = Script::new(&[PRIMARY]);
	let engine = engine(&script);

	engine
		.monitor_address(NetworkId::Ethereum, OWNER, AddressOptions::default())
		.unwrap();
	engine
		.monitor_nft_collection(NetworkId::Ethereum, CONTRACT, CollectionOptions::default())
		.unwrap();
	assert_eq!(
		engine.active_tasks(),
		vec![
			"balance_ethereum".to_string(),
			"blocks_ethereum".to_string(),
			format!("nft_ethereum_{}", CONTRACT),
		]
	);

	assert!(engine.stop_nft_collection(NetworkId::Ethereum, CONTRACT));
	assert!(!engine.stop_nft_collection(NetworkId::Ethereum, CONTRACT));
	assert_eq!(
		engine.active_tasks(),
		vec!["balance_ethereum".to_string(), "blocks_ethereum".to_string()]
	);

	assert!(engine.stop_monitoring(NetworkId::Ethereum, OWNER));
	assert!(engine.active_tasks().is_empty());
	assert!(!engine.heartbeat().is_running(NetworkId::Ethereum));
	assert!(!engine.stop_monitoring(NetworkId::Ethereum, OWNER));
	assert!(!engine.stop_monitoring(NetworkId::Ethereum, "garbage"));

	engine.destroy().await;
}

#[tokio::test]
async fn test_stop_all_monitoring_keeps_engine_usable() {
	let script = Script::new(&[PRIMARY]);
	let engine = engine(&script);

	engine
		.monitor_address(NetworkId::Ethereum, OWNER, AddressOptions::default())
		.unwrap();
	engine.stop_all_monitoring();
	assert!(engine.active_tasks().is_empty());
	assert!(engine.monitored_addresses(NetworkId::Ethereum).is_empty());
	assert!(!engine.is_destroyed());

	engine
		.monitor_address(NetworkId::Ethereum, OWNER, AddressOptions::default())
		.unwrap();
	assert_eq!(engine.active_tasks().len(), 2);

	engine.destroy().await;
}

#[tokio::test]
async fn test_stop_all_monitoring_silences_every_timer() {
	let script = Script::new(&[PRIMARY, BACKUP]);
	let engine = engine_with(
		&script,
		MonitorConfig {
			polling_interval: Duration::from_millis(30),
			heartbeat_interval: Duration::from_millis(30),
			health_check_interval: Duration::from_millis(30),
			ping_timeout: Duration::from_millis(50),
			..quiet_config()
		},
	);

	engine
		.monitor_address(NetworkId::Ethereum, OWNER, AddressOptions::default())
		.unwrap();
	settle().await;
	assert!(engine.heartbeat().is_running(NetworkId::Ethereum));
	assert!(engine.heartbeat().is_sweep_running());

	engine.stop_all_monitoring();
	assert!(!engine.heartbeat().is_running(NetworkId::Ethereum));
	assert!(!engine.heartbeat().is_sweep_running());

	// A stale connection would be reconnected if anything still watched it
	engine
		.registry()
		.update_status(NetworkId::Ethereum, |status| {
			status.last_ping_time = Some(chrono::Utc::now() - chrono::Duration::minutes(10));
		})
		.await;
	script.push_balances(&[1, 2, 3, 4]);
	let mut events = engine.subscribe();
	let connects = script.connects().len();

	assert!(engine.heartbeat().sweep_once().await.is_empty());
	tokio::time::sleep(Duration::from_millis(300)).await;

	assert!(matches!(
		events.try_recv(),
		Err(broadcast::error::TryRecvError::Empty)
	));
	assert_eq!(script.connects().len(), connects);
	assert!(!engine.heartbeat().is_running(NetworkId::Ethereum));
	let status = engine
		.connection_status(NetworkId::Ethereum)
		.await
		.unwrap();
	assert!(status.connected);
	assert!(!status.is_reconnecting);

	engine.destroy().await;
}

#[tokio::test]
async fn test_destroy_releases_everything() {
	let script = Script::new(&[PRIMARY]);
	let engine = engine(&script);

	engine
		.monitor_address(NetworkId::Ethereum, OWNER, AddressOptions::default())
		.unwrap();
	engine.check_network(NetworkId::Ethereum).await.unwrap();
	assert!(engine.registry().get(NetworkId::Ethereum).await.is_some());

	engine.destroy().await;
	assert!(engine.is_destroyed());
	assert!(engine.active_tasks().is_empty());
	assert!(engine.monitored_addresses(NetworkId::Ethereum).is_empty());
	assert!(engine.governor().is_destroyed());
	assert!(engine.registry().get(NetworkId::Ethereum).await.is_none());
	assert_eq!(script.closed.load(Ordering::SeqCst), 1);

	let status = engine
		.connection_status(NetworkId::Ethereum)
		.await
		.unwrap();
	assert!(!status.connected);
	assert!(!status.is_reconnecting);

	assert!(matches!(
		engine.monitor_address(NetworkId::Ethereum, OWNER, AddressOptions::default()),
		Err(MonitorError::Destroyed)
	));
	assert!(matches!(
		engine.check_network(NetworkId::Ethereum).await,
		Err(MonitorError::Destroyed)
	));

	// Second call is a no-op
	engine.destroy().await;
	assert_eq!(script.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_nft_transfers_are_reported_per_direction() {
	let script = Script::new(&[PRIMARY]);
	let engine = engine(&script);
	let mut events = engine.subscribe();

	engine
		.monitor_nft_transfers(
			NetworkId::Ethereum,
			OWNER,
			NftOptions {
				contract_addresses: vec![CONTRACT.to_string()],
				standards: Vec::new(),
			},
		)
		.unwrap();
	settle().await;
	// First pass only places the cursor after the current head
	engine.check_network(NetworkId::Ethereum).await.unwrap();
	assert!(script.log_queries.lock().unwrap().is_empty());

	{
		let mut logs = script.logs.lock().unwrap();
		logs.push(erc721_log(105, OWNER, OTHER, 7));
		logs.push(batch_log(108, OTHER, OWNER, &[1, 2], &[1, 1]));
	}
	script.block_number.store(110, Ordering::SeqCst);
	engine.check_network(NetworkId::Ethereum).await.unwrap();

	assert_eq!(*script.log_queries.lock().unwrap(), vec![(101, 110)]);
	let nft_events = collect(&mut events, 6, is_nft_event).await;
	assert_eq!(nft_events.len(), 6);

	match (&nft_events[0], &nft_events[1]) {
		(MonitorEvent::NftTransfer(transfer), MonitorEvent::NftOwnershipChange(change)) => {
			assert_eq!(transfer.standard, NftStandard::Erc721);
			assert_eq!(transfer.token_id, "7");
			assert_eq!(transfer.value, "1");
			assert_eq!(transfer.contract, CONTRACT);
			assert_eq!(change.address, OWNER);
			assert_eq!(change.direction, OwnershipDirection::Send);
		}
		other => panic!("unexpected events {:?}", other),
	}

	let received: Vec<String> = nft_events
		.iter()
		.filter_map(|event| match event {
			MonitorEvent::NftOwnershipChange(change)
				if change.direction == OwnershipDirection::Receive =>
			{
				assert_eq!(change.transfer.standard, NftStandard::Erc1155);
				assert_eq!(change.transfer.operator.as_deref(), Some(OTHER));
				Some(change.transfer.token_id.clone())
			}
			_ => None,
		})
		.collect();
	assert_eq!(received, vec!["1".to_string(), "2".to_string()]);

	// The cursor moved past the queried range
	engine.check_network(NetworkId::Ethereum).await.unwrap();
	assert_eq!(script.log_queries.lock().unwrap().len(), 1);

	engine.destroy().await;
}

#[tokio::test]
async fn test_log_queries_are_bounded() {
	let script = Script::new(&[PRIMARY]);
	let engine = engine(&script);

	engine
		.monitor_nft_collection(
			NetworkId::Ethereum,
			CONTRACT,
			CollectionOptions {
				standard: NftStandard::Erc721,
			},
		)
		.unwrap();
	settle().await;
	engine.check_network(NetworkId::Ethereum).await.unwrap();

	script.block_number.store(5_000, Ordering::SeqCst);
	engine.check_network(NetworkId::Ethereum).await.unwrap();
	engine.check_network(NetworkId::Ethereum).await.unwrap();

	assert_eq!(
		*script.log_queries.lock().unwrap(),
		vec![(101, 2_100), (2_101, 4_100)]
	);

	engine.destroy().await;
}

#[tokio::test]
async fn test_collection_reports_unrelated_transfers() {
	let script = Script::new(&[PRIMARY]);
	let engine = engine(&script);
	let mut events = engine.subscribe();

	engine
		.monitor_nft_collection(NetworkId::Ethereum, CONTRACT, CollectionOptions::default())
		.unwrap();
	settle().await;
	engine.check_network(NetworkId::Ethereum).await.unwrap();

	script.logs.lock().unwrap().push(erc721_log(103, OTHER, OTHER, 9));
	script.block_number.store(104, Ordering::SeqCst);
	engine.check_network(NetworkId::Ethereum).await.unwrap();

	let nft_events = collect(&mut events, 1, is_nft_event).await;
	assert!(matches!(
		&nft_events[..],
		[MonitorEvent::NftTransfer(transfer)] if transfer.token_id == "9"
	));

	engine.destroy().await;
}

#[tokio::test]
async fn test_registration_errors() {
	let script = Script::new(&[PRIMARY, SOLANA]);
	let engine = engine(&script);

	assert!(matches!(
		engine.monitor_address(NetworkId::Bsc, OWNER, AddressOptions::default()),
		Err(MonitorError::UnsupportedNetwork(NetworkId::Bsc))
	));
	assert!(matches!(
		engine.monitor_address(NetworkId::Ethereum, "not-an-address", AddressOptions::default()),
		Err(MonitorError::InvalidAddress(_))
	));
	assert!(matches!(
		engine.monitor_nft_transfers(
			NetworkId::Ethereum,
			OWNER,
			NftOptions {
				contract_addresses: vec!["0x123".to_string()],
				standards: Vec::new(),
			}
		),
		Err(MonitorError::InvalidAddress(_))
	));
	assert!(matches!(
		engine.monitor_nft_transfers(NetworkId::Solana, SOLANA_OWNER, NftOptions::default()),
		Err(MonitorError::Unsupported(_))
	));
	assert!(matches!(
		engine.check_network(NetworkId::Polygon).await,
		Err(MonitorError::UnsupportedNetwork(_))
	));

	// Solana balances are supported
	engine
		.monitor_address(NetworkId::Solana, SOLANA_OWNER, AddressOptions::default())
		.unwrap();
	assert!(engine.active_tasks().contains(&"balance_solana".to_string()));

	engine.destroy().await;
}

#[tokio::test]
async fn test_transport_error_triggers_reconnection() {
	let script = Script::new(&[PRIMARY, BACKUP]);
	let engine = engine(&script);
	let mut events = engine.subscribe();

	engine
		.monitor_address(NetworkId::Ethereum, OWNER, AddressOptions::default())
		.unwrap();
	engine.check_network(NetworkId::Ethereum).await.unwrap();

	script.fail_balances.store(true, Ordering::SeqCst);
	// Transport errors are not surfaced to the caller
	engine.check_network(NetworkId::Ethereum).await.unwrap();
	script.fail_balances.store(false, Ordering::SeqCst);

	let reconnected = collect(&mut events, 1, |event| {
		matches!(event, MonitorEvent::ProviderReconnected { .. })
	})
	.await;
	assert_eq!(reconnected.len(), 1);

	let mut connected = false;
	for _ in 0..100 {
		let status = engine
			.connection_status(NetworkId::Ethereum)
			.await
			.unwrap();
		if status.connected && !status.is_reconnecting {
			connected = true;
			break;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	assert!(connected);
	assert!(engine.metrics().network(NetworkId::Ethereum).unwrap().reconnections >= 1);
	// Monitoring is re-armed on the new handle
	assert_eq!(engine.active_tasks().len(), 2);

	engine.destroy().await;
}

#[tokio::test]
async fn test_exhausted_reconnection_is_reported_once() {
	let script = Script::new(&[PRIMARY, BACKUP]);
	let engine = engine_with(
		&script,
		MonitorConfig {
			polling_interval: Duration::from_millis(30),
			..quiet_config()
		},
	);
	let mut events = engine.subscribe();

	engine
		.monitor_address(NetworkId::Ethereum, OWNER, AddressOptions::default())
		.unwrap();
	settle().await;
	script.set_healthy(&[]);
	script.fail_balances.store(true, Ordering::SeqCst);

	let errors = collect(&mut events, 1, |event| {
		matches!(event, MonitorEvent::ProviderError { .. })
	})
	.await;
	assert_eq!(errors.len(), 1);
	let connects = script.connects().len();

	// Polling keeps ticking but never reconnects on its own
	tokio::time::sleep(Duration::from_millis(300)).await;
	let mut later_errors = 0;
	while let Ok(event) = events.try_recv() {
		if matches!(event, MonitorEvent::ProviderError { .. }) {
			later_errors += 1;
		}
	}
	assert_eq!(later_errors, 0);
	assert_eq!(script.connects().len(), connects);

	let status = engine
		.connection_status(NetworkId::Ethereum)
		.await
		.unwrap();
	assert!(!status.connected);
	assert!(!status.is_reconnecting);
	assert!(status.reconnect_exhausted);
	assert_eq!(engine.active_tasks().len(), 2);

	// An explicit request starts over
	script.set_healthy(&[PRIMARY, BACKUP]);
	script.fail_balances.store(false, Ordering::SeqCst);
	assert!(engine.reconnect(NetworkId::Ethereum).await.unwrap());
	let reconnected = collect(&mut events, 1, |event| {
		matches!(event, MonitorEvent::ProviderReconnected { .. })
	})
	.await;
	assert_eq!(reconnected.len(), 1);
	assert!(
		!engine
			.connection_status(NetworkId::Ethereum)
			.await
			.unwrap()
			.reconnect_exhausted
	);

	engine.destroy().await;
}

#[tokio::test]
async fn test_removal_during_check_drops_the_result() {
	let script = Script::new(&[PRIMARY]);
	script.push_balances(&[10]);
	let engine = engine(&script);
	let mut events = engine.subscribe();

	engine
		.monitor_address(NetworkId::Ethereum, OWNER, AddressOptions::default())
		.unwrap();
	settle().await;
	engine.check_network(NetworkId::Ethereum).await.unwrap();

	script.push_balances(&[20]);
	let gate = Arc::new(Notify::new());
	*script.balance_gate.lock().unwrap() = Some(gate.clone());
	let calls = script.balance_calls.load(Ordering::SeqCst);

	let check = {
		let engine = engine.clone();
		tokio::spawn(async move { engine.check_network(NetworkId::Ethereum).await })
	};
	while script.balance_calls.load(Ordering::SeqCst) == calls {
		tokio::task::yield_now().await;
	}

	assert!(engine.stop_monitoring(NetworkId::Ethereum, OWNER));
	gate.notify_one();
	check.await.unwrap().unwrap();

	assert!(collect(&mut events, 1, is_balance_change).await.is_empty());
	assert!(engine
		.last_balance(NetworkId::Ethereum, OWNER, "native")
		.is_none());

	engine.destroy().await;
}

#[tokio::test]
async fn test_new_blocks_drive_checks() {
	let script = Script::new(&[PRIMARY]);
	script.block_subscription.store(true, Ordering::SeqCst);
	let engine = engine(&script);
	let mut events = engine.subscribe();

	engine
		.monitor_address(NetworkId::Ethereum, OWNER, AddressOptions::default())
		.unwrap();

	let mut sender = None;
	for _ in 0..100 {
		if let Some(found) = script.block_senders.lock().unwrap().first().cloned() {
			sender = Some(found);
			break;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	let sender = sender.expect("no block subscription");
	let calls = script.balance_calls.load(Ordering::SeqCst);

	sender
		.send(BlockHeader {
			number: 101,
			timestamp: Some(1_700_000_000),
		})
		.await
		.unwrap();

	let blocks = collect(&mut events, 1, |event| {
		matches!(event, MonitorEvent::NewBlock(_))
	})
	.await;
	match &blocks[..] {
		[MonitorEvent::NewBlock(block)] => {
			assert_eq!(block.block_number, 101);
			assert_eq!(block.timestamp.timestamp(), 1_700_000_000);
		}
		other => panic!("unexpected events {:?}", other),
	}

	for _ in 0..100 {
		if script.balance_calls.load(Ordering::SeqCst) > calls {
			break;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	assert!(script.balance_calls.load(Ordering::SeqCst) > calls);

	engine.destroy().await;
}

#[tokio::test]
async fn test_external_reconnect_rotates_endpoint() {
	let script = Script::new(&[PRIMARY, BACKUP]);
	let engine = engine(&script);
	let mut events = engine.subscribe();

	engine
		.monitor_address(NetworkId::Ethereum, OWNER, AddressOptions::default())
		.unwrap();
	engine.check_network(NetworkId::Ethereum).await.unwrap();

	assert!(engine.reconnect(NetworkId::Ethereum).await.unwrap());
	let reconnected = collect(&mut events, 1, |event| {
		matches!(event, MonitorEvent::ProviderReconnected { .. })
	})
	.await;
	assert_eq!(reconnected.len(), 1);

	let status = engine
		.connection_status(NetworkId::Ethereum)
		.await
		.unwrap();
	assert_eq!(status.active_url.as_deref(), Some(BACKUP));
	assert!(matches!(
		engine.reconnect(NetworkId::Polygon).await,
		Err(MonitorError::UnsupportedNetwork(_))
	));

	engine.destroy().await;
}
