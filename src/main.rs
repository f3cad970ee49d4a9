//! Chain monitoring service entry point.
//!
//! Loads network definitions, engine tuning and a watch list, registers the watch
//! list with the monitoring engine and logs every event it publishes until Ctrl+C.
//!
//! # Flow
//! 1. Loads `.env` and applies CLI overrides
//! 2. Loads configurations from the config directory
//! 3. Creates the engine and registers the watch list
//! 4. Optionally reports NFT transfer history from a block explorer
//! 5. Optionally serves metrics over HTTP
//! 6. Destroys the engine on Ctrl+C

use anyhow::Context;
use chain_sentinel::{
	models::{
		ConfigLoader, MonitorConfig, MonitorEvent, NetworkConfig, NetworkId, NftStandard, WatchList,
		WatchedNftTransfers,
	},
	services::{
		explorer::{ExplorerClient, ExplorerConfig},
		monitor::MonitoringEngine,
		ratelimit::RateGovernor,
	},
	utils::{logging::setup_logging, metrics::server::create_metrics_server},
};
use clap::{Arg, ArgMatches, Command};
use dotenvy::dotenv;
use std::{collections::HashMap, env::var, path::Path, sync::Arc};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};

const DEFAULT_METRICS_ADDRESS: &str = "127.0.0.1:8081";
const DEFAULT_EXPLORER_NETWORK: &str = "ethereum";

fn build_cli() -> Command {
	Command::new("chain-sentinel")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Watches balances and NFT transfers across EVM networks and Solana.")
		.arg(
			Arg::new("config-dir")
				.long("config-dir")
				.help("Directory holding networks/, monitor.json and watch.json (default: config)")
				.value_name("DIR"),
		)
		.arg(
			Arg::new("log-level")
				.long("log-level")
				.help("Set log level (trace, debug, info, warn, error)")
				.value_name("LEVEL"),
		)
		.arg(
			Arg::new("metrics")
				.long("metrics")
				.help("Enable metrics server")
				.action(clap::ArgAction::SetTrue),
		)
		.arg(
			Arg::new("metrics-address")
				.long("metrics-address")
				.help("Address to start the metrics server on (default: 127.0.0.1:8081)")
				.value_name("HOST:PORT"),
		)
		.arg(
			Arg::new("explorer-url")
				.long("explorer-url")
				.help("Block explorer API used for the NFT history report (env: EXPLORER_URL)")
				.value_name("URL"),
		)
		.arg(
			Arg::new("explorer-network")
				.long("explorer-network")
				.help("Network the explorer indexes (default: ethereum)")
				.value_name("NETWORK"),
		)
}

/// Loads a single optional file, falling back to defaults when it is absent
fn load_optional<T: ConfigLoader + Default>(path: &Path) -> anyhow::Result<T> {
	if !path.exists() {
		info!(path = %path.display(), "Configuration file not found, using defaults");
		return Ok(T::default());
	}
	T::load_from_path(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn load_configs(
	matches: &ArgMatches,
) -> anyhow::Result<(Vec<NetworkConfig>, MonitorConfig, WatchList)> {
	let dir = matches
		.get_one::<String>("config-dir")
		.map(String::as_str)
		.unwrap_or("config");
	let dir = Path::new(dir);

	let networks: HashMap<String, NetworkConfig> =
		NetworkConfig::load_all(Some(&dir.join("networks")))
			.context("Failed to load network configurations")?;
	let monitor_config: MonitorConfig = load_optional(&dir.join("monitor.json"))?;
	let watch_list: WatchList = load_optional(&dir.join("watch.json"))?;

	Ok((networks.into_values().collect(), monitor_config, watch_list))
}

/// Registers every watch list entry, logging the ones that fail
///
/// # Returns
/// Number of successful registrations
fn register_watch_list(engine: &MonitoringEngine, watch_list: WatchList) -> usize {
	let mut registered = 0;

	for entry in watch_list.addresses {
		match engine.monitor_address(entry.network, &entry.address, entry.options) {
			Ok(()) => registered += 1,
			Err(e) => error!(network = %entry.network, address = %entry.address, error = %e, "Failed to monitor address"),
		}
	}
	for entry in watch_list.nft_transfers {
		match engine.monitor_nft_transfers(entry.network, &entry.address, entry.options) {
			Ok(()) => registered += 1,
			Err(e) => error!(network = %entry.network, address = %entry.address, error = %e, "Failed to monitor NFT transfers"),
		}
	}
	for entry in watch_list.collections {
		match engine.monitor_nft_collection(entry.network, &entry.contract, entry.options) {
			Ok(()) => registered += 1,
			Err(e) => error!(network = %entry.network, contract = %entry.contract, error = %e, "Failed to monitor NFT collection"),
		}
	}

	registered
}

/// Explorer client for the NFT history report, `None` when no explorer URL is configured
///
/// # Arguments
/// * `matches` - CLI overrides, `--explorer-url` wins over `url`
/// * `url` - Explorer URL from the environment
/// * `api_key` - Explorer API key from the environment
/// * `governor` - Shared with the engine so explorer calls respect the same limits
fn build_explorer(
	matches: &ArgMatches,
	url: Option<String>,
	api_key: Option<String>,
	governor: Arc<RateGovernor>,
) -> anyhow::Result<Option<ExplorerClient>> {
	let Some(url) = matches.get_one::<String>("explorer-url").cloned().or(url) else {
		return Ok(None);
	};
	let network: NetworkId = matches
		.get_one::<String>("explorer-network")
		.map(String::as_str)
		.unwrap_or(DEFAULT_EXPLORER_NETWORK)
		.parse()
		.map_err(anyhow::Error::msg)?;

	let mut config = ExplorerConfig::new("explorer", url);
	if let Some(api_key) = api_key {
		config = config.with_api_key(api_key);
	}
	let explorer =
		ExplorerClient::new(network, config, governor).context("Failed to create explorer client")?;
	Ok(Some(explorer))
}

/// Logs the recorded NFT transfers of every watched address on the explorer's network
///
/// # Returns
/// Number of transfers found
async fn report_nft_history(explorer: &ExplorerClient, entries: &[WatchedNftTransfers]) -> usize {
	let mut total = 0;

	for entry in entries.iter().filter(|e| e.network == explorer.network()) {
		let standards = if entry.options.standards.is_empty() {
			vec![NftStandard::Erc721, NftStandard::Erc1155]
		} else {
			entry.options.standards.clone()
		};
		for standard in standards {
			match explorer.nft_transfers(&entry.address, None, standard).await {
				Ok(transfers) => {
					info!(
						network = %entry.network,
						address = %entry.address,
						?standard,
						transfers = transfers.len(),
						latest_block = ?transfers.first().and_then(|t| t.block_number),
						"NFT transfer history"
					);
					total += transfers.len();
				}
				Err(e) => warn!(
					network = %entry.network,
					address = %entry.address,
					?standard,
					error = %e,
					"Failed to fetch NFT transfer history"
				),
			}
		}
	}

	total
}

async fn log_events(mut events: broadcast::Receiver<MonitorEvent>) {
	loop {
		match events.recv().await {
			Ok(event) => {
				let payload = serde_json::to_string(&event).unwrap_or_default();
				info!(event = event.name(), network = %event.network(), %payload, "Monitor event");
			}
			Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event logger lagged behind"),
			Err(RecvError::Closed) => return,
		}
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let matches = build_cli().get_matches();

	dotenv().ok();

	let log_level = matches
		.get_one::<String>("log-level")
		.cloned()
		.or_else(|| var("LOG_LEVEL").ok());
	setup_logging(log_level.as_deref()).unwrap_or_else(|e| {
		eprintln!("Failed to setup logging: {}", e);
	});

	let (networks, monitor_config, watch_list) = load_configs(&matches)?;
	if networks.is_empty() {
		info!("No network configurations found. Exiting...");
		return Ok(());
	}

	let engine = MonitoringEngine::new(monitor_config, networks)
		.context("Failed to create monitoring engine")?;
	let event_logger = tokio::spawn(log_events(engine.subscribe()));

	if watch_list.is_empty() {
		warn!("Watch list is empty, only connection health will be reported");
	}
	let nft_entries = watch_list.nft_transfers.clone();
	let registered = register_watch_list(&engine, watch_list);
	info!(registered, "Watch list registered");

	let explorer = build_explorer(
		&matches,
		var("EXPLORER_URL").ok(),
		var("EXPLORER_API_KEY").ok(),
		engine.governor(),
	)?;
	let history_report = match explorer {
		Some(explorer) => Some(tokio::spawn(async move {
			let total = report_nft_history(&explorer, &nft_entries).await;
			info!(total, "NFT history report finished");
		})),
		None => {
			info!("Explorer disabled. Use --explorer-url or EXPLORER_URL to enable the NFT history report");
			None
		}
	};

	let metrics_enabled =
		matches.get_flag("metrics") || var("METRICS_ENABLED").map(|v| v == "true").unwrap_or(false);
	let metrics_address = matches
		.get_one::<String>("metrics-address")
		.cloned()
		.unwrap_or_else(|| DEFAULT_METRICS_ADDRESS.to_string());

	let metrics_server = if metrics_enabled {
		match create_metrics_server(metrics_address, engine.metrics_aggregator()) {
			Ok(server) => Some(server),
			Err(e) => {
				error!("Failed to create metrics server: {}", e);
				None
			}
		}
	} else {
		info!("Metrics server disabled. Use --metrics flag or METRICS_ENABLED=true to enable");
		None
	};

	info!("Service started. Press Ctrl+C to shutdown");

	let ctrl_c = tokio::signal::ctrl_c();
	if let Some(metrics_future) = metrics_server {
		tokio::select! {
			result = ctrl_c => {
				if let Err(e) = result {
					error!("Error waiting for Ctrl+C: {}", e);
				}
				info!("Shutdown signal received, stopping services...");
			}
			result = metrics_future => {
				if let Err(e) = result {
					error!("Metrics server error: {}", e);
				}
				info!("Metrics server stopped, shutting down services...");
			}
		}
	} else {
		if let Err(e) = ctrl_c.await {
			error!("Error waiting for Ctrl+C: {}", e);
		}
		info!("Shutdown signal received, stopping services...");
	}

	if let Some(report) = history_report {
		report.abort();
	}
	shutdown(engine).await;
	event_logger.abort();

	info!("Shutdown complete");
	Ok(())
}

async fn shutdown(engine: Arc<MonitoringEngine>) {
	let metrics = engine.metrics();
	engine.destroy().await;
	info!(events = metrics.total_events(), "Engine destroyed");
}
