//! EVM-compatible blockchain client implementation.
//!
//! Reads native balances with `eth_getBalance`, ERC20 balances with an `eth_call` to
//! `balanceOf`, and NFT transfer logs with `eth_getLogs` filtered on the ERC721 and
//! ERC1155 transfer topics. New blocks are pushed through `eth_subscribe("newHeads")`
//! when the transport supports subscriptions.

use alloy::{
	primitives::{Address, Bytes, B256},
	sol_types::SolCall,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{str::FromStr, time::Duration};
use tokio::sync::mpsc;

use crate::{
	models::{NetworkId, TokenConfig},
	services::blockchain::{
		client::{Balance, BlockHeader, ChainClient, ClientCapabilities, RawLog},
		clients::abi::{
			balanceOfCall, TRANSFER_BATCH_TOPIC, TRANSFER_SINGLE_TOPIC, TRANSFER_TOPIC,
		},
		transports::{extract_result, BlockchainTransport},
		BlockChainError,
	},
	utils::parsing::{parse_hex_u256, parse_hex_u64},
};

/// Client implementation for Ethereum Virtual Machine (EVM) compatible blockchains
pub struct EvmClient<T: BlockchainTransport> {
	network: NetworkId,
	transport: T,
}

impl<T: BlockchainTransport> EvmClient<T> {
	pub fn new_with_transport(network: NetworkId, transport: T) -> Self {
		Self { network, transport }
	}

	async fn call(&self, method: &str, params: Value) -> Result<Value, BlockChainError> {
		let response = self.transport.send_raw_request(method, Some(params)).await?;
		extract_result(response)
	}

	fn quantity(value: &Value, what: &str) -> Result<u64, BlockChainError> {
		let raw = value
			.as_str()
			.ok_or_else(|| BlockChainError::response_error(format!("{} is not a string", what)))?;
		parse_hex_u64(raw).map_err(BlockChainError::response_error)
	}
}

/// ABI-encoded `balanceOf(owner)` call data
fn balance_of_calldata(owner: &str) -> Result<Bytes, BlockChainError> {
	let owner = Address::from_str(owner)
		.map_err(|e| BlockChainError::request_error(format!("Invalid owner {}: {}", owner, e)))?;
	Ok(balanceOfCall { owner }.abi_encode().into())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogEntry {
	address: Address,
	topics: Vec<B256>,
	data: Bytes,
	block_number: Option<String>,
	transaction_hash: Option<B256>,
	log_index: Option<String>,
	#[serde(default)]
	removed: bool,
}

impl TryFrom<LogEntry> for RawLog {
	type Error = BlockChainError;

	fn try_from(entry: LogEntry) -> Result<Self, Self::Error> {
		let parse = |value: Option<String>| {
			value
				.map(|raw| parse_hex_u64(&raw))
				.transpose()
				.map_err(BlockChainError::response_error)
		};
		Ok(RawLog {
			address: entry.address,
			topics: entry.topics,
			data: entry.data,
			block_number: parse(entry.block_number)?,
			transaction_hash: entry.transaction_hash,
			log_index: parse(entry.log_index)?,
		})
	}
}

fn parse_logs(result: Value) -> Result<Vec<RawLog>, BlockChainError> {
	let entries: Vec<LogEntry> = serde_json::from_value(result)
		.map_err(|e| BlockChainError::response_error(format!("Malformed logs: {}", e)))?;
	entries
		.into_iter()
		.filter(|entry| !entry.removed)
		.map(RawLog::try_from)
		.collect()
}

fn parse_header(header: &Value) -> Option<BlockHeader> {
	let number = parse_hex_u64(header.get("number")?.as_str()?).ok()?;
	let timestamp = header
		.get("timestamp")
		.and_then(Value::as_str)
		.and_then(|raw| parse_hex_u64(raw).ok());
	Some(BlockHeader { number, timestamp })
}

#[async_trait]
impl<T: BlockchainTransport + 'static> ChainClient for EvmClient<T> {
	fn network(&self) -> NetworkId {
		self.network
	}

	fn endpoint(&self) -> String {
		self.transport.get_current_url().to_string()
	}

	fn capabilities(&self) -> ClientCapabilities {
		ClientCapabilities {
			ping: self.transport.supports_ping(),
			block_subscription: self.transport.supports_subscriptions(),
			contract_logs: true,
		}
	}

	async fn get_block_number(&self) -> Result<u64, BlockChainError> {
		let result = self.call("eth_blockNumber", json!([])).await?;
		Self::quantity(&result, "eth_blockNumber result")
	}

	async fn get_native_balance(&self, address: &str) -> Result<Balance, BlockChainError> {
		let result = self
			.call("eth_getBalance", json!([address, "latest"]))
			.await?;
		let raw = result
			.as_str()
			.ok_or_else(|| BlockChainError::response_error("eth_getBalance result is not a string"))?;
		let value = parse_hex_u256(raw).map_err(BlockChainError::response_error)?;
		Ok(Balance::new(value, self.network.native_decimals()))
	}

	async fn get_token_balance(
		&self,
		address: &str,
		token: &TokenConfig,
	) -> Result<Balance, BlockChainError> {
		let call = json!({ "to": token.address, "data": balance_of_calldata(address)? });
		let result = self.call("eth_call", json!([call, "latest"])).await?;
		let raw = result
			.as_str()
			.ok_or_else(|| BlockChainError::response_error("eth_call result is not a string"))?;
		let data = Bytes::from_str(raw)
			.map_err(|e| BlockChainError::response_error(format!("Malformed eth_call result: {}", e)))?;
		if data.is_empty() {
			return Err(BlockChainError::response_error(format!(
				"{} returned no data for balanceOf",
				token.address
			)));
		}
		let value = balanceOfCall::abi_decode_returns(&data).map_err(|e| {
			BlockChainError::response_error(format!("Malformed balanceOf result: {}", e))
		})?;
		Ok(Balance::new(value, token.decimals))
	}

	async fn get_transfer_logs(
		&self,
		contract: &str,
		from_block: u64,
		to_block: u64,
	) -> Result<Vec<RawLog>, BlockChainError> {
		let filter = json!({
			"address": contract,
			"fromBlock": format!("0x{:x}", from_block),
			"toBlock": format!("0x{:x}", to_block),
			"topics": [[TRANSFER_TOPIC, TRANSFER_SINGLE_TOPIC, TRANSFER_BATCH_TOPIC]],
		});
		let result = self.call("eth_getLogs", json!([filter])).await?;
		parse_logs(result)
	}

	async fn ping(&self) -> Result<Duration, BlockChainError> {
		self.transport.ping().await
	}

	async fn subscribe_blocks(&self) -> Result<mpsc::Receiver<BlockHeader>, BlockChainError> {
		let mut notifications = self
			.transport
			.subscribe("eth_subscribe", json!(["newHeads"]))
			.await?;
		let (sender, receiver) = mpsc::channel(16);
		let network = self.network;

		tokio::spawn(async move {
			while let Some(header) = notifications.recv().await {
				match parse_header(&header) {
					Some(header) => {
						if sender.send(header).await.is_err() {
							break;
						}
					}
					None => tracing::warn!(%network, "Ignoring malformed block header"),
				}
			}
		});

		Ok(receiver)
	}

	async fn close(&self) {
		self.transport.close().await;
	}
}
