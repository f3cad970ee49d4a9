//! Solana client implementation over plain JSON-RPC.
//!
//! Block numbers are slots. Token balances are the sum of every SPL token account the
//! owner holds for the configured mint. Solana has no contract event logs, so NFT
//! transfer detection is not offered.

use alloy::primitives::U256;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::{
	models::{NetworkId, TokenConfig},
	services::blockchain::{
		client::{Balance, BlockHeader, ChainClient, ClientCapabilities, RawLog},
		transports::{extract_result, BlockchainTransport},
		BlockChainError,
	},
};

pub struct SolanaClient<T: BlockchainTransport> {
	transport: T,
}

impl<T: BlockchainTransport> SolanaClient<T> {
	pub fn new_with_transport(transport: T) -> Self {
		Self { transport }
	}

	async fn call(&self, method: &str, params: Value) -> Result<Value, BlockChainError> {
		let response = self.transport.send_raw_request(method, Some(params)).await?;
		extract_result(response)
	}
}

/// Sums the `tokenAmount` of every account in a `jsonParsed` token account list
///
/// Returns the summed amount and the decimals reported by the accounts, if any.
fn sum_token_accounts(result: &Value) -> Result<(U256, Option<u8>), BlockChainError> {
	let accounts = result
		.get("value")
		.and_then(Value::as_array)
		.ok_or_else(|| BlockChainError::response_error("Token account list without value"))?;

	let mut total = U256::ZERO;
	let mut decimals = None;
	for account in accounts {
		let amount = account
			.pointer("/account/data/parsed/info/tokenAmount")
			.ok_or_else(|| BlockChainError::response_error("Token account without tokenAmount"))?;
		let raw = amount
			.get("amount")
			.and_then(Value::as_str)
			.ok_or_else(|| BlockChainError::response_error("tokenAmount without amount"))?;
		let value = U256::from_str_radix(raw, 10).map_err(|e| {
			BlockChainError::response_error(format!("Invalid token amount {}: {}", raw, e))
		})?;
		total = total.saturating_add(value);
		if let Some(reported) = amount.get("decimals").and_then(Value::as_u64) {
			decimals = u8::try_from(reported).ok();
		}
	}
	Ok((total, decimals))
}

#[async_trait]
impl<T: BlockchainTransport + 'static> ChainClient for SolanaClient<T> {
	fn network(&self) -> NetworkId {
		NetworkId::Solana
	}

	fn endpoint(&self) -> String {
		self.transport.get_current_url().to_string()
	}

	fn capabilities(&self) -> ClientCapabilities {
		ClientCapabilities {
			ping: self.transport.supports_ping(),
			block_subscription: self.transport.supports_subscriptions(),
			contract_logs: false,
		}
	}

	async fn get_block_number(&self) -> Result<u64, BlockChainError> {
		let result = self.call("getSlot", json!([{ "commitment": "confirmed" }])).await?;
		result
			.as_u64()
			.ok_or_else(|| BlockChainError::response_error("getSlot result is not a number"))
	}

	async fn get_native_balance(&self, address: &str) -> Result<Balance, BlockChainError> {
		let result = self
			.call("getBalance", json!([address, { "commitment": "confirmed" }]))
			.await?;
		let lamports = result
			.get("value")
			.and_then(Value::as_u64)
			.ok_or_else(|| BlockChainError::response_error("getBalance without value"))?;
		Ok(Balance::new(
			U256::from(lamports),
			NetworkId::Solana.native_decimals(),
		))
	}

	async fn get_token_balance(
		&self,
		address: &str,
		token: &TokenConfig,
	) -> Result<Balance, BlockChainError> {
		let result = self
			.call(
				"getTokenAccountsByOwner",
				json!([address, { "mint": token.address }, { "encoding": "jsonParsed" }]),
			)
			.await?;
		let (total, reported) = sum_token_accounts(&result)?;
		Ok(Balance::new(total, reported.unwrap_or(token.decimals)))
	}

	async fn get_transfer_logs(
		&self,
		_contract: &str,
		_from_block: u64,
		_to_block: u64,
	) -> Result<Vec<RawLog>, BlockChainError> {
		Err(BlockChainError::unsupported("contract logs on solana"))
	}

	async fn ping(&self) -> Result<Duration, BlockChainError> {
		self.transport.ping().await
	}

	async fn subscribe_blocks(&self) -> Result<mpsc::Receiver<BlockHeader>, BlockChainError> {
		let mut notifications = self.transport.subscribe("slotSubscribe", json!([])).await?;
		let (sender, receiver) = mpsc::channel(16);

		tokio::spawn(async move {
			while let Some(slot) = notifications.recv().await {
				let Some(number) = slot.get("slot").and_then(Value::as_u64) else {
					tracing::warn!("Ignoring malformed slot notification");
					continue;
				};
				let header = BlockHeader {
					number,
					timestamp: None,
				};
				if sender.send(header).await.is_err() {
					break;
				}
			}
		});

		Ok(receiver)
	}

	async fn close(&self) {
		self.transport.close().await;
	}
}
