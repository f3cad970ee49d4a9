use chain_sentinel::{
	models::{NetworkId, TokenConfig},
	services::blockchain::{
		BlockChainError, ChainClient, EvmClient, HttpTransportClient, SolanaClient, TRANSFER_TOPIC,
	},
	utils::HttpRetryConfig,
};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use std::time::Duration;

const OWNER: &str = "0x00000000000000000000000000000000000000aa";

fn transport(server: &ServerGuard) -> HttpTransportClient {
	HttpTransportClient::new(
		&server.url(),
		&HttpRetryConfig {
			max_retries: 0,
			..Default::default()
		},
		Duration::from_secs(2),
	)
	.unwrap()
}

async fn rpc_mock(server: &mut ServerGuard, method: &str, result: serde_json::Value) -> mockito::Mock {
	server
		.mock("POST", "/")
		.match_body(Matcher::PartialJson(json!({ "method": method })))
		.with_header("content-type", "application/json")
		.with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string())
		.create_async()
		.await
}

#[tokio::test]
async fn test_evm_client_reads() {
	let mut server = Server::new_async().await;
	let block = rpc_mock(&mut server, "eth_blockNumber", json!("0x1b4")).await;
	let balance = rpc_mock(&mut server, "eth_getBalance", json!("0xde0b6b3a7640000")).await;
	let token = rpc_mock(
		&mut server,
		"eth_call",
		json!(format!("0x{:064x}", 1_500_000u64)),
	)
	.await;

	let client = EvmClient::new_with_transport(NetworkId::Ethereum, transport(&server));
	assert_eq!(client.get_block_number().await.unwrap(), 436);
	assert_eq!(client.get_native_balance(OWNER).await.unwrap().formatted(), "1.0");
	let usdc = TokenConfig {
		address: "0x00000000000000000000000000000000000000dd".to_string(),
		decimals: 6,
	};
	assert_eq!(
		client.get_token_balance(OWNER, &usdc).await.unwrap().formatted(),
		"1.5"
	);

	let capabilities = client.capabilities();
	assert!(!capabilities.ping);
	assert!(!capabilities.block_subscription);
	assert!(capabilities.contract_logs);
	assert!(client.subscribe_blocks().await.is_err());

	block.assert_async().await;
	balance.assert_async().await;
	token.assert_async().await;
}

#[tokio::test]
async fn test_evm_client_transfer_logs() {
	let mut server = Server::new_async().await;
	let logs = server
		.mock("POST", "/")
		.match_body(Matcher::AllOf(vec![
			Matcher::PartialJson(json!({ "method": "eth_getLogs" })),
			Matcher::Regex(r#""fromBlock":"0x65""#.to_string()),
			Matcher::Regex(r#""toBlock":"0x6e""#.to_string()),
		]))
		.with_body(
			json!({
				"jsonrpc": "2.0",
				"id": 1,
				"result": [
					{
						"address": "0x00000000000000000000000000000000000000cc",
						"topics": [
							TRANSFER_TOPIC,
							format!("0x{:0>64}", "aa"),
							format!("0x{:0>64}", "bb"),
							format!("0x{:064x}", 7)
						],
						"data": "0x",
						"blockNumber": "0x69",
						"transactionHash": format!("0x{}", "11".repeat(32)),
						"logIndex": "0x0"
					},
					{
						"address": "0x00000000000000000000000000000000000000cc",
						"topics": [TRANSFER_TOPIC],
						"data": "0x",
						"blockNumber": "0x6a",
						"transactionHash": format!("0x{}", "22".repeat(32)),
						"logIndex": "0x1",
						"removed": true
					}
				]
			})
			.to_string(),
		)
		.create_async()
		.await;

	let client = EvmClient::new_with_transport(NetworkId::Ethereum, transport(&server));
	let result = client
		.get_transfer_logs("0x00000000000000000000000000000000000000cc", 101, 110)
		.await
		.unwrap();

	logs.assert_async().await;
	assert_eq!(result.len(), 1);
	assert_eq!(result[0].block_number, Some(105));
	assert_eq!(result[0].topics.len(), 4);
}

#[tokio::test]
async fn test_rpc_errors_are_data_errors() {
	let mut server = Server::new_async().await;
	server
		.mock("POST", "/")
		.with_body(
			json!({
				"jsonrpc": "2.0",
				"id": 1,
				"error": { "code": -32602, "message": "invalid argument" }
			})
			.to_string(),
		)
		.create_async()
		.await;

	let client = EvmClient::new_with_transport(NetworkId::Polygon, transport(&server));
	let error = client.get_native_balance(OWNER).await.unwrap_err();
	assert!(matches!(error, BlockChainError::RequestError(_)));
	assert!(!error.is_transport());
}

#[tokio::test]
async fn test_server_failures_are_transport_errors() {
	let mut server = Server::new_async().await;
	server
		.mock("POST", "/")
		.with_status(503)
		.create_async()
		.await;

	let client = EvmClient::new_with_transport(NetworkId::Base, transport(&server));
	assert!(client.get_block_number().await.unwrap_err().is_transport());
}

#[tokio::test]
async fn test_solana_client_reads() {
	let mut server = Server::new_async().await;
	let slot = rpc_mock(&mut server, "getSlot", json!(250_000_000u64)).await;
	let balance = rpc_mock(
		&mut server,
		"getBalance",
		json!({ "context": { "slot": 1 }, "value": 1_500_000_000u64 }),
	)
	.await;
	let tokens = rpc_mock(
		&mut server,
		"getTokenAccountsByOwner",
		json!({
			"context": { "slot": 1 },
			"value": [
				{ "account": { "data": { "parsed": { "info": { "tokenAmount": { "amount": "1000000", "decimals": 6 } } } } } },
				{ "account": { "data": { "parsed": { "info": { "tokenAmount": { "amount": "250000", "decimals": 6 } } } } } }
			]
		}),
	)
	.await;

	let client = SolanaClient::new_with_transport(transport(&server));
	let owner = "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T";
	assert_eq!(client.network(), NetworkId::Solana);
	assert_eq!(client.get_block_number().await.unwrap(), 250_000_000);
	assert_eq!(client.get_native_balance(owner).await.unwrap().formatted(), "1.5");

	let usdc = TokenConfig {
		address: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
		decimals: 6,
	};
	assert_eq!(
		client.get_token_balance(owner, &usdc).await.unwrap().formatted(),
		"1.25"
	);
	assert!(!client.capabilities().contract_logs);
	assert!(client.get_transfer_logs("any", 1, 2).await.is_err());

	slot.assert_async().await;
	balance.assert_async().await;
	tokens.assert_async().await;
}
