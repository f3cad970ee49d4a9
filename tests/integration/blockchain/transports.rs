use crate::integration::mocks::{start_test_websocket_server, ServerCommand};
use chain_sentinel::{
	models::NetworkId,
	services::blockchain::{
		BlockchainTransport, ChainClient, EvmClient, HttpTransportClient, WsConfig,
		WsTransportClient,
	},
	utils::HttpRetryConfig,
};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_ws_transport_request_and_ping() {
	let (url, _commands, shutdown) = start_test_websocket_server().await;

	let transport = WsTransportClient::new(&url, WsConfig::single_attempt())
		.await
		.unwrap();
	assert!(transport.supports_ping());
	assert!(transport.supports_subscriptions());
	assert_eq!(transport.get_current_url(), url);

	let response = transport
		.send_raw_request("eth_blockNumber", Some(json!([])))
		.await
		.unwrap();
	assert_eq!(response["result"], "0x10");

	let latency = transport.ping().await.unwrap();
	assert!(latency < Duration::from_secs(1));

	let _ = shutdown.send(());
}

#[tokio::test]
async fn test_ws_client_block_subscription_ends_with_socket() {
	let (url, commands, _shutdown) = start_test_websocket_server().await;
	let transport = WsTransportClient::new(&url, WsConfig::single_attempt())
		.await
		.unwrap();
	let client = EvmClient::new_with_transport(NetworkId::Ethereum, transport);

	assert_eq!(client.get_block_number().await.unwrap(), 16);
	let capabilities = client.capabilities();
	assert!(capabilities.ping && capabilities.block_subscription && capabilities.contract_logs);

	let mut blocks = client.subscribe_blocks().await.unwrap();
	commands.send(ServerCommand::NewHead(0x11)).await.unwrap();
	let header = tokio::time::timeout(Duration::from_secs(2), blocks.recv())
		.await
		.unwrap()
		.unwrap();
	assert_eq!(header.number, 0x11);
	assert_eq!(header.timestamp, Some(100));

	commands.send(ServerCommand::Close).await.unwrap();
	let end = tokio::time::timeout(Duration::from_secs(2), blocks.recv())
		.await
		.unwrap();
	assert!(end.is_none());

	let error = client.get_block_number().await.unwrap_err();
	assert!(error.is_transport());
}

#[tokio::test]
async fn test_ws_connect_failure_is_transport_error() {
	let error = WsTransportClient::new("ws://127.0.0.1:1", WsConfig::single_attempt())
		.await
		.err()
		.unwrap();
	assert!(error.is_transport());

	let error = WsTransportClient::new("http://127.0.0.1:1", WsConfig::single_attempt())
		.await
		.err()
		.unwrap();
	assert!(error.to_string().contains("Unsupported scheme"));
}

#[tokio::test]
async fn test_ws_close_rejects_later_requests() {
	let (url, _commands, _shutdown) = start_test_websocket_server().await;
	let transport = WsTransportClient::new(&url, WsConfig::single_attempt())
		.await
		.unwrap();
	assert!(transport.is_connected().await);

	transport.close().await;
	assert!(!transport.is_connected().await);
	let error = transport
		.send_raw_request("eth_blockNumber", Some(json!([])))
		.await
		.unwrap_err();
	assert!(error.is_transport());
}

#[tokio::test]
async fn test_http_transport_has_no_ping_or_subscriptions() {
	let transport = HttpTransportClient::new(
		"http://127.0.0.1:8545",
		&HttpRetryConfig::default(),
		Duration::from_secs(1),
	)
	.unwrap();
	assert!(!transport.supports_ping());
	assert!(!transport.supports_subscriptions());
	assert!(transport.ping().await.is_err());
}
