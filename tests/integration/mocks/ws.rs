use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::{
	net::TcpListener,
	sync::{mpsc, oneshot},
};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Commands a test sends to the connected socket
pub enum ServerCommand {
	/// Pushes a `newHeads` notification with the given block number
	NewHead(u64),
	/// Closes the socket from the server side
	Close,
}

/// Starts a JSON-RPC WebSocket node answering `eth_blockNumber` with `0x10` and
/// `eth_subscribe` with subscription `0x1`
///
/// Returns the URL, a command channel and a shutdown trigger.
pub async fn start_test_websocket_server(
) -> (String, mpsc::Sender<ServerCommand>, oneshot::Sender<()>) {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let url = format!("ws://{}", listener.local_addr().unwrap());
	let (command_tx, mut command_rx) = mpsc::channel::<ServerCommand>(8);
	let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

	tokio::spawn(async move {
		let stream = tokio::select! {
			accepted = listener.accept() => match accepted {
				Ok((stream, _)) => stream,
				Err(_) => return,
			},
			_ = &mut shutdown_rx => return,
		};
		let Ok(socket) = accept_async(stream).await else {
			return;
		};
		let (mut write, mut read) = socket.split();

		loop {
			tokio::select! {
				frame = read.next() => {
					let Some(Ok(frame)) = frame else { break };
					match frame {
						Message::Text(text) => {
							let request: Value = serde_json::from_str(text.as_str()).unwrap();
							let result = match request["method"].as_str() {
								Some("eth_blockNumber") => json!("0x10"),
								Some("eth_subscribe") => json!("0x1"),
								_ => Value::Null,
							};
							let response = json!({ "jsonrpc": "2.0", "id": request["id"], "result": result });
							if write.send(Message::Text(response.to_string().into())).await.is_err() {
								break;
							}
						}
						Message::Ping(data) => {
							if write.send(Message::Pong(data)).await.is_err() {
								break;
							}
						}
						Message::Close(_) => break,
						_ => {}
					}
				}
				command = command_rx.recv() => match command {
					Some(ServerCommand::NewHead(number)) => {
						let notification = json!({
							"jsonrpc": "2.0",
							"method": "eth_subscription",
							"params": {
								"subscription": "0x1",
								"result": { "number": format!("0x{:x}", number), "timestamp": "0x64" }
							}
						});
						if write.send(Message::Text(notification.to_string().into())).await.is_err() {
							break;
						}
					}
					Some(ServerCommand::Close) | None => {
						let _ = write.send(Message::Close(None)).await;
						break;
					}
				},
				_ = &mut shutdown_rx => break,
			}
		}
	});

	(url, command_tx, shutdown_tx)
}
