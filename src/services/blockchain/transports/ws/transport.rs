//! Websocket transport implementation for blockchain interactions.
//!
//! Requests are correlated by id, so any number of callers may share the socket. The
//! reader task answers server pings, completes our own pings (used as the native
//! liveness probe) and forwards subscription notifications.

use async_trait::async_trait;
use futures_util::{
	stream::{SplitSink, SplitStream},
	SinkExt, StreamExt,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::{
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
	time::{Duration, Instant},
};
use tokio::{
	net::TcpStream,
	sync::{mpsc, oneshot, Mutex},
	task::JoinHandle,
	time::timeout,
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::services::blockchain::{
	transports::{
		extract_result,
		ws::{
			config::WsConfig,
			connection::{PendingRequest, WebSocketConnection},
		},
		BlockchainTransport,
	},
	BlockChainError,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// JSON-RPC over WebSocket for a single endpoint
pub struct WsTransportClient {
	url: String,
	config: WsConfig,
	sink: Arc<Mutex<WsSink>>,
	connection: Arc<Mutex<WebSocketConnection>>,
	request_id_counter: AtomicU64,
	reader: JoinHandle<()>,
}

impl WsTransportClient {
	/// Opens the socket and starts the reader task
	///
	/// # Arguments
	/// * `url` - `ws://` or `wss://` endpoint URL
	/// * `config` - Handshake and message timeouts
	pub async fn new(url: &str, config: WsConfig) -> Result<Self, BlockChainError> {
		if !(url.starts_with("ws://") || url.starts_with("wss://")) {
			return Err(BlockChainError::connection_error(format!(
				"Unsupported scheme for WebSocket transport: {}",
				url
			)));
		}

		let (stream, _) = timeout(config.connection_timeout, connect_async(url))
			.await
			.map_err(|_| BlockChainError::timeout(format!("WebSocket handshake with {}", url)))??;

		let (sink, stream) = stream.split();
		let sink = Arc::new(Mutex::new(sink));
		let connection = Arc::new(Mutex::new(WebSocketConnection::default()));

		let reader = tokio::spawn(read_loop(
			url.to_string(),
			stream,
			connection.clone(),
			sink.clone(),
		));

		tracing::debug!(url, "WebSocket connected");

		Ok(Self {
			url: url.to_string(),
			config,
			sink,
			connection,
			request_id_counter: AtomicU64::new(1),
			reader,
		})
	}

	/// Whether the reader still considers the socket usable
	pub async fn is_connected(&self) -> bool {
		self.connection.lock().await.is_healthy
	}

	async fn send_message(&self, message: Message) -> Result<(), BlockChainError> {
		let mut sink = self.sink.lock().await;
		sink.send(message).await.map_err(BlockChainError::from)
	}

	async fn request(
		&self,
		method: &str,
		params: Value,
		subscription: Option<mpsc::Sender<Value>>,
	) -> Result<Value, BlockChainError> {
		let id = self.request_id_counter.fetch_add(1, Ordering::Relaxed);
		let body = self.customize_request(id, method, Some(params));
		let (response_tx, response_rx) = oneshot::channel();

		{
			let mut connection = self.connection.lock().await;
			if !connection.is_healthy {
				return Err(BlockChainError::connection_error(format!(
					"WebSocket {} is closed",
					self.url
				)));
			}
			connection.pending.insert(
				id,
				PendingRequest {
					response: response_tx,
					subscription,
				},
			);
			connection.update_activity();
		}

		if let Err(e) = self.send_message(Message::Text(body.to_string().into())).await {
			self.connection.lock().await.pending.remove(&id);
			return Err(e);
		}

		match timeout(self.config.message_timeout, response_rx).await {
			Ok(Ok(response)) => Ok(response),
			Ok(Err(_)) => Err(BlockChainError::connection_error(format!(
				"WebSocket {} closed before answering {}",
				self.url, method
			))),
			Err(_) => {
				self.connection.lock().await.pending.remove(&id);
				Err(BlockChainError::timeout(format!(
					"{} on {} after {:?}",
					method, self.url, self.config.message_timeout
				)))
			}
		}
	}
}

impl Drop for WsTransportClient {
	fn drop(&mut self) {
		self.reader.abort();
	}
}

#[async_trait]
impl BlockchainTransport for WsTransportClient {
	fn get_current_url(&self) -> &str {
		&self.url
	}

	async fn send_raw_request<P>(
		&self,
		method: &str,
		params: Option<P>,
	) -> Result<Value, BlockChainError>
	where
		P: Into<Value> + Send + Clone + Serialize,
	{
		let params = params.map(Into::into).unwrap_or_else(|| json!([]));
		self.request(method, params, None).await
	}

	fn supports_ping(&self) -> bool {
		true
	}

	fn supports_subscriptions(&self) -> bool {
		true
	}

	async fn ping(&self) -> Result<Duration, BlockChainError> {
		let payload = self
			.request_id_counter
			.fetch_add(1, Ordering::Relaxed)
			.to_be_bytes()
			.to_vec();
		let (pong_tx, pong_rx) = oneshot::channel();

		{
			let mut connection = self.connection.lock().await;
			if !connection.is_healthy {
				return Err(BlockChainError::connection_error(format!(
					"WebSocket {} is closed",
					self.url
				)));
			}
			connection.pings.insert(payload.clone(), pong_tx);
		}

		let started = Instant::now();
		if let Err(e) = self.send_message(Message::Ping(payload.clone().into())).await {
			self.connection.lock().await.pings.remove(&payload);
			return Err(e);
		}

		match timeout(self.config.message_timeout, pong_rx).await {
			Ok(Ok(())) => Ok(started.elapsed()),
			Ok(Err(_)) => Err(BlockChainError::connection_error(format!(
				"WebSocket {} closed before pong",
				self.url
			))),
			Err(_) => {
				self.connection.lock().await.pings.remove(&payload);
				Err(BlockChainError::timeout(format!("Ping to {}", self.url)))
			}
		}
	}

	async fn subscribe(
		&self,
		method: &str,
		params: Value,
	) -> Result<mpsc::Receiver<Value>, BlockChainError> {
		let (sink, stream) = mpsc::channel(self.config.subscription_buffer);
		let response = self.request(method, params, Some(sink)).await?;
		let subscription_id = extract_result(response)?;
		tracing::debug!(url = %self.url, method, subscription = %subscription_id, "Subscribed");
		Ok(stream)
	}

	async fn close(&self) {
		if let Err(e) = self.send_message(Message::Close(None)).await {
			tracing::debug!(url = %self.url, error = %e, "Close frame not delivered");
		}
		self.connection.lock().await.shutdown();
		self.reader.abort();
	}
}

async fn read_loop(
	url: String,
	mut stream: SplitStream<WsStream>,
	connection: Arc<Mutex<WebSocketConnection>>,
	sink: Arc<Mutex<WsSink>>,
) {
	while let Some(frame) = stream.next().await {
		match frame {
			Ok(Message::Text(text)) => {
				let message: Value = match serde_json::from_str(text.as_str()) {
					Ok(message) => message,
					Err(e) => {
						tracing::warn!(url = %url, error = %e, "Ignoring non-JSON frame");
						continue;
					}
				};
				let routed = connection.lock().await.dispatch(message);
				if let Some((subscriber, payload)) = routed {
					if subscriber.send(payload).await.is_err() {
						tracing::debug!(url = %url, "Subscription receiver dropped");
					}
				}
			}
			Ok(Message::Ping(data)) => {
				connection.lock().await.update_activity();
				if let Err(e) = sink.lock().await.send(Message::Pong(data)).await {
					tracing::warn!(url = %url, error = %e, "Failed to answer ping");
					break;
				}
			}
			Ok(Message::Pong(data)) => connection.lock().await.complete_ping(&data),
			Ok(Message::Close(frame)) => {
				tracing::debug!(url = %url, ?frame, "WebSocket closed by peer");
				break;
			}
			Ok(_) => {}
			Err(e) => {
				tracing::warn!(url = %url, error = %e, "WebSocket read failed");
				break;
			}
		}
	}

	connection.lock().await.shutdown();
}
