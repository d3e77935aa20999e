//! Request/response correlation on top of one transport.
//!
//! Handles:
//! - Generating unique request IDs
//! - Correlating responses with pending requests
//! - Distinguishing server-pushed events from responses
//! - Converting classified error payloads into [`Error`] values
//!
//! A connection is bound to exactly one physical transport. When the session
//! manager replaces the transport it builds a new connection; pending calls
//! on the old one fail with [`Error::ChannelClosed`], which classifies as
//! transient and feeds the retry tiers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use mira_protocol::{Message, Request};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Mutex, Notify, mpsc, oneshot};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// One correlation layer over one physical link.
pub struct Connection {
	last_id: AtomicU32,
	callbacks: Arc<Mutex<HashMap<u32, oneshot::Sender<Result<Value>>>>>,
	sender: Mutex<Box<dyn Transport>>,
	receiver: Mutex<Option<Box<dyn TransportReceiver>>>,
	message_rx: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
	closed: AtomicBool,
	shutdown: Notify,
}

impl Connection {
	pub fn new(parts: TransportParts) -> Self {
		Self {
			last_id: AtomicU32::new(0),
			callbacks: Arc::new(Mutex::new(HashMap::new())),
			sender: Mutex::new(parts.sender),
			receiver: Mutex::new(Some(parts.receiver)),
			message_rx: Mutex::new(Some(parts.message_rx)),
			closed: AtomicBool::new(false),
			shutdown: Notify::new(),
		}
	}

	/// Marks the connection unusable and stops its message loop and receiver
	/// task. Calls in flight fail with [`Error::ChannelClosed`]; new calls
	/// fail the same way without touching the transport. The session manager
	/// invokes this whenever it replaces or abandons a connection.
	pub fn shutdown(&self) {
		self.closed.store(true, Ordering::SeqCst);
		self.shutdown.notify_one();
	}

	/// Sends one call and awaits its correlated response.
	///
	/// Server-reported failures come back as their classified [`Error`]
	/// variant; a vanished message loop comes back as [`Error::ChannelClosed`].
	pub async fn call(
		&self,
		session: Option<&str>,
		service: &str,
		method: &str,
		params: Value,
	) -> Result<Value> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(Error::ChannelClosed);
		}
		let id = self.last_id.fetch_add(1, Ordering::SeqCst);
		let (tx, rx) = oneshot::channel();
		self.callbacks.lock().await.insert(id, tx);

		let request = Request {
			id,
			session: session.map(str::to_string),
			service: service.to_string(),
			method: method.to_string(),
			params,
		};

		tracing::trace!(target = "mira.rpc", id, service, method, "sending call");
		let request_value = serde_json::to_value(&request)?;
		if let Err(e) = self.sender.lock().await.send(request_value).await {
			self.callbacks.lock().await.remove(&id);
			return Err(e);
		}

		rx.await.map_err(|_| Error::ChannelClosed).and_then(|result| result)
	}

	/// [`Connection::call`] with the result deserialized into `T`.
	pub async fn call_as<T: DeserializeOwned>(
		&self,
		session: Option<&str>,
		service: &str,
		method: &str,
		params: Value,
	) -> Result<T> {
		let value = self.call(session, service, method, params).await?;
		serde_json::from_value(value)
			.map_err(|e| Error::UnexpectedResponse(format!("{service}.{method}: {e}")))
	}

	/// Runs the message dispatch loop until the transport closes, then fails
	/// every still-pending call. Spawn this once per connection.
	pub async fn run(&self) {
		let (receiver, mut message_rx) = {
			let receiver = self.receiver.lock().await.take();
			let message_rx = self.message_rx.lock().await.take();
			match (receiver, message_rx) {
				(Some(receiver), Some(message_rx)) => (receiver, message_rx),
				_ => {
					tracing::warn!(target = "mira.rpc", "run() called twice on one connection");
					return;
				}
			}
		};
		let receiver_task = tokio::spawn(async move {
			if let Err(e) = receiver.run().await {
				tracing::debug!(target = "mira.rpc", error = %e, "transport receiver ended");
			}
		});

		loop {
			tokio::select! {
				_ = self.shutdown.notified() => {
					tracing::debug!(target = "mira.rpc", "connection shut down");
					break;
				}
				message = message_rx.recv() => match message {
					Some(message_value) => match serde_json::from_value::<Message>(message_value.clone()) {
						Ok(message) => self.dispatch(message).await,
						Err(e) => {
							tracing::warn!(target = "mira.rpc", error = %e, %message_value, "unparseable message");
						}
					},
					None => break,
				},
			}
		}

		self.closed.store(true, Ordering::SeqCst);
		tracing::debug!(target = "mira.rpc", "message loop ended");
		receiver_task.abort();
		let _ = receiver_task.await;

		// Anything still waiting will never get a response on this link.
		let mut callbacks = self.callbacks.lock().await;
		for (_, tx) in callbacks.drain() {
			let _ = tx.send(Err(Error::ChannelClosed));
		}
	}

	async fn dispatch(&self, message: Message) {
		match message {
			Message::Response(response) => {
				let Some(callback) = self.callbacks.lock().await.remove(&response.id) else {
					tracing::warn!(target = "mira.rpc", id = response.id, "response for unknown request");
					return;
				};
				let result = match response.error {
					Some(payload) => Err(Error::from(payload)),
					None => Ok(response.result.unwrap_or(Value::Null)),
				};
				// Ignore send failure: the caller gave up waiting.
				let _ = callback.send(result);
			}
			Message::Event(event) => {
				tracing::debug!(
					target = "mira.rpc",
					session = event.session.as_deref().unwrap_or(""),
					method = %event.method,
					"server event"
				);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fake::FakeServer;
	use mira_protocol::ServiceName;
	use std::sync::Arc;

	async fn spawned_connection(server: &FakeServer) -> Arc<Connection> {
		let parts = server.open().await.unwrap();
		let connection = Arc::new(Connection::new(parts));
		let conn = Arc::clone(&connection);
		tokio::spawn(async move { conn.run().await });
		connection
	}

	#[tokio::test]
	async fn request_ids_increment_per_connection() {
		let server = FakeServer::new();
		let connection = spawned_connection(&server).await;

		connection
			.call(None, ServiceName::Session.wire_name(), "noop", serde_json::json!({}))
			.await
			.unwrap();
		connection
			.call(None, ServiceName::Session.wire_name(), "noop", serde_json::json!({}))
			.await
			.unwrap();

		let sent = server.take_sent();
		assert_eq!(sent.len(), 2);
		assert_eq!(sent[0]["id"], 0);
		assert_eq!(sent[1]["id"], 1);
	}

	#[tokio::test]
	async fn error_payload_surfaces_classified() {
		let server = FakeServer::new();
		server.fail_next(
			"getValue",
			mira_protocol::ErrorCategory::ResourceLimit,
			"payload too large",
			1,
		);
		let connection = spawned_connection(&server).await;

		let err = connection
			.call(None, ServiceName::Config.wire_name(), "getValue", serde_json::json!({}))
			.await
			.unwrap_err();
		assert!(matches!(err, Error::ResourceLimit(_)));
	}

	#[tokio::test]
	async fn shutdown_fails_pending_and_subsequent_calls() {
		let server = FakeServer::new();
		server.swallow_next("noop", 1);
		let connection = spawned_connection(&server).await;

		let call = connection.call(None, ServiceName::Session.wire_name(), "noop", serde_json::json!({}));
		let shutdown = async {
			tokio::time::sleep(std::time::Duration::from_millis(20)).await;
			connection.shutdown();
		};
		let (result, ()) = tokio::join!(call, shutdown);
		assert!(matches!(result.unwrap_err(), Error::ChannelClosed));

		// A shut-down connection refuses new calls without touching the wire.
		server.take_sent();
		let err = connection
			.call(None, ServiceName::Session.wire_name(), "noop", serde_json::json!({}))
			.await
			.unwrap_err();
		assert!(matches!(err, Error::ChannelClosed));
		assert!(server.take_sent().is_empty());
	}

	#[tokio::test]
	async fn pending_calls_fail_when_link_drops() {
		let server = FakeServer::new();
		server.swallow_next("getValue", 1);
		let connection = spawned_connection(&server).await;

		let call = connection.call(None, ServiceName::Config.wire_name(), "getValue", serde_json::json!({}));
		let drop_link = async {
			tokio::time::sleep(std::time::Duration::from_millis(20)).await;
			server.drop_link();
		};
		let (result, ()) = tokio::join!(call, drop_link);
		assert!(matches!(result.unwrap_err(), Error::ChannelClosed));
	}
}
