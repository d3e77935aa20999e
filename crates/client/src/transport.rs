//! Transport seam: one physical connection to the server.
//!
//! A transport is split into a sender half and a receiver half so the
//! connection layer can pump inbound messages independently of outbound
//! calls. The session manager never reuses a transport after deciding it is
//! unusable; it asks its [`TransportFactory`] for a fresh one instead.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Outbound half of a transport.
pub trait Transport: Send {
	fn send(&mut self, message: JsonValue) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Inbound half of a transport; `run` pumps messages until the peer closes.
pub trait TransportReceiver: Send {
	fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// Everything needed to build a connection on top of one physical link.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<JsonValue>,
}

/// Mints fresh physical connections. The session manager calls this on every
/// connect and reconnect; tests substitute an in-memory implementation.
pub trait TransportFactory: Send + Sync {
	fn connect(&self) -> Pin<Box<dyn Future<Output = Result<TransportParts>> + Send + '_>>;
}

/// Newline-delimited JSON over TCP.
pub struct TcpTransport;

impl TcpTransport {
	/// Opens a socket to `host:port` and splits it into transport parts.
	pub async fn connect(host: &str, port: u16) -> Result<TransportParts> {
		let stream = TcpStream::connect((host, port))
			.await
			.map_err(|e| Error::Transport(format!("connect {host}:{port}: {e}")))?;
		let (read_half, write_half) = stream.into_split();
		let (message_tx, message_rx) = mpsc::unbounded_channel();

		Ok(TransportParts {
			sender: Box::new(TcpSender { write_half }),
			receiver: Box::new(TcpReceiver {
				read_half: BufReader::new(read_half),
				message_tx,
			}),
			message_rx,
		})
	}
}

struct TcpSender {
	write_half: OwnedWriteHalf,
}

impl Transport for TcpSender {
	fn send(&mut self, message: JsonValue) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			let mut line = serde_json::to_vec(&message)?;
			line.push(b'\n');
			self.write_half
				.write_all(&line)
				.await
				.map_err(|e| Error::Transport(format!("send: {e}")))?;
			self.write_half
				.flush()
				.await
				.map_err(|e| Error::Transport(format!("flush: {e}")))?;
			Ok(())
		})
	}
}

struct TcpReceiver {
	read_half: BufReader<OwnedReadHalf>,
	message_tx: mpsc::UnboundedSender<JsonValue>,
}

impl TransportReceiver for TcpReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			let mut line = String::new();
			loop {
				line.clear();
				let read = self
					.read_half
					.read_line(&mut line)
					.await
					.map_err(|e| Error::Transport(format!("recv: {e}")))?;
				if read == 0 {
					tracing::debug!(target = "mira.rpc", "transport closed by peer");
					return Ok(());
				}
				let trimmed = line.trim();
				if trimmed.is_empty() {
					continue;
				}
				match serde_json::from_str::<JsonValue>(trimmed) {
					Ok(message) => {
						if self.message_tx.send(message).is_err() {
							// Connection dropped its receiver; nothing left to pump.
							return Ok(());
						}
					}
					Err(e) => {
						tracing::warn!(target = "mira.rpc", error = %e, "discarding unparseable frame");
					}
				}
			}
		})
	}
}

/// Factory producing TCP transports to a fixed host/port.
pub struct TcpFactory {
	host: String,
	port: u16,
}

impl TcpFactory {
	pub fn new(host: impl Into<String>, port: u16) -> Self {
		Self { host: host.into(), port }
	}
}

impl TransportFactory for TcpFactory {
	fn connect(&self) -> Pin<Box<dyn Future<Output = Result<TransportParts>> + Send + '_>> {
		Box::pin(async move { TcpTransport::connect(&self.host, self.port).await })
	}
}
