//! Message channels carrying envelopes between the bridge and a driver.
//!
//! Two channels exist below the dispatch layer: an in-process [`pipe`] pair
//! (local mode and tests) and a [`WebSocketTransport`] client (remote mode).
//! Both surface the same shape: a cloneable [`TransportSink`] for outgoing
//! envelopes and an unbounded inbound queue. Framing below the message
//! boundary is the socket library's concern, not ours - one JSON text frame
//! is one [`Message`].
//!
//! A send attempted while the channel is not open is dropped and logged,
//! never queued or retried.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsFrame;

use crate::error::{Error, Result};
use tabwire_protocol::Message;


/// Outgoing half of a message channel.
///
/// Implementations are cheap to clone behind an `Arc` and safe to call from
/// any task; delivery order matches call order per sink.
pub trait TransportSink: Send + Sync {
	/// Sends one envelope to the peer, dropping it with a warning if the
	/// channel is not open.
	fn send(&self, message: Message);

	/// Whether the channel can currently deliver.
	fn is_open(&self) -> bool;

	/// Closes the channel. Subsequent sends are dropped; the peer observes
	/// end of inbound traffic.
	fn close(&self);
}

/// A message channel split into its two halves.
pub struct TransportParts {
	/// Outgoing envelope sink.
	pub sink: Arc<dyn TransportSink>,
	/// Incoming envelope queue; `None` from `recv` means the peer closed.
	pub inbound: mpsc::UnboundedReceiver<Message>,
}

/// One end of an in-process duplex message channel.
pub struct PipeTransport {
	sink: Arc<PipeSink>,
	inbound: mpsc::UnboundedReceiver<Message>,
}

impl PipeTransport {
	/// Splits this end into sink and inbound queue.
	pub fn into_parts(self) -> TransportParts {
		TransportParts {
			sink: self.sink,
			inbound: self.inbound,
		}
	}
}

/// Creates a connected pair of in-process channel ends.
///
/// Everything sent on one end arrives on the other, in order, with no
/// serialization step in between.
pub fn pipe() -> (PipeTransport, PipeTransport) {
	let (a_tx, a_rx) = mpsc::unbounded_channel();
	let (b_tx, b_rx) = mpsc::unbounded_channel();
	let a = PipeTransport {
		sink: Arc::new(PipeSink {
			tx: Mutex::new(Some(b_tx)),
		}),
		inbound: a_rx,
	};
	let b = PipeTransport {
		sink: Arc::new(PipeSink {
			tx: Mutex::new(Some(a_tx)),
		}),
		inbound: b_rx,
	};
	(a, b)
}

struct PipeSink {
	tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
}

impl TransportSink for PipeSink {
	fn send(&self, message: Message) {
		let guard = self.tx.lock();
		match guard.as_ref() {
			Some(tx) => {
				if tx.send(message).is_err() {
					tracing::warn!(target: "tabwire::transport", "dropping message: pipe peer closed");
				}
			}
			None => {
				tracing::warn!(target: "tabwire::transport", "dropping message: pipe closed locally");
			}
		}
	}

	fn is_open(&self) -> bool {
		self.tx.lock().as_ref().is_some_and(|tx| !tx.is_closed())
	}

	fn close(&self) {
		self.tx.lock().take();
	}
}

/// WebSocket message channel used by the remote transport adapter.
///
/// The bridge is the connecting side: it dials out to the driver's relay
/// endpoint, then exchanges one JSON envelope per text frame. Reader and
/// writer run as detached tasks; the sink hands frames to the writer.
pub struct WebSocketTransport;

impl WebSocketTransport {
	/// Dials `url` and returns the channel halves once the socket is up.
	pub async fn connect(url: &str) -> Result<TransportParts> {
		let (stream, _) = tokio_tungstenite::connect_async(url)
			.await
			.map_err(|err| Error::Transport(err.to_string()))?;
		tracing::debug!(target: "tabwire::transport", url, "websocket connected");
		Ok(Self::from_stream(stream))
	}

	/// Completes the server-side handshake on an accepted TCP connection.
	pub async fn accept(stream: tokio::net::TcpStream) -> Result<TransportParts> {
		let stream = tokio_tungstenite::accept_async(stream)
			.await
			.map_err(|err| Error::Transport(err.to_string()))?;
		tracing::debug!(target: "tabwire::transport", "websocket accepted");
		Ok(Self::from_stream(stream))
	}

	/// Wraps an established WebSocket stream (either side of the socket).
	pub fn from_stream<S>(stream: WebSocketStream<S>) -> TransportParts
	where
		S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
	{
		let (mut ws_writer, mut ws_reader) = stream.split();
		let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
		let (in_tx, in_rx) = mpsc::unbounded_channel::<Message>();
		let open = Arc::new(AtomicBool::new(true));

		let writer_open = Arc::clone(&open);
		tokio::spawn(async move {
			while let Some(message) = out_rx.recv().await {
				let text = match serde_json::to_string(&message) {
					Ok(text) => text,
					Err(err) => {
						tracing::warn!(target: "tabwire::transport", %err, "dropping unserializable message");
						continue;
					}
				};
				if ws_writer.send(WsFrame::Text(text)).await.is_err() {
					writer_open.store(false, Ordering::SeqCst);
					break;
				}
			}
			let _ = ws_writer.close().await;
		});

		let reader_open = Arc::clone(&open);
		tokio::spawn(async move {
			while let Some(frame) = ws_reader.next().await {
				match frame {
					Ok(WsFrame::Text(text)) => match serde_json::from_str::<Message>(&text) {
						Ok(message) => {
							if in_tx.send(message).is_err() {
								break;
							}
						}
						Err(err) => {
							tracing::warn!(target: "tabwire::transport", %err, "skipping undecodable frame");
						}
					},
					Ok(WsFrame::Close(_)) => break,
					Ok(_) => {}
					Err(err) => {
						tracing::debug!(target: "tabwire::transport", %err, "websocket read failed");
						break;
					}
				}
			}
			reader_open.store(false, Ordering::SeqCst);
			tracing::debug!(target: "tabwire::transport", "websocket inbound ended");
		});

		TransportParts {
			sink: Arc::new(WsSink {
				tx: Mutex::new(Some(out_tx)),
				open,
			}),
			inbound: in_rx,
		}
	}
}

struct WsSink {
	tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
	open: Arc<AtomicBool>,
}

impl TransportSink for WsSink {
	fn send(&self, message: Message) {
		if !self.open.load(Ordering::SeqCst) {
			tracing::warn!(target: "tabwire::transport", "dropping message: websocket not open");
			return;
		}
		let guard = self.tx.lock();
		match guard.as_ref() {
			Some(tx) => {
				if tx.send(message).is_err() {
					tracing::warn!(target: "tabwire::transport", "dropping message: websocket writer gone");
				}
			}
			None => {
				tracing::warn!(target: "tabwire::transport", "dropping message: websocket closed locally");
			}
		}
	}

	fn is_open(&self) -> bool {
		self.open.load(Ordering::SeqCst) && self.tx.lock().is_some()
	}

	fn close(&self) {
		self.open.store(false, Ordering::SeqCst);
		self.tx.lock().take();
	}
}
