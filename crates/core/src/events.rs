//! Event fan-out for session and client observers.
//!
//! [`EventBus`] combines a broadcast channel with predicate-based waiters:
//! subscribers get a lag-tolerant [`EventStream`], while `wait_for` callers
//! get an [`EventWaiter`] that resolves on the first matching event. Waiters
//! are checked before the broadcast send, so a `wait_for` never loses its
//! event to a lagging receiver.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};

use tabwire_runtime::{Error, Result};

struct WaiterEntry<E> {
	predicate: Box<dyn Fn(&E) -> bool + Send + Sync>,
	complete_tx: oneshot::Sender<E>,
}

/// Broadcast fan-out plus one-shot predicate waiters.
pub struct EventBus<E: Clone + Send + 'static> {
	tx: broadcast::Sender<E>,
	waiters: Mutex<Vec<WaiterEntry<E>>>,
}

impl<E: Clone + Send + 'static> EventBus<E> {
	pub fn new(capacity: usize) -> Self {
		let (tx, _) = broadcast::channel(capacity);
		Self {
			tx,
			waiters: Mutex::new(Vec::new()),
		}
	}

	/// Delivers `event` to every matching waiter, then to every subscriber.
	pub fn emit(&self, event: E) {
		{
			let mut waiters = self.waiters.lock();
			let mut i = 0;
			while i < waiters.len() {
				if (waiters[i].predicate)(&event) {
					let entry = waiters.swap_remove(i);
					let _ = entry.complete_tx.send(event.clone());
				} else {
					i += 1;
				}
			}
		}
		let _ = self.tx.send(event);
	}

	/// Subscribes to all future events.
	pub fn subscribe(&self) -> EventStream<E> {
		EventStream { rx: self.tx.subscribe() }
	}

	/// Waits for the first event matching `predicate`, up to `timeout`.
	pub fn wait_for<F>(&self, predicate: F, timeout: Duration) -> EventWaiter<E>
	where
		F: Fn(&E) -> bool + Send + Sync + 'static,
	{
		let (complete_tx, complete_rx) = oneshot::channel();
		self.waiters.lock().push(WaiterEntry {
			predicate: Box::new(predicate),
			complete_tx,
		});
		EventWaiter {
			rx: complete_rx,
			timeout,
		}
	}

	#[cfg(test)]
	fn waiter_count(&self) -> usize {
		self.waiters.lock().len()
	}
}

/// Subscriber stream that logs and skips broadcast lag instead of erroring.
pub struct EventStream<E: Clone + Send + 'static> {
	rx: broadcast::Receiver<E>,
}

impl<E: Clone + Send + 'static> EventStream<E> {
	/// Next event, or `None` once the bus is gone.
	pub async fn recv(&mut self) -> Option<E> {
		loop {
			match self.rx.recv().await {
				Ok(event) => return Some(event),
				Err(broadcast::error::RecvError::Lagged(n)) => {
					tracing::warn!(target: "tabwire::session", dropped = n, "event stream lagged");
				}
				Err(broadcast::error::RecvError::Closed) => return None,
			}
		}
	}

	/// Next event if one is immediately available.
	pub fn try_recv(&mut self) -> Option<E> {
		loop {
			match self.rx.try_recv() {
				Ok(event) => return Some(event),
				Err(broadcast::error::TryRecvError::Lagged(n)) => {
					tracing::warn!(target: "tabwire::session", dropped = n, "event stream lagged");
				}
				Err(
					broadcast::error::TryRecvError::Empty
					| broadcast::error::TryRecvError::Closed,
				) => return None,
			}
		}
	}
}

/// One-shot waiter returned by [`EventBus::wait_for`].
///
/// Await it directly for no deadline, or call [`wait`](Self::wait) to apply
/// the configured timeout.
pub struct EventWaiter<E> {
	rx: oneshot::Receiver<E>,
	timeout: Duration,
}

impl<E: Send + 'static> EventWaiter<E> {
	/// Resolves with the matching event, or [`Error::Timeout`].
	pub async fn wait(self) -> Result<E> {
		let timeout = self.timeout;
		tokio::time::timeout(timeout, self.rx)
			.await
			.map_err(|_| Error::Timeout("waiting for event".to_string()))?
			.map_err(|_| Error::ChannelClosed)
	}
}

impl<E: Send + 'static> Future for EventWaiter<E> {
	type Output = Result<E>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(Ok(event)) => Poll::Ready(Ok(event)),
			Poll::Ready(Err(_)) => Poll::Ready(Err(Error::ChannelClosed)),
			Poll::Pending => Poll::Pending,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Clone, Debug, PartialEq)]
	struct Ping(u32);

	#[tokio::test]
	async fn broadcast_reaches_every_subscriber() {
		let bus: EventBus<Ping> = EventBus::new(16);
		let mut a = bus.subscribe();
		let mut b = bus.subscribe();

		bus.emit(Ping(7));

		assert_eq!(a.recv().await, Some(Ping(7)));
		assert_eq!(b.recv().await, Some(Ping(7)));
	}

	#[tokio::test]
	async fn waiter_resolves_on_first_match_only() {
		let bus: EventBus<Ping> = EventBus::new(16);
		let waiter = bus.wait_for(|ping| ping.0 == 2, Duration::from_secs(1));

		bus.emit(Ping(1));
		bus.emit(Ping(2));
		bus.emit(Ping(2));

		assert_eq!(waiter.wait().await.unwrap(), Ping(2));
		assert_eq!(bus.waiter_count(), 0);
	}

	#[tokio::test]
	async fn waiter_times_out_without_match() {
		let bus: EventBus<Ping> = EventBus::new(16);
		let waiter = bus.wait_for(|_| false, Duration::from_millis(10));

		bus.emit(Ping(1));

		assert!(waiter.wait().await.unwrap_err().is_timeout());
	}

	#[tokio::test]
	async fn stream_ends_when_bus_is_dropped() {
		let bus: EventBus<Ping> = EventBus::new(16);
		let mut stream = bus.subscribe();
		bus.emit(Ping(3));
		drop(bus);

		assert_eq!(stream.recv().await, Some(Ping(3)));
		assert_eq!(stream.recv().await, None);
	}
}
