//! Client half of the bridge: proxy registry and call correlation.
//!
//! [`ClientConnection`] is the mirror image of the server's dispatcher
//! connection. It assigns monotonically increasing call ids, pairs each
//! outgoing [`Call`] with a oneshot for its [`Return`], and maintains the
//! guid-addressed proxy registry that `__create__` / `__dispose__`
//! envelopes manipulate. Incoming envelope handling is synchronous, which
//! preserves peer ordering: a `__create__` is always applied before any
//! envelope that references the new guid.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tabwire_protocol::envelope::{Call, CreateParams, Event, Message, Return};
use tokio::sync::{Notify, oneshot};

use crate::dispatch::OutboundHandler;
use crate::error::{Error, Result};

pub mod proxy;

pub use proxy::{GenericProxy, Proxy, ProxyBase};

type CallbackMap = Arc<Mutex<HashMap<u32, oneshot::Sender<Result<Value>>>>>;

/// Builds concrete proxies for `__create__` announcements.
///
/// The factory is synchronous so that creates can be applied inline, in
/// arrival order, before any later envelope is looked at.
pub trait ProxyFactory: Send + Sync {
	fn create_proxy(
		&self,
		connection: &Arc<ClientConnection>,
		parent: &Arc<dyn Proxy>,
		kind: &str,
		guid: Arc<str>,
		initializer: Value,
	) -> Result<Arc<dyn Proxy>>;
}

/// Client-side connection: call correlation plus the proxy registry.
pub struct ClientConnection {
	objects: DashMap<Arc<str>, Arc<dyn Proxy>>,
	waiters: DashMap<Arc<str>, Arc<Notify>>,
	callbacks: CallbackMap,
	last_id: AtomicU32,
	factory: Box<dyn ProxyFactory>,
	on_message: Mutex<Option<OutboundHandler>>,
	root: Arc<dyn Proxy>,
	closed: Mutex<Option<String>>,
	creates_seen: AtomicU32,
	state_notify: Notify,
}

impl ClientConnection {
	pub fn new(factory: Box<dyn ProxyFactory>) -> Arc<Self> {
		Arc::new_cyclic(|weak: &Weak<Self>| Self {
			objects: DashMap::new(),
			waiters: DashMap::new(),
			callbacks: Arc::new(Mutex::new(HashMap::new())),
			last_id: AtomicU32::new(0),
			factory,
			on_message: Mutex::new(None),
			root: GenericProxy::root(weak.clone()),
			closed: Mutex::new(None),
			creates_seen: AtomicU32::new(0),
			state_notify: Notify::new(),
		})
	}

	/// Installs the handler receiving envelopes bound for the peer.
	pub fn set_on_message(&self, handler: OutboundHandler) {
		*self.on_message.lock() = Some(handler);
	}

	/// The designated root sentinel resolved for the empty guid.
	pub fn root(&self) -> Arc<dyn Proxy> {
		Arc::clone(&self.root)
	}

	/// Resolves a guid against the registry; the empty guid names the root.
	pub fn resolve(&self, guid: &str) -> Result<Arc<dyn Proxy>> {
		if guid.is_empty() {
			return Ok(self.root());
		}
		self.objects
			.get(guid)
			.map(|entry| Arc::clone(entry.value()))
			.ok_or_else(|| Error::ObjectNotFound { guid: guid.to_string() })
	}

	/// Number of `__create__` envelopes applied so far.
	pub fn creates_observed(&self) -> u32 {
		self.creates_seen.load(Ordering::SeqCst)
	}

	pub fn is_closed(&self) -> bool {
		self.closed.lock().is_some()
	}

	pub fn closed_reason(&self) -> Option<String> {
		self.closed.lock().clone()
	}

	/// Tears down the connection: rejects every pending call with the given
	/// reason and drops the proxy registry. Idempotent.
	pub fn close(&self, reason: &str) {
		{
			let mut closed = self.closed.lock();
			if closed.is_some() {
				return;
			}
			*closed = Some(reason.to_string());
		}
		*self.on_message.lock() = None;
		let pending: Vec<_> = {
			let mut callbacks = self.callbacks.lock();
			callbacks.drain().collect()
		};
		for (_, tx) in pending {
			let _ = tx.send(Err(Error::ConnectionClosed { reason: reason.to_string() }));
		}
		self.objects.clear();
		for entry in self.waiters.iter() {
			entry.value().notify_waiters();
		}
		self.waiters.clear();
		self.state_notify.notify_waiters();
		tracing::debug!(target: "tabwire::client", reason, "connection closed");
	}

	/// Sends a verb call to the peer and returns the future for its return
	/// envelope. Dropping the future before completion abandons the call:
	/// the correlation slot is removed and a late return is ignored.
	pub fn send_call(&self, guid: &str, method: &str, params: Value) -> CallFuture {
		if let Some(reason) = self.closed_reason() {
			return CallFuture::failed(Error::ConnectionClosed { reason });
		}
		let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
		let (tx, rx) = oneshot::channel();
		self.callbacks.lock().insert(id, tx);
		let guard = CancelGuard::new(id, Arc::clone(&self.callbacks));
		tracing::trace!(target: "tabwire::client", id, guid, method, "sending call");
		let message = Message::Call(Call {
			id,
			guid: Arc::from(guid),
			method: method.to_string(),
			params,
		});
		if !self.deliver(message) {
			if let Some(tx) = self.callbacks.lock().remove(&id) {
				let _ = tx.send(Err(Error::Transport(
					"connection has no outbound handler".to_string(),
				)));
			}
		}
		CallFuture { rx, guard }
	}

	/// Applies one incoming envelope. Synchronous: creates, disposes and
	/// returns take effect before the caller reads the next envelope.
	pub fn dispatch(self: &Arc<Self>, message: Message) {
		if self.is_closed() {
			tracing::trace!(target: "tabwire::client", "dropping envelope on closed connection");
			return;
		}
		match message {
			Message::Return(ret) => self.handle_return(ret),
			Message::Event(event) if event.is_create() => self.handle_create(event),
			Message::Event(event) if event.is_dispose() => self.handle_dispose(event),
			Message::Event(event) => self.handle_event(event),
			Message::Call(call) => {
				tracing::warn!(
					target: "tabwire::client",
					id = call.id,
					method = %call.method,
					"unexpected call envelope on client connection"
				);
			}
			Message::Unknown(value) => {
				tracing::warn!(target: "tabwire::client", ?value, "skipping undecodable envelope");
			}
		}
	}

	/// Waits until the registry holds `guid`, or the timeout elapses, or
	/// the connection closes.
	pub async fn wait_for_object(&self, guid: &str, timeout: Duration) -> Result<Arc<dyn Proxy>> {
		let deadline = tokio::time::Instant::now() + timeout;
		let guid_arc: Arc<str> = Arc::from(guid);
		loop {
			// Register the waiter before checking, so a create landing
			// between the check and the await still wakes us.
			let notify = {
				let entry = self
					.waiters
					.entry(Arc::clone(&guid_arc))
					.or_insert_with(|| Arc::new(Notify::new()));
				Arc::clone(entry.value())
			};
			let notified = notify.notified();
			if let Some(entry) = self.objects.get(&guid_arc) {
				return Ok(Arc::clone(entry.value()));
			}
			if let Some(reason) = self.closed_reason() {
				return Err(Error::ConnectionClosed { reason });
			}
			tokio::select! {
				biased;
				_ = notified => {}
				_ = tokio::time::sleep_until(deadline) => {
					return Err(Error::Timeout(format!("waiting for object {guid}")));
				}
			}
		}
	}

	/// Waits until at least `count` creates have been applied.
	pub async fn wait_for_creates(&self, count: u32, timeout: Duration) -> Result<()> {
		let deadline = tokio::time::Instant::now() + timeout;
		loop {
			let notified = self.state_notify.notified();
			if self.creates_observed() >= count {
				return Ok(());
			}
			if let Some(reason) = self.closed_reason() {
				return Err(Error::ConnectionClosed { reason });
			}
			tokio::select! {
				biased;
				_ = notified => {}
				_ = tokio::time::sleep_until(deadline) => {
					return Err(Error::Timeout(format!("waiting for {count} creates")));
				}
			}
		}
	}

	fn handle_return(&self, ret: Return) {
		let sender = self.callbacks.lock().remove(&ret.id);
		let Some(sender) = sender else {
			// Abandoned call, the guard already removed the slot.
			tracing::trace!(target: "tabwire::client", id = ret.id, "return for abandoned call");
			return;
		};
		let outcome = match ret.error {
			Some(error) => Err(Error::from_wire(error)),
			None => Ok(ret.result.unwrap_or(Value::Null)),
		};
		let _ = sender.send(outcome);
	}

	fn handle_create(self: &Arc<Self>, event: Event) {
		let params: CreateParams = match serde_json::from_value(event.params) {
			Ok(params) => params,
			Err(err) => {
				tracing::error!(target: "tabwire::client", %err, "malformed __create__ params");
				return;
			}
		};
		let parent = match self.resolve(&event.guid) {
			Ok(parent) => parent,
			Err(_) => {
				tracing::error!(
					target: "tabwire::client",
					parent = &*event.guid,
					guid = &*params.guid,
					"__create__ references unknown parent"
				);
				return;
			}
		};
		let guid = Arc::clone(&params.guid);
		let created =
			self.factory
				.create_proxy(self, &parent, &params.kind, guid, params.initializer);
		let object = match created {
			Ok(object) => object,
			Err(err) => {
				tracing::error!(
					target: "tabwire::client",
					kind = %params.kind,
					guid = &*params.guid,
					%err,
					"proxy factory failed"
				);
				return;
			}
		};
		tracing::debug!(
			target: "tabwire::client",
			kind = %params.kind,
			guid = object.guid(),
			parent = parent.guid(),
			"created proxy"
		);
		parent.base().add_child(Arc::clone(&object));
		self.objects.insert(object.base().guid_arc(), object);
		if let Some((_, notify)) = self.waiters.remove(&params.guid) {
			notify.notify_waiters();
		}
		self.creates_seen.fetch_add(1, Ordering::SeqCst);
		self.state_notify.notify_waiters();
	}

	fn handle_dispose(&self, event: Event) {
		let object = self.objects.get(&event.guid).map(|entry| Arc::clone(entry.value()));
		let Some(object) = object else {
			tracing::warn!(target: "tabwire::client", guid = &*event.guid, "__dispose__ for unknown guid");
			return;
		};
		self.dispose_subtree(&object);
		if let Some(parent) = object.base().parent() {
			parent.base().remove_child(object.guid());
		}
		tracing::debug!(target: "tabwire::client", guid = object.guid(), "disposed proxy subtree");
	}

	// Children first, so no proxy is ever registered without its parent.
	fn dispose_subtree(&self, object: &Arc<dyn Proxy>) {
		if !object.base().mark_disposed() {
			return;
		}
		for child in object.base().take_children() {
			self.dispose_subtree(&child);
		}
		self.objects.remove(object.base().guid());
	}

	fn handle_event(&self, event: Event) {
		match self.resolve(&event.guid) {
			Ok(object) => object.on_event(&event.method, event.params),
			Err(_) => {
				tracing::warn!(
					target: "tabwire::client",
					guid = &*event.guid,
					method = %event.method,
					"event for unknown guid"
				);
			}
		}
	}

	fn deliver(&self, message: Message) -> bool {
		let handler = self.on_message.lock();
		match handler.as_ref() {
			Some(handler) => {
				handler(message);
				true
			}
			None => {
				tracing::warn!(target: "tabwire::client", "no outbound handler installed, dropping envelope");
				false
			}
		}
	}
}

/// Removes the correlation slot when a call future is dropped mid-flight.
struct CancelGuard {
	id: u32,
	callbacks: CallbackMap,
	completed: bool,
}

impl CancelGuard {
	fn new(id: u32, callbacks: CallbackMap) -> Self {
		Self { id, callbacks, completed: false }
	}

	fn completed(callbacks: CallbackMap) -> Self {
		Self { id: 0, callbacks, completed: true }
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}
		if self.callbacks.lock().remove(&self.id).is_some() {
			tracing::trace!(target: "tabwire::client", id = self.id, "call abandoned before return");
		}
	}
}

/// Future resolving to the peer's return for one call envelope.
pub struct CallFuture {
	rx: oneshot::Receiver<Result<Value>>,
	guard: CancelGuard,
}

impl CallFuture {
	/// A future that is already settled with `err`.
	fn failed(err: Error) -> Self {
		let (tx, rx) = oneshot::channel();
		let _ = tx.send(Err(err));
		Self {
			rx,
			guard: CancelGuard::completed(Arc::new(Mutex::new(HashMap::new()))),
		}
	}
}

impl Future for CallFuture {
	type Output = Result<Value>;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = self.get_mut();
		match Pin::new(&mut this.rx).poll(cx) {
			Poll::Ready(Ok(outcome)) => {
				this.guard.complete();
				Poll::Ready(outcome)
			}
			Poll::Ready(Err(_)) => {
				this.guard.complete();
				Poll::Ready(Err(Error::ChannelClosed))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}
