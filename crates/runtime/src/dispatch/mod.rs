//! Server half of the bridge: envelope routing and the dispatcher tree.
//!
//! A [`DispatcherConnection`] owns the guid registry and routes each
//! incoming call envelope to the addressed [`Dispatcher`], converting the
//! verb's outcome into a return envelope. Outgoing traffic (returns,
//! lifecycle `__create__`/`__dispose__`, domain events) flows through a
//! single outbound handler slot, which the embedding bridge points at the
//! peer - directly during the synchronous bootstrap, through a queue once
//! steady.
//!
//! # Dispatch Regimes
//!
//! The connection has an explicit two-state scheduler mode:
//!
//! - [`DispatchMode::Bootstrapping`] - verbs run inline on the caller's
//!   stack, so the object graph is fully materialized before the first
//!   public call returns
//! - [`DispatchMode::Steady`] - each envelope is handled as an independent
//!   spawned unit, so one slow call never blocks delivery of others
//!
//! The transition is a single observable switch ([`switch_to_steady`]) with
//! a deliberate yield before steady traffic resumes.
//!
//! [`switch_to_steady`]: DispatcherConnection::switch_to_steady

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

use crate::error::{Error, Result};
use tabwire_protocol::{Call, Message, Return};

pub mod dispatcher;
pub mod root;

pub use dispatcher::{Dispatcher, DispatcherBase, VerbFuture};
pub use root::{RootDispatcher, RootFactory, RootFuture};

/// Handler receiving every outgoing envelope of a connection.
pub type OutboundHandler = Box<dyn Fn(Message) + Send + Sync>;

/// Scheduler mode of a dispatcher connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
	/// Bootstrap phase: verbs and event propagation run on the caller's
	/// stack, in arrival order.
	Bootstrapping,
	/// Steady state: each envelope is an independently scheduled unit.
	Steady,
}

/// Routes envelopes between the transport and the dispatcher tree.
///
/// The registry here is the sole owner of dispatcher lifetime: nodes enter
/// through [`publish`](Self::publish) (which announces them to the peer with
/// a synchronous `__create__`) and leave through [`dispose`](Self::dispose)
/// or [`close`](Self::close).
pub struct DispatcherConnection {
	dispatchers: DashMap<Arc<str>, Arc<dyn Dispatcher>>,
	on_message: Mutex<Option<OutboundHandler>>,
	steady: AtomicBool,
	ready: AtomicBool,
	closed: AtomicBool,
	state_notify: Notify,
	next_object_id: AtomicU64,
	creates_sent: AtomicU32,
}

impl DispatcherConnection {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			dispatchers: DashMap::new(),
			on_message: Mutex::new(None),
			steady: AtomicBool::new(false),
			ready: AtomicBool::new(false),
			closed: AtomicBool::new(false),
			state_notify: Notify::new(),
			next_object_id: AtomicU64::new(0),
			creates_sent: AtomicU32::new(0),
		})
	}

	/// Points outgoing traffic at the peer, replacing any previous handler.
	///
	/// The local bridge swaps this exactly once: from direct synchronous
	/// delivery during bootstrap to a queued pump in steady state.
	pub fn set_on_message(&self, handler: OutboundHandler) {
		*self.on_message.lock() = Some(handler);
	}

	/// Assigns a connection-unique guid for a new node of `kind`.
	pub fn assign_guid(&self, kind: &str) -> Arc<str> {
		let id = self.next_object_id.fetch_add(1, Ordering::SeqCst) + 1;
		Arc::from(format!("{kind}@{id}").as_str())
	}

	/// Looks up a live dispatcher by guid.
	pub fn get(&self, guid: &str) -> Option<Arc<dyn Dispatcher>> {
		self.dispatchers.get(guid).map(|entry| Arc::clone(entry.value()))
	}

	/// Number of `__create__` envelopes emitted so far.
	pub fn creates_sent(&self) -> u32 {
		self.creates_sent.load(Ordering::SeqCst)
	}

	/// Current scheduler mode.
	pub fn mode(&self) -> DispatchMode {
		if self.steady.load(Ordering::SeqCst) {
			DispatchMode::Steady
		} else {
			DispatchMode::Bootstrapping
		}
	}

	/// Switches dispatch from bootstrapping to steady, once.
	///
	/// Yields before returning so anything already scheduled behind the
	/// bootstrap runs ahead of the first steady-state envelope.
	pub async fn switch_to_steady(&self) {
		if !self.steady.swap(true, Ordering::SeqCst) {
			tracing::debug!(target: "tabwire::dispatch", "dispatch mode: bootstrapping -> steady");
			tokio::task::yield_now().await;
		}
	}

	/// Whether the bootstrap/initialize sequence has completed.
	pub fn is_ready(&self) -> bool {
		self.ready.load(Ordering::SeqCst)
	}

	/// Marks the bootstrap complete; steady-state calls are accepted after.
	pub fn mark_ready(&self) {
		if !self.ready.swap(true, Ordering::SeqCst) {
			tracing::debug!(target: "tabwire::dispatch", "connection ready");
			self.state_notify.notify_waiters();
		}
	}

	/// Waits until the connection is ready.
	///
	/// Fails with [`Error::ConnectionClosedBeforeInit`] if the connection
	/// closes first.
	pub async fn wait_ready(&self) -> Result<()> {
		loop {
			let notified = self.state_notify.notified();
			if self.is_ready() {
				return Ok(());
			}
			if self.is_closed() {
				return Err(Error::ConnectionClosedBeforeInit);
			}
			notified.await;
		}
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Terminates the connection: no further delivery in either direction,
	/// all registry entries released.
	pub fn close(&self, reason: &str) {
		if self.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		tracing::debug!(target: "tabwire::dispatch", reason, "dispatcher connection closed");
		*self.on_message.lock() = None;
		self.dispatchers.clear();
		self.state_notify.notify_waiters();
	}

	/// Registers `dispatcher` and announces it to the peer.
	///
	/// The `__create__` envelope is emitted synchronously with the
	/// registration - never batched or reordered - so the peer always
	/// observes a node's creation before any envelope referencing its guid.
	pub fn publish(&self, dispatcher: Arc<dyn Dispatcher>) {
		if self.is_closed() {
			tracing::warn!(target: "tabwire::dispatch", guid = dispatcher.guid(), "publish after close dropped");
			return;
		}
		let base = dispatcher.base();
		let guid = base.guid_arc();
		if self.dispatchers.contains_key(&guid) {
			tracing::error!(target: "tabwire::dispatch", guid = &*guid, "duplicate guid, publish dropped");
			return;
		}

		let parent_guid = base
			.parent()
			.map(|parent| parent.base().guid_arc())
			.unwrap_or_else(|| Arc::from(""));
		if let Some(parent) = base.parent() {
			parent.base().add_child(Arc::clone(&dispatcher));
		}
		self.dispatchers.insert(Arc::clone(&guid), Arc::clone(&dispatcher));
		self.creates_sent.fetch_add(1, Ordering::SeqCst);
		tracing::debug!(
			target: "tabwire::dispatch",
			guid = &*guid,
			kind = dispatcher.kind(),
			parent = &*parent_guid,
			"dispatcher published"
		);
		self.send_message(Message::create(
			&*parent_guid,
			dispatcher.kind(),
			&*guid,
			base.initializer().clone(),
		));
	}

	/// Registers the root scope at the empty guid, without announcing it.
	pub(crate) fn register_root(&self, root: Arc<dyn Dispatcher>) {
		self.dispatchers.insert(root.base().guid_arc(), root);
	}

	/// Tears down `dispatcher` and its subtree.
	///
	/// Children are disposed before the node itself leaves the registry; a
	/// single `__dispose__` envelope names the subtree root, and the peer
	/// cascades from there.
	pub fn dispose(&self, dispatcher: &Arc<dyn Dispatcher>) {
		if !dispatcher.base().mark_disposed() {
			return;
		}
		self.unregister_subtree(dispatcher);
		if let Some(parent) = dispatcher.base().parent() {
			parent.base().remove_child(dispatcher.guid());
		}
		self.send_message(Message::dispose(dispatcher.guid()));
	}

	fn unregister_subtree(&self, dispatcher: &Arc<dyn Dispatcher>) {
		for child in dispatcher.base().take_children() {
			child.base().mark_disposed();
			self.unregister_subtree(&child);
		}
		self.dispatchers.remove(dispatcher.guid());
		dispatcher.on_dispose();
		tracing::debug!(
			target: "tabwire::dispatch",
			guid = dispatcher.guid(),
			kind = dispatcher.kind(),
			"dispatcher disposed"
		);
	}

	/// Routes one incoming envelope.
	///
	/// Call envelopes run inline while bootstrapping and as spawned units in
	/// steady state. Non-call envelopes are not expected on the server side
	/// and are logged and skipped.
	pub async fn dispatch(self: &Arc<Self>, message: Message) {
		if self.is_closed() {
			tracing::warn!(target: "tabwire::dispatch", "envelope after close dropped");
			return;
		}
		match message {
			Message::Call(call) => match self.mode() {
				DispatchMode::Bootstrapping => self.run_call(call).await,
				DispatchMode::Steady => {
					let connection = Arc::clone(self);
					tokio::spawn(async move {
						connection.run_call(call).await;
					});
				}
			},
			Message::Return(ret) => {
				tracing::warn!(target: "tabwire::dispatch", id = ret.id, "unexpected return envelope");
			}
			Message::Event(event) => {
				tracing::warn!(
					target: "tabwire::dispatch",
					guid = &*event.guid,
					method = %event.method,
					"unexpected event envelope"
				);
			}
			Message::Unknown(value) => {
				tracing::warn!(target: "tabwire::dispatch", %value, "unknown envelope shape skipped");
			}
		}
	}

	/// Runs one call to completion and emits its return envelope.
	async fn run_call(self: &Arc<Self>, call: Call) {
		let id = call.id;
		let message = match self.invoke(call).await {
			Ok(result) => Message::Return(Return::ok(id, result)),
			Err(err) => {
				tracing::debug!(target: "tabwire::dispatch", id, %err, "call failed");
				Message::Return(Return::err(id, err.wire()))
			}
		};
		self.send_message(message);
	}

	async fn invoke(self: &Arc<Self>, call: Call) -> Result<Value> {
		if !self.is_ready() && !call.guid.is_empty() {
			return Err(Error::OutOfOrder { method: call.method });
		}
		let dispatcher = self
			.get(&call.guid)
			.ok_or_else(|| Error::unknown_target(&*call.guid))?;
		tracing::trace!(
			target: "tabwire::dispatch",
			guid = &*call.guid,
			method = %call.method,
			id = call.id,
			"dispatching call"
		);
		dispatcher.handle(call.method, call.params).await
	}

	/// Emits a domain event from `guid` to the peer.
	pub fn send_event(&self, guid: &Arc<str>, method: &str, params: Value) {
		self.send_message(Message::event(&**guid, method, params));
	}

	/// Hands one outgoing envelope to the outbound handler.
	///
	/// With no handler installed, or after close, the envelope is dropped
	/// and logged - never queued or retried.
	pub fn send_message(&self, message: Message) {
		if self.is_closed() {
			tracing::warn!(target: "tabwire::dispatch", "dropping outgoing envelope: connection closed");
			return;
		}
		let guard = self.on_message.lock();
		match guard.as_ref() {
			Some(handler) => handler(message),
			None => {
				tracing::warn!(target: "tabwire::dispatch", "dropping outgoing envelope: no transport");
			}
		}
	}
}
