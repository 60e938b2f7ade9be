//! Dispatcher - server-side wrapper around one engine object.
//!
//! Every object exposed over the bridge (the application, a context, a page)
//! is wrapped by exactly one dispatcher node holding:
//! - its guid, immutable and unique for the connection's lifetime
//! - a closed verb table, invoked by the connection per call envelope
//! - parent/children links forming the dispatcher tree
//! - a weak back-reference to the connection for event emission
//!
//! The connection's registry is the sole owner of dispatcher lifetime; the
//! wrapped engine object is exclusively owned by its dispatcher.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use downcast_rs::{DowncastSync, impl_downcast};
use parking_lot::Mutex;
use serde_json::Value;

use super::DispatcherConnection;
use crate::error::Result;

/// Private module for the sealed trait pattern.
pub mod private {
	/// Marker trait that seals `Dispatcher`.
	pub trait Sealed {}
}

/// Future returned by a dispatcher verb invocation.
pub type VerbFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send + 'static>>;

/// Server-side wrapper exposing one engine object's verbs and events.
///
/// This trait is sealed - concrete dispatchers embed a [`DispatcherBase`]
/// and implement [`handle`](Self::handle) as a match over their closed verb
/// table. Unknown verbs fail with `UnknownMethod`; params that fail schema
/// validation fail with `InvalidParams`.
pub trait Dispatcher: private::Sealed + DowncastSync {
	/// Shared node state: guid, kind, tree links, connection back-reference.
	fn base(&self) -> &DispatcherBase;

	/// Invokes a verb from this type's closed verb table.
	fn handle(self: Arc<Self>, method: String, params: Value) -> VerbFuture;

	/// Hook invoked when this node is torn down, after its children.
	fn on_dispose(&self) {}

	/// The guid naming this node across the bridge.
	fn guid(&self) -> &str {
		self.base().guid()
	}

	/// The object kind, one of the closed set of node types.
	fn kind(&self) -> &'static str {
		self.base().kind()
	}
}

impl_downcast!(sync Dispatcher);

type ChildRegistry = HashMap<Arc<str>, Arc<dyn Dispatcher>>;

/// Base state embedded in every concrete dispatcher.
pub struct DispatcherBase {
	guid: Arc<str>,
	kind: &'static str,
	parent: Option<Weak<dyn Dispatcher>>,
	connection: Weak<DispatcherConnection>,
	children: Mutex<ChildRegistry>,
	initializer: Value,
	disposed: AtomicBool,
}

impl DispatcherBase {
	/// Base state for a node parented under `parent` (or the root scope when
	/// `parent` is `None`).
	pub fn new(
		connection: &Arc<DispatcherConnection>,
		parent: Option<&Arc<dyn Dispatcher>>,
		kind: &'static str,
		guid: Arc<str>,
		initializer: Value,
	) -> Self {
		Self {
			guid,
			kind,
			parent: parent.map(Arc::downgrade),
			connection: Arc::downgrade(connection),
			children: Mutex::new(HashMap::new()),
			initializer,
			disposed: AtomicBool::new(false),
		}
	}

	pub fn guid(&self) -> &str {
		&self.guid
	}

	pub fn guid_arc(&self) -> Arc<str> {
		Arc::clone(&self.guid)
	}

	pub fn kind(&self) -> &'static str {
		self.kind
	}

	/// The parent node, if it is still alive and this is not a root child.
	pub fn parent(&self) -> Option<Arc<dyn Dispatcher>> {
		self.parent.as_ref().and_then(Weak::upgrade)
	}

	/// The owning connection, if it is still alive.
	pub fn connection(&self) -> Option<Arc<DispatcherConnection>> {
		self.connection.upgrade()
	}

	/// Construction-time state announced in this node's `__create__`.
	pub fn initializer(&self) -> &Value {
		&self.initializer
	}

	pub fn add_child(&self, child: Arc<dyn Dispatcher>) {
		self.children
			.lock()
			.insert(child.base().guid_arc(), child);
	}

	pub fn remove_child(&self, guid: &str) {
		self.children.lock().remove(guid);
	}

	/// Snapshot of the current children, unordered.
	pub fn children(&self) -> Vec<Arc<dyn Dispatcher>> {
		self.children.lock().values().cloned().collect()
	}

	/// Drains the children set for a disposal cascade.
	pub(crate) fn take_children(&self) -> Vec<Arc<dyn Dispatcher>> {
		self.children.lock().drain().map(|(_, child)| child).collect()
	}

	pub fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::SeqCst)
	}

	/// Marks this node disposed; returns `false` if it already was.
	pub(crate) fn mark_disposed(&self) -> bool {
		!self.disposed.swap(true, Ordering::SeqCst)
	}

	/// Emits a domain event from this node to the peer.
	///
	/// Events from a disposed node, or after the connection is gone, are
	/// silently discarded.
	pub fn emit_event(&self, method: &str, params: Value) {
		if self.is_disposed() {
			return;
		}
		if let Some(connection) = self.connection() {
			connection.send_event(&self.guid, method, params);
		}
	}
}
