//! Proxy - client-side mirror of one dispatcher node.
//!
//! Proxies are created by the registry when a `__create__` envelope arrives
//! and addressed by guid from then on. A proxy holds no strong reference to
//! the connection (the registry owns proxy lifetime, the connection owns
//! the registry), and no proxy outlives its parent: disposal cascades down
//! the parent chain.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use downcast_rs::{DowncastSync, impl_downcast};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{CallFuture, ClientConnection};
use crate::error::{Error, Result};

/// Private module for the sealed trait pattern.
pub mod private {
	/// Marker trait that seals `Proxy`.
	pub trait Sealed {}
}

/// Client-side mirror object corresponding to one dispatcher.
///
/// Concrete proxies embed a [`ProxyBase`] and override
/// [`on_event`](Self::on_event) for the domain events they understand.
pub trait Proxy: private::Sealed + DowncastSync {
	/// Shared node state: guid, kind, tree links, connection back-reference.
	fn base(&self) -> &ProxyBase;

	/// Handles a domain event addressed to this proxy.
	fn on_event(&self, method: &str, params: Value) {
		tracing::debug!(
			target: "tabwire::client",
			guid = self.base().guid(),
			kind = self.base().kind(),
			method,
			?params,
			"unhandled event"
		);
	}

	/// The guid naming this node across the bridge.
	fn guid(&self) -> &str {
		self.base().guid()
	}

	/// The object kind announced by the node's `__create__`.
	fn kind(&self) -> &str {
		self.base().kind()
	}
}

impl_downcast!(sync Proxy);

impl std::fmt::Debug for dyn Proxy {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Proxy")
			.field("guid", &self.guid())
			.field("kind", &self.kind())
			.finish_non_exhaustive()
	}
}

type ChildRegistry = HashMap<Arc<str>, Arc<dyn Proxy>>;

/// Base state embedded in every concrete proxy.
pub struct ProxyBase {
	guid: Arc<str>,
	kind: String,
	parent: Option<Weak<dyn Proxy>>,
	connection: Weak<ClientConnection>,
	children: Mutex<ChildRegistry>,
	initializer: Value,
	disposed: AtomicBool,
}

impl ProxyBase {
	/// Base state for a proxy under `parent` (the root sentinel counts).
	pub fn new(
		connection: &Arc<ClientConnection>,
		parent: &Arc<dyn Proxy>,
		kind: impl Into<String>,
		guid: Arc<str>,
		initializer: Value,
	) -> Self {
		Self::from_parts(
			Arc::downgrade(connection),
			Some(Arc::downgrade(parent)),
			kind,
			guid,
			initializer,
		)
	}

	pub(crate) fn from_parts(
		connection: Weak<ClientConnection>,
		parent: Option<Weak<dyn Proxy>>,
		kind: impl Into<String>,
		guid: Arc<str>,
		initializer: Value,
	) -> Self {
		Self {
			guid,
			kind: kind.into(),
			parent,
			connection,
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

	pub fn kind(&self) -> &str {
		&self.kind
	}

	/// The parent proxy, if it is still alive.
	pub fn parent(&self) -> Option<Arc<dyn Proxy>> {
		self.parent.as_ref().and_then(Weak::upgrade)
	}

	/// The owning connection, if it is still alive.
	pub fn connection(&self) -> Option<Arc<ClientConnection>> {
		self.connection.upgrade()
	}

	/// Initializer snapshot from this node's `__create__`.
	pub fn initializer(&self) -> &Value {
		&self.initializer
	}

	pub fn add_child(&self, child: Arc<dyn Proxy>) {
		self.children.lock().insert(child.base().guid_arc(), child);
	}

	pub fn remove_child(&self, guid: &str) {
		self.children.lock().remove(guid);
	}

	/// Snapshot of the current children, unordered.
	pub fn children(&self) -> Vec<Arc<dyn Proxy>> {
		self.children.lock().values().cloned().collect()
	}

	pub(crate) fn take_children(&self) -> Vec<Arc<dyn Proxy>> {
		self.children.lock().drain().map(|(_, child)| child).collect()
	}

	pub fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::SeqCst)
	}

	pub(crate) fn mark_disposed(&self) -> bool {
		!self.disposed.swap(true, Ordering::SeqCst)
	}

	/// Sends a verb call from this proxy with raw JSON params.
	pub fn call_value(&self, method: &str, params: Value) -> CallFuture {
		match self.connection() {
			Some(connection) => connection.send_call(&self.guid, method, params),
			None => CallFuture::failed(Error::ConnectionClosed {
				reason: "client connection dropped".into(),
			}),
		}
	}

	/// Sends a verb call with typed params, decoding a typed result.
	pub async fn call<P, R>(&self, method: &str, params: &P) -> Result<R>
	where
		P: Serialize,
		R: DeserializeOwned,
	{
		let params = serde_json::to_value(params)?;
		let result = self.call_value(method, params).await?;
		Ok(serde_json::from_value(result)?)
	}

	/// Sends a verb call with no params, ignoring the result payload.
	pub async fn call_unit(&self, method: &str) -> Result<()> {
		self.call_value(method, Value::Object(serde_json::Map::new()))
			.await?;
		Ok(())
	}
}

/// Inert proxy used for unrecognized kinds and the root sentinel.
///
/// Keeps the tree navigable when the peer announces an object kind this
/// client does not model; every event on it is logged and ignored.
pub struct GenericProxy {
	base: ProxyBase,
}

impl GenericProxy {
	pub fn new(
		connection: &Arc<ClientConnection>,
		parent: &Arc<dyn Proxy>,
		kind: impl Into<String>,
		guid: Arc<str>,
		initializer: Value,
	) -> Arc<Self> {
		Arc::new(Self {
			base: ProxyBase::new(connection, parent, kind, guid, initializer),
		})
	}

	/// The designated root sentinel returned for the empty guid.
	pub(crate) fn root(connection: Weak<ClientConnection>) -> Arc<dyn Proxy> {
		Arc::new(Self {
			base: ProxyBase::from_parts(
				connection,
				None,
				"Root",
				Arc::from(""),
				Value::Object(serde_json::Map::new()),
			),
		})
	}
}

impl private::Sealed for GenericProxy {}

impl Proxy for GenericProxy {
	fn base(&self) -> &ProxyBase {
		&self.base
	}
}
