//! Root scope - the well-known object that bootstraps the dispatcher tree.
//!
//! The root lives at the empty guid and understands exactly one verb,
//! `initialize`. The host supplies a [`RootFactory`] that builds the
//! top-level object graph; the factory runs exactly once, either from the
//! driver's `initialize` call or from a host-driven [`bootstrap`] (the
//! create-count handshake, where the tree is built before any driver call
//! arrives). An `initialize` after a host-driven bootstrap answers with the
//! already-built top object; only a second `initialize` is rejected.
//!
//! [`bootstrap`]: RootDispatcher::bootstrap

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::{Value, json};
use tabwire_protocol::envelope::{GuidRef, InitializeParams, METHOD_INITIALIZE};

use super::dispatcher::{Dispatcher, DispatcherBase, VerbFuture, private};
use super::DispatcherConnection;
use crate::error::{Error, Result};

pub type RootFuture = Pin<Box<dyn Future<Output = Result<Arc<dyn Dispatcher>>> + Send>>;

/// Host hook that builds the top-level object graph, invoked exactly once.
///
/// The factory publishes every dispatcher the bootstrap requires (the
/// `__create__` envelopes go out synchronously from `publish`) and returns
/// the top-level dispatcher the driver addresses first.
pub trait RootFactory: Send + Sync {
	fn create_root(
		&self,
		connection: &Arc<DispatcherConnection>,
		params: InitializeParams,
	) -> RootFuture;
}

/// The root scope at the empty guid.
pub struct RootDispatcher {
	base: DispatcherBase,
	factory: Mutex<Option<Arc<dyn RootFactory>>>,
	top: Mutex<Option<Arc<dyn Dispatcher>>>,
	initialized: AtomicBool,
}

impl RootDispatcher {
	pub fn new(
		connection: &Arc<DispatcherConnection>,
		factory: Arc<dyn RootFactory>,
	) -> Arc<Self> {
		let root = Arc::new(Self {
			base: DispatcherBase::new(
				connection,
				None,
				"Root",
				Arc::from(""),
				Value::Object(serde_json::Map::new()),
			),
			factory: Mutex::new(Some(factory)),
			top: Mutex::new(None),
			initialized: AtomicBool::new(false),
		});
		connection.register_root(root.clone());
		root
	}

	/// Builds the object graph without a driver `initialize` call.
	///
	/// Used by the create-count handshake and by local in-process mode: the
	/// host bootstraps the tree up front and the peer observes the resulting
	/// `__create__` sequence. Marks the connection ready.
	pub async fn bootstrap(&self, params: InitializeParams) -> Result<Arc<dyn Dispatcher>> {
		let top = self.build_top(params).await?;
		Ok(top)
	}

	async fn build_top(&self, params: InitializeParams) -> Result<Arc<dyn Dispatcher>> {
		let factory = self
			.factory
			.lock()
			.take()
			.ok_or(Error::AlreadyInitialized)?;
		let connection = self
			.base
			.connection()
			.ok_or_else(|| Error::ConnectionClosed { reason: "connection dropped".into() })?;
		let top = factory.create_root(&connection, params).await?;
		*self.top.lock() = Some(Arc::clone(&top));
		connection.mark_ready();
		tracing::debug!(
			target: "tabwire::dispatch",
			top = top.guid(),
			"root scope bootstrapped"
		);
		Ok(top)
	}

	async fn initialize(&self, params: InitializeParams) -> Result<Value> {
		if self.initialized.swap(true, Ordering::SeqCst) {
			return Err(Error::AlreadyInitialized);
		}
		let top = {
			let existing = self.top.lock().clone();
			match existing {
				// Host-driven bootstrap already ran; hand back its result.
				Some(top) => top,
				None => self.build_top(params).await?,
			}
		};
		Ok(json!({ "application": GuidRef::new(top.guid()).to_value() }))
	}
}

impl private::Sealed for RootDispatcher {}

impl Dispatcher for RootDispatcher {
	fn base(&self) -> &DispatcherBase {
		&self.base
	}

	fn handle(self: Arc<Self>, method: String, params: Value) -> VerbFuture {
		Box::pin(async move {
			if method != METHOD_INITIALIZE {
				return Err(Error::unknown_method("Root", &method));
			}
			let params: InitializeParams = serde_json::from_value(params)
				.map_err(|err| Error::invalid_params(&method, err))?;
			self.initialize(params).await
		})
	}
}
