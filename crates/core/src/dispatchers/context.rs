//! Context dispatcher - the browsing context node.

use std::sync::Arc;

use serde_json::{Value, json};

use tabwire_runtime::dispatch::dispatcher::private::Sealed;
use tabwire_runtime::{Dispatcher, DispatcherBase, DispatcherConnection, Error, VerbFuture};

/// The primary browsing context, second creation of every bootstrap.
///
/// Carries no verbs of its own; it exists to parent the page nodes, so the
/// application's disposal cascades through one subtree.
pub struct ContextDispatcher {
	base: DispatcherBase,
}

impl ContextDispatcher {
	pub fn publish(
		connection: &Arc<DispatcherConnection>,
		parent: &Arc<dyn Dispatcher>,
	) -> Arc<Self> {
		let context = Arc::new(Self {
			base: DispatcherBase::new(
				connection,
				Some(parent),
				"Context",
				connection.assign_guid("context"),
				json!({}),
			),
		});
		connection.publish(Arc::clone(&context) as Arc<dyn Dispatcher>);
		context
	}
}

impl Sealed for ContextDispatcher {}

impl Dispatcher for ContextDispatcher {
	fn base(&self) -> &DispatcherBase {
		&self.base
	}

	fn handle(self: Arc<Self>, method: String, _params: Value) -> VerbFuture {
		Box::pin(async move { Err(Error::unknown_method("Context", method)) })
	}
}
