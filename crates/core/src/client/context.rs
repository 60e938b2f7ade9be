//! Client context proxy.

use std::sync::Arc;

use serde_json::Value;

use super::page::Page;
use tabwire_runtime::client::proxy::private::Sealed;
use tabwire_runtime::{ClientConnection, Proxy, ProxyBase};

/// Driver-side handle for the primary browsing context.
pub struct Context {
	base: ProxyBase,
}

impl Context {
	pub(crate) fn new(
		connection: &Arc<ClientConnection>,
		parent: &Arc<dyn Proxy>,
		guid: Arc<str>,
		initializer: Value,
	) -> Arc<Self> {
		Arc::new(Self {
			base: ProxyBase::new(connection, parent, "Context", guid, initializer),
		})
	}

	/// Pages currently alive under this context, unordered.
	pub fn pages(&self) -> Vec<Arc<Page>> {
		self.base
			.children()
			.into_iter()
			.filter_map(|child| child.downcast_arc::<Page>().ok())
			.collect()
	}
}

impl Sealed for Context {}

impl Proxy for Context {
	fn base(&self) -> &ProxyBase {
		&self.base
	}
}
