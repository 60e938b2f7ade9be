//! Typed driver-side proxies for the session surface.
//!
//! One proxy type per dispatcher kind. The factory is the client-side twin
//! of the bootstrap order: `Application` first, `Context` under it, then
//! one `Page` per attach announcement. Kinds this crate does not model fall
//! back to the generic proxy so an unknown node never kills the connection.

mod application;
mod context;
mod page;

pub use application::{Application, ApplicationEvent};
pub use context::Context;
pub use page::Page;

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use tabwire_runtime::{ClientConnection, GenericProxy, Proxy, ProxyFactory, Result};

/// Maps `__create__` kinds onto this crate's typed proxies.
pub struct CoreProxyFactory;

impl ProxyFactory for CoreProxyFactory {
	fn create_proxy(
		&self,
		connection: &Arc<ClientConnection>,
		parent: &Arc<dyn Proxy>,
		kind: &str,
		guid: Arc<str>,
		initializer: Value,
	) -> Result<Arc<dyn Proxy>> {
		let proxy: Arc<dyn Proxy> = match kind {
			"Application" => Application::new(connection, parent, guid, initializer),
			"Context" => Context::new(connection, parent, guid, initializer),
			"Page" => Page::new(connection, parent, guid, initializer)?,
			other => {
				debug!(
					target: "tabwire::client",
					kind = other,
					guid = &*guid,
					"no typed proxy for kind, using generic"
				);
				GenericProxy::new(connection, parent, other, guid, initializer)
			}
		};
		Ok(proxy)
	}
}
