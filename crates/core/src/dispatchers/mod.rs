//! Server-side dispatcher tree over a [`Session`].
//!
//! Three node kinds, created in a fixed order: the application (well-known
//! guid, first `__create__` of every bootstrap), the browsing context under
//! it, and one page node per attached tab. Verb tables are closed enums;
//! anything outside them is an `UnknownMethod` on the wire.

mod application;
mod context;
mod page;

pub use application::ApplicationDispatcher;
pub use context::ContextDispatcher;
pub use page::PageDispatcher;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::session::Session;
use tabwire_protocol::InitializeParams;
use tabwire_runtime::{Dispatcher, DispatcherConnection, Error, Result, RootFactory, RootFuture};

/// Well-known guid of the application node, the first bootstrap creation.
pub const APPLICATION_GUID: &str = "Application";

/// Builds the application tree when a connection bootstraps.
///
/// Runs exactly once per connection, from either handshake variant: the
/// host-driven bootstrap of the create-count handshake, or the driver's
/// `initialize` call.
pub struct SessionRootFactory {
	session: Arc<Session>,
}

impl SessionRootFactory {
	pub fn new(session: Arc<Session>) -> Self {
		Self { session }
	}
}

impl RootFactory for SessionRootFactory {
	fn create_root(
		&self,
		connection: &Arc<DispatcherConnection>,
		params: InitializeParams,
	) -> RootFuture {
		let session = Arc::clone(&self.session);
		let connection = Arc::clone(connection);
		Box::pin(async move {
			debug!(
				target: "tabwire::dispatch",
				sdk_language = %params.sdk_language,
				"building application tree"
			);
			let application = ApplicationDispatcher::publish(&connection, session);
			Ok(application as Arc<dyn Dispatcher>)
		})
	}
}

/// Decodes a verb's params into its typed struct.
fn decode<T: DeserializeOwned>(method: &str, params: Value) -> Result<T> {
	serde_json::from_value(params).map_err(|err| Error::invalid_params(method, err))
}
