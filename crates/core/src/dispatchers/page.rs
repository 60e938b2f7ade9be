//! Page dispatcher - one node per attached tab.

use std::str::FromStr;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::host::PageBinding;
use crate::session::Session;
use tabwire_protocol::TabId;
use tabwire_runtime::dispatch::dispatcher::private::Sealed;
use tabwire_runtime::{Dispatcher, DispatcherBase, DispatcherConnection, Error, Result, VerbFuture};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageVerb {
	Describe,
}

impl FromStr for PageVerb {
	type Err = Error;

	fn from_str(method: &str) -> Result<Self> {
		match method {
			"describe" => Ok(Self::Describe),
			_ => Err(Error::unknown_method("Page", method)),
		}
	}
}

/// Server node wrapping one attached tab's engine binding.
///
/// Published synchronously with the attach effect, so its `__create__`
/// always precedes the first envelope referencing its guid; disposed when
/// the tab detaches.
pub struct PageDispatcher {
	base: DispatcherBase,
	tab_id: TabId,
	binding: Arc<dyn PageBinding>,
	session: Arc<Session>,
}

impl PageDispatcher {
	pub(crate) fn publish(
		connection: &Arc<DispatcherConnection>,
		parent: &Arc<dyn Dispatcher>,
		tab_id: TabId,
		binding: Arc<dyn PageBinding>,
		session: Arc<Session>,
	) -> Arc<Self> {
		let initializer = json!({ "tabId": tab_id, "url": binding.url() });
		let page = Arc::new(Self {
			base: DispatcherBase::new(
				connection,
				Some(parent),
				"Page",
				connection.assign_guid("page"),
				initializer,
			),
			tab_id,
			binding,
			session,
		});
		connection.publish(Arc::clone(&page) as Arc<dyn Dispatcher>);
		page
	}

	pub fn tab_id(&self) -> TabId {
		self.tab_id
	}

	/// The live engine binding wrapped by this node.
	pub fn binding(&self) -> &Arc<dyn PageBinding> {
		&self.binding
	}

	async fn verb_describe(&self) -> Result<Value> {
		let info = self.session.describe(self.tab_id).await?;
		Ok(serde_json::to_value(info)?)
	}
}

impl Sealed for PageDispatcher {}

impl Dispatcher for PageDispatcher {
	fn base(&self) -> &DispatcherBase {
		&self.base
	}

	fn handle(self: Arc<Self>, method: String, _params: Value) -> VerbFuture {
		Box::pin(async move {
			match method.parse::<PageVerb>()? {
				PageVerb::Describe => self.verb_describe().await,
			}
		})
	}
}
