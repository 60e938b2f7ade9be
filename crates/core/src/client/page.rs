//! Client page proxy.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};

use tabwire_protocol::{TabId, TabInfo};
use tabwire_runtime::client::proxy::private::Sealed;
use tabwire_runtime::{ClientConnection, Error, Proxy, ProxyBase, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInitializer {
	tab_id: TabId,
	#[serde(default)]
	url: String,
}

/// Driver-side handle for one attached tab.
pub struct Page {
	base: ProxyBase,
	tab_id: TabId,
	url: String,
}

impl Page {
	pub(crate) fn new(
		connection: &Arc<ClientConnection>,
		parent: &Arc<dyn Proxy>,
		guid: Arc<str>,
		initializer: Value,
	) -> Result<Arc<Self>> {
		let parsed: PageInitializer = serde_json::from_value(initializer.clone())
			.map_err(|err| Error::invalid_params("__create__", err))?;
		Ok(Arc::new(Self {
			base: ProxyBase::new(connection, parent, "Page", guid, initializer),
			tab_id: parsed.tab_id,
			url: parsed.url,
		}))
	}

	/// The tab this page is bound to.
	pub fn tab_id(&self) -> TabId {
		self.tab_id
	}

	/// URL snapshot taken when the tab attached.
	pub fn url(&self) -> &str {
		&self.url
	}

	/// Fetches the tab's current engine metadata.
	pub async fn describe(&self) -> Result<TabInfo> {
		self.base.call("describe", &json!({})).await
	}
}

impl std::fmt::Debug for Page {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Page")
			.field("tab_id", &self.tab_id)
			.field("url", &self.url)
			.finish_non_exhaustive()
	}
}

impl Sealed for Page {}

impl Proxy for Page {
	fn base(&self) -> &ProxyBase {
		&self.base
	}
}
