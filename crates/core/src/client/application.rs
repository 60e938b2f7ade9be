//! Client application proxy - the typed driver surface.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::context::Context;
use super::page::Page;
use crate::events::{EventBus, EventStream, EventWaiter};
use tabwire_protocol::{
	GuidRef, InteractionMode, NewPageOptions, RecorderOptions, TabFilter, TabId, TestDescriptor,
};
use tabwire_runtime::client::proxy::private::Sealed;
use tabwire_runtime::{ClientConnection, Error, Proxy, ProxyBase, Result};

/// Typed mirror of the session events the server emits.
#[derive(Clone)]
pub enum ApplicationEvent {
	Attached { tab_id: TabId, page: Arc<Page> },
	Detached { tab_id: TabId },
	ModeChanged { mode: InteractionMode },
	Show,
	Hide,
}

impl std::fmt::Debug for ApplicationEvent {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Attached { tab_id, .. } => f
				.debug_struct("Attached")
				.field("tab_id", tab_id)
				.finish_non_exhaustive(),
			Self::Detached { tab_id } => {
				f.debug_struct("Detached").field("tab_id", tab_id).finish()
			}
			Self::ModeChanged { mode } => {
				f.debug_struct("ModeChanged").field("mode", mode).finish()
			}
			Self::Show => f.write_str("Show"),
			Self::Hide => f.write_str("Hide"),
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachedEvent {
	page: GuidRef,
	tab_id: TabId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetachedEvent {
	tab_id: TabId,
}

#[derive(Debug, Deserialize)]
struct ModeChangedEvent {
	mode: InteractionMode,
}

#[derive(Debug, Deserialize)]
struct PageResult {
	page: GuidRef,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PagesResult {
	pages: Vec<GuidRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TestsResult {
	tests: Vec<TestDescriptor>,
}

/// Driver-side root handle: session verbs plus the typed event stream.
pub struct Application {
	base: ProxyBase,
	events: EventBus<ApplicationEvent>,
}

impl Application {
	pub(crate) fn new(
		connection: &Arc<ClientConnection>,
		parent: &Arc<dyn Proxy>,
		guid: Arc<str>,
		initializer: Value,
	) -> Arc<Self> {
		Arc::new(Self {
			base: ProxyBase::new(connection, parent, "Application", guid, initializer),
			events: EventBus::new(256),
		})
	}

	/// Subscribes to the typed application event stream.
	pub fn events(&self) -> EventStream<ApplicationEvent> {
		self.events.subscribe()
	}

	/// Waits for the first application event matching `predicate`.
	pub fn wait_for_event<F>(
		&self,
		predicate: F,
		timeout: Duration,
	) -> EventWaiter<ApplicationEvent>
	where
		F: Fn(&ApplicationEvent) -> bool + Send + Sync + 'static,
	{
		self.events.wait_for(predicate, timeout)
	}

	/// The browsing context announced by the bootstrap.
	pub fn context(&self) -> Option<Arc<Context>> {
		self.base
			.children()
			.into_iter()
			.find_map(|child| child.downcast_arc::<Context>().ok())
	}

	/// Attaches a tab by id, returning its page handle.
	pub async fn attach(&self, tab_id: TabId) -> Result<Arc<Page>> {
		let result: PageResult = self.base.call("attach", &json!({ "tabId": tab_id })).await?;
		self.resolve_page(&result.page)
	}

	/// Attaches every tab matching `filter`.
	///
	/// Already-attached tabs and tabs the engine refuses are skipped
	/// server-side; the result holds only the pages this call attached.
	pub async fn attach_all(&self, filter: &TabFilter) -> Result<Vec<Arc<Page>>> {
		let result: PagesResult = self.base.call("attachAll", filter).await?;
		result
			.pages
			.iter()
			.map(|page| self.resolve_page(page))
			.collect()
	}

	/// Detaches a tab by id. Unattached tabs are a no-op.
	pub async fn detach(&self, tab_id: TabId) -> Result<()> {
		let _: Value = self.base.call("detach", &json!({ "tabId": tab_id })).await?;
		Ok(())
	}

	/// Detaches the tab behind `page`.
	pub async fn detach_page(&self, page: &Page) -> Result<()> {
		let _: Value = self
			.base
			.call("detach", &json!({ "page": GuidRef::new(page.guid()).to_value() }))
			.await?;
		Ok(())
	}

	/// Detaches every attached tab.
	pub async fn detach_all(&self) -> Result<()> {
		self.base.call_unit("detachAll").await
	}

	/// Opens a fresh tab and attaches it in one step.
	pub async fn new_page(&self, options: &NewPageOptions) -> Result<Arc<Page>> {
		let result: PageResult = self.base.call("newPage", options).await?;
		self.resolve_page(&result.page)
	}

	/// Switches the interaction mode.
	pub async fn set_mode(&self, mode: InteractionMode) -> Result<()> {
		let _: Value = self.base.call("setMode", &json!({ "mode": mode })).await?;
		Ok(())
	}

	/// Shows the recorder surface, or reconfigures it if already visible.
	pub async fn show_recorder(&self, options: &RecorderOptions) -> Result<()> {
		let _: Value = self.base.call("showRecorder", options).await?;
		Ok(())
	}

	/// Hides the recorder surface.
	pub async fn hide_recorder(&self) -> Result<()> {
		self.base.call_unit("hideRecorder").await
	}

	/// Closes the session. Terminal; the server disposes this object tree.
	pub async fn close(&self) -> Result<()> {
		self.base.call_unit("close").await
	}

	/// Parses `code` server-side into test descriptors, executing nothing.
	pub async fn list(&self, code: &str) -> Result<Vec<TestDescriptor>> {
		let result: TestsResult = self.base.call("list", &json!({ "code": code })).await?;
		Ok(result.tests)
	}

	/// Stages `code` server-side for a later bare [`run`](Self::run).
	pub async fn load(&self, code: &str) -> Result<()> {
		let _: Value = self.base.call("load", &json!({ "code": code })).await?;
		Ok(())
	}

	/// Runs `code` (or the loaded script when `None`) against `page` (or
	/// the whole context when `None`).
	pub async fn run(&self, page: Option<&Page>, code: Option<&str>) -> Result<()> {
		let mut params = serde_json::Map::new();
		if let Some(page) = page {
			params.insert("page".into(), GuidRef::new(page.guid()).to_value());
		}
		if let Some(code) = code {
			params.insert("code".into(), Value::String(code.to_string()));
		}
		let _: Value = self.base.call("run", &Value::Object(params)).await?;
		Ok(())
	}

	fn resolve_page(&self, guid: &GuidRef) -> Result<Arc<Page>> {
		let connection = self
			.base
			.connection()
			.ok_or_else(|| Error::ConnectionClosed {
				reason: "client connection dropped".into(),
			})?;
		let proxy = connection.resolve(&guid.guid)?;
		proxy
			.downcast_arc::<Page>()
			.map_err(|_| Error::ObjectNotFound {
				guid: guid.guid.to_string(),
			})
	}

	fn decode_event(&self, method: &str, params: Value) -> Result<Option<ApplicationEvent>> {
		Ok(match method {
			"attached" => {
				let event: AttachedEvent = serde_json::from_value(params)?;
				let page = self.resolve_page(&event.page)?;
				Some(ApplicationEvent::Attached {
					tab_id: event.tab_id,
					page,
				})
			}
			"detached" => {
				let event: DetachedEvent = serde_json::from_value(params)?;
				Some(ApplicationEvent::Detached {
					tab_id: event.tab_id,
				})
			}
			"modeChanged" => {
				let event: ModeChangedEvent = serde_json::from_value(params)?;
				Some(ApplicationEvent::ModeChanged { mode: event.mode })
			}
			"show" => Some(ApplicationEvent::Show),
			"hide" => Some(ApplicationEvent::Hide),
			_ => None,
		})
	}
}

impl Sealed for Application {}

impl Proxy for Application {
	fn base(&self) -> &ProxyBase {
		&self.base
	}

	fn on_event(&self, method: &str, params: Value) {
		match self.decode_event(method, params) {
			Ok(Some(event)) => self.events.emit(event),
			Ok(None) => {
				debug!(target: "tabwire::client", method, "unhandled application event");
			}
			Err(err) => {
				warn!(target: "tabwire::client", method, %err, "dropping malformed application event");
			}
		}
	}
}
