//! Application dispatcher - the wire face of one [`Session`].

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;

use super::context::ContextDispatcher;
use super::page::PageDispatcher;
use super::{APPLICATION_GUID, decode};
use crate::events::EventStream;
use crate::host::PageBinding;
use crate::session::{Session, SessionEvent};
use tabwire_protocol::{GuidRef, InteractionMode, NewPageOptions, RecorderOptions, TabFilter, TabId};
use tabwire_runtime::dispatch::dispatcher::private::Sealed;
use tabwire_runtime::{Dispatcher, DispatcherBase, DispatcherConnection, Error, Result, VerbFuture};

/// The closed verb table of the application node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApplicationVerb {
	Attach,
	AttachAll,
	Detach,
	DetachAll,
	NewPage,
	SetMode,
	ShowRecorder,
	HideRecorder,
	Close,
	List,
	Load,
	Run,
}

impl FromStr for ApplicationVerb {
	type Err = Error;

	fn from_str(method: &str) -> Result<Self> {
		Ok(match method {
			"attach" => Self::Attach,
			"attachAll" => Self::AttachAll,
			"detach" => Self::Detach,
			"detachAll" => Self::DetachAll,
			"newPage" => Self::NewPage,
			"setMode" => Self::SetMode,
			"showRecorder" => Self::ShowRecorder,
			"hideRecorder" => Self::HideRecorder,
			"close" => Self::Close,
			"list" => Self::List,
			"load" => Self::Load,
			"run" => Self::Run,
			_ => return Err(Error::unknown_method("Application", method)),
		})
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachParams {
	tab_id: TabId,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DetachParams {
	tab_id: Option<TabId>,
	page: Option<GuidRef>,
}

#[derive(Debug, Deserialize)]
struct SetModeParams {
	mode: InteractionMode,
}

#[derive(Debug, Deserialize)]
struct CodeParams {
	code: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RunParams {
	page: Option<GuidRef>,
	code: Option<String>,
}

/// Server node for the session surface: verbs in, session events out.
///
/// Owns the page dispatcher registry keyed by tab id. Page nodes are
/// published under one lock from both reaction paths (a verb's own attach
/// effect and the event pump observing it), so each attach yields exactly
/// one `__create__`, and always before any envelope referencing the guid.
pub struct ApplicationDispatcher {
	base: DispatcherBase,
	session: Arc<Session>,
	context: Mutex<Option<Arc<ContextDispatcher>>>,
	pages: Mutex<HashMap<TabId, Arc<PageDispatcher>>>,
	pump: Mutex<Option<JoinHandle<()>>>,
}

impl ApplicationDispatcher {
	/// Publishes the application node and its context, in that order, and
	/// starts the pump forwarding session events to the wire.
	pub fn publish(connection: &Arc<DispatcherConnection>, session: Arc<Session>) -> Arc<Self> {
		let application = Arc::new(Self {
			base: DispatcherBase::new(
				connection,
				None,
				"Application",
				Arc::from(APPLICATION_GUID),
				json!({}),
			),
			session,
			context: Mutex::new(None),
			pages: Mutex::new(HashMap::new()),
			pump: Mutex::new(None),
		});
		connection.publish(Arc::clone(&application) as Arc<dyn Dispatcher>);

		let parent: Arc<dyn Dispatcher> = Arc::clone(&application) as Arc<dyn Dispatcher>;
		let context = ContextDispatcher::publish(connection, &parent);
		*application.context.lock() = Some(context);

		let pump = tokio::spawn(Self::pump_events(
			Arc::downgrade(&application),
			application.session.subscribe(),
		));
		*application.pump.lock() = Some(pump);
		application
	}

	pub fn session(&self) -> &Arc<Session> {
		&self.session
	}

	async fn pump_events(application: Weak<Self>, mut events: EventStream<SessionEvent>) {
		while let Some(event) = events.recv().await {
			let Some(application) = application.upgrade() else {
				return;
			};
			application.forward_event(event);
		}
	}

	fn forward_event(&self, event: SessionEvent) {
		match event {
			SessionEvent::Attached { tab_id, page } => {
				let Some(dispatcher) = self.ensure_page(tab_id, page) else {
					return;
				};
				self.base.emit_event(
					"attached",
					json!({
						"page": GuidRef::new(dispatcher.guid()).to_value(),
						"tabId": tab_id,
					}),
				);
			}
			SessionEvent::Detached { tab_id } => {
				// Announce first; observers may still resolve the page
				// while handling the event.
				self.base.emit_event("detached", json!({ "tabId": tab_id }));
				self.drop_page(tab_id);
			}
			SessionEvent::ModeChanged { mode } => {
				self.base.emit_event("modeChanged", json!({ "mode": mode }));
			}
			SessionEvent::Show => self.base.emit_event("show", json!({})),
			SessionEvent::Hide => self.base.emit_event("hide", json!({})),
		}
	}

	/// The page node for `tab_id`, published first if the tab has none yet.
	fn ensure_page(
		&self,
		tab_id: TabId,
		binding: Arc<dyn PageBinding>,
	) -> Option<Arc<PageDispatcher>> {
		let mut pages = self.pages.lock();
		if let Some(existing) = pages.get(&tab_id) {
			return Some(Arc::clone(existing));
		}
		let connection = self.base.connection()?;
		let context = self.context.lock().clone()?;
		let parent: Arc<dyn Dispatcher> = context;
		let dispatcher = PageDispatcher::publish(
			&connection,
			&parent,
			tab_id,
			binding,
			Arc::clone(&self.session),
		);
		pages.insert(tab_id, Arc::clone(&dispatcher));
		Some(dispatcher)
	}

	fn drop_page(&self, tab_id: TabId) {
		let dispatcher = self.pages.lock().remove(&tab_id);
		if let (Some(dispatcher), Some(connection)) = (dispatcher, self.base.connection()) {
			let dispatcher: Arc<dyn Dispatcher> = dispatcher;
			connection.dispose(&dispatcher);
		}
	}

	fn page_node(
		&self,
		tab_id: TabId,
		binding: Arc<dyn PageBinding>,
	) -> Result<Arc<PageDispatcher>> {
		self.ensure_page(tab_id, binding)
			.ok_or_else(|| Error::ConnectionClosed {
				reason: "connection dropped".into(),
			})
	}

	fn tab_for_guid(&self, guid: &str) -> Option<TabId> {
		self.pages
			.lock()
			.iter()
			.find_map(|(tab_id, page)| (page.guid() == guid).then_some(*tab_id))
	}

	async fn verb_attach(&self, params: Value) -> Result<Value> {
		let params: AttachParams = decode("attach", params)?;
		let page = self.session.attach(params.tab_id).await?;
		let dispatcher = self.page_node(params.tab_id, page)?;
		Ok(json!({ "page": GuidRef::new(dispatcher.guid()).to_value() }))
	}

	async fn verb_attach_all(&self, params: Value) -> Result<Value> {
		let filter: TabFilter = decode("attachAll", params)?;
		let pages = self.session.attach_all(&filter).await?;
		let refs = pages
			.into_iter()
			.map(|page| {
				let dispatcher = self.page_node(page.tab_id(), page)?;
				Ok(GuidRef::new(dispatcher.guid()).to_value())
			})
			.collect::<Result<Vec<Value>>>()?;
		Ok(json!({ "pages": refs }))
	}

	async fn verb_detach(&self, params: Value) -> Result<Value> {
		let params: DetachParams = decode("detach", params)?;
		let tab_id = match (params.tab_id, params.page) {
			(Some(tab_id), _) => Some(tab_id),
			// A guid for a page we no longer hold detaches nothing.
			(None, Some(page)) => self.tab_for_guid(&page.guid),
			(None, None) => {
				return Err(Error::invalid_params_msg(
					"detach",
					"either tabId or page is required",
				));
			}
		};
		if let Some(tab_id) = tab_id {
			self.session.detach(tab_id).await?;
		}
		Ok(json!({}))
	}

	async fn verb_new_page(&self, params: Value) -> Result<Value> {
		let options: NewPageOptions = decode("newPage", params)?;
		let page = self.session.new_page(&options).await?;
		let dispatcher = self.page_node(page.tab_id(), page)?;
		Ok(json!({ "page": GuidRef::new(dispatcher.guid()).to_value() }))
	}

	async fn verb_set_mode(&self, params: Value) -> Result<Value> {
		let params: SetModeParams = decode("setMode", params)?;
		self.session.set_mode(params.mode).await?;
		Ok(json!({}))
	}

	async fn verb_show_recorder(&self, params: Value) -> Result<Value> {
		let options: RecorderOptions = decode("showRecorder", params)?;
		self.session.show_recorder(&options).await?;
		Ok(json!({}))
	}

	async fn verb_close(self: &Arc<Self>) -> Result<Value> {
		self.session.close().await?;
		if let Some(connection) = self.base.connection() {
			let this: Arc<dyn Dispatcher> = Arc::clone(self) as Arc<dyn Dispatcher>;
			connection.dispose(&this);
		}
		Ok(json!({}))
	}

	async fn verb_list(&self, params: Value) -> Result<Value> {
		let params: CodeParams = decode("list", params)?;
		let tests = self.session.list(&params.code).await?;
		Ok(json!({ "tests": tests }))
	}

	async fn verb_load(&self, params: Value) -> Result<Value> {
		let params: CodeParams = decode("load", params)?;
		self.session.load(&params.code).await?;
		Ok(json!({}))
	}

	async fn verb_run(&self, params: Value) -> Result<Value> {
		let params: RunParams = decode("run", params)?;
		let target = match params.page {
			Some(page) => Some(
				self.tab_for_guid(&page.guid)
					.ok_or_else(|| Error::unknown_target(&*page.guid))?,
			),
			None => None,
		};
		self.session.run(target, params.code.as_deref()).await?;
		Ok(json!({}))
	}
}

impl Sealed for ApplicationDispatcher {}

impl Dispatcher for ApplicationDispatcher {
	fn base(&self) -> &DispatcherBase {
		&self.base
	}

	fn handle(self: Arc<Self>, method: String, params: Value) -> VerbFuture {
		Box::pin(async move {
			match method.parse::<ApplicationVerb>()? {
				ApplicationVerb::Attach => self.verb_attach(params).await,
				ApplicationVerb::AttachAll => self.verb_attach_all(params).await,
				ApplicationVerb::Detach => self.verb_detach(params).await,
				ApplicationVerb::DetachAll => {
					self.session.detach_all().await?;
					Ok(json!({}))
				}
				ApplicationVerb::NewPage => self.verb_new_page(params).await,
				ApplicationVerb::SetMode => self.verb_set_mode(params).await,
				ApplicationVerb::ShowRecorder => self.verb_show_recorder(params).await,
				ApplicationVerb::HideRecorder => {
					self.session.hide_recorder().await?;
					Ok(json!({}))
				}
				ApplicationVerb::Close => self.verb_close().await,
				ApplicationVerb::List => self.verb_list(params).await,
				ApplicationVerb::Load => self.verb_load(params).await,
				ApplicationVerb::Run => self.verb_run(params).await,
			}
		})
	}

	fn on_dispose(&self) {
		if let Some(pump) = self.pump.lock().take() {
			pump.abort();
		}
		self.pages.lock().clear();
		*self.context.lock() = None;
	}
}
