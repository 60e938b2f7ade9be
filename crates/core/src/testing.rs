//! Test doubles for the engine boundary.
//!
//! [`MockHost`] plays the automation engine: a scripted tab table, a
//! recording log of every engine call, and failure/delay injection for the
//! unhappy paths. Exported so embedding hosts can reuse the doubles in
//! their own tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::host::{BrowserHost, PageBinding, RecorderSurface};
use tabwire_protocol::{NewPageOptions, RecorderOptions, TabId, TabInfo};
use tabwire_runtime::{Error, Result};

/// One engine call observed by a [`MockHost`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
	Attach(TabId),
	Detach(TabId),
	Open { url: Option<String> },
	Run { tab_id: Option<TabId>, code: String },
}

/// One call observed by a [`MockRecorder`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderAction {
	Show(RecorderOptions),
	Update(RecorderOptions),
	Hide,
}

/// Scripted [`BrowserHost`] that records every engine call.
pub struct MockHost {
	tabs: Mutex<Vec<TabInfo>>,
	actions: Mutex<Vec<HostAction>>,
	recorder: Arc<MockRecorder>,
	next_tab_id: AtomicI32,
	fail_attach: Mutex<Option<String>>,
	fail_run: Mutex<Option<String>>,
	attach_delay: Mutex<Option<Duration>>,
}

impl MockHost {
	pub fn new() -> Arc<Self> {
		Self::with_tabs(Vec::new())
	}

	/// A host whose tab table starts with `tabs`.
	pub fn with_tabs(tabs: Vec<TabInfo>) -> Arc<Self> {
		let next = tabs.iter().map(|tab| tab.id).max().unwrap_or(0) + 1;
		Arc::new(Self {
			tabs: Mutex::new(tabs),
			actions: Mutex::new(Vec::new()),
			recorder: Arc::new(MockRecorder::default()),
			next_tab_id: AtomicI32::new(next),
			fail_attach: Mutex::new(None),
			fail_run: Mutex::new(None),
			attach_delay: Mutex::new(None),
		})
	}

	/// Adds a tab to the scripted table.
	pub fn add_tab(&self, tab: TabInfo) {
		self.next_tab_id.fetch_max(tab.id + 1, Ordering::SeqCst);
		self.tabs.lock().push(tab);
	}

	/// Every engine call recorded so far.
	pub fn actions(&self) -> Vec<HostAction> {
		self.actions.lock().clone()
	}

	/// The recorder double behind [`BrowserHost::recorder`].
	pub fn recorder_mock(&self) -> Arc<MockRecorder> {
		Arc::clone(&self.recorder)
	}

	/// Makes the next attach fail with an engine error.
	pub fn fail_next_attach(&self, message: &str) {
		*self.fail_attach.lock() = Some(message.to_string());
	}

	/// Makes the next script run fail with an engine error.
	pub fn fail_next_run(&self, message: &str) {
		*self.fail_run.lock() = Some(message.to_string());
	}

	/// Delays every attach, for exercising in-flight transport loss.
	pub fn set_attach_delay(&self, delay: Duration) {
		*self.attach_delay.lock() = Some(delay);
	}
}

#[async_trait]
impl BrowserHost for MockHost {
	async fn tabs(&self) -> Result<Vec<TabInfo>> {
		Ok(self.tabs.lock().clone())
	}

	async fn open_tab(&self, options: &NewPageOptions) -> Result<TabInfo> {
		let id = self.next_tab_id.fetch_add(1, Ordering::SeqCst);
		self.actions.lock().push(HostAction::Open {
			url: options.url.clone(),
		});
		let mut tab = TabInfo::new(id, options.url.clone().unwrap_or_default());
		if let Some(window_id) = options.window_id {
			tab = tab.with_window_id(window_id);
		}
		if let Some(index) = options.index {
			tab = tab.with_index(index);
		}
		if let Some(pinned) = options.pinned {
			tab = tab.with_pinned(pinned);
		}
		if let Some(active) = options.active {
			tab = tab.with_active(active);
		}
		self.tabs.lock().push(tab.clone());
		Ok(tab)
	}

	async fn attach_tab(&self, tab_id: TabId) -> Result<Arc<dyn PageBinding>> {
		let delay = *self.attach_delay.lock();
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}
		if let Some(message) = self.fail_attach.lock().take() {
			return Err(Error::Engine(message));
		}
		let url = self
			.tabs
			.lock()
			.iter()
			.find(|tab| tab.id == tab_id)
			.map(|tab| tab.url.clone())
			.ok_or_else(|| Error::Engine(format!("no tab with id {tab_id}")))?;
		self.actions.lock().push(HostAction::Attach(tab_id));
		Ok(Arc::new(MockPageBinding { tab_id, url }))
	}

	async fn detach_tab(&self, tab_id: TabId) -> Result<()> {
		self.actions.lock().push(HostAction::Detach(tab_id));
		Ok(())
	}

	fn recorder(&self) -> Arc<dyn RecorderSurface> {
		Arc::clone(&self.recorder) as Arc<dyn RecorderSurface>
	}

	async fn run_script(&self, page: Option<Arc<dyn PageBinding>>, code: &str) -> Result<()> {
		if let Some(message) = self.fail_run.lock().take() {
			return Err(Error::Engine(message));
		}
		self.actions.lock().push(HostAction::Run {
			tab_id: page.map(|page| page.tab_id()),
			code: code.to_string(),
		});
		Ok(())
	}
}

/// Recording [`RecorderSurface`] double.
#[derive(Default)]
pub struct MockRecorder {
	actions: Mutex<Vec<RecorderAction>>,
}

impl MockRecorder {
	/// Every recorder call recorded so far.
	pub fn actions(&self) -> Vec<RecorderAction> {
		self.actions.lock().clone()
	}
}

#[async_trait]
impl RecorderSurface for MockRecorder {
	async fn show(&self, options: &RecorderOptions) -> Result<()> {
		self.actions
			.lock()
			.push(RecorderAction::Show(options.clone()));
		Ok(())
	}

	async fn update(&self, options: &RecorderOptions) -> Result<()> {
		self.actions
			.lock()
			.push(RecorderAction::Update(options.clone()));
		Ok(())
	}

	async fn hide(&self) -> Result<()> {
		self.actions.lock().push(RecorderAction::Hide);
		Ok(())
	}
}

/// Inert page binding handed out by [`MockHost::attach_tab`].
pub struct MockPageBinding {
	tab_id: TabId,
	url: String,
}

impl PageBinding for MockPageBinding {
	fn tab_id(&self) -> TabId {
		self.tab_id
	}

	fn url(&self) -> String {
		self.url.clone()
	}
}
