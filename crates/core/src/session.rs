//! Session manager - tab attachment, interaction mode, recorder lifecycle.
//!
//! A [`Session`] owns one driver's view of the browser: which tabs carry an
//! automation page, the current [`InteractionMode`], whether the recorder
//! surface is up, and the script staged for execution. All of it sits
//! behind one async mutex, so every operation is atomic across its engine
//! awaits - callers never observe a half-applied attach or a page-less tab.
//!
//! State changes are announced on a session event bus ([`SessionEvent`]);
//! the application dispatcher forwards them to the wire, and embedding
//! hosts may subscribe directly.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::events::{EventBus, EventStream, EventWaiter};
use crate::filter::tab_matches;
use crate::host::{BrowserHost, PageBinding};
use crate::script::parse_tests;
use tabwire_protocol::{
	InteractionMode, NewPageOptions, RecorderOptions, TabFilter, TabId, TabInfo, TestDescriptor,
};
use tabwire_runtime::{Error, Result};

/// Tunables fixed at session construction.
#[derive(Debug, Clone)]
pub struct SessionOptions {
	/// URL opened by `new_page` when the caller names none.
	pub default_url: String,
	/// Broadcast capacity of the session event bus.
	pub event_capacity: usize,
}

impl Default for SessionOptions {
	fn default() -> Self {
		Self {
			default_url: "about:blank".to_string(),
			event_capacity: 256,
		}
	}
}

/// State change announced by a session.
#[derive(Clone)]
pub enum SessionEvent {
	Attached {
		tab_id: TabId,
		page: Arc<dyn PageBinding>,
	},
	Detached {
		tab_id: TabId,
	},
	ModeChanged {
		mode: InteractionMode,
	},
	Show,
	Hide,
}

impl std::fmt::Debug for SessionEvent {
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

struct StagedScript {
	code: String,
	tests: Vec<TestDescriptor>,
}

struct SessionState {
	tabs: BTreeMap<TabId, Arc<dyn PageBinding>>,
	mode: InteractionMode,
	recorder_visible: bool,
	recorder_config: RecorderOptions,
	staged: Option<StagedScript>,
}

/// One driver's attachment/mode state over a set of browser tabs.
pub struct Session {
	host: Arc<dyn BrowserHost>,
	options: SessionOptions,
	events: EventBus<SessionEvent>,
	state: Mutex<SessionState>,
	closed: AtomicBool,
}

impl Session {
	pub fn new(host: Arc<dyn BrowserHost>, options: SessionOptions) -> Arc<Self> {
		let events = EventBus::new(options.event_capacity);
		Arc::new(Self {
			host,
			options,
			events,
			state: Mutex::new(SessionState {
				tabs: BTreeMap::new(),
				mode: InteractionMode::None,
				recorder_visible: false,
				recorder_config: RecorderOptions::default(),
				staged: None,
			}),
			closed: AtomicBool::new(false),
		})
	}

	/// Subscribes to all future session events.
	pub fn subscribe(&self) -> EventStream<SessionEvent> {
		self.events.subscribe()
	}

	/// Waits for the first session event matching `predicate`.
	pub fn wait_for_event<F>(&self, predicate: F, timeout: Duration) -> EventWaiter<SessionEvent>
	where
		F: Fn(&SessionEvent) -> bool + Send + Sync + 'static,
	{
		self.events.wait_for(predicate, timeout)
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Binds an automation page to `tab_id`.
	///
	/// Re-attaching an already-attached tab is a no-op returning the
	/// existing page; only a first attach emits `Attached`.
	pub async fn attach(&self, tab_id: TabId) -> Result<Arc<dyn PageBinding>> {
		let mut state = self.lock().await?;
		if let Some(existing) = state.tabs.get(&tab_id) {
			return Ok(Arc::clone(existing));
		}
		let page = self.host.attach_tab(tab_id).await?;
		state.tabs.insert(tab_id, Arc::clone(&page));
		debug!(target: "tabwire::session", tab_id, "tab attached");
		self.events.emit(SessionEvent::Attached {
			tab_id,
			page: Arc::clone(&page),
		});
		Ok(page)
	}

	/// Attaches every tab matching `filter` that is not attached yet.
	///
	/// Returns the pages attached by this call, in tab order. Bulk attach
	/// never fails part-way: already-attached tabs and tabs the engine
	/// refuses are skipped, not errored.
	pub async fn attach_all(&self, filter: &TabFilter) -> Result<Vec<Arc<dyn PageBinding>>> {
		let mut state = self.lock().await?;
		let tabs = self.host.tabs().await?;
		let mut attached = Vec::new();
		for tab in tabs {
			if !tab_matches(filter, &tab) || state.tabs.contains_key(&tab.id) {
				continue;
			}
			let page = match self.host.attach_tab(tab.id).await {
				Ok(page) => page,
				Err(err) => {
					warn!(target: "tabwire::session", tab_id = tab.id, %err, "skipping tab that failed to attach");
					continue;
				}
			};
			state.tabs.insert(tab.id, Arc::clone(&page));
			self.events.emit(SessionEvent::Attached {
				tab_id: tab.id,
				page: Arc::clone(&page),
			});
			attached.push(page);
		}
		debug!(target: "tabwire::session", count = attached.len(), "bulk attach");
		Ok(attached)
	}

	/// Releases the page bound to `tab_id`. No-op if it is not attached.
	pub async fn detach(&self, tab_id: TabId) -> Result<()> {
		let mut state = self.lock().await?;
		self.detach_locked(&mut state, tab_id).await
	}

	/// Detaches every attached tab, emitting one `Detached` per tab.
	pub async fn detach_all(&self) -> Result<()> {
		let mut state = self.lock().await?;
		let tab_ids: Vec<TabId> = state.tabs.keys().copied().collect();
		for tab_id in tab_ids {
			self.detach_locked(&mut state, tab_id).await?;
		}
		Ok(())
	}

	async fn detach_locked(
		&self,
		state: &mut MutexGuard<'_, SessionState>,
		tab_id: TabId,
	) -> Result<()> {
		if !state.tabs.contains_key(&tab_id) {
			return Ok(());
		}
		self.host.detach_tab(tab_id).await?;
		state.tabs.remove(&tab_id);
		debug!(target: "tabwire::session", tab_id, "tab detached");
		self.events.emit(SessionEvent::Detached { tab_id });
		Ok(())
	}

	/// Opens a fresh tab and attaches it in one atomic step.
	pub async fn new_page(&self, options: &NewPageOptions) -> Result<Arc<dyn PageBinding>> {
		let mut state = self.lock().await?;
		let mut options = options.clone();
		if options.url.is_none() {
			options.url = Some(self.options.default_url.clone());
		}
		let tab = self.host.open_tab(&options).await?;
		let page = self.host.attach_tab(tab.id).await?;
		state.tabs.insert(tab.id, Arc::clone(&page));
		debug!(target: "tabwire::session", tab_id = tab.id, url = %tab.url, "page opened");
		self.events.emit(SessionEvent::Attached {
			tab_id: tab.id,
			page: Arc::clone(&page),
		});
		Ok(page)
	}

	/// Transitions the interaction mode, emitting `ModeChanged` when the
	/// landed mode differs from the current one.
	pub async fn set_mode(&self, mode: InteractionMode) -> Result<()> {
		let mut state = self.lock().await?;
		self.apply_mode(&mut state, mode)
	}

	// The mode set is flat except for the combined recording-inspecting
	// state: it is reachable only from recording, and leaving it through
	// either of its components (or none) lands on none.
	fn apply_mode(
		&self,
		state: &mut MutexGuard<'_, SessionState>,
		target: InteractionMode,
	) -> Result<()> {
		use InteractionMode as Mode;
		if target == state.mode {
			return Ok(());
		}
		if target == Mode::RecordingInspecting && state.mode != Mode::Recording {
			return Err(Error::invalid_params_msg(
				"setMode",
				format!("cannot enter recording-inspecting from {}", state.mode),
			));
		}
		let landed = if state.mode == Mode::RecordingInspecting
			&& matches!(target, Mode::None | Mode::Recording | Mode::Inspecting)
		{
			Mode::None
		} else {
			target
		};
		if landed == state.mode {
			return Ok(());
		}
		state.mode = landed;
		debug!(target: "tabwire::session", mode = %landed, "interaction mode changed");
		self.events.emit(SessionEvent::ModeChanged { mode: landed });
		Ok(())
	}

	/// Shows the recorder surface, or reconfigures it if already visible.
	///
	/// A requested mode is applied through the regular mode machine, so a
	/// `ModeChanged` accompanies the `Show` only when the mode actually
	/// changes. Re-showing never emits a duplicate `Show`.
	pub async fn show_recorder(&self, options: &RecorderOptions) -> Result<()> {
		let mut state = self.lock().await?;
		let recorder = self.host.recorder();
		if state.recorder_visible {
			recorder.update(options).await?;
			merge_recorder_config(&mut state.recorder_config, options);
			debug!(target: "tabwire::session", "recorder reconfigured");
		} else {
			recorder.show(options).await?;
			state.recorder_visible = true;
			state.recorder_config = options.clone();
			debug!(target: "tabwire::session", "recorder shown");
			self.events.emit(SessionEvent::Show);
		}
		if let Some(mode) = options.mode {
			self.apply_mode(&mut state, mode)?;
		}
		Ok(())
	}

	/// Hides the recorder surface. No-op if it is already hidden.
	///
	/// The mode falls back to `none` before the surface goes away.
	pub async fn hide_recorder(&self) -> Result<()> {
		let mut state = self.lock().await?;
		if !state.recorder_visible {
			return Ok(());
		}
		self.apply_mode(&mut state, InteractionMode::None)?;
		self.host.recorder().hide().await?;
		state.recorder_visible = false;
		debug!(target: "tabwire::session", "recorder hidden");
		self.events.emit(SessionEvent::Hide);
		Ok(())
	}

	/// Tears the session down: every tab detached, the recorder hidden.
	///
	/// Terminal - any operation after a successful close (including a
	/// second close) fails with [`Error::SessionClosed`]. Engine refusals
	/// during teardown are logged, never propagated part-way.
	pub async fn close(&self) -> Result<()> {
		let mut state = self.state.lock().await;
		if self.closed.load(Ordering::SeqCst) {
			return Err(Error::SessionClosed);
		}
		let tab_ids: Vec<TabId> = state.tabs.keys().copied().collect();
		for tab_id in tab_ids {
			if let Err(err) = self.host.detach_tab(tab_id).await {
				warn!(target: "tabwire::session", tab_id, %err, "detach during close failed");
			}
			state.tabs.remove(&tab_id);
			self.events.emit(SessionEvent::Detached { tab_id });
		}
		if state.recorder_visible {
			if state.mode != InteractionMode::None {
				state.mode = InteractionMode::None;
				self.events.emit(SessionEvent::ModeChanged {
					mode: InteractionMode::None,
				});
			}
			if let Err(err) = self.host.recorder().hide().await {
				warn!(target: "tabwire::session", %err, "recorder hide during close failed");
			}
			state.recorder_visible = false;
			self.events.emit(SessionEvent::Hide);
		}
		state.staged = None;
		self.closed.store(true, Ordering::SeqCst);
		debug!(target: "tabwire::session", "session closed");
		Ok(())
	}

	/// Parses `code` into test descriptors without executing anything.
	pub async fn list(&self, code: &str) -> Result<Vec<TestDescriptor>> {
		self.ensure_open()?;
		Ok(parse_tests(code))
	}

	/// Parses `code` and stages it for a later [`run`](Self::run) with no
	/// inline code.
	pub async fn load(&self, code: &str) -> Result<Vec<TestDescriptor>> {
		let mut state = self.lock().await?;
		let tests = parse_tests(code);
		debug!(target: "tabwire::session", count = tests.len(), "script staged");
		state.staged = Some(StagedScript {
			code: code.to_string(),
			tests: tests.clone(),
		});
		Ok(tests)
	}

	/// Executes a script against the page bound to `target`, or against the
	/// whole context when `target` is `None`.
	///
	/// With no inline `code`, the script staged by [`load`](Self::load)
	/// runs; staging nothing first is a params error.
	pub async fn run(&self, target: Option<TabId>, code: Option<&str>) -> Result<()> {
		let state = self.lock().await?;
		let page = match target {
			Some(tab_id) => Some(
				state
					.tabs
					.get(&tab_id)
					.cloned()
					.ok_or(Error::PageNotAttached { tab_id })?,
			),
			None => None,
		};
		let code = match code {
			Some(code) => code.to_string(),
			None => state
				.staged
				.as_ref()
				.map(|script| script.code.clone())
				.ok_or_else(|| {
					Error::invalid_params_msg("run", "no code given and no script loaded")
				})?,
		};
		debug!(target: "tabwire::session", tab_id = ?target, "running script");
		self.host.run_script(page, &code).await
	}

	/// Current engine metadata for an attached tab.
	///
	/// Fails with [`Error::PageNotAttached`] when the tab is not attached,
	/// or when the engine no longer lists it.
	pub async fn describe(&self, tab_id: TabId) -> Result<TabInfo> {
		self.ensure_open()?;
		if self.page(tab_id).await.is_none() {
			return Err(Error::PageNotAttached { tab_id });
		}
		self.host
			.tabs()
			.await?
			.into_iter()
			.find(|tab| tab.id == tab_id)
			.ok_or(Error::PageNotAttached { tab_id })
	}

	/// The page bound to `tab_id`, if attached.
	pub async fn page(&self, tab_id: TabId) -> Option<Arc<dyn PageBinding>> {
		self.state.lock().await.tabs.get(&tab_id).cloned()
	}

	/// Currently attached tab ids, ascending.
	pub async fn attached_tabs(&self) -> Vec<TabId> {
		self.state.lock().await.tabs.keys().copied().collect()
	}

	pub async fn mode(&self) -> InteractionMode {
		self.state.lock().await.mode
	}

	pub async fn recorder_visible(&self) -> bool {
		self.state.lock().await.recorder_visible
	}

	/// Effective recorder configuration, as accumulated by show/re-show.
	pub async fn recorder_config(&self) -> RecorderOptions {
		self.state.lock().await.recorder_config.clone()
	}

	/// Test descriptors staged by the last [`load`](Self::load), if any.
	pub async fn staged_tests(&self) -> Option<Vec<TestDescriptor>> {
		self.state
			.lock()
			.await
			.staged
			.as_ref()
			.map(|script| script.tests.clone())
	}

	fn ensure_open(&self) -> Result<()> {
		if self.is_closed() {
			return Err(Error::SessionClosed);
		}
		Ok(())
	}

	async fn lock(&self) -> Result<MutexGuard<'_, SessionState>> {
		let state = self.state.lock().await;
		self.ensure_open()?;
		Ok(state)
	}
}

fn merge_recorder_config(config: &mut RecorderOptions, update: &RecorderOptions) {
	if update.mode.is_some() {
		config.mode = update.mode;
	}
	if update.language.is_some() {
		config.language = update.language.clone();
	}
	if update.test_id_attribute_name.is_some() {
		config.test_id_attribute_name = update.test_id_attribute_name.clone();
	}
	if update.play_in_incognito.is_some() {
		config.play_in_incognito = update.play_in_incognito;
	}
	if update.window.is_some() {
		config.window = update.window.clone();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{HostAction, MockHost, RecorderAction};

	fn fixture() -> Arc<MockHost> {
		MockHost::with_tabs(vec![
			TabInfo::new(1, "https://a.example.com/").with_active(true),
			TabInfo::new(2, "https://b.example.com/login"),
			TabInfo::new(3, "https://c.example.com/").with_pinned(true),
		])
	}

	fn drain(stream: &mut EventStream<SessionEvent>) -> Vec<SessionEvent> {
		let mut events = Vec::new();
		while let Some(event) = stream.try_recv() {
			events.push(event);
		}
		events
	}

	#[tokio::test]
	async fn attach_is_idempotent_and_emits_once() {
		let host = fixture();
		let session = Session::new(host.clone(), SessionOptions::default());
		let mut stream = session.subscribe();

		let first = session.attach(1).await.unwrap();
		let second = session.attach(1).await.unwrap();

		assert_eq!(first.tab_id(), second.tab_id());
		assert!(Arc::ptr_eq(&first, &second));
		let events = drain(&mut stream);
		assert_eq!(events.len(), 1);
		assert!(matches!(events[0], SessionEvent::Attached { tab_id: 1, .. }));
		// The engine saw exactly one attach.
		assert_eq!(host.actions(), vec![HostAction::Attach(1)]);
	}

	#[tokio::test]
	async fn detach_clears_the_map_and_tolerates_unknown_tabs() {
		let host = fixture();
		let session = Session::new(host.clone(), SessionOptions::default());
		let mut stream = session.subscribe();

		session.attach(1).await.unwrap();
		session.detach(1).await.unwrap();
		assert!(session.attached_tabs().await.is_empty());

		// Detaching again, or a tab never attached, is a silent no-op.
		session.detach(1).await.unwrap();
		session.detach(99).await.unwrap();

		let events = drain(&mut stream);
		assert_eq!(events.len(), 2);
		assert!(matches!(events[1], SessionEvent::Detached { tab_id: 1 }));
	}

	#[tokio::test]
	async fn attach_all_filters_and_skips_already_attached() {
		let host = fixture();
		let session = Session::new(host.clone(), SessionOptions::default());

		session.attach(2).await.unwrap();
		let filter = TabFilter {
			url: Some(vec!["https://*.example.com/*".into()]),
			..Default::default()
		};
		let pages = session.attach_all(&filter).await.unwrap();

		// Tab 2 was already attached; only 1 and 3 are new, in tab order.
		let ids: Vec<TabId> = pages.iter().map(|page| page.tab_id()).collect();
		assert_eq!(ids, vec![1, 3]);
		assert_eq!(session.attached_tabs().await, vec![1, 2, 3]);
	}

	#[tokio::test]
	async fn attach_all_never_fails_part_way() {
		let host = fixture();
		host.fail_next_attach("tab crashed");
		let session = Session::new(host.clone(), SessionOptions::default());

		let pages = session.attach_all(&TabFilter::default()).await.unwrap();

		// The first tab failed to attach and was skipped like an unmatched one.
		let ids: Vec<TabId> = pages.iter().map(|page| page.tab_id()).collect();
		assert_eq!(ids, vec![2, 3]);
	}

	#[tokio::test]
	async fn new_page_is_atomic() {
		let host = fixture();
		let session = Session::new(host.clone(), SessionOptions::default());
		let mut stream = session.subscribe();

		let page = session
			.new_page(&NewPageOptions {
				url: Some("https://fresh.example.com/".into()),
				..Default::default()
			})
			.await
			.unwrap();

		// The owning tab is in the map immediately, not after a poll.
		assert!(session.page(page.tab_id()).await.is_some());
		assert_eq!(drain(&mut stream).len(), 1);
		assert_eq!(
			host.actions(),
			vec![
				HostAction::Open {
					url: Some("https://fresh.example.com/".into())
				},
				HostAction::Attach(page.tab_id()),
			]
		);
	}

	#[tokio::test]
	async fn new_page_fills_the_default_url() {
		let host = fixture();
		let session = Session::new(host.clone(), SessionOptions::default());
		session.new_page(&NewPageOptions::default()).await.unwrap();
		assert!(host.actions().contains(&HostAction::Open {
			url: Some("about:blank".into())
		}));
	}

	#[tokio::test]
	async fn set_mode_emits_once_per_change() {
		let host = fixture();
		let session = Session::new(host, SessionOptions::default());
		let mut stream = session.subscribe();

		session.set_mode(InteractionMode::Recording).await.unwrap();
		session.set_mode(InteractionMode::Recording).await.unwrap();

		let events = drain(&mut stream);
		assert_eq!(events.len(), 1);
		assert!(matches!(
			events[0],
			SessionEvent::ModeChanged {
				mode: InteractionMode::Recording
			}
		));
		assert_eq!(session.mode().await, InteractionMode::Recording);
	}

	#[tokio::test]
	async fn combined_mode_is_only_reachable_from_recording() {
		let host = fixture();
		let session = Session::new(host, SessionOptions::default());

		let err = session
			.set_mode(InteractionMode::RecordingInspecting)
			.await
			.unwrap_err();
		assert!(err.is_invalid_params());

		session.set_mode(InteractionMode::Recording).await.unwrap();
		session
			.set_mode(InteractionMode::RecordingInspecting)
			.await
			.unwrap();
		assert_eq!(session.mode().await, InteractionMode::RecordingInspecting);
	}

	#[tokio::test]
	async fn leaving_combined_mode_lands_on_none() {
		for exit in [
			InteractionMode::None,
			InteractionMode::Recording,
			InteractionMode::Inspecting,
		] {
			let session = Session::new(fixture(), SessionOptions::default());
			session.set_mode(InteractionMode::Recording).await.unwrap();
			session
				.set_mode(InteractionMode::RecordingInspecting)
				.await
				.unwrap();
			session.set_mode(exit).await.unwrap();
			assert_eq!(session.mode().await, InteractionMode::None, "exit via {exit}");
		}

		// Any other target is taken literally.
		let session = Session::new(fixture(), SessionOptions::default());
		session.set_mode(InteractionMode::Recording).await.unwrap();
		session
			.set_mode(InteractionMode::RecordingInspecting)
			.await
			.unwrap();
		session.set_mode(InteractionMode::Standby).await.unwrap();
		assert_eq!(session.mode().await, InteractionMode::Standby);
	}

	#[tokio::test]
	async fn recorder_show_is_idempotent_and_reconfigures() {
		let host = fixture();
		let session = Session::new(host.clone(), SessionOptions::default());
		let mut stream = session.subscribe();

		session
			.show_recorder(&RecorderOptions {
				language: Some("javascript".into()),
				..Default::default()
			})
			.await
			.unwrap();
		session
			.show_recorder(&RecorderOptions {
				language: Some("python".into()),
				..Default::default()
			})
			.await
			.unwrap();

		let shows = drain(&mut stream)
			.iter()
			.filter(|event| matches!(event, SessionEvent::Show))
			.count();
		assert_eq!(shows, 1);
		assert_eq!(
			session.recorder_config().await.language.as_deref(),
			Some("python")
		);
		let recorder = host.recorder_mock();
		assert!(matches!(recorder.actions()[0], RecorderAction::Show(_)));
		assert!(matches!(recorder.actions()[1], RecorderAction::Update(_)));
	}

	#[tokio::test]
	async fn show_recorder_routes_mode_through_the_machine() {
		let host = fixture();
		let session = Session::new(host, SessionOptions::default());
		let mut stream = session.subscribe();

		session
			.show_recorder(&RecorderOptions {
				mode: Some(InteractionMode::Recording),
				..Default::default()
			})
			.await
			.unwrap();
		// Same mode again: Show already emitted, no second ModeChanged.
		session
			.show_recorder(&RecorderOptions {
				mode: Some(InteractionMode::Recording),
				..Default::default()
			})
			.await
			.unwrap();

		let events = drain(&mut stream);
		let mode_changes = events
			.iter()
			.filter(|event| matches!(event, SessionEvent::ModeChanged { .. }))
			.count();
		assert_eq!(mode_changes, 1);
		assert_eq!(session.mode().await, InteractionMode::Recording);
	}

	#[tokio::test]
	async fn hide_recorder_resets_mode_and_is_idempotent() {
		let host = fixture();
		let session = Session::new(host.clone(), SessionOptions::default());

		// Hiding while hidden emits nothing and skips the engine.
		session.hide_recorder().await.unwrap();
		assert!(host.recorder_mock().actions().is_empty());

		session
			.show_recorder(&RecorderOptions {
				mode: Some(InteractionMode::Recording),
				..Default::default()
			})
			.await
			.unwrap();
		let mut stream = session.subscribe();
		session.hide_recorder().await.unwrap();

		let events = drain(&mut stream);
		assert!(matches!(
			events[0],
			SessionEvent::ModeChanged {
				mode: InteractionMode::None
			}
		));
		assert!(matches!(events[1], SessionEvent::Hide));
		assert!(!session.recorder_visible().await);
	}

	#[tokio::test]
	async fn close_is_terminal() {
		let host = fixture();
		let session = Session::new(host.clone(), SessionOptions::default());
		session.attach(1).await.unwrap();
		session.attach(2).await.unwrap();
		session
			.show_recorder(&RecorderOptions::default())
			.await
			.unwrap();
		let mut stream = session.subscribe();

		session.close().await.unwrap();

		let events = drain(&mut stream);
		let detached = events
			.iter()
			.filter(|event| matches!(event, SessionEvent::Detached { .. }))
			.count();
		assert_eq!(detached, 2);
		assert!(events.iter().any(|event| matches!(event, SessionEvent::Hide)));

		assert!(session.close().await.unwrap_err().is_session_closed());
		assert!(session.attach(3).await.unwrap_err().is_session_closed());
		assert!(
			session
				.set_mode(InteractionMode::Recording)
				.await
				.unwrap_err()
				.is_session_closed()
		);
		assert!(session.list("").await.unwrap_err().is_session_closed());
	}

	#[tokio::test]
	async fn run_uses_staged_code_and_validates_targets() {
		let host = fixture();
		let session = Session::new(host.clone(), SessionOptions::default());

		// Nothing staged and no inline code.
		let err = session.run(None, None).await.unwrap_err();
		assert!(err.is_invalid_params());

		let code = "test('stub', () => {});";
		let tests = session.load(code).await.unwrap();
		assert_eq!(tests.len(), 1);
		session.run(None, None).await.unwrap();
		assert_eq!(
			host.actions(),
			vec![HostAction::Run {
				tab_id: None,
				code: code.into()
			}]
		);

		// A target that is not attached is rejected before execution.
		let err = session.run(Some(1), None).await.unwrap_err();
		assert!(err.is_page_not_attached());

		session.attach(1).await.unwrap();
		session.run(Some(1), Some("other")).await.unwrap();
		assert!(host.actions().contains(&HostAction::Run {
			tab_id: Some(1),
			code: "other".into()
		}));
	}

	#[tokio::test]
	async fn list_parses_without_staging() {
		let session = Session::new(fixture(), SessionOptions::default());
		let tests = session.list("test('a', () => {});").await.unwrap();
		assert_eq!(tests.len(), 1);
		assert!(session.staged_tests().await.is_none());
		assert!(session.list("garbage").await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn describe_requires_attachment() {
		let session = Session::new(fixture(), SessionOptions::default());
		assert!(
			session
				.describe(1)
				.await
				.unwrap_err()
				.is_page_not_attached()
		);

		session.attach(1).await.unwrap();
		let info = session.describe(1).await.unwrap();
		assert_eq!(info.url, "https://a.example.com/");
		assert!(info.active);
	}
}
