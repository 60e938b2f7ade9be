//! Domain data carried over the bridge.
//!
//! These are the typed shapes referenced by session-manager verbs and
//! events: tab metadata as the engine reports it, the attribute filter used
//! by `attachAll`, placement options for `newPage` and the recorder surface,
//! the interaction-mode machine's value set, and the descriptors produced by
//! parsing a test script. All field names follow the wire (camelCase).
//!
//! # Main Types
//!
//! - [`InteractionMode`] - Current recording/inspection behavior of a session
//! - [`TabInfo`] / [`TabId`] - Engine-reported tab metadata
//! - [`TabFilter`] - Conjunction over tab attributes for bulk attach
//! - [`NewPageOptions`] - Tab placement/activation options
//! - [`RecorderOptions`] - Recorder surface configuration
//! - [`TestDescriptor`] - One parsed test declaration

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of one browser tab, as assigned by the host browser.
pub type TabId = i32;

/// The session's current high-level recording/inspection behavior.
///
/// Exactly one mode is active at a time per session. The set is flat except
/// for [`RecordingInspecting`](Self::RecordingInspecting), a combined state
/// reachable only while recording.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InteractionMode {
	/// No active recording or inspection.
	#[default]
	None,
	/// Actions are being recorded into a script.
	Recording,
	/// Element inspection is active.
	Inspecting,
	/// Text-assertion authoring is active.
	AssertingText,
	/// Value-assertion authoring is active.
	AssertingValue,
	/// Visibility-assertion authoring is active.
	AssertingVisibility,
	/// Snapshot-assertion authoring is active.
	AssertingSnapshot,
	/// Combined state: inspecting while a recording stays open.
	#[serde(rename = "recording-inspecting")]
	RecordingInspecting,
	/// Recorder is open but paused.
	Standby,
}

impl InteractionMode {
	/// The wire string for this mode.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::None => "none",
			Self::Recording => "recording",
			Self::Inspecting => "inspecting",
			Self::AssertingText => "assertingText",
			Self::AssertingValue => "assertingValue",
			Self::AssertingVisibility => "assertingVisibility",
			Self::AssertingSnapshot => "assertingSnapshot",
			Self::RecordingInspecting => "recording-inspecting",
			Self::Standby => "standby",
		}
	}
}

impl std::fmt::Display for InteractionMode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Tab load status as the host browser reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabStatus {
	Unloaded,
	Loading,
	Complete,
}

/// Kind of browser window a tab lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
	Normal,
	Popup,
	Panel,
	App,
	Devtools,
}

/// Snapshot of one tab's metadata, as reported by the engine boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
	pub id: TabId,
	pub window_id: i32,
	/// Zero-based position of the tab within its window.
	pub index: i32,
	pub url: String,
	pub title: String,
	pub active: bool,
	pub pinned: bool,
	pub highlighted: bool,
	pub audible: bool,
	pub muted: bool,
	pub discarded: bool,
	pub auto_discardable: bool,
	/// Tab group id, `-1` when the tab is ungrouped.
	pub group_id: i32,
	pub status: TabStatus,
	pub window_type: WindowType,
	/// Whether the tab's window was the last focused one.
	pub last_focused_window: bool,
}

impl TabInfo {
	/// A plain complete tab in a normal window with engine defaults.
	pub fn new(id: TabId, url: impl Into<String>) -> Self {
		Self {
			id,
			window_id: 1,
			index: 0,
			url: url.into(),
			title: String::new(),
			active: false,
			pinned: false,
			highlighted: false,
			audible: false,
			muted: false,
			discarded: false,
			auto_discardable: true,
			group_id: -1,
			status: TabStatus::Complete,
			window_type: WindowType::Normal,
			last_focused_window: true,
		}
	}

	pub fn with_title(mut self, title: impl Into<String>) -> Self {
		self.title = title.into();
		self
	}

	pub fn with_active(mut self, active: bool) -> Self {
		self.active = active;
		self
	}

	pub fn with_pinned(mut self, pinned: bool) -> Self {
		self.pinned = pinned;
		self
	}

	pub fn with_window_id(mut self, window_id: i32) -> Self {
		self.window_id = window_id;
		self
	}

	pub fn with_index(mut self, index: i32) -> Self {
		self.index = index;
		self
	}

	pub fn with_group_id(mut self, group_id: i32) -> Self {
		self.group_id = group_id;
		self
	}

	pub fn with_status(mut self, status: TabStatus) -> Self {
		self.status = status;
		self
	}
}

/// Conjunction over tab attributes selecting tabs for bulk attach.
///
/// Every field is optional; an empty filter matches every tab. `url` and
/// `title` hold glob patterns (`url` matches if any pattern matches).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabFilter {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status: Option<TabStatus>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub last_focused_window: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub window_id: Option<i32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub window_type: Option<WindowType>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub active: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub index: Option<i32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub url: Option<Vec<String>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub current_window: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub highlighted: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub discarded: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub auto_discardable: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub pinned: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub audible: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub muted: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub group_id: Option<i32>,
}

/// Placement and activation options for opening a fresh tab.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPageOptions {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub index: Option<i32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub opener_tab_id: Option<TabId>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub pinned: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub window_id: Option<i32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub active: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub selected: Option<bool>,
}

/// Where the recorder surface is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderWindowKind {
	Popup,
	Sidepanel,
}

/// Recorder surface placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecorderWindow {
	#[serde(rename = "type", skip_serializing_if = "Option::is_none")]
	pub kind: Option<RecorderWindowKind>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
}

/// Configuration applied when showing (or re-showing) the recorder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderOptions {
	/// Interaction mode to switch to alongside showing the surface.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub mode: Option<InteractionMode>,
	/// Target language of the generated script.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub language: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub test_id_attribute_name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub play_in_incognito: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub window: Option<RecorderWindow>,
}

/// Per-test options recovered from a `use`-style declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOptions {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub device_name: Option<String>,
	/// Raw context options object, passed through without interpretation.
	#[serde(skip_serializing_if = "Value::is_null", default)]
	pub context_options: Value,
}

/// Source position of a parsed test declaration, 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLocation {
	pub file: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub line: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub column: Option<u32>,
}

/// One test declaration recovered from a script, without executing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDescriptor {
	pub title: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub options: Option<TestOptions>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub location: Option<SourceLocation>,
}
