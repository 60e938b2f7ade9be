//! Engine boundary - the capabilities the bridge drives but never owns.
//!
//! The automation engine (tab table, page attachment, recorder surface,
//! script execution) lives outside this crate. The session manager talks to
//! it exclusively through these traits, so the same bridge runs against a
//! real browser embedding or against the doubles in [`crate::testing`].

use std::sync::Arc;

use async_trait::async_trait;

use tabwire_protocol::{NewPageOptions, RecorderOptions, TabId, TabInfo};
use tabwire_runtime::Result;

/// Browser-side capabilities the session manager consumes.
#[async_trait]
pub trait BrowserHost: Send + Sync {
	/// Snapshot of every tab the engine currently knows about.
	async fn tabs(&self) -> Result<Vec<TabInfo>>;

	/// Opens a fresh tab with the given placement/activation options.
	async fn open_tab(&self, options: &NewPageOptions) -> Result<TabInfo>;

	/// Binds an automation page to the given tab.
	async fn attach_tab(&self, tab_id: TabId) -> Result<Arc<dyn PageBinding>>;

	/// Releases the automation binding for the given tab.
	async fn detach_tab(&self, tab_id: TabId) -> Result<()>;

	/// The recorder surface owned by the engine.
	fn recorder(&self) -> Arc<dyn RecorderSurface>;

	/// Executes a script against `page`, or against the whole context when
	/// `page` is `None`.
	async fn run_script(&self, page: Option<Arc<dyn PageBinding>>, code: &str) -> Result<()>;
}

/// Engine-owned page object attached to exactly one tab.
pub trait PageBinding: Send + Sync {
	fn tab_id(&self) -> TabId;
	fn url(&self) -> String;
}

impl std::fmt::Debug for dyn PageBinding {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PageBinding")
			.field("tab_id", &self.tab_id())
			.field("url", &self.url())
			.finish()
	}
}

/// The visual recorder surface, shown/hidden by the session manager.
#[async_trait]
pub trait RecorderSurface: Send + Sync {
	async fn show(&self, options: &RecorderOptions) -> Result<()>;

	/// Reconfigures an already-visible surface in place.
	async fn update(&self, options: &RecorderOptions) -> Result<()>;

	async fn hide(&self) -> Result<()>;
}
