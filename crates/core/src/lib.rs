//! tabwire: in-browser automation bridge over tab-level sessions.
//!
//! This crate is the domain half of the bridge: it owns the session (which
//! tabs carry an automation page, the interaction mode, the recorder
//! surface, staged scripts) and exposes it over the guid-addressed
//! object-RPC from `tabwire-runtime` - as a dispatcher tree toward drivers
//! and as typed proxies toward embedders.
//!
//! # Architecture
//!
//! ```text
//! driver <-- transport --> ┌────────────────────────────┐
//!                          │ Bridge                     │
//!                          │  ┌──────────────────────┐  │
//!                          │  │ DispatcherConnection │  │  envelopes <-> verbs
//!                          │  │  Application/Context │  │
//!                          │  │  /Page dispatchers   │  │
//!                          │  └──────────┬───────────┘  │
//!                          │  ┌──────────▼───────────┐  │
//!                          │  │ Session              │  │  tabs, mode, recorder
//!                          │  └──────────┬───────────┘  │
//!                          │  ┌──────────▼───────────┐  │
//!                          │  │ BrowserHost (trait)  │  │  the engine seam
//!                          │  └──────────────────────┘  │
//!                          └────────────────────────────┘
//! ```
//!
//! The engine itself (tab table, page attachment, recorder rendering,
//! script execution) stays behind the [`BrowserHost`] trait; the doubles in
//! [`testing`] stand in for it everywhere in this crate's tests.
//!
//! # Examples
//!
//! ```ignore
//! use std::sync::Arc;
//! use tabwire::{Bridge, BrowserHost, SessionOptions, TabFilter};
//!
//! # async fn run(host: Arc<dyn BrowserHost>) -> tabwire::Result<()> {
//! let bridge = Bridge::local(host, SessionOptions::default()).await?;
//! let app = bridge.application().expect("local bridge has a client half");
//!
//! let page = app.attach(12).await?;
//! println!("attached {} at {}", page.tab_id(), page.url());
//!
//! let all = app.attach_all(&TabFilter {
//!     url: Some(vec!["https://*.example.com/*".into()]),
//!     ..Default::default()
//! }).await?;
//! println!("{} more pages", all.len());
//!
//! app.close().await?;
//! bridge.close().await;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod client;
pub mod dispatchers;
pub mod events;
pub mod filter;
pub mod host;
pub mod script;
pub mod session;
pub mod testing;

pub use bridge::{Bridge, Handshake};
pub use client::{Application, ApplicationEvent, Context, CoreProxyFactory, Page};
pub use dispatchers::{
	APPLICATION_GUID, ApplicationDispatcher, ContextDispatcher, PageDispatcher, SessionRootFactory,
};
pub use events::{EventBus, EventStream, EventWaiter};
pub use filter::tab_matches;
pub use host::{BrowserHost, PageBinding, RecorderSurface};
pub use script::{SCRIPT_FILE, parse_tests};
pub use session::{Session, SessionEvent, SessionOptions};

// The wire and runtime layers, re-exported for embedders that wire their
// own transports or factories.
pub use tabwire_protocol as protocol;
pub use tabwire_runtime as runtime;

pub use tabwire_protocol::{
	InteractionMode, NewPageOptions, RecorderOptions, RecorderWindow, RecorderWindowKind,
	SourceLocation, TabFilter, TabId, TabInfo, TabStatus, TestDescriptor, TestOptions, WindowType,
};
pub use tabwire_runtime::{Error, Result};
