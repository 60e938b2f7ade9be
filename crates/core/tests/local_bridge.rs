//! End-to-end flows over an in-process bridge with a mock browser host.
//!
//! Everything here exercises the full wire path: typed proxy -> client
//! connection -> dispatcher tree -> session -> host, and the event path
//! back. Session-level behavior without the wire is covered by the unit
//! tests in `src/session.rs`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tabwire::runtime::Proxy;
use tabwire::testing::{HostAction, MockHost};
use tabwire::{
	ApplicationEvent, Bridge, EventStream, InteractionMode, NewPageOptions, RecorderOptions,
	SessionOptions, TabFilter, TabId, TabInfo,
};

fn seeded_host() -> Arc<MockHost> {
	MockHost::with_tabs(vec![
		TabInfo::new(1, "https://app.example.com/").with_active(true),
		TabInfo::new(2, "https://app.example.com/settings"),
		TabInfo::new(3, "https://other.example.net/").with_pinned(true),
	])
}

async fn local_bridge(host: Arc<MockHost>) -> Bridge {
	Bridge::local(host, SessionOptions::default())
		.await
		.expect("local bridge should bootstrap")
}

/// Next typed event, bounded so a broken pump fails the test instead of
/// hanging it.
async fn next_event(events: &mut EventStream<ApplicationEvent>) -> ApplicationEvent {
	tokio::time::timeout(Duration::from_secs(5), events.recv())
		.await
		.expect("no application event within deadline")
		.expect("application event stream ended")
}

/// Polls `condition` until it holds; steady-mode effects land a task hop
/// after the verb that caused them.
async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
	let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
	while !condition() {
		assert!(
			tokio::time::Instant::now() < deadline,
			"timed out waiting for {what}"
		);
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
}

#[tokio::test]
async fn bootstrap_builds_application_and_context() {
	let bridge = local_bridge(seeded_host()).await;
	let app = Arc::clone(bridge.application().expect("application handle"));

	assert_eq!(app.base().kind(), "Application");
	assert_eq!(app.base().guid(), "Application");
	assert_eq!(app.base().initializer(), &json!({}));

	let context = app.context().expect("context child");
	assert_eq!(context.base().kind(), "Context");
	assert!(context.pages().is_empty());

	// Exactly the two bootstrap creations, nothing else unprompted.
	assert_eq!(bridge.client().expect("client half").creates_observed(), 2);
	assert_eq!(bridge.server().expect("server half").creates_sent(), 2);
	bridge.close().await;
}

#[tokio::test]
async fn attach_yields_a_live_page_handle() {
	let host = seeded_host();
	let bridge = local_bridge(Arc::clone(&host)).await;
	let app = Arc::clone(bridge.application().expect("application handle"));
	let mut events = app.events();

	let page = app.attach(1).await.expect("attach tab 1");
	assert_eq!(page.tab_id(), 1);
	assert_eq!(page.url(), "https://app.example.com/");

	let info = page.describe().await.expect("describe attached tab");
	assert_eq!(info.id, 1);
	assert!(info.active);

	// The event names the same page node the verb returned.
	match next_event(&mut events).await {
		ApplicationEvent::Attached { tab_id, page: announced } => {
			assert_eq!(tab_id, 1);
			assert!(Arc::ptr_eq(&announced, &page));
		}
		other => panic!("expected attached, got {other:?}"),
	}
	assert_eq!(host.actions(), vec![HostAction::Attach(1)]);
	bridge.close().await;
}

#[tokio::test]
async fn attach_is_idempotent_over_the_wire() {
	let bridge = local_bridge(seeded_host()).await;
	let app = Arc::clone(bridge.application().expect("application handle"));

	let first = app.attach(2).await.expect("first attach");
	let second = app.attach(2).await.expect("second attach");
	assert!(Arc::ptr_eq(&first, &second));

	// One page creation beyond the bootstrap pair.
	assert_eq!(bridge.client().expect("client half").creates_observed(), 3);
	bridge.close().await;
}

#[tokio::test]
async fn attach_all_populates_and_detach_all_empties_the_context() {
	let bridge = local_bridge(seeded_host()).await;
	let app = Arc::clone(bridge.application().expect("application handle"));

	let filter = TabFilter {
		url: Some(vec!["https://app.example.com/*".into()]),
		..Default::default()
	};
	let pages = app.attach_all(&filter).await.expect("attach all");
	let ids: Vec<TabId> = pages.iter().map(|page| page.tab_id()).collect();
	assert_eq!(ids, vec![1, 2]);

	let context = app.context().expect("context child");
	assert_eq!(context.pages().len(), 2);

	app.detach_all().await.expect("detach all");
	wait_until("context to empty", || context.pages().is_empty()).await;
	assert!(
		bridge
			.session()
			.expect("session half")
			.attached_tabs()
			.await
			.is_empty()
	);
	bridge.close().await;
}

#[tokio::test]
async fn detach_disposes_the_page_node() {
	let bridge = local_bridge(seeded_host()).await;
	let app = Arc::clone(bridge.application().expect("application handle"));

	let page = app.attach(1).await.expect("attach tab 1");
	// Unknown tabs detach as a no-op.
	app.detach(42).await.expect("detach unknown tab");

	let detached = app.wait_for_event(
		|event| matches!(event, ApplicationEvent::Detached { tab_id: 1 }),
		Duration::from_secs(5),
	);
	app.detach_page(&page).await.expect("detach by page ref");
	detached.wait().await.expect("detached event");

	wait_until("page node disposal", || page.base().is_disposed()).await;
	assert!(app.context().expect("context child").pages().is_empty());
	bridge.close().await;
}

#[tokio::test]
async fn new_page_opens_and_attaches_in_one_step() {
	let host = seeded_host();
	let bridge = local_bridge(Arc::clone(&host)).await;
	let app = Arc::clone(bridge.application().expect("application handle"));

	let page = app
		.new_page(&NewPageOptions {
			url: Some("https://fresh.example.com/".into()),
			active: Some(true),
			..Default::default()
		})
		.await
		.expect("new page");
	assert_eq!(page.tab_id(), 4);
	assert_eq!(page.url(), "https://fresh.example.com/");
	assert!(page.describe().await.expect("describe new tab").active);

	assert_eq!(
		host.actions(),
		vec![
			HostAction::Open {
				url: Some("https://fresh.example.com/".into())
			},
			HostAction::Attach(4),
		]
	);
	bridge.close().await;
}

#[tokio::test]
async fn recorder_flow_emits_ordered_events() {
	let bridge = local_bridge(seeded_host()).await;
	let app = Arc::clone(bridge.application().expect("application handle"));
	let mut events = app.events();

	app.show_recorder(&RecorderOptions {
		mode: Some(InteractionMode::Recording),
		language: Some("javascript".into()),
		..Default::default()
	})
	.await
	.expect("show recorder");
	app.set_mode(InteractionMode::RecordingInspecting)
		.await
		.expect("enter combined mode");
	// Leaving the combined mode lands on none, whichever half is dropped.
	app.set_mode(InteractionMode::Inspecting)
		.await
		.expect("exit combined mode");
	app.hide_recorder().await.expect("hide recorder");

	let mut seen = Vec::new();
	while !matches!(seen.last(), Some(ApplicationEvent::Hide)) {
		seen.push(next_event(&mut events).await);
	}
	assert_eq!(seen.len(), 5, "{seen:?}");
	assert!(matches!(seen[0], ApplicationEvent::Show));
	assert!(matches!(
		seen[1],
		ApplicationEvent::ModeChanged { mode: InteractionMode::Recording }
	));
	assert!(matches!(
		seen[2],
		ApplicationEvent::ModeChanged { mode: InteractionMode::RecordingInspecting }
	));
	assert!(matches!(
		seen[3],
		ApplicationEvent::ModeChanged { mode: InteractionMode::None }
	));

	assert_eq!(
		bridge.session().expect("session half").mode().await,
		InteractionMode::None
	);
	bridge.close().await;
}

#[tokio::test]
async fn combined_mode_rejection_crosses_the_wire() {
	let bridge = local_bridge(seeded_host()).await;
	let app = Arc::clone(bridge.application().expect("application handle"));

	let err = app
		.set_mode(InteractionMode::RecordingInspecting)
		.await
		.expect_err("combined mode from none must be rejected");
	assert!(err.is_invalid_params(), "{err}");
	bridge.close().await;
}

#[tokio::test]
async fn script_verbs_round_trip() {
	let host = seeded_host();
	let bridge = local_bridge(Arc::clone(&host)).await;
	let app = Arc::clone(bridge.application().expect("application handle"));

	let code = r#"
test('logs in', async ({ page }) => {});
test.use({ deviceName: 'Pixel 7' });
test('mobile layout', async ({ page }) => {});
"#;

	// list parses without staging anything.
	let tests = app.list(code).await.expect("list");
	assert_eq!(tests.len(), 2);
	assert_eq!(tests[0].title, "logs in");
	assert!(tests[0].options.is_none());
	assert_eq!(
		tests[1]
			.options
			.as_ref()
			.and_then(|options| options.device_name.as_deref()),
		Some("Pixel 7")
	);
	assert!(bridge.session().expect("session half").staged_tests().await.is_none());

	// A bare run with nothing loaded is a params failure.
	let err = app.run(None, None).await.expect_err("bare run unstaged");
	assert!(err.is_invalid_params(), "{err}");

	app.load(code).await.expect("load");
	app.run(None, None).await.expect("run staged code");
	assert!(host.actions().contains(&HostAction::Run {
		tab_id: None,
		code: code.to_string(),
	}));

	let page = app.attach(1).await.expect("attach tab 1");
	app.run(Some(page.as_ref()), Some("test('x', () => {});"))
		.await
		.expect("run against one page");
	assert!(host.actions().contains(&HostAction::Run {
		tab_id: Some(1),
		code: "test('x', () => {});".to_string(),
	}));
	bridge.close().await;
}

#[tokio::test]
async fn close_tears_down_the_object_tree() {
	let bridge = local_bridge(seeded_host()).await;
	let app = Arc::clone(bridge.application().expect("application handle"));

	app.attach(1).await.expect("attach tab 1");
	app.close().await.expect("close");
	assert!(bridge.session().expect("session half").is_closed());
	wait_until("application disposal", || app.base().is_disposed()).await;

	// The dispatcher subtree is gone; further verbs miss their target.
	let err = app.attach(2).await.expect_err("attach after close");
	assert!(err.is_unknown_target(), "{err}");
	bridge.close().await;
}
