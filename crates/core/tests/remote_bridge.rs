//! Server-end bridge over the in-process pipe, driven with raw envelopes.
//!
//! These tests pin the wire contract itself: bootstrap announcement order,
//! create-before-reference, error envelopes, handshake gating, and teardown
//! when the transport drops mid-call.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tabwire::protocol::{Call, CreateParams, Message, WireError};
use tabwire::runtime::TransportParts;
use tabwire::runtime::transport::pipe;
use tabwire::testing::MockHost;
use tabwire::{Bridge, Handshake, SessionOptions, TabInfo};
use tokio::sync::mpsc;

/// Hand-rolled driver end: raw envelopes in, raw envelopes out.
struct RawDriver {
	sink: Arc<dyn tabwire::runtime::TransportSink>,
	inbound: mpsc::UnboundedReceiver<Message>,
	next_id: u32,
}

impl RawDriver {
	fn new(transport: TransportParts) -> Self {
		Self {
			sink: transport.sink,
			inbound: transport.inbound,
			next_id: 0,
		}
	}

	async fn recv(&mut self) -> Message {
		tokio::time::timeout(Duration::from_secs(5), self.inbound.recv())
			.await
			.expect("no envelope within deadline")
			.expect("transport closed")
	}

	/// Sends a call and returns its id for correlation.
	fn call(&mut self, guid: &str, method: &str, params: Value) -> u32 {
		self.next_id += 1;
		self.sink.send(Message::Call(Call {
			id: self.next_id,
			guid: Arc::from(guid),
			method: method.to_string(),
			params,
		}));
		self.next_id
	}

	/// Waits for the return correlating to `id`, skipping events.
	async fn result_of(&mut self, id: u32) -> Result<Value, WireError> {
		loop {
			if let Message::Return(ret) = self.recv().await {
				assert_eq!(ret.id, id, "returns must correlate in order");
				return match ret.error {
					Some(error) => Err(error),
					None => Ok(ret.result.unwrap_or(Value::Null)),
				};
			}
		}
	}

	/// Drains the two bootstrap creations a default handshake announces.
	async fn drain_bootstrap(&mut self) {
		for _ in 0..2 {
			let message = self.recv().await;
			let Message::Event(event) = message else {
				panic!("expected bootstrap create, got {message:?}");
			};
			assert!(event.is_create());
		}
	}
}

fn create_params(event: tabwire::protocol::Event) -> CreateParams {
	serde_json::from_value(event.params).expect("well-formed create params")
}

#[tokio::test]
async fn create_count_handshake_announces_the_tree_unprompted() {
	let (server_end, driver_end) = pipe();
	let host = MockHost::with_tabs(vec![TabInfo::new(1, "https://a.example.com/")]);
	let bridge = Bridge::remote(
		server_end.into_parts(),
		host,
		Handshake::default(),
		SessionOptions::default(),
	)
	.await
	.expect("remote bridge");
	let mut driver = RawDriver::new(driver_end.into_parts());

	// First creation: the application, under the root scope, at its
	// well-known guid, with an empty initializer.
	let Message::Event(event) = driver.recv().await else {
		panic!("expected application create");
	};
	assert!(event.is_create());
	assert_eq!(&*event.guid, "");
	let params = create_params(event);
	assert_eq!(params.kind, "Application");
	assert_eq!(&*params.guid, "Application");
	assert_eq!(params.initializer, json!({}));

	// Second creation: the context, parented under the application.
	let Message::Event(event) = driver.recv().await else {
		panic!("expected context create");
	};
	assert!(event.is_create());
	assert_eq!(&*event.guid, "Application");
	let params = create_params(event);
	assert_eq!(params.kind, "Context");
	assert!(params.guid.starts_with("context@"));

	// And silence until the driver acts.
	let quiet = tokio::time::timeout(Duration::from_millis(100), driver.inbound.recv()).await;
	assert!(quiet.is_err(), "unexpected extra bootstrap envelope: {quiet:?}");

	bridge.close().await;
}

#[tokio::test]
async fn attach_create_precedes_the_verb_return() {
	let (server_end, driver_end) = pipe();
	let host = MockHost::with_tabs(vec![TabInfo::new(7, "https://a.example.com/")]);
	let bridge = Bridge::remote(
		server_end.into_parts(),
		host,
		Handshake::default(),
		SessionOptions::default(),
	)
	.await
	.expect("remote bridge");
	let mut driver = RawDriver::new(driver_end.into_parts());
	driver.drain_bootstrap().await;

	let id = driver.call("Application", "attach", json!({ "tabId": 7 }));

	let mut page_guid = None;
	let result = loop {
		match driver.recv().await {
			Message::Event(event) if event.is_create() => {
				let params = create_params(event);
				assert_eq!(params.kind, "Page");
				assert_eq!(params.initializer["tabId"], 7);
				assert_eq!(params.initializer["url"], "https://a.example.com/");
				page_guid = Some(params.guid.to_string());
			}
			Message::Return(ret) => {
				assert_eq!(ret.id, id);
				break ret.result.expect("attach result");
			}
			// The attached notification rides alongside; order against the
			// return is not part of the contract.
			_ => {}
		}
	};
	let page_guid = page_guid.expect("page create must precede the attach return");
	assert_eq!(result["page"]["guid"], page_guid.as_str());

	bridge.close().await;
}

#[tokio::test]
async fn failures_come_back_as_error_envelopes() {
	let (server_end, driver_end) = pipe();
	let host = MockHost::with_tabs(vec![TabInfo::new(7, "https://a.example.com/")]);
	let bridge = Bridge::remote(
		server_end.into_parts(),
		host,
		Handshake::default(),
		SessionOptions::default(),
	)
	.await
	.expect("remote bridge");
	let mut driver = RawDriver::new(driver_end.into_parts());
	driver.drain_bootstrap().await;

	// A guid nothing ever announced.
	let id = driver.call("page@99", "describe", json!({}));
	let err = driver.result_of(id).await.expect_err("unknown guid");
	assert!(err.message.starts_with("Unknown target"), "{}", err.message);
	assert!(err.message.contains("page@99"), "{}", err.message);

	// A verb outside the application's table.
	let id = driver.call("Application", "navigate", json!({}));
	let err = driver.result_of(id).await.expect_err("unknown verb");
	assert!(err.message.starts_with("Unknown method"), "{}", err.message);
	assert!(err.message.contains("navigate"), "{}", err.message);

	// Params that fail schema validation.
	let id = driver.call("Application", "attach", json!({ "tabId": "seven" }));
	let err = driver.result_of(id).await.expect_err("malformed params");
	assert!(err.message.starts_with("Invalid params"), "{}", err.message);
	assert!(err.message.contains("attach"), "{}", err.message);

	// None of those poisoned the connection.
	let id = driver.call("Application", "attach", json!({ "tabId": 7 }));
	let result = driver.result_of(id).await.expect("attach after failures");
	assert!(result["page"]["guid"].is_string());

	bridge.close().await;
}

#[tokio::test]
async fn initialize_handshake_gates_early_calls() {
	let (server_end, driver_end) = pipe();
	let host = MockHost::new();
	let mut driver = RawDriver::new(driver_end.into_parts());

	let server = tokio::spawn(Bridge::remote(
		server_end.into_parts(),
		host,
		Handshake::Initialize,
		SessionOptions::default(),
	));

	// Non-root traffic before initialize is rejected, not queued.
	let id = driver.call("Application", "attach", json!({ "tabId": 1 }));
	let err = driver.result_of(id).await.expect_err("call before initialize");
	assert!(err.message.starts_with("Out of order"), "{}", err.message);
	assert!(err.message.contains("attach"), "{}", err.message);

	// initialize builds the tree and answers with the application ref.
	let id = driver.call("", "initialize", json!({ "sdkLanguage": "python" }));
	let mut kinds = Vec::new();
	let result = loop {
		match driver.recv().await {
			Message::Event(event) if event.is_create() => kinds.push(create_params(event).kind),
			Message::Return(ret) if ret.id == id => break ret.result.expect("initialize result"),
			other => panic!("unexpected envelope during initialize: {other:?}"),
		}
	};
	assert_eq!(kinds, vec!["Application", "Context"]);
	assert_eq!(result["application"]["guid"], "Application");

	let bridge = server
		.await
		.expect("server task")
		.expect("remote bridge after initialize");

	// The handshake is once per connection.
	let id = driver.call("", "initialize", json!({ "sdkLanguage": "python" }));
	let err = driver.result_of(id).await.expect_err("second initialize");
	assert!(err.message.starts_with("Already initialized"), "{}", err.message);

	bridge.close().await;
}

#[tokio::test]
async fn initialize_handshake_end_to_end() {
	let (server_end, driver_end) = pipe();
	let host = MockHost::with_tabs(vec![TabInfo::new(3, "https://a.example.com/")]);

	let server = tokio::spawn(Bridge::remote(
		server_end.into_parts(),
		host,
		Handshake::Initialize,
		SessionOptions::default(),
	));
	let driver_bridge = Bridge::connect(driver_end.into_parts(), Handshake::Initialize)
		.await
		.expect("driver connect");
	let server_bridge = server
		.await
		.expect("server task")
		.expect("remote bridge after initialize");

	let app = Arc::clone(driver_bridge.application().expect("application handle"));
	assert!(app.context().is_some());
	let page = app.attach(3).await.expect("attach over the pipe");
	assert_eq!(page.tab_id(), 3);

	driver_bridge.close().await;
	server_bridge.close().await;
}

#[tokio::test]
async fn transport_loss_fails_calls_in_flight() {
	// Two pipes with a relay in the middle so the test can sever both
	// directions at once, the way a dying peer would.
	let (server_end, server_relay) = pipe();
	let (driver_end, driver_relay) = pipe();
	let TransportParts {
		sink: toward_driver,
		inbound: mut from_driver,
	} = driver_relay.into_parts();
	let TransportParts {
		sink: toward_server,
		inbound: mut from_server,
	} = server_relay.into_parts();
	let downstream = tokio::spawn(async move {
		while let Some(message) = from_server.recv().await {
			toward_driver.send(message);
		}
	});
	let upstream = tokio::spawn(async move {
		while let Some(message) = from_driver.recv().await {
			toward_server.send(message);
		}
	});

	let host = MockHost::with_tabs(vec![TabInfo::new(1, "https://a.example.com/")]);
	host.set_attach_delay(Duration::from_secs(30));
	let server_bridge = Bridge::remote(
		server_end.into_parts(),
		host,
		Handshake::default(),
		SessionOptions::default(),
	)
	.await
	.expect("remote bridge");
	let driver_bridge = Bridge::connect(driver_end.into_parts(), Handshake::default())
		.await
		.expect("driver connect");

	let app = Arc::clone(driver_bridge.application().expect("application handle"));
	let in_flight = tokio::spawn(async move { app.attach(1).await });
	tokio::time::sleep(Duration::from_millis(50)).await;

	// Cut the wire under the in-flight call. Aborting the relay drops its
	// sinks, which ends the inbound stream on both bridges.
	upstream.abort();
	downstream.abort();

	let err = in_flight
		.await
		.expect("attach task")
		.expect_err("in-flight call must fail on transport loss");
	assert!(err.is_connection_closed(), "{err}");
	assert!(driver_bridge.client().expect("client half").is_closed());

	driver_bridge.close().await;
	// The server end still has a verb parked on the stalled host; dropping
	// the bridge aborts its pumps without waiting for that verb.
	drop(server_bridge);
}

#[tokio::test]
async fn close_before_ready_fails_the_connect() {
	let (server_end, driver_end) = pipe();
	// No server ever comes up on the other end.
	drop(server_end);

	let err = Bridge::connect(driver_end.into_parts(), Handshake::default())
		.await
		.expect_err("connect against a dead peer");
	assert!(matches!(err, tabwire::Error::ConnectionClosedBeforeInit), "{err}");
}

#[tokio::test(start_paused = true)]
async fn handshake_times_out_against_a_silent_peer() {
	let (server_end, driver_end) = pipe();
	// The peer is connected but never announces anything.
	let _held = server_end;

	let err = Bridge::connect(driver_end.into_parts(), Handshake::default())
		.await
		.expect_err("connect against a silent peer");
	assert!(err.is_timeout(), "{err}");
}
