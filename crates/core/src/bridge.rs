//! Bridge assembly - wiring a session, its dispatcher tree, and a driver.
//!
//! Three flavors share one handle type:
//!
//! - [`Bridge::local`] - both halves in-process, for embedding hosts that
//!   drive the session through the typed client without a socket
//! - [`Bridge::remote`] - the server end over a transport, speaking to an
//!   external driver
//! - [`Bridge::connect`] - the driver end over a transport, yielding the
//!   typed [`Application`] handle
//!
//! A bridge owns its pump tasks; dropping it aborts them, [`Bridge::close`]
//! tears the whole assembly down in order (session, server, client, sink).

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::{Application, CoreProxyFactory};
use crate::dispatchers::{APPLICATION_GUID, SessionRootFactory};
use crate::host::BrowserHost;
use crate::session::{Session, SessionOptions};
use tabwire_protocol::{GuidRef, InitializeParams, METHOD_INITIALIZE, Message};
use tabwire_runtime::{
	ClientConnection, DispatcherConnection, Error, Result, RootDispatcher, TransportParts,
	TransportSink,
};

/// Time allowed for the peer to complete either handshake variant.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Readiness convention between server and driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
	/// The server bootstraps unprompted; the driver proceeds once it has
	/// observed this many `__create__` envelopes.
	CreateCount(u32),
	/// The driver opens with an `initialize` call to the root scope; the
	/// server builds the tree from its factory hook then.
	Initialize,
}

impl Default for Handshake {
	// Application + context, the two bootstrap creations.
	fn default() -> Self {
		Self::CreateCount(2)
	}
}

#[derive(Debug, Deserialize)]
struct InitializeResult {
	application: GuidRef,
}

/// A running bridge: connection halves plus the pump tasks between them.
pub struct Bridge {
	session: Option<Arc<Session>>,
	server: Option<Arc<DispatcherConnection>>,
	client: Option<Arc<ClientConnection>>,
	application: Option<Arc<Application>>,
	sink: Option<Arc<dyn TransportSink>>,
	tasks: Vec<JoinHandle<()>>,
}

impl Bridge {
	/// Wires both halves back-to-back in-process.
	///
	/// Delivery is synchronous during bootstrap, so the whole object graph
	/// (application, context) exists on the client before this returns;
	/// after the switch to steady dispatch, each direction runs through its
	/// own queue and pump.
	pub async fn local(host: Arc<dyn BrowserHost>, options: SessionOptions) -> Result<Self> {
		let session = Session::new(host, options);
		let server = DispatcherConnection::new();
		let client = ClientConnection::new(Box::new(CoreProxyFactory));

		let (client_tx, mut client_rx) = mpsc::unbounded_channel::<Message>();
		client.set_on_message(Box::new(move |message| {
			let _ = client_tx.send(message);
		}));
		let call_server = Arc::clone(&server);
		let client_pump = tokio::spawn(async move {
			while let Some(message) = client_rx.recv().await {
				call_server.dispatch(message).await;
			}
		});

		// Direct synchronous delivery while bootstrapping: every __create__
		// is applied on the client before bootstrap() returns.
		let bootstrap_client = Arc::clone(&client);
		server.set_on_message(Box::new(move |message| {
			bootstrap_client.dispatch(message);
		}));

		let root = RootDispatcher::new(
			&server,
			Arc::new(SessionRootFactory::new(Arc::clone(&session))),
		);
		root.bootstrap(InitializeParams::default()).await?;
		let application = resolve_application(&client)?;

		let (server_tx, mut server_rx) = mpsc::unbounded_channel::<Message>();
		server.set_on_message(Box::new(move |message| {
			let _ = server_tx.send(message);
		}));
		let event_client = Arc::clone(&client);
		let server_pump = tokio::spawn(async move {
			while let Some(message) = server_rx.recv().await {
				event_client.dispatch(message);
			}
		});

		server.switch_to_steady().await;
		debug!(target: "tabwire::bridge", "local bridge up");
		Ok(Self {
			session: Some(session),
			server: Some(server),
			client: Some(client),
			application: Some(application),
			sink: None,
			tasks: vec![client_pump, server_pump],
		})
	}

	/// Runs the server end over a transport.
	///
	/// With [`Handshake::CreateCount`] the tree is bootstrapped before this
	/// returns; with [`Handshake::Initialize`] this waits for the driver's
	/// `initialize` call (failing with `ConnectionClosedBeforeInit` if the
	/// transport closes first). When the inbound stream ends the session is
	/// closed and the registry cleared; there is no reconnection.
	pub async fn remote(
		transport: TransportParts,
		host: Arc<dyn BrowserHost>,
		handshake: Handshake,
		options: SessionOptions,
	) -> Result<Self> {
		let TransportParts { sink, mut inbound } = transport;
		let session = Session::new(host, options);
		let server = DispatcherConnection::new();

		let out_sink = Arc::clone(&sink);
		server.set_on_message(Box::new(move |message| out_sink.send(message)));

		let root = RootDispatcher::new(
			&server,
			Arc::new(SessionRootFactory::new(Arc::clone(&session))),
		);

		let pump_server = Arc::clone(&server);
		let pump_session = Arc::clone(&session);
		let inbound_pump = tokio::spawn(async move {
			while let Some(message) = inbound.recv().await {
				pump_server.dispatch(message).await;
			}
			// Peer gone: tear down without waiting for a close verb.
			pump_server.close("transport closed");
			if !pump_session.is_closed() {
				if let Err(err) = pump_session.close().await {
					debug!(target: "tabwire::bridge", %err, "session close after transport loss");
				}
			}
		});

		match handshake {
			Handshake::CreateCount(expected) => {
				root.bootstrap(InitializeParams::default()).await?;
				let sent = server.creates_sent();
				if sent != expected {
					warn!(
						target: "tabwire::bridge",
						sent,
						expected,
						"bootstrap object count differs from the advertised handshake count"
					);
				}
			}
			Handshake::Initialize => {
				tokio::time::timeout(HANDSHAKE_TIMEOUT, server.wait_ready())
					.await
					.map_err(|_| Error::Timeout("waiting for initialize".into()))??;
			}
		}

		server.switch_to_steady().await;
		debug!(target: "tabwire::bridge", ?handshake, "remote bridge up");
		Ok(Self {
			session: Some(session),
			server: Some(server),
			client: None,
			application: None,
			sink: Some(sink),
			tasks: vec![inbound_pump],
		})
	}

	/// Runs the driver end over a transport and completes the handshake,
	/// yielding the typed application handle.
	pub async fn connect(transport: TransportParts, handshake: Handshake) -> Result<Self> {
		let TransportParts { sink, mut inbound } = transport;
		let client = ClientConnection::new(Box::new(CoreProxyFactory));

		let out_sink = Arc::clone(&sink);
		client.set_on_message(Box::new(move |message| out_sink.send(message)));

		let pump_client = Arc::clone(&client);
		let inbound_pump = tokio::spawn(async move {
			while let Some(message) = inbound.recv().await {
				pump_client.dispatch(message);
			}
			pump_client.close("transport closed");
		});

		let application = match handshake {
			Handshake::CreateCount(expected) => {
				client
					.wait_for_creates(expected, HANDSHAKE_TIMEOUT)
					.await
					.map_err(before_init)?;
				resolve_application(&client)?
			}
			Handshake::Initialize => {
				let params = serde_json::to_value(InitializeParams::default())?;
				let result = tokio::time::timeout(
					HANDSHAKE_TIMEOUT,
					client.send_call("", METHOD_INITIALIZE, params),
				)
				.await
				.map_err(|_| Error::Timeout("waiting for initialize result".into()))?
				.map_err(before_init)?;
				let result: InitializeResult = serde_json::from_value(result)?;
				let proxy = client.resolve(&result.application.guid)?;
				proxy
					.downcast_arc::<Application>()
					.map_err(|_| Error::ObjectNotFound {
						guid: result.application.guid.to_string(),
					})?
			}
		};

		debug!(target: "tabwire::bridge", ?handshake, "driver connected");
		Ok(Self {
			session: None,
			server: None,
			client: Some(client),
			application: Some(application),
			sink: Some(sink),
			tasks: vec![inbound_pump],
		})
	}

	/// The typed driver handle. `None` on a server-end bridge.
	pub fn application(&self) -> Option<&Arc<Application>> {
		self.application.as_ref()
	}

	/// The session this bridge serves. `None` on a driver-end bridge.
	pub fn session(&self) -> Option<&Arc<Session>> {
		self.session.as_ref()
	}

	/// The client connection half, when this bridge has one.
	pub fn client(&self) -> Option<&Arc<ClientConnection>> {
		self.client.as_ref()
	}

	/// The server connection half, when this bridge has one.
	pub fn server(&self) -> Option<&Arc<DispatcherConnection>> {
		self.server.as_ref()
	}

	/// Tears the assembly down: session, server registry, client registry,
	/// transport sink, pump tasks, in that order.
	pub async fn close(mut self) {
		if let Some(session) = self.session.take() {
			if !session.is_closed() {
				if let Err(err) = session.close().await {
					debug!(target: "tabwire::bridge", %err, "session close during bridge shutdown");
				}
			}
		}
		if let Some(server) = self.server.take() {
			server.close("bridge closed");
		}
		if let Some(client) = self.client.take() {
			client.close("bridge closed");
		}
		if let Some(sink) = self.sink.take() {
			sink.close();
		}
		for task in self.tasks.drain(..) {
			task.abort();
		}
	}
}

impl std::fmt::Debug for Bridge {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Bridge")
			.field("session", &self.session.is_some())
			.field("server", &self.server.is_some())
			.field("client", &self.client.is_some())
			.field("application", &self.application.is_some())
			.finish_non_exhaustive()
	}
}

impl Drop for Bridge {
	fn drop(&mut self) {
		for task in self.tasks.drain(..) {
			task.abort();
		}
	}
}

fn resolve_application(client: &Arc<ClientConnection>) -> Result<Arc<Application>> {
	let proxy = client.resolve(APPLICATION_GUID)?;
	proxy
		.downcast_arc::<Application>()
		.map_err(|_| Error::ObjectNotFound {
			guid: APPLICATION_GUID.to_string(),
		})
}

// A transport lost mid-handshake reads as "never initialized", whatever
// rejection raced it.
fn before_init(err: Error) -> Error {
	if err.is_connection_closed() {
		Error::ConnectionClosedBeforeInit
	} else {
		err
	}
}
