//! Tabwire runtime - connection machinery for the object-RPC bridge.
//!
//! This crate carries the transport-agnostic plumbing shared by both halves
//! of a bridge:
//!
//! - **Transport**: message-boundary pipes (in-process) and WebSocket
//! - **Dispatch**: the server-side dispatcher tree, one node per live
//!   domain object, addressed by guid
//! - **Client**: the mirror-image proxy registry with call correlation
//!
//! The runtime knows envelopes and guids, never tabs or sessions. Domain
//! semantics live in the `tabwire` crate, which plugs in on the server side
//! through [`dispatch::RootFactory`] and on the client side through
//! [`client::ProxyFactory`].

pub mod client;
pub mod dispatch;
pub mod error;
pub mod transport;

pub use client::{CallFuture, ClientConnection, GenericProxy, Proxy, ProxyBase, ProxyFactory};
pub use dispatch::{
	DispatchMode, Dispatcher, DispatcherBase, DispatcherConnection, OutboundHandler,
	RootDispatcher, RootFactory, RootFuture, VerbFuture,
};
pub use error::{Error, Result};
pub use transport::{PipeTransport, TransportParts, TransportSink, WebSocketTransport};
