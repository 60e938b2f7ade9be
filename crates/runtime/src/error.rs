//! Error types for the tabwire bridge.
//!
//! One taxonomy covers the whole bridge: routing failures, handshake
//! violations, session lifecycle, and transport conditions. Verb-level
//! errors never cross the wire as panics or closed sockets - the dispatcher
//! connection converts them into a return envelope's `error` field via
//! [`Error::wire`], and the client reconstructs them as [`Error::Remote`].

use tabwire_protocol::{TabId, WireError};
use thiserror::Error;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the tabwire bridge.
#[derive(Debug, Error)]
pub enum Error {
	/// A call addressed a guid with no registered dispatcher.
	#[error("Unknown target: {guid}")]
	UnknownTarget { guid: String },

	/// A call named a verb outside the target type's closed verb table.
	#[error("Unknown method: {kind}.{method}")]
	UnknownMethod { kind: String, method: String },

	/// Verb params failed schema validation.
	#[error("Invalid params for {method}: {source}")]
	InvalidParams {
		method: String,
		#[source]
		source: serde_json::Error,
	},

	/// A second `initialize` call reached the root scope.
	#[error("Already initialized")]
	AlreadyInitialized,

	/// A non-bootstrap call arrived before `initialize` completed.
	#[error("Out of order: {method} before initialize completed")]
	OutOfOrder { method: String },

	/// The session was closed; no further operations are accepted.
	#[error("Session closed")]
	SessionClosed,

	/// A run targeted a page whose tab is not currently attached.
	#[error("Page not attached: tab {tab_id}")]
	PageNotAttached { tab_id: TabId },

	/// The transport closed before the bootstrap/initialize sequence finished.
	#[error("Connection closed before initialization")]
	ConnectionClosedBeforeInit,

	/// The connection closed; pending calls are rejected with this.
	#[error("Connection closed: {reason}")]
	ConnectionClosed { reason: String },

	/// Transport-level failure (socket error, malformed frame source).
	#[error("Transport error: {0}")]
	Transport(String),

	/// Peer-reported verb failure, reconstructed from a return envelope.
	#[error("{message}")]
	Remote {
		/// Failure description as serialized by the peer.
		message: String,
		/// Peer-side stack trace, when provided.
		stack: Option<String>,
	},

	/// Guid was not present in the local proxy registry.
	#[error("Object not found: {guid}")]
	ObjectNotFound { guid: String },

	/// Waiting for an object or event exceeded its deadline.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// A correlation channel closed before the return arrived.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// Failure reported by the underlying automation engine.
	#[error("Engine failure: {0}")]
	Engine(String),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Shorthand for an [`Error::UnknownTarget`].
	pub fn unknown_target(guid: impl Into<String>) -> Self {
		Self::UnknownTarget { guid: guid.into() }
	}

	/// Shorthand for an [`Error::UnknownMethod`].
	pub fn unknown_method(kind: impl Into<String>, method: impl Into<String>) -> Self {
		Self::UnknownMethod {
			kind: kind.into(),
			method: method.into(),
		}
	}

	/// Shorthand for an [`Error::InvalidParams`] wrapping a serde failure.
	pub fn invalid_params(method: impl Into<String>, source: serde_json::Error) -> Self {
		Self::InvalidParams {
			method: method.into(),
			source,
		}
	}

	/// An [`Error::InvalidParams`] for a semantic rejection with no serde
	/// failure behind it.
	pub fn invalid_params_msg(method: impl Into<String>, message: impl std::fmt::Display) -> Self {
		Self::InvalidParams {
			method: method.into(),
			source: serde::de::Error::custom(message),
		}
	}

	/// Serializes this error into the wire payload of a failed return.
	pub fn wire(&self) -> WireError {
		WireError {
			message: self.to_string(),
			stack: match self {
				Self::Remote { stack, .. } => stack.clone(),
				_ => None,
			},
		}
	}

	/// Reconstructs a peer-reported failure from a wire payload.
	pub fn from_wire(error: WireError) -> Self {
		Self::Remote {
			message: error.message,
			stack: error.stack,
		}
	}

	fn remote_message(&self) -> Option<&str> {
		match self {
			Self::Remote { message, .. } => Some(message),
			_ => None,
		}
	}

	/// True for a routing failure on an unregistered guid, local or remote.
	pub fn is_unknown_target(&self) -> bool {
		matches!(self, Self::UnknownTarget { .. })
			|| self
				.remote_message()
				.is_some_and(|m| m.starts_with("Unknown target"))
	}

	/// True for a verb outside the target's verb table, local or remote.
	pub fn is_unknown_method(&self) -> bool {
		matches!(self, Self::UnknownMethod { .. })
			|| self
				.remote_message()
				.is_some_and(|m| m.starts_with("Unknown method"))
	}

	/// True for a params rejection, local or remote.
	pub fn is_invalid_params(&self) -> bool {
		matches!(self, Self::InvalidParams { .. })
			|| self
				.remote_message()
				.is_some_and(|m| m.starts_with("Invalid params"))
	}

	/// True for a closed-session rejection, local or remote.
	pub fn is_session_closed(&self) -> bool {
		matches!(self, Self::SessionClosed)
			|| self
				.remote_message()
				.is_some_and(|m| m.starts_with("Session closed"))
	}

	/// True for a not-attached rejection, local or remote.
	pub fn is_page_not_attached(&self) -> bool {
		matches!(self, Self::PageNotAttached { .. })
			|| self
				.remote_message()
				.is_some_and(|m| m.starts_with("Page not attached"))
	}

	/// True when the failure is any connection-closure condition.
	pub fn is_connection_closed(&self) -> bool {
		matches!(
			self,
			Self::ConnectionClosed { .. } | Self::ConnectionClosedBeforeInit
		) || self
			.remote_message()
			.is_some_and(|m| m.starts_with("Connection closed"))
	}

	/// True for a repeated root handshake, local or remote.
	pub fn is_already_initialized(&self) -> bool {
		matches!(self, Self::AlreadyInitialized)
			|| self
				.remote_message()
				.is_some_and(|m| m.starts_with("Already initialized"))
	}

	/// True for a pre-initialize ordering violation, local or remote.
	pub fn is_out_of_order(&self) -> bool {
		matches!(self, Self::OutOfOrder { .. })
			|| self
				.remote_message()
				.is_some_and(|m| m.starts_with("Out of order"))
	}

	/// True if waiting exceeded a deadline.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout(_))
	}
}
