//! Wire envelopes for the object-RPC channel.
//!
//! Every frame crossing the bridge is one JSON object in one of three shapes:
//!
//! 1. [`Call`] — driver-initiated verb invocation: `{id, guid, method, params}`
//! 2. [`Return`] — completion of exactly one call: `{id, result?}` or `{id, error?}`
//! 3. [`Event`] — server-initiated notification: `{guid, method, params}`, no `id`
//!
//! Object lifecycle rides on two reserved event methods: [`METHOD_CREATE`]
//! announces a new object (the event's `guid` names the *parent* scope, the
//! child guid travels inside [`CreateParams`]), and [`METHOD_DISPOSE`] tears
//! one down. Objects are referenced inside params, results, and initializers
//! as `{"guid": "..."}` objects ([`GuidRef`]).
//!
//! # Main Types
//!
//! - [`Message`] - Untagged union over the three shapes, with a forward-compatible catch-all
//! - [`Call`] / [`Return`] / [`Event`] - The individual envelope shapes
//! - [`WireError`] - Flat error payload carried by a failed return
//! - [`CreateParams`] - Typed view of a `__create__` event's params
//! - [`InitializeParams`] - Negotiated parameters of the root `initialize` call

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Reserved event method announcing a new object node.
pub const METHOD_CREATE: &str = "__create__";

/// Reserved event method tearing an object node down.
pub const METHOD_DISPOSE: &str = "__dispose__";

/// Well-known method name of the root handshake call.
pub const METHOD_INITIALIZE: &str = "initialize";

/// Serde helpers for `Arc<str>` guid fields.
pub fn serialize_arc_str<S>(arc: &Arc<str>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
	S: serde::Serializer,
{
	serializer.serialize_str(arc)
}

pub fn deserialize_arc_str<'de, D>(deserializer: D) -> std::result::Result<Arc<str>, D::Error>
where
	D: serde::Deserializer<'de>,
{
	let s: String = serde::Deserialize::deserialize(deserializer)?;
	Ok(Arc::from(s.as_str()))
}

fn empty_params() -> Value {
	Value::Object(serde_json::Map::new())
}

/// Verb invocation addressed to one object node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
	/// Caller-assigned id, unique per outstanding call, echoed by the return.
	pub id: u32,
	/// Guid of the target object. Empty string addresses the root scope.
	#[serde(
		serialize_with = "serialize_arc_str",
		deserialize_with = "deserialize_arc_str"
	)]
	pub guid: Arc<str>,
	/// Verb name resolved against the target's closed verb table.
	pub method: String,
	/// Verb parameters; an absent field reads as the empty object.
	#[serde(default = "empty_params")]
	pub params: Value,
}

/// Completion envelope correlating to exactly one [`Call`] by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Return {
	/// Id of the call this return completes.
	pub id: u32,
	/// Success payload, mutually exclusive with `error`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	/// Failure payload, mutually exclusive with `result`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<WireError>,
}

impl Return {
	/// Successful completion carrying `result`.
	pub fn ok(id: u32, result: Value) -> Self {
		Self {
			id,
			result: Some(result),
			error: None,
		}
	}

	/// Failed completion carrying a serialized error.
	pub fn err(id: u32, error: WireError) -> Self {
		Self {
			id,
			result: None,
			error: Some(error),
		}
	}
}

/// Error payload of a failed return: flat `{message, stack?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
	/// Human-readable failure description.
	pub message: String,
	/// Optional stack or origin trace, for diagnostics only.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stack: Option<String>,
}

impl WireError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			stack: None,
		}
	}
}

/// Server-initiated notification emitted by one object node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
	/// Guid of the emitting object (for `__create__`, the parent scope).
	#[serde(
		serialize_with = "serialize_arc_str",
		deserialize_with = "deserialize_arc_str"
	)]
	pub guid: Arc<str>,
	/// Event method name; reserved names carry object lifecycle.
	pub method: String,
	/// Event payload; an absent field reads as the empty object.
	#[serde(default = "empty_params")]
	pub params: Value,
}

impl Event {
	/// Whether this event announces a new object node.
	pub fn is_create(&self) -> bool {
		self.method == METHOD_CREATE
	}

	/// Whether this event tears an object node down.
	pub fn is_dispose(&self) -> bool {
		self.method == METHOD_DISPOSE
	}
}

/// Typed view of a `__create__` event's params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateParams {
	/// Object kind, one of the closed set of node types.
	#[serde(rename = "type")]
	pub kind: String,
	/// Guid assigned to the new object.
	#[serde(
		serialize_with = "serialize_arc_str",
		deserialize_with = "deserialize_arc_str"
	)]
	pub guid: Arc<str>,
	/// Construction-time state snapshot; guid refs name other objects.
	#[serde(default = "empty_params")]
	pub initializer: Value,
}

/// Guid reference as embedded in params, results, and initializers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuidRef {
	#[serde(
		serialize_with = "serialize_arc_str",
		deserialize_with = "deserialize_arc_str"
	)]
	pub guid: Arc<str>,
}

impl GuidRef {
	pub fn new(guid: impl AsRef<str>) -> Self {
		Self {
			guid: Arc::from(guid.as_ref()),
		}
	}

	/// The `{"guid": "..."}` JSON object form.
	pub fn to_value(&self) -> Value {
		serde_json::json!({ "guid": &*self.guid })
	}
}

/// Parameters of the root scope's `initialize` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeParams {
	/// Language tag of the driver SDK, e.g. `"javascript"` or `"python"`.
	#[serde(rename = "sdkLanguage")]
	pub sdk_language: String,
}

impl Default for InitializeParams {
	fn default() -> Self {
		Self {
			sdk_language: "javascript".into(),
		}
	}
}

/// Discriminated union of wire envelopes.
///
/// Discrimination is structural: calls carry `id` + `method`, returns carry
/// `id` without `method`, events carry `method` without `id`. Anything else
/// lands in [`Unknown`](Self::Unknown) so an unrecognized frame never kills
/// the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	/// Verb invocation (has `id`, `guid`, and `method`).
	Call(Call),
	/// Call completion (has `id`, no `method`).
	Return(Return),
	/// Notification (has `method`, no `id`).
	Event(Event),
	/// Unknown message shape (forward-compatible catch-all).
	Unknown(Value),
}

impl Message {
	/// A `__create__` event announcing `child_guid` under `parent_guid`.
	pub fn create(
		parent_guid: impl AsRef<str>,
		kind: impl Into<String>,
		child_guid: impl AsRef<str>,
		initializer: Value,
	) -> Self {
		let params = CreateParams {
			kind: kind.into(),
			guid: Arc::from(child_guid.as_ref()),
			initializer,
		};
		Self::Event(Event {
			guid: Arc::from(parent_guid.as_ref()),
			method: METHOD_CREATE.into(),
			params: serde_json::to_value(params).unwrap_or_else(|_| empty_params()),
		})
	}

	/// A `__dispose__` event tearing `guid` down.
	pub fn dispose(guid: impl AsRef<str>) -> Self {
		Self::Event(Event {
			guid: Arc::from(guid.as_ref()),
			method: METHOD_DISPOSE.into(),
			params: empty_params(),
		})
	}

	/// A domain event emitted by `guid`.
	pub fn event(guid: impl AsRef<str>, method: impl Into<String>, params: Value) -> Self {
		Self::Event(Event {
			guid: Arc::from(guid.as_ref()),
			method: method.into(),
			params,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn call_envelope_is_discriminated_by_id_and_method() {
		let json = r#"{"id":7,"guid":"Application","method":"attach","params":{"tabId":12}}"#;
		let msg: Message = serde_json::from_str(json).unwrap();
		match msg {
			Message::Call(call) => {
				assert_eq!(call.id, 7);
				assert_eq!(&*call.guid, "Application");
				assert_eq!(call.method, "attach");
				assert_eq!(call.params["tabId"], 12);
			}
			other => panic!("expected call, got {other:?}"),
		}
	}

	#[test]
	fn return_envelope_is_discriminated_by_id_without_method() {
		let json = r#"{"id":7,"result":{"page":{"guid":"Page@1"}}}"#;
		let msg: Message = serde_json::from_str(json).unwrap();
		match msg {
			Message::Return(ret) => {
				assert_eq!(ret.id, 7);
				assert_eq!(ret.result.unwrap()["page"]["guid"], "Page@1");
				assert!(ret.error.is_none());
			}
			other => panic!("expected return, got {other:?}"),
		}
	}

	#[test]
	fn event_envelope_is_discriminated_by_missing_id() {
		let json = r#"{"guid":"Application","method":"modeChanged","params":{"mode":"recording"}}"#;
		let msg: Message = serde_json::from_str(json).unwrap();
		match msg {
			Message::Event(event) => {
				assert_eq!(&*event.guid, "Application");
				assert_eq!(event.method, "modeChanged");
				assert_eq!(event.params["mode"], "recording");
			}
			other => panic!("expected event, got {other:?}"),
		}
	}

	#[test]
	fn unrecognized_shape_falls_back_to_unknown() {
		let json = r#"{"jsonrpc":"2.0","weird":true}"#;
		let msg: Message = serde_json::from_str(json).unwrap();
		assert!(matches!(msg, Message::Unknown(_)));
	}

	#[test]
	fn missing_params_read_as_empty_object() {
		let json = r#"{"id":1,"guid":"","method":"initialize"}"#;
		let msg: Message = serde_json::from_str(json).unwrap();
		match msg {
			Message::Call(call) => assert!(call.params.as_object().unwrap().is_empty()),
			other => panic!("expected call, got {other:?}"),
		}
	}

	#[test]
	fn create_envelope_puts_parent_on_top_and_child_in_params() {
		let msg = Message::create("", "Application", "Application", serde_json::json!({}));
		let json = serde_json::to_value(&msg).unwrap();
		assert_eq!(json["guid"], "");
		assert_eq!(json["method"], "__create__");
		assert_eq!(json["params"]["type"], "Application");
		assert_eq!(json["params"]["guid"], "Application");
		assert!(json["params"]["initializer"].as_object().unwrap().is_empty());
	}

	#[test]
	fn create_params_round_trip_through_typed_view() {
		let msg = Message::create("Context@1", "Page", "Page@2", serde_json::json!({"tabId": 4}));
		let Message::Event(event) = msg else {
			panic!("create is an event");
		};
		assert!(event.is_create());
		let params: CreateParams = serde_json::from_value(event.params).unwrap();
		assert_eq!(params.kind, "Page");
		assert_eq!(&*params.guid, "Page@2");
		assert_eq!(params.initializer["tabId"], 4);
	}

	#[test]
	fn error_payload_is_flat() {
		let ret = Return::err(3, WireError::new("unknown target: Page@9"));
		let json = serde_json::to_value(&ret).unwrap();
		assert_eq!(json["error"]["message"], "unknown target: Page@9");
		assert!(json["error"].get("error").is_none());
		assert!(json["error"].get("stack").is_none());
		assert!(json.get("result").is_none());
	}

	#[test]
	fn guid_ref_serializes_to_guid_object() {
		let value = GuidRef::new("Page@3").to_value();
		assert_eq!(value, serde_json::json!({"guid": "Page@3"}));
	}

	#[test]
	fn initialize_params_use_sdk_language_wire_name() {
		let json = serde_json::to_string(&InitializeParams {
			sdk_language: "python".into(),
		})
		.unwrap();
		assert_eq!(json, r#"{"sdkLanguage":"python"}"#);
	}
}
