//! RPC envelope types: requests, responses, events, and classified errors.
//!
//! Responses are distinguished from server-pushed events by the presence of
//! the `id` field, so the two are modeled as an untagged union.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request message sent to the server.
///
/// ```json
/// {
///   "id": 42,
///   "session": "b2f7c1e0-…",
///   "service": "query",
///   "method": "find",
///   "params": { "kind": "Image", "id": 101 }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
	/// Unique request ID for correlating responses.
	pub id: u32,
	/// Session UUID this call is attributed to; absent only for session
	/// establishment itself.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub session: Option<String>,
	/// Logical service the call targets (wire name, e.g. `"query"`).
	pub service: String,
	/// Method name to invoke.
	pub method: String,
	/// Method parameters as a JSON object.
	pub params: Value,
}

/// Response message from the server. `result` and `error` are mutually
/// exclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	/// Request ID this response correlates to.
	pub id: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorPayload>,
}

/// Server-reported error with its failure classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
	/// Failure category assigned by the server.
	#[serde(default)]
	pub category: ErrorCategory,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<Value>,
}

/// Failure categories the server may report.
///
/// Unknown categories from newer servers deserialize to [`ErrorCategory::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
	/// A fronting router lost its link to the backend mid-call.
	TransientNetwork,
	/// The claimed session is not known to the server (expired or destroyed).
	SessionExpired,
	/// Credentials rejected or insufficient permission.
	SecurityViolation,
	/// A server-side resource ceiling was hit (e.g. oversized payload).
	ResourceLimit,
	/// The server reported a deterministic internal defect.
	InternalDefect,
	/// Anything the server could not classify.
	#[serde(other)]
	#[default]
	Unknown,
}

/// Server-pushed event message (no `id` field).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub session: Option<String>,
	pub method: String,
	pub params: Value,
}

/// Discriminated union of inbound protocol messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	/// Response message (has `id` field).
	Response(Response),
	/// Event message (no `id` field).
	Event(Event),
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn response_with_id_deserializes_as_response() {
		let json = r#"{"id": 42, "result": {"status": "ok"}}"#;
		let message: Message = serde_json::from_str(json).unwrap();
		match message {
			Message::Response(response) => {
				assert_eq!(response.id, 42);
				assert!(response.result.is_some());
				assert!(response.error.is_none());
			}
			_ => panic!("expected Response"),
		}
	}

	#[test]
	fn message_without_id_deserializes_as_event() {
		let json = r#"{"session": "abc", "method": "sessionClosed", "params": {}}"#;
		let message: Message = serde_json::from_str(json).unwrap();
		match message {
			Message::Event(event) => {
				assert_eq!(event.session.as_deref(), Some("abc"));
				assert_eq!(event.method, "sessionClosed");
			}
			_ => panic!("expected Event"),
		}
	}

	#[test]
	fn error_category_wire_names() {
		let payload: ErrorPayload =
			serde_json::from_str(r#"{"category": "SECURITY_VIOLATION", "message": "denied"}"#).unwrap();
		assert_eq!(payload.category, ErrorCategory::SecurityViolation);
	}

	#[test]
	fn unrecognized_category_maps_to_unknown() {
		let payload: ErrorPayload =
			serde_json::from_str(r#"{"category": "QUOTA_DRIFT", "message": "?"}"#).unwrap();
		assert_eq!(payload.category, ErrorCategory::Unknown);
	}

	#[test]
	fn missing_category_defaults_to_unknown() {
		let payload: ErrorPayload = serde_json::from_str(r#"{"message": "boom"}"#).unwrap();
		assert_eq!(payload.category, ErrorCategory::Unknown);
	}
}
