//! Session establishment and liveness payloads.

use serde::{Deserialize, Serialize};

/// Parameters for `createSession`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionParams {
	pub username: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub password: Option<String>,
	/// Effective group to open the session under; server default when absent.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub group: Option<String>,
	/// Principal the session acts on behalf of (ownership-preserving writes).
	#[serde(skip_serializing_if = "Option::is_none")]
	pub impersonate: Option<String>,
	/// Free-form connection properties forwarded to the server.
	#[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
	pub properties: std::collections::HashMap<String, String>,
}

/// Parameters for `joinSession`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSessionParams {
	pub uuid: String,
}

/// Result of a successful create or join.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
	pub uuid: String,
}

/// Parameters for `closeSession`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseSessionParams {
	pub uuid: String,
	/// Soft close decrements the shared refcount; hard close destroys the
	/// session unconditionally.
	pub soft: bool,
}

/// Acknowledgement of a close, with the refcount remaining server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseSessionAck {
	#[serde(default)]
	pub remaining: u32,
}

/// Authenticated caller context attached to a live session.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
	pub user_id: i64,
	pub user_name: String,
	pub group_id: i64,
	pub group_name: String,
	#[serde(default)]
	pub is_admin: bool,
	#[serde(default)]
	pub member_of_groups: Vec<i64>,
	#[serde(default)]
	pub leader_of_groups: Vec<i64>,
	pub session_uuid: String,
}

/// Result of `resolveService` / `castService`: an opaque remote reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRef {
	/// Stringified remote reference, valid only on the transport that issued it.
	pub reference: String,
}
