//! Wire-level message bodies.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Identifier tying a response to its request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
	/// Numeric identifier.
	Number(i64),
	/// String identifier.
	String(String),
}

impl fmt::Display for RequestId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Number(id) => id.fmt(f),
			Self::String(id) => id.fmt(f),
		}
	}
}

/// A method call expecting a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnyRequest {
	/// Request identifier, assigned by the connection.
	pub id: RequestId,
	/// Method name.
	pub method: String,
	/// Parameter payload.
	#[serde(default)]
	pub params: JsonValue,
}

/// The reply to an [`AnyRequest`].
///
/// Exactly one of `result` and `error` is populated by a conforming peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnyResponse {
	/// Identifier of the request this answers.
	pub id: RequestId,
	/// Success payload.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<JsonValue>,
	/// Failure payload.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<ResponseError>,
}

/// A method call with no reply expected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnyNotification {
	/// Method name.
	pub method: String,
	/// Parameter payload.
	#[serde(default)]
	pub params: JsonValue,
}

/// Error body of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct ResponseError {
	/// Numeric error code.
	pub code: i64,
	/// Human-readable description.
	pub message: String,
	/// Optional structured detail.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<JsonValue>,
}
