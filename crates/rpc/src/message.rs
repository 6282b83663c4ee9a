//! `Content-Length` framed message reading and writing.

use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::types::{AnyNotification, AnyRequest, AnyResponse};
use crate::{Error, Result};

/// A complete wire message.
#[derive(Debug, Clone)]
pub enum Message {
	/// A call expecting a response.
	Request(AnyRequest),
	/// The answer to an earlier request.
	Response(AnyResponse),
	/// A call with no reply expected.
	Notification(AnyNotification),
}

impl Message {
	/// Read one framed message. Returns `Ok(None)` once the peer closes
	/// the channel.
	pub async fn read(input: &mut (impl AsyncBufRead + Unpin)) -> Result<Option<Self>> {
		let mut line = String::new();
		let mut content_length = None;
		loop {
			line.clear();
			if input.read_line(&mut line).await? == 0 {
				return Ok(None);
			}
			let header = line.trim_end();
			if header.is_empty() {
				break;
			}
			if let Some(value) = header.strip_prefix("Content-Length:") {
				let length = value.trim().parse().map_err(|_| {
					Error::Protocol(format!("invalid Content-Length header: {header:?}"))
				})?;
				content_length = Some(length);
			}
		}

		let length =
			content_length.ok_or_else(|| Error::Protocol("missing Content-Length header".into()))?;
		let mut body = vec![0u8; length];
		input.read_exact(&mut body).await?;

		let json = serde_json::from_slice(&body)?;
		Self::from_json(json).map(Some)
	}

	/// Write one framed message and flush it.
	pub async fn write(&self, output: &mut (impl AsyncWrite + Unpin)) -> Result<()> {
		let body = match self {
			Self::Request(req) => serde_json::to_string(&serde_json::json!({
				"jsonrpc": "2.0",
				"id": req.id,
				"method": req.method,
				"params": req.params,
			}))?,
			Self::Response(resp) => {
				let mut body = serde_json::json!({
					"jsonrpc": "2.0",
					"id": resp.id,
				});
				match &resp.error {
					Some(error) => body["error"] = serde_json::to_value(error)?,
					None => body["result"] = resp.result.clone().unwrap_or(JsonValue::Null),
				}
				serde_json::to_string(&body)?
			}
			Self::Notification(notif) => serde_json::to_string(&serde_json::json!({
				"jsonrpc": "2.0",
				"method": notif.method,
				"params": notif.params,
			}))?,
		};

		let framed = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
		output.write_all(framed.as_bytes()).await?;
		output.flush().await?;
		Ok(())
	}

	/// Classify a decoded body by which of `id` and `method` it carries.
	fn from_json(json: JsonValue) -> Result<Self> {
		let has_id = json.get("id").is_some_and(|id| !id.is_null());
		let has_method = json.get("method").is_some();
		match (has_id, has_method) {
			(true, true) => Ok(Self::Request(serde_json::from_value(json)?)),
			(true, false) => Ok(Self::Response(serde_json::from_value(json)?)),
			(false, true) => Ok(Self::Notification(serde_json::from_value(json)?)),
			(false, false) => Err(Error::Protocol(
				"message is neither a request, a response, nor a notification".into(),
			)),
		}
	}
}
