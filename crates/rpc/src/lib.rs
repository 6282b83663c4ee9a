//! Asynchronous framed JSON-RPC plumbing for talking to worker processes.
//!
//! A [`Connection`] owns one peer: it multiplexes concurrent requests over a
//! byte channel, correlates responses back to their callers by request ID,
//! and forwards peer notifications in arrival order. Payloads are JSON
//! messages framed with `Content-Length` headers, the same envelope used by
//! the language server protocol.
//!
//! Method names and payload types are bound together through the [`Request`]
//! and [`Notification`] traits so call sites stay typed while the pump
//! itself only deals in [`Message`] values.

#![warn(missing_docs)]

mod connection;
mod message;
mod method;
mod types;

use std::io;
use std::sync::Arc;

pub use connection::Connection;
pub use message::Message;
pub use method::{Notification, Request};
pub use types::{AnyNotification, AnyRequest, AnyResponse, RequestId, ResponseError};

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible errors.
///
/// Cloneable so one failure can be fanned out to every caller waiting on the
/// same connection.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The connection I/O task has exited, taking all pending requests
	/// with it.
	#[error("connection stopped")]
	ConnectionStopped,
	/// The peer replied with an error response.
	#[error("{0}")]
	Response(#[from] ResponseError),
	/// A payload could not be serialized or deserialized.
	#[error("deserialization failed: {0}")]
	Deserialize(String),
	/// The peer violated the framing or message protocol.
	#[error("protocol error: {0}")]
	Protocol(String),
	/// Input/output error on the underlying channel.
	#[error("{0}")]
	Io(Arc<io::Error>),
}

impl From<io::Error> for Error {
	fn from(err: io::Error) -> Self {
		Self::Io(Arc::new(err))
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::Deserialize(err.to_string())
	}
}
