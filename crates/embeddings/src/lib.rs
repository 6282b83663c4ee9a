//! Controller for local, on-device semantic code search.
//!
//! The actual embedding work (model inference, vector store, indexer)
//! lives in a separate engine worker process; this crate supervises it.
//! [`EmbeddingsController`] owns the whole subsystem:
//!
//! - lazy, single-flight engine startup: the process is spawned on first
//!   use, at most once, and concurrent callers share one attempt
//! - a routed notification stream turning engine progress pushes into
//!   indicator state and reconciliation loads
//! - a single-slot repository cache answering "is this path indexed"
//!   without repeated engine round-trips
//! - a derived status snapshot with push change events for host UI
//!
//! The controller is deliberately fail-closed: while the configured
//! credential is not scoped to the primary backend, or whenever the engine
//! misbehaves, every query degrades to "no results" rather than an error
//! dialog.

#![warn(missing_docs)]

mod config;
mod controller;
mod events;
mod progress;
pub mod protocol;
mod status;
mod telemetry;
pub mod transport;

pub use config::{ControllerConfig, EngineConfig, PRIMARY_ENDPOINT};
pub use controller::EmbeddingsController;
pub use events::Subscription;
pub use progress::IndicatorSnapshot;
pub use status::{ProviderState, ProviderStatus, StatusGroup, StatusSnapshot};
pub use telemetry::{NoopTelemetry, TelemetrySink};
pub use transport::{EngineTransport, StartedEngine, StdioTransport};

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible errors.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The engine process could not be spawned.
	#[error("failed to spawn engine `{command}`: {reason}")]
	Spawn {
		/// The command that was attempted.
		command: String,
		/// Why the spawn failed.
		reason: String,
	},
	/// The engine connection is gone.
	#[error("engine stopped")]
	EngineStopped,
	/// The engine took longer than the configured timeout.
	#[error("request timed out: {0}")]
	RequestTimeout(String),
	/// The engine answered with an error response.
	#[error("{0}")]
	Response(semdex_rpc::ResponseError),
	/// Undecodable or protocol-violating engine traffic.
	#[error("protocol error: {0}")]
	Protocol(String),
	/// The controller was disposed.
	#[error("controller disposed")]
	Disposed,
}

impl From<semdex_rpc::Error> for Error {
	fn from(err: semdex_rpc::Error) -> Self {
		use semdex_rpc::Error as Rpc;
		match err {
			Rpc::ConnectionStopped => Self::EngineStopped,
			Rpc::Response(resp) => Self::Response(resp),
			Rpc::Deserialize(msg) | Rpc::Protocol(msg) => Self::Protocol(msg),
			Rpc::Io(io) => Self::Protocol(io.to_string()),
			other => Self::Protocol(other.to_string()),
		}
	}
}
