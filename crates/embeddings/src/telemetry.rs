//! Error capture seam.

use crate::Error;

/// Sink for errors worth reporting upstream.
///
/// The host decides what capture means: a crash reporter, a log file, or
/// nothing at all. Implementations must return quickly; they are called
/// from async tasks.
pub trait TelemetrySink: Send + Sync {
	/// Record one error occurrence.
	fn capture(&self, error: &Error);
}

/// Sink that drops every capture.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
	fn capture(&self, _error: &Error) {}
}
