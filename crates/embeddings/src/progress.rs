//! Indexing progress indicator state.

use serde::Serialize;

/// Point-in-time view of the indexing indicator, for the host UI to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndicatorSnapshot {
	/// Completion percentage, when known.
	pub percent: Option<u8>,
	/// Most recent problem the engine reported for the running job.
	pub error: Option<String>,
	/// Informational message to surface, if any.
	pub message: Option<String>,
}

/// Epoch-guarded indicator state.
///
/// Every new indexing run bumps the epoch. Deferred hide timers capture the
/// epoch they were scheduled under, so a timer from an earlier run can
/// never hide the indicator of a later one.
#[derive(Debug, Default)]
pub(crate) struct Indicator {
	epoch: u64,
	visible: bool,
	percent: Option<u8>,
	error: Option<String>,
	message: Option<String>,
}

impl Indicator {
	/// Show a fresh indicator for a new run and return its epoch.
	pub(crate) fn begin(&mut self) -> u64 {
		self.epoch += 1;
		self.visible = true;
		self.percent = Some(0);
		self.error = None;
		self.message = None;
		self.epoch
	}

	pub(crate) fn epoch(&self) -> u64 {
		self.epoch
	}

	pub(crate) fn set_percent(&mut self, percent: u8) {
		self.percent = Some(percent);
	}

	pub(crate) fn set_error(&mut self, error: String) {
		self.error = Some(error);
	}

	/// Record an informational message. Shown alongside the indicator when
	/// one is visible, on its own otherwise; sticky until the next run.
	pub(crate) fn set_message(&mut self, message: String) {
		self.message = Some(message);
	}

	/// Hide the indicator if `epoch` is still the current run.
	pub(crate) fn hide_if_current(&mut self, epoch: u64) -> bool {
		if self.epoch == epoch && self.visible {
			self.visible = false;
			true
		} else {
			false
		}
	}

	pub(crate) fn snapshot(&self) -> Option<IndicatorSnapshot> {
		if self.visible {
			Some(IndicatorSnapshot {
				percent: self.percent,
				error: self.error.clone(),
				message: self.message.clone(),
			})
		} else {
			self.message.clone().map(|message| IndicatorSnapshot {
				percent: None,
				error: None,
				message: Some(message),
			})
		}
	}
}
