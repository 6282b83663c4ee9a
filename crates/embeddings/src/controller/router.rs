//! Engine notification routing.
//!
//! One router task per session consumes the engine's notification stream
//! in arrival order. Completion is reconciled through a fresh load round
//! trip; readiness is never assumed from the done signal alone.

use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use semdex_rpc::{AnyNotification, Notification};

use crate::protocol::{IndexProgress, ProgressUpdate};

use super::ControllerInner;

/// How long the indicator stays visible after a run completes, so the
/// finished state is perceptible before it disappears.
const INDICATOR_GRACE: Duration = Duration::from_secs(30);

impl ControllerInner {
	/// Spawn the router task for a freshly bound session.
	///
	/// The task holds only a weak reference to the controller and stops
	/// on cancellation or when the engine closes its side.
	pub(super) fn spawn_notification_router(
		&self,
		mut notifications: mpsc::UnboundedReceiver<AnyNotification>,
	) {
		let weak = self.weak.clone();
		let cancel = self.cancel.clone();
		tokio::spawn(async move {
			loop {
				let notification = tokio::select! {
					() = cancel.cancelled() => break,
					notification = notifications.recv() => match notification {
						Some(notification) => notification,
						None => {
							debug!("engine notification stream ended");
							break;
						}
					},
				};
				let Some(inner) = weak.upgrade() else { break };
				inner.route_notification(notification).await;
			}
		});
	}

	async fn route_notification(&self, notification: AnyNotification) {
		if notification.method != IndexProgress::METHOD {
			debug!(method = %notification.method, "ignoring unknown engine notification");
			return;
		}
		match serde_json::from_value::<ProgressUpdate>(notification.params.clone()) {
			Ok(update) => self.handle_progress(update).await,
			Err(_) => {
				// Unknown payload shapes are version skew, not a fault.
				info!(payload = %notification.params, "unrecognized progress payload");
				self.indicator.lock().set_message(format!(
					"Semantic search engine sent an unrecognized progress update: {}",
					notification.params
				));
			}
		}
	}

	async fn handle_progress(&self, update: ProgressUpdate) {
		match &update {
			ProgressUpdate::Progress { num_items, total_items } => {
				if self.indexing.read().is_none() {
					// Stray tick after completion; nothing to attach it to.
					debug!(num_items, total_items, "progress with no job outstanding");
					return;
				}
				trace!(num_items, total_items, "indexing progress");
				if let Some(percent) = update.percent() {
					self.indicator.lock().set_percent(percent);
				}
			}
			ProgressUpdate::Error(detail) => {
				// Not terminal: the engine keeps indexing and still owes
				// a done signal, so the job stays outstanding.
				let text = error_text(detail);
				warn!(error = %text, "engine reported an indexing problem");
				self.indicator.lock().set_error(text);
			}
			ProgressUpdate::Done => self.finish_indexing().await,
		}
	}

	/// Handle the terminal done signal for the outstanding job.
	async fn finish_indexing(&self) {
		// Keep the bar up briefly, then hide it unless a newer run has
		// taken over the indicator in the meantime.
		let epoch = {
			let mut indicator = self.indicator.lock();
			indicator.set_percent(100);
			indicator.epoch()
		};
		self.schedule_indicator_hide(epoch);

		let finished = self.indexing.write().take();
		let Some(path) = finished else {
			debug!("done signal with no indexing job outstanding");
			self.status_observers.emit();
			return;
		};

		let matches_cache = {
			let repo = self.repo.read();
			repo.as_ref().is_none_or(|state| state.path == path)
		};
		if matches_cache {
			self.reload(&path).await;
			self.change_observers.emit();
		} else {
			debug!(path = %path.display(), "indexing finished for a replaced repository");
		}

		// Pushed unconditionally: projections depend on the cleared
		// in-progress path even when the reload changed nothing.
		self.status_observers.emit();
	}

	fn schedule_indicator_hide(&self, epoch: u64) {
		let weak = self.weak.clone();
		let cancel = self.cancel.clone();
		tokio::spawn(async move {
			tokio::select! {
				() = cancel.cancelled() => {}
				() = tokio::time::sleep(INDICATOR_GRACE) => {
					if let Some(inner) = weak.upgrade() {
						inner.indicator.lock().hide_if_current(epoch);
					}
				}
			}
		});
	}
}

/// Engine error payloads are usually plain strings; fall back to raw JSON
/// for anything else.
fn error_text(detail: &JsonValue) -> String {
	match detail {
		JsonValue::String(text) => text.clone(),
		other => other.to_string(),
	}
}
