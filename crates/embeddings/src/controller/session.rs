//! Engine session lifecycle.
//!
//! The engine is spawned lazily and at most once per controller. Callers
//! that race the spawn share one attempt through a leader/waiter protocol;
//! a failed attempt is delivered to everyone waiting and cleared, so the
//! next call starts fresh instead of replaying a stale error forever.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, watch};
use tracing::{info, warn};

use semdex_rpc::{Connection, Request};

use crate::protocol::SetToken;
use crate::transport::StartedEngine;
use crate::{Error, Result};

use super::ControllerInner;

/// Cloneable handle to a bound engine session.
#[derive(Clone)]
pub(super) struct EngineSession {
	connection: Connection,
}

impl EngineSession {
	fn new(connection: Connection) -> Self {
		Self { connection }
	}

	/// Typed request with a timeout. [`Duration::ZERO`] disables the
	/// timeout.
	pub(super) async fn request<R: Request>(
		&self,
		params: R::Params,
		timeout: Duration,
	) -> Result<R::Result> {
		if timeout == Duration::ZERO {
			Ok(self.connection.request::<R>(params).await?)
		} else {
			match tokio::time::timeout(timeout, self.connection.request::<R>(params)).await {
				Ok(result) => Ok(result?),
				Err(_) => Err(Error::RequestTimeout(R::METHOD.into())),
			}
		}
	}

	/// Fire-and-forget token push. A failure here only means the
	/// connection already stopped; the next spawn re-forwards the token.
	pub(super) fn push_token(&self, token: &str) {
		if let Err(err) = self.connection.request_forget::<SetToken>(token.to_owned()) {
			warn!(error = %err, "failed to forward token to engine");
		}
	}
}

/// Tracking state for an engine start in progress.
pub(super) struct InFlightStart {
	tx: watch::Sender<Option<Arc<Result<EngineSession>>>>,
	rx: watch::Receiver<Option<Arc<Result<EngineSession>>>>,
}

impl ControllerInner {
	/// Get the bound session, starting the engine if necessary.
	///
	/// # Singleflight protocol
	///
	/// 1. Fast path: a session is already bound
	/// 2. Leader election: the first caller in becomes leader, the rest
	///    become waiters
	/// 3. Leader: re-check, start via the transport, bind, publish the
	///    result on the watch channel
	/// 4. Waiters: receive the published result directly
	///
	/// A spawn failure is fanned out to every waiter and the in-flight
	/// slot is cleared, so a later call begins a fresh attempt.
	pub(super) async fn ensure_session(&self) -> Result<EngineSession> {
		if self.cancel.is_cancelled() {
			return Err(Error::Disposed);
		}

		// 1. Fast path
		let bound = self.session.read().clone();
		if let Some(session) = bound {
			return Ok(session);
		}

		// 2. Leader election
		let (inflight, is_leader) = {
			let mut slot = self.session_inflight.lock().await;
			match slot.as_ref() {
				Some(inflight) => (inflight.clone(), false),
				None => {
					let (tx, rx) = watch::channel(None);
					let inflight = Arc::new(InFlightStart { tx, rx });
					*slot = Some(inflight.clone());
					(inflight, true)
				}
			}
		};

		if !is_leader {
			// 4. Wait for the leader's published result
			let mut rx = inflight.rx.clone();
			loop {
				let result = {
					let borrow = rx.borrow();
					borrow.as_ref().cloned()
				};

				if let Some(result) = result {
					return (*result).clone();
				}

				if rx.changed().await.is_err() {
					return Err(Error::Protocol("engine start aborted".into()));
				}
			}
		}

		// 3. Leader work
		let guard = StartGuard::new(Arc::clone(&self.session_inflight), inflight);

		// Re-check after election so a session bound by a previous leader
		// is reused instead of double-starting the engine.
		let bound = self.session.read().clone();
		if let Some(session) = bound {
			return guard.complete(Ok(session));
		}

		info!(command = %self.config.engine.command, "starting embeddings engine session");
		let result = match self.transport.start(&self.config.engine).await {
			Ok(started) => {
				let session = self.bind_engine(started);
				*self.session.write() = Some(session.clone());
				self.change_observers.emit();
				Ok(session)
			}
			Err(err) => {
				self.telemetry.capture(&err);
				warn!(error = %err, "engine spawn failed");
				Err(err)
			}
		};
		guard.complete(result)
	}

	/// Wire a started engine into the controller: notification router
	/// first, so nothing the engine pushes between startup and the first
	/// request can be dropped, then the credential.
	fn bind_engine(&self, started: StartedEngine) -> EngineSession {
		let StartedEngine { connection, notifications, process } = started;
		*self.engine_process.lock() = process;
		self.spawn_notification_router(notifications);

		let session = EngineSession::new(connection);
		let token = self.credential.read().token.clone();
		if let Some(token) = token {
			session.push_token(&token);
		}
		session
	}
}

/// Guard that un-wedges the in-flight slot if the leader fails or is
/// cancelled.
struct StartGuard {
	slot: Arc<AsyncMutex<Option<Arc<InFlightStart>>>>,
	inflight: Arc<InFlightStart>,
	completed: bool,
}

impl StartGuard {
	fn new(slot: Arc<AsyncMutex<Option<Arc<InFlightStart>>>>, inflight: Arc<InFlightStart>) -> Self {
		Self { slot, inflight, completed: false }
	}

	fn complete(mut self, result: Result<EngineSession>) -> Result<EngineSession> {
		self.completed = true;

		// 1) publish the result to waiters (sync, no await points)
		let _ = self.inflight.tx.send(Some(Arc::new(result.clone())));

		// 2) clear the slot so the next call is a fresh attempt; inline
		//    when uncontended, from a task when a waiter holds the lock
		match self.slot.try_lock() {
			Ok(mut slot) => *slot = None,
			Err(_) => {
				let slot = Arc::clone(&self.slot);
				tokio::spawn(async move {
					*slot.lock().await = None;
				});
			}
		}

		result
	}
}

impl Drop for StartGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}

		// Leader exited early: wake waiters with a deterministic error,
		// then un-wedge the slot.
		let aborted: Result<EngineSession> = Err(Error::Protocol(
			"engine start aborted (leader cancelled)".into(),
		));
		let _ = self.inflight.tx.send(Some(Arc::new(aborted)));

		match self.slot.try_lock() {
			Ok(mut slot) => *slot = None,
			Err(_) => {
				let slot = Arc::clone(&self.slot);
				tokio::spawn(async move {
					*slot.lock().await = None;
				});
			}
		}
	}
}
