//! The embeddings controller.
//!
//! One controller instance supervises one engine process and carries all
//! subsystem state: the bound session, the credential scope, the
//! single-slot repository cache, the in-progress indexing path, and the
//! observer lists. Everything the host sees is derived from that state on
//! demand.

mod router;
mod session;


use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ControllerConfig, is_primary_endpoint};
use crate::events::{Observers, Subscription};
use crate::progress::{Indicator, IndicatorSnapshot};
use crate::protocol::{IndexParams, IndexRepo, LoadRepo, QueryMatch, QueryRepo, QueryResultSet};
use crate::status::{RepoState, StatusInputs, StatusSnapshot, project};
use crate::telemetry::{NoopTelemetry, TelemetrySink};
use crate::transport::{EngineProcess, EngineTransport, StdioTransport};
use crate::Result;

use session::{EngineSession, InFlightStart};

/// Credential scope pushed in by the host.
#[derive(Debug, Default)]
struct Credential {
	/// Bearer token for the configured endpoint, if any.
	token: Option<String>,
	/// Whether the endpoint is the primary backend. Everything is inert
	/// while this is false.
	primary_backend: bool,
}

/// Controller for the local embeddings engine.
///
/// The engine process is started lazily on first use and at most once per
/// controller; concurrent callers share a single spawn attempt. All
/// methods are cheap to call from UI-adjacent code: state reads are
/// lock-and-copy, and engine traffic happens on background tasks.
#[derive(Clone)]
pub struct EmbeddingsController {
	inner: Arc<ControllerInner>,
}

/// Shared controller state.
///
/// # Concurrency
///
/// - `session`: `RwLock` fast path for the bound session handle
/// - `session_inflight`: async `Mutex` gate electing one spawn leader
/// - `load_gate`: async `Mutex` serializing load round-trips so rapid
///   duplicate loads collapse onto one engine request
/// - `repo`, `indexing`, `credential`: plain `RwLock` state reads
pub(crate) struct ControllerInner {
	/// Back-reference handed to spawned tasks; they must not keep a
	/// disposed controller alive.
	weak: Weak<ControllerInner>,
	config: ControllerConfig,
	transport: Arc<dyn EngineTransport>,
	telemetry: Arc<dyn TelemetrySink>,
	/// Bound engine session, once one exists.
	session: RwLock<Option<EngineSession>>,
	/// Spawn attempt in flight, shared between leader and waiters.
	session_inflight: Arc<AsyncMutex<Option<Arc<InFlightStart>>>>,
	/// Child handle of the running engine process.
	engine_process: Mutex<Option<EngineProcess>>,
	credential: RwLock<Credential>,
	/// Single-slot cache of the last load outcome.
	repo: RwLock<Option<RepoState>>,
	/// Serializes engine load round-trips.
	load_gate: AsyncMutex<()>,
	/// Path an indexing job is outstanding for.
	indexing: RwLock<Option<PathBuf>>,
	indicator: Mutex<Indicator>,
	status_observers: Observers,
	change_observers: Observers,
	cancel: CancellationToken,
}

impl EmbeddingsController {
	/// Create a controller that runs the engine over stdio.
	pub fn new(config: ControllerConfig) -> Self {
		Self::with_transport(config, Arc::new(StdioTransport), Arc::new(NoopTelemetry))
	}

	/// Create a controller with an explicit transport and telemetry sink.
	pub fn with_transport(
		config: ControllerConfig,
		transport: Arc<dyn EngineTransport>,
		telemetry: Arc<dyn TelemetrySink>,
	) -> Self {
		let inner = Arc::new_cyclic(|weak| ControllerInner {
			weak: weak.clone(),
			config,
			transport,
			telemetry,
			session: RwLock::new(None),
			session_inflight: Arc::new(AsyncMutex::new(None)),
			engine_process: Mutex::new(None),
			credential: RwLock::new(Credential::default()),
			repo: RwLock::new(None),
			load_gate: AsyncMutex::new(()),
			indexing: RwLock::new(None),
			indicator: Mutex::new(Indicator::default()),
			status_observers: Observers::default(),
			change_observers: Observers::default(),
			cancel: CancellationToken::new(),
		});
		Self { inner }
	}

	/// Bring the subsystem up: start the engine session, then eagerly load
	/// the configured workspace root.
	///
	/// The eager load is best-effort; only spawn failures are reported.
	///
	/// # Errors
	///
	/// Returns an error if the engine process cannot be spawned or the
	/// controller was disposed.
	pub async fn start(&self) -> Result<()> {
		self.inner.ensure_session().await?;
		let root = self.inner.config.workspace_root.clone();
		if root.is_some() {
			let _ = self.inner.load(root).await;
		}
		Ok(())
	}

	/// Record the credential scope for `endpoint`.
	///
	/// The subsystem only operates against the primary backend; any other
	/// endpoint turns every operation into a cheap no-op. When a session
	/// is already bound and a token is given, it is forwarded to the
	/// engine fire-and-forget.
	pub fn set_credential(&self, endpoint: &str, token: Option<String>) {
		self.inner.set_credential(endpoint, token);
	}

	/// Ask the engine to activate the index for `path`.
	///
	/// Returns whether an index exists for that path. Fail-closed: a
	/// missing path, a non-primary backend, or any engine failure all
	/// answer `false`. Outcomes are cached per path until a different
	/// path is loaded.
	pub async fn load(&self, path: Option<PathBuf>) -> bool {
		self.inner.load(path).await
	}

	/// Kick off indexing for the cached repository.
	///
	/// Silently does nothing unless a repository is cached, the backend
	/// is primary, no index exists yet, and no job is already running.
	pub async fn start_indexing(&self) {
		self.inner.start_indexing().await;
	}

	/// Similarity search against the loaded index.
	///
	/// # Errors
	///
	/// Returns an error if the engine cannot be reached, times out, or
	/// rejects the query.
	pub async fn query(&self, text: &str) -> Result<QueryResultSet> {
		self.inner.query_engine(text).await
	}

	/// Best-effort context lookup: like [`Self::query`], but failures
	/// yield an empty set and results are capped at `max_results`.
	pub async fn get_context(&self, text: &str, max_results: usize) -> Vec<QueryMatch> {
		self.inner.context(text, max_results).await
	}

	/// Project the current status snapshot.
	pub fn status(&self) -> StatusSnapshot {
		self.inner.status()
	}

	/// Current indexing indicator, if one should be shown.
	pub fn indexing_indicator(&self) -> Option<IndicatorSnapshot> {
		self.inner.indicator.lock().snapshot()
	}

	/// Observe status transitions. Fired after anything that changes the
	/// projected status; observers pull [`Self::status`] themselves.
	pub fn on_status_changed(&self, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
		self.inner.status_observers.subscribe(callback)
	}

	/// Observe repository-level changes: session bind and post-indexing
	/// reloads.
	pub fn on_change(&self, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
		self.inner.change_observers.subscribe(callback)
	}

	/// Tear the subsystem down: stop background tasks and the engine
	/// process. The controller is inert afterwards.
	pub async fn dispose(&self) {
		self.inner.dispose().await;
	}
}

impl std::fmt::Debug for EmbeddingsController {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EmbeddingsController")
			.field("engine", &self.inner.config.engine.command)
			.field("disposed", &self.inner.cancel.is_cancelled())
			.finish_non_exhaustive()
	}
}

impl ControllerInner {
	fn set_credential(&self, endpoint: &str, token: Option<String>) {
		let primary = is_primary_endpoint(endpoint);
		let flag_changed = {
			let mut credential = self.credential.write();
			let flag_changed = credential.primary_backend != primary;
			credential.primary_backend = primary;
			credential.token = token.clone();
			flag_changed
		};

		if let Some(token) = token {
			let session = self.session.read().clone();
			if let Some(session) = session {
				session.push_token(&token);
			}
		}

		// Exactly one event per flag flip; token-only updates are silent.
		if flag_changed {
			debug!(primary_backend = primary, "backend scope changed");
			self.status_observers.emit();
		}
	}

	async fn load(&self, path: Option<PathBuf>) -> bool {
		if !self.credential.read().primary_backend {
			debug!("load skipped: backend is not primary");
			return false;
		}
		let Some(path) = path else {
			debug!("load skipped: no workspace root");
			return false;
		};

		if let Some(cached) = self.cached_result(&path) {
			return cached;
		}

		let _gate = self.load_gate.lock().await;
		// Re-check: the previous gate holder may have loaded this path.
		if let Some(cached) = self.cached_result(&path) {
			return cached;
		}

		let Ok(session) = self.ensure_session().await else {
			// Spawn failures are reported through start(); a load simply
			// answers that no index is available.
			return false;
		};
		self.round_trip_load(&session, &path).await.unwrap_or(false)
	}

	fn cached_result(&self, path: &Path) -> Option<bool> {
		let repo = self.repo.read();
		repo.as_ref().and_then(|state| (state.path == *path).then_some(state.load_result))
	}

	/// One engine round-trip. The cache is only touched on success so a
	/// transient failure cannot shadow an earlier real answer.
	async fn round_trip_load(&self, session: &EngineSession, path: &Path) -> Result<bool> {
		match session.request::<LoadRepo>(path.to_path_buf(), self.request_timeout()).await {
			Ok(available) => {
				debug!(path = %path.display(), available, "repository load refreshed");
				*self.repo.write() = Some(RepoState { path: path.to_path_buf(), load_result: available });
				self.status_observers.emit();
				Ok(available)
			}
			Err(err) => {
				self.telemetry.capture(&err);
				warn!(path = %path.display(), error = %err, "engine load request failed");
				Err(err)
			}
		}
	}

	/// Fresh load that bypasses the cache; used after an indexing run so
	/// readiness is asserted by the engine, never assumed.
	pub(super) async fn reload(&self, path: &Path) {
		let _gate = self.load_gate.lock().await;
		let Ok(session) = self.ensure_session().await else {
			return;
		};
		let _ = self.round_trip_load(&session, path).await;
	}

	async fn start_indexing(&self) {
		let repo = self.repo.read().clone();
		let Some(repo) = repo else {
			debug!("indexing skipped: no repository loaded yet");
			return;
		};
		if !self.credential.read().primary_backend {
			debug!("indexing skipped: backend is not primary");
			return;
		}
		if repo.load_result {
			debug!(path = %repo.path.display(), "indexing skipped: index already available");
			return;
		}
		if self.indexing.read().is_some() {
			debug!("indexing skipped: a job is already outstanding");
			return;
		}

		let Ok(session) = self.ensure_session().await else {
			return;
		};

		// Recorded before the request goes out: a small repository can
		// finish and push its done signal ahead of the ack, and that done
		// must find the job it terminates.
		*self.indexing.write() = Some(repo.path.clone());
		let epoch = self.indicator.lock().begin();
		self.status_observers.emit();

		let params = IndexParams {
			path: repo.path.clone(),
			model: self.config.model.clone(),
			dimension: self.config.dimension,
		};
		match session.request::<IndexRepo>(params, self.request_timeout()).await {
			Ok(_) => {
				info!(path = %repo.path.display(), model = %self.config.model, "indexing started");
			}
			Err(err) => {
				self.telemetry.capture(&err);
				warn!(path = %repo.path.display(), error = %err, "index request failed");
				// Roll back unless a done signal already consumed the job.
				let cleared = {
					let mut indexing = self.indexing.write();
					if indexing.as_deref() == Some(repo.path.as_path()) {
						*indexing = None;
						true
					} else {
						false
					}
				};
				if cleared {
					self.indicator.lock().hide_if_current(epoch);
					self.status_observers.emit();
				}
			}
		}
	}

	async fn query_engine(&self, text: &str) -> Result<QueryResultSet> {
		let session = self.ensure_session().await?;
		session.request::<QueryRepo>(text.to_owned(), self.request_timeout()).await
	}

	async fn context(&self, text: &str, max_results: usize) -> Vec<QueryMatch> {
		match self.query_engine(text).await {
			Ok(result_set) => {
				let mut matches = result_set.results;
				matches.truncate(max_results);
				matches
			}
			Err(err) => {
				self.telemetry.capture(&err);
				debug!(error = %err, "context query failed; returning no matches");
				Vec::new()
			}
		}
	}

	fn status(&self) -> StatusSnapshot {
		let repo = self.repo.read().clone();
		let indexing = self.indexing.read().clone();
		let primary_backend = self.credential.read().primary_backend;
		project(StatusInputs {
			primary_backend,
			repo: repo.as_ref(),
			indexing: indexing.as_deref(),
			workspace_root: self.config.workspace_root.as_deref(),
		})
	}

	pub(super) fn request_timeout(&self) -> Duration {
		self.config.engine.request_timeout()
	}

	async fn dispose(&self) {
		self.cancel.cancel();
		*self.session.write() = None;
		let process = self.engine_process.lock().take();
		if let Some(process) = process {
			process.stop().await;
		}
		info!("embeddings controller disposed");
	}
}

impl Drop for ControllerInner {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}
