//! Engine process transport.
//!
//! [`EngineTransport`] abstracts how an engine comes up so tests can stand
//! in an in-memory peer; [`StdioTransport`] spawns the real worker process
//! and speaks framed JSON-RPC over its stdio.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::info;

use semdex_rpc::{AnyNotification, Connection};

use crate::config::EngineConfig;
use crate::{Error, Result};

/// A freshly started engine, not yet wired into the controller.
pub struct StartedEngine {
	/// Request channel to the engine.
	pub connection: Connection,
	/// Inbound notification stream, in arrival order.
	pub notifications: mpsc::UnboundedReceiver<AnyNotification>,
	/// Child handle when the engine runs as a separate process.
	pub process: Option<EngineProcess>,
}

/// Handle to a spawned engine process.
pub struct EngineProcess {
	child: Child,
}

impl EngineProcess {
	/// Best-effort kill, then wait a bit for the exit to land.
	pub async fn stop(mut self) {
		let _ = self.child.start_kill();
		let _ = tokio::time::timeout(Duration::from_secs(2), self.child.wait()).await;
	}
}

/// How engine sessions are brought up.
#[async_trait]
pub trait EngineTransport: Send + Sync {
	/// Start the engine and bind its message channel.
	async fn start(&self, config: &EngineConfig) -> Result<StartedEngine>;
}

/// Transport that runs the engine as a child process.
#[derive(Debug, Default)]
pub struct StdioTransport;

#[async_trait]
impl EngineTransport for StdioTransport {
	async fn start(&self, config: &EngineConfig) -> Result<StartedEngine> {
		info!(command = %config.command, "starting embeddings engine");

		let mut cmd = Command::new(&config.command);
		cmd.args(&config.args)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::null())
			.kill_on_drop(true);

		for (key, value) in &config.env {
			cmd.env(key, value);
		}

		#[cfg(unix)]
		cmd.process_group(0);

		let mut child = cmd.spawn().map_err(|e| Error::Spawn {
			command: config.command.clone(),
			reason: e.to_string(),
		})?;

		let stdin = child.stdin.take().ok_or_else(|| Error::Spawn {
			command: config.command.clone(),
			reason: "failed to capture stdin".into(),
		})?;
		let stdout = child.stdout.take().ok_or_else(|| Error::Spawn {
			command: config.command.clone(),
			reason: "failed to capture stdout".into(),
		})?;

		let (notification_tx, notifications) = mpsc::unbounded_channel();
		let connection = Connection::spawn(stdout, stdin, notification_tx);

		Ok(StartedEngine {
			connection,
			notifications,
			process: Some(EngineProcess { child }),
		})
	}
}
