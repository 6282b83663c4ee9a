//! Controller and engine configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// The backend endpoint local embeddings are offered for.
///
/// Credentials scoped to any other endpoint disable the whole subsystem.
pub const PRIMARY_ENDPOINT: &str = "https://semdex.dev";

/// Configuration for the engine worker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
	/// Command to run the engine.
	pub command: String,
	/// Arguments to pass to the command.
	#[serde(default)]
	pub args: Vec<String>,
	/// Environment variables to set.
	#[serde(default)]
	pub env: HashMap<String, String>,
	/// Request timeout in seconds. Zero disables the timeout.
	#[serde(default = "default_timeout")]
	pub timeout_secs: u64,
}

/// Returns the default engine request timeout in seconds.
fn default_timeout() -> u64 {
	30
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			command: "semdex-engine".into(),
			args: Vec::new(),
			env: HashMap::new(),
			timeout_secs: default_timeout(),
		}
	}
}

impl EngineConfig {
	/// Per-request timeout. [`Duration::ZERO`] means no timeout.
	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_secs)
	}
}

/// Top-level controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
	/// Engine process settings.
	#[serde(default)]
	pub engine: EngineConfig,
	/// Workspace root the host currently has open, if any.
	#[serde(default)]
	pub workspace_root: Option<PathBuf>,
	/// Identifier of the embedding model repositories are indexed with.
	#[serde(default = "default_model")]
	pub model: String,
	/// Dimension of the embedding vectors the model produces.
	#[serde(default = "default_dimension")]
	pub dimension: u32,
}

fn default_model() -> String {
	"BAAI/bge-small-en-v1.5".into()
}

fn default_dimension() -> u32 {
	384
}

impl Default for ControllerConfig {
	fn default() -> Self {
		Self {
			engine: EngineConfig::default(),
			workspace_root: None,
			model: default_model(),
			dimension: default_dimension(),
		}
	}
}

/// True when `endpoint` addresses the primary backend.
///
/// Comparison is by scheme, host and effective port; paths and query
/// strings are irrelevant to credential scoping.
pub(crate) fn is_primary_endpoint(endpoint: &str) -> bool {
	let (Ok(primary), Ok(candidate)) = (Url::parse(PRIMARY_ENDPOINT), Url::parse(endpoint)) else {
		return false;
	};
	candidate.scheme() == primary.scheme()
		&& candidate.host_str() == primary.host_str()
		&& candidate.port_or_known_default() == primary.port_or_known_default()
}
