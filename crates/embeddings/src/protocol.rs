//! Wire bindings for the engine's `embeddings/*` methods.
//!
//! The engine is a separate process; these types are the entire contract
//! with it. Anything it sends that does not decode into one of these
//! shapes is treated as an anomaly by the router, never as a crash.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use semdex_rpc::{Notification, Request};

/// `embeddings/set-token`: hand the engine the bearer token it needs to
/// fetch models. Sent fire-and-forget; the ack is discarded.
pub enum SetToken {}

impl Request for SetToken {
	const METHOD: &'static str = "embeddings/set-token";
	type Params = String;
	type Result = JsonValue;
}

/// `embeddings/index`: start indexing a repository. The response only
/// acknowledges that the job was accepted; completion is signalled through
/// [`IndexProgress`] notifications.
pub enum IndexRepo {}

impl Request for IndexRepo {
	const METHOD: &'static str = "embeddings/index";
	type Params = IndexParams;
	type Result = JsonValue;
}

/// Parameters of [`IndexRepo`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexParams {
	/// Repository root to index.
	pub path: PathBuf,
	/// Embedding model identifier.
	pub model: String,
	/// Embedding vector dimension.
	pub dimension: u32,
}

/// `embeddings/load`: make the index for a repository the active one.
/// Returns whether an index exists for that path.
pub enum LoadRepo {}

impl Request for LoadRepo {
	const METHOD: &'static str = "embeddings/load";
	type Params = PathBuf;
	type Result = bool;
}

/// `embeddings/query`: similarity search against the loaded index.
pub enum QueryRepo {}

impl Request for QueryRepo {
	const METHOD: &'static str = "embeddings/query";
	type Params = String;
	type Result = QueryResultSet;
}

/// Matches returned by [`QueryRepo`], best first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResultSet {
	/// Matching snippets, best first.
	#[serde(default)]
	pub results: Vec<QueryMatch>,
}

/// One similarity match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMatch {
	/// File the snippet came from.
	pub file_name: PathBuf,
	/// First line of the snippet, zero-based.
	pub start_line: u32,
	/// Line just past the end of the snippet.
	pub end_line: u32,
	/// Snippet text.
	pub content: String,
}

/// `embeddings/progress`: indexing progress pushed by the engine.
pub enum IndexProgress {}

impl Notification for IndexProgress {
	const METHOD: &'static str = "embeddings/progress";
	type Params = ProgressUpdate;
}

/// Progress payload, externally tagged on the wire: `{"Progress": {..}}`,
/// `{"Error": ..}`, or the bare terminal sentinel `"Done"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProgressUpdate {
	/// Items processed so far out of the currently known total.
	#[serde(rename_all = "camelCase")]
	Progress {
		/// Items embedded so far.
		num_items: u64,
		/// Total items the engine expects to embed; zero while unknown.
		total_items: u64,
	},
	/// The engine hit a problem. Not terminal: the job keeps running and
	/// `Done` is still expected.
	Error(JsonValue),
	/// No further progress messages will arrive for this job.
	Done,
}

impl ProgressUpdate {
	/// Completion percentage, when computable.
	pub fn percent(&self) -> Option<u8> {
		match self {
			Self::Progress { num_items, total_items } if *total_items > 0 => {
				Some((num_items.saturating_mul(100) / total_items).min(100) as u8)
			}
			_ => None,
		}
	}
}
