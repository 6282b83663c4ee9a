//! Derived status for the host's capability panel.
//!
//! Status is never stored: it is projected on demand from the credential
//! flag, the repository cache and the in-progress indexing path, so there
//! is no second copy to fall out of sync.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// Load outcome for the most recently loaded workspace root.
///
/// The cache deliberately holds one entry; loading a different root
/// replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RepoState {
	pub path: PathBuf,
	pub load_result: bool,
}

/// Lifecycle state advertised for the local embeddings provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderState {
	/// No load has completed for this workspace yet.
	Indeterminate,
	/// An indexing job is outstanding for this workspace.
	Indexing,
	/// An index is loaded and queryable.
	Ready,
	/// No index exists for this workspace.
	Unconsented,
}

/// One capability provider inside a status group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
	/// Capability kind.
	pub kind: &'static str,
	/// Provider flavor.
	#[serde(rename = "type")]
	pub provider_type: &'static str,
	/// Current lifecycle state.
	pub state: ProviderState,
}

impl ProviderStatus {
	fn local_embeddings(state: ProviderState) -> Self {
		Self { kind: "embeddings", provider_type: "local", state }
	}
}

/// Providers grouped under the workspace they describe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusGroup {
	/// Workspace root path, or empty when none is known.
	pub name: String,
	/// Capability providers available for this workspace.
	pub providers: Vec<ProviderStatus>,
}

/// Everything the controller advertises to status observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
	/// One group per known workspace; empty off the primary backend.
	pub groups: Vec<StatusGroup>,
}

impl StatusSnapshot {
	/// State of the local embeddings provider, if one is advertised.
	pub fn provider_state(&self) -> Option<ProviderState> {
		let group = self.groups.first()?;
		group.providers.first().map(|provider| provider.state)
	}
}

pub(crate) struct StatusInputs<'a> {
	pub primary_backend: bool,
	pub repo: Option<&'a RepoState>,
	pub indexing: Option<&'a Path>,
	pub workspace_root: Option<&'a Path>,
}

/// Project a status snapshot from the controller's current state.
///
/// An indexing job only shows as `Indexing` while its path matches the
/// cached repository; a job for a since-replaced root is invisible here
/// and resolves itself through the router when it finishes.
pub(crate) fn project(inputs: StatusInputs<'_>) -> StatusSnapshot {
	if !inputs.primary_backend {
		return StatusSnapshot { groups: Vec::new() };
	}

	let (name, state) = match inputs.repo {
		None => {
			let name = inputs
				.workspace_root
				.map(|root| root.display().to_string())
				.unwrap_or_default();
			(name, ProviderState::Indeterminate)
		}
		Some(repo) => {
			let state = if inputs.indexing == Some(repo.path.as_path()) {
				ProviderState::Indexing
			} else if repo.load_result {
				ProviderState::Ready
			} else {
				ProviderState::Unconsented
			};
			(repo.path.display().to_string(), state)
		}
	};

	StatusSnapshot {
		groups: vec![StatusGroup {
			name,
			providers: vec![ProviderStatus::local_embeddings(state)],
		}],
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	fn repo(path: &str, load_result: bool) -> RepoState {
		RepoState { path: path.into(), load_result }
	}

	#[test]
	fn non_primary_backends_advertise_nothing() {
		let cached = repo("/repo", true);
		let snapshot = project(StatusInputs {
			primary_backend: false,
			repo: Some(&cached),
			indexing: None,
			workspace_root: None,
		});
		assert!(snapshot.groups.is_empty());
		assert_eq!(snapshot.provider_state(), None);
	}

	#[test]
	fn empty_cache_is_indeterminate_and_named_after_the_workspace() {
		let snapshot = project(StatusInputs {
			primary_backend: true,
			repo: None,
			indexing: None,
			workspace_root: Some(Path::new("/workspace")),
		});
		assert_eq!(snapshot.provider_state(), Some(ProviderState::Indeterminate));
		assert_eq!(snapshot.groups[0].name, "/workspace");

		let unnamed = project(StatusInputs {
			primary_backend: true,
			repo: None,
			indexing: None,
			workspace_root: None,
		});
		assert_eq!(unnamed.groups[0].name, "");
	}

	#[test]
	fn an_outstanding_job_for_the_cached_path_wins_over_readiness() {
		let cached = repo("/repo", true);
		let snapshot = project(StatusInputs {
			primary_backend: true,
			repo: Some(&cached),
			indexing: Some(Path::new("/repo")),
			workspace_root: None,
		});
		assert_eq!(snapshot.provider_state(), Some(ProviderState::Indexing));
		assert_eq!(snapshot.groups[0].name, "/repo");
	}

	#[test]
	fn load_outcomes_split_ready_from_unconsented() {
		let available = repo("/repo", true);
		let snapshot = project(StatusInputs {
			primary_backend: true,
			repo: Some(&available),
			indexing: None,
			workspace_root: None,
		});
		assert_eq!(snapshot.provider_state(), Some(ProviderState::Ready));

		let missing = repo("/repo", false);
		let snapshot = project(StatusInputs {
			primary_backend: true,
			repo: Some(&missing),
			indexing: None,
			workspace_root: None,
		});
		assert_eq!(snapshot.provider_state(), Some(ProviderState::Unconsented));
	}

	#[test]
	fn jobs_for_a_replaced_root_do_not_show_as_indexing() {
		let cached = repo("/new-root", false);
		let snapshot = project(StatusInputs {
			primary_backend: true,
			repo: Some(&cached),
			indexing: Some(Path::new("/old-root")),
			workspace_root: None,
		});
		assert_eq!(snapshot.provider_state(), Some(ProviderState::Unconsented));
	}

	#[test]
	fn provider_rows_serialize_with_wire_field_names() {
		let snapshot = project(StatusInputs {
			primary_backend: true,
			repo: Some(&repo("/repo", true)),
			indexing: None,
			workspace_root: None,
		});
		let json = serde_json::to_value(&snapshot).unwrap();
		assert_eq!(
			json,
			serde_json::json!({
				"groups": [{
					"name": "/repo",
					"providers": [{"kind": "embeddings", "type": "local", "state": "ready"}]
				}]
			}),
		);
	}
}
