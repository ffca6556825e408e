//! Read-only drift check.

use serde::Serialize;
use std::path::{Path, PathBuf};

use super::bindings::{Overrides, resolve_bindings};
use super::plan::{build_plan, validate_configuration};
use crate::changelog::ChangelogEntry;
use crate::errors::{ComposeError, RenderIssue};
use crate::manifest::Manifest;
use crate::state::ProjectState;

/// Where one template-owned file stands relative to the template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FileState {
    /// Matches the current render
    Current,
    /// Untouched since the last render; update would overwrite it
    Outdated,
    /// Edited locally; the template has not changed it
    LocallyModified,
    /// Edited locally and changed upstream; update would report a conflict
    WouldConflict,
    /// Not on disk; update would create it
    Missing,
    RenderFailed { issue: RenderIssue },
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileState::Current => write!(f, "current"),
            FileState::Outdated => write!(f, "outdated"),
            FileState::LocallyModified => write!(f, "locally modified"),
            FileState::WouldConflict => write!(f, "would conflict"),
            FileState::Missing => write!(f, "missing"),
            FileState::RenderFailed { issue } => write!(f, "render failed: {}", issue),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStatus {
    pub path: PathBuf,
    #[serde(flatten)]
    pub state: FileState,
}

/// Drift report for a project.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub recorded_version: String,
    pub current_version: String,
    pub files: Vec<FileStatus>,
    pub pending_changelog: Vec<ChangelogEntry>,
}

impl StatusReport {
    pub fn is_outdated(&self) -> bool {
        self.recorded_version != self.current_version
    }

    /// Files whose state is anything but `Current`.
    pub fn drifted(&self) -> impl Iterator<Item = &FileStatus> {
        self.files.iter().filter(|f| f.state != FileState::Current)
    }
}

/// Compare every template-owned file with the template under the stored answers.
pub fn status(manifest: &Manifest, target: &Path) -> Result<StatusReport, ComposeError> {
    let state = ProjectState::new(target);
    let stored = state.load_answers()?;
    let bindings = resolve_bindings(&manifest.schema, Some(&stored), &Overrides::default(), None)?;
    validate_configuration(manifest)?;
    let plan = build_plan(manifest, &bindings.flags, &bindings.variables)?;

    let mut files = Vec::new();
    for file in plan.template_owned() {
        let on_disk = state.read_target(&file.path)?;
        let previous = state.snapshot(&file.path)?;
        let file_state = match on_disk {
            None => FileState::Missing,
            Some(disk) if disk == file.content => FileState::Current,
            Some(disk) if previous.as_ref() == Some(&disk) => FileState::Outdated,
            Some(_) if previous.as_ref() == Some(&file.content) => FileState::LocallyModified,
            Some(_) => FileState::WouldConflict,
        };
        files.push(FileStatus {
            path: file.path.clone(),
            state: file_state,
        });
    }
    for failure in &plan.failures {
        files.push(FileStatus {
            path: failure
                .path
                .clone()
                .unwrap_or_else(|| PathBuf::from(&failure.source)),
            state: FileState::RenderFailed {
                issue: failure.issue.clone(),
            },
        });
    }

    Ok(StatusReport {
        recorded_version: stored.template_version.clone(),
        current_version: manifest.version.clone(),
        files,
        pending_changelog: manifest.changelog.pending(stored.changelog_seen).to_vec(),
    })
}
