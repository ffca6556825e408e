//! Three-way update of a generated project.
//!
//! For every template-owned file three versions are compared: what is on
//! disk, the previous render stored in `.stamp/base/`, and the new render.
//!
//! | on disk            | previous vs new | result                         |
//! |--------------------|-----------------|--------------------------------|
//! | absent             |                 | created                        |
//! | == new             |                 | unchanged                      |
//! | == previous        | differ          | overwritten                    |
//! | != previous        | equal           | unchanged (local edits kept)   |
//! | != previous        | differ          | conflict, file untouched       |
//!
//! App-owned files are created when absent and skipped otherwise. Files that
//! drop out of the plan are reported as orphans and never deleted.

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::bindings::{Overrides, resolve_bindings};
use super::plan::{Plan, PlannedFile, build_plan, validate_configuration};
use super::writer::ProjectWriter;
use super::{Flags, Variables};
use crate::answers::AnswersRecord;
use crate::changelog::ChangelogEntry;
use crate::errors::{ComposeError, RenderIssue};
use crate::manifest::Manifest;
use crate::schema::Ownership;
use crate::state::ProjectState;

/// Update settings.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Explicit flag/variable changes
    pub overrides: Overrides,
    /// Attach a unified diff (on disk -> new render) to each conflict
    pub diff: bool,
}

/// Why a file conflicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// Differs from the previous render, and the template changed it too
    LocallyModified,
    /// No previous render is recorded and it differs from the new render
    NoPreviousRender,
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictReason::LocallyModified => {
                write!(f, "locally modified and changed upstream")
            }
            ConflictReason::NoPreviousRender => {
                write!(f, "no previous render recorded and differs from the new render")
            }
        }
    }
}

/// Whether a textual three-way merge of a conflict would succeed.
///
/// Informational: the merge is never applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePreview {
    Clean,
    Overlapping,
    Unavailable,
}

impl std::fmt::Display for MergePreview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergePreview::Clean => write!(f, "a clean three-way merge exists"),
            MergePreview::Overlapping => write!(f, "local and upstream edits overlap"),
            MergePreview::Unavailable => write!(f, "no textual merge possible"),
        }
    }
}

/// A flag whose value this update changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagChange {
    pub name: String,
    pub from: Option<bool>,
    pub to: bool,
}

impl std::fmt::Display for FlagChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.from {
            Some(from) => write!(f, "{}: {} -> {}", self.name, from, self.to),
            None => write!(f, "{}: unset -> {}", self.name, self.to),
        }
    }
}

/// Why a file is orphaned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrphanReason {
    /// The entry's flag dependency no longer holds
    FlagExcluded {
        predicate: String,
        changed: Vec<FlagChange>,
    },
    /// The template no longer has an entry rendering to this path
    RemovedFromTemplate,
}

impl std::fmt::Display for OrphanReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrphanReason::FlagExcluded { predicate, changed } if changed.is_empty() => {
                write!(f, "excluded: '{}' is false", predicate)
            }
            OrphanReason::FlagExcluded { predicate, changed } => {
                let changes: Vec<String> = changed.iter().map(|c| c.to_string()).collect();
                write!(
                    f,
                    "excluded: '{}' is now false ({})",
                    predicate,
                    changes.join(", ")
                )
            }
            OrphanReason::RemovedFromTemplate => write!(f, "no longer part of the template"),
        }
    }
}

/// One per-file result of an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateFinding {
    Created {
        path: PathBuf,
        ownership: Ownership,
    },
    Overwritten {
        path: PathBuf,
    },
    Unchanged {
        path: PathBuf,
        /// On-disk edits kept because the template didn't change the file
        locally_modified: bool,
    },
    /// App-owned and already present
    Skipped {
        path: PathBuf,
    },
    Conflict {
        path: PathBuf,
        reason: ConflictReason,
        merge: MergePreview,
        #[serde(skip_serializing_if = "Option::is_none")]
        diff: Option<String>,
    },
    Orphaned {
        path: PathBuf,
        reason: OrphanReason,
    },
    Failed {
        /// Output path, or the template source when the path didn't render
        path: PathBuf,
        source: String,
        issue: RenderIssue,
    },
    /// The file or its snapshot could not be read or written
    IoFailed {
        path: PathBuf,
        error: String,
    },
}

impl UpdateFinding {
    pub fn path(&self) -> &Path {
        match self {
            UpdateFinding::Created { path, .. }
            | UpdateFinding::Overwritten { path }
            | UpdateFinding::Unchanged { path, .. }
            | UpdateFinding::Skipped { path }
            | UpdateFinding::Conflict { path, .. }
            | UpdateFinding::Orphaned { path, .. }
            | UpdateFinding::Failed { path, .. }
            | UpdateFinding::IoFailed { path, .. } => path,
        }
    }

    /// Whether the project now needs manual attention.
    pub fn needs_attention(&self) -> bool {
        matches!(
            self,
            UpdateFinding::Conflict { .. }
                | UpdateFinding::Failed { .. }
                | UpdateFinding::IoFailed { .. }
        )
    }
}

/// Everything an update did and found.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateResult {
    pub previous_version: String,
    pub version: String,
    pub findings: Vec<UpdateFinding>,
    /// Changelog entries added since the project last updated
    pub pending_changelog: Vec<ChangelogEntry>,
    /// Stored answers dropped because the template no longer declares them
    pub dropped_answers: Vec<String>,
    pub answers_written: bool,
}

impl UpdateResult {
    fn paths<F: Fn(&UpdateFinding) -> bool>(&self, pick: F) -> Vec<&Path> {
        self.findings
            .iter()
            .filter(|f| pick(f))
            .map(|f| f.path())
            .collect()
    }

    pub fn created(&self) -> Vec<&Path> {
        self.paths(|f| matches!(f, UpdateFinding::Created { .. }))
    }

    pub fn overwritten(&self) -> Vec<&Path> {
        self.paths(|f| matches!(f, UpdateFinding::Overwritten { .. }))
    }

    pub fn unchanged(&self) -> Vec<&Path> {
        self.paths(|f| matches!(f, UpdateFinding::Unchanged { .. }))
    }

    pub fn skipped(&self) -> Vec<&Path> {
        self.paths(|f| matches!(f, UpdateFinding::Skipped { .. }))
    }

    pub fn conflicted(&self) -> Vec<&Path> {
        self.paths(|f| matches!(f, UpdateFinding::Conflict { .. }))
    }

    pub fn orphaned(&self) -> Vec<&Path> {
        self.paths(|f| matches!(f, UpdateFinding::Orphaned { .. }))
    }

    /// Files that failed to render or could not be read or written.
    pub fn failed(&self) -> Vec<&Path> {
        self.paths(|f| {
            matches!(
                f,
                UpdateFinding::Failed { .. } | UpdateFinding::IoFailed { .. }
            )
        })
    }

    /// Whether any file was written.
    pub fn wrote_files(&self) -> bool {
        !self.created().is_empty() || !self.overwritten().is_empty()
    }

    /// Conflicts or per-file failures were reported.
    pub fn needs_attention(&self) -> bool {
        self.findings.iter().any(UpdateFinding::needs_attention)
    }
}

/// Update the project at `target` to the given template revision.
///
/// Configuration problems abort before anything is written. Per-file render
/// and IO failures are reported as findings and don't stop other files; only
/// an attempt to overwrite an app-owned file aborts the pass. The answers
/// record is rewritten last, and only when it changed.
pub fn update(
    manifest: &Manifest,
    target: &Path,
    options: &UpdateOptions,
) -> Result<UpdateResult, ComposeError> {
    let state = ProjectState::new(target);
    let stored = state.load_answers()?;

    let bindings = resolve_bindings(&manifest.schema, Some(&stored), &options.overrides, None)?;
    validate_configuration(manifest)?;
    let plan = build_plan(manifest, &bindings.flags, &bindings.variables)?;

    let writer = ProjectWriter::new(&state);
    let mut result = UpdateResult {
        previous_version: stored.template_version.clone(),
        version: manifest.version.clone(),
        pending_changelog: manifest.changelog.pending(stored.changelog_seen).to_vec(),
        dropped_answers: bindings.dropped.clone(),
        ..Default::default()
    };

    for file in &plan.files {
        let outcome = match file.ownership {
            Ownership::App => update_app_owned(&state, &writer, file),
            Ownership::Template => update_template_owned(&state, &writer, file, options.diff),
        };
        let finding = match outcome {
            Ok(finding) => finding,
            Err(err @ ComposeError::OwnershipViolation { .. }) => return Err(err),
            Err(err) => {
                warn!(path = %file.path.display(), error = %err, "file could not be updated");
                UpdateFinding::IoFailed {
                    path: file.path.clone(),
                    error: err.to_string(),
                }
            }
        };
        result.findings.push(finding);
    }

    for failure in &plan.failures {
        warn!(source = %failure.source, issue = %failure.issue, "template file failed to render");
        result.findings.push(UpdateFinding::Failed {
            path: failure
                .path
                .clone()
                .unwrap_or_else(|| PathBuf::from(&failure.source)),
            source: failure.source.clone(),
            issue: failure.issue.clone(),
        });
    }

    let orphans = find_orphans(
        manifest,
        &state,
        &plan,
        &stored,
        &bindings.flags,
        &bindings.variables,
    )?;
    result.findings.extend(orphans);

    let answers = AnswersRecord {
        template_version: manifest.version.clone(),
        template: Some(manifest.root.display().to_string()),
        commit: manifest.commit.clone(),
        changelog_seen: manifest.changelog.len(),
        flags: bindings.flags,
        variables: bindings.variables,
    };
    if answers != stored {
        state.save_answers(&answers)?;
        result.answers_written = true;
    }

    info!(
        target = %target.display(),
        from = %result.previous_version,
        to = %result.version,
        created = result.created().len(),
        overwritten = result.overwritten().len(),
        conflicts = result.conflicted().len(),
        "updated project"
    );
    Ok(result)
}

fn update_app_owned(
    state: &ProjectState,
    writer: &ProjectWriter<'_>,
    file: &PlannedFile,
) -> Result<UpdateFinding, ComposeError> {
    if state.target(&file.path).exists() {
        debug!(path = %file.path.display(), "app-owned file present, skipping");
        return Ok(UpdateFinding::Skipped {
            path: file.path.clone(),
        });
    }
    writer.write(file)?;
    Ok(UpdateFinding::Created {
        path: file.path.clone(),
        ownership: Ownership::App,
    })
}

fn update_template_owned(
    state: &ProjectState,
    writer: &ProjectWriter<'_>,
    file: &PlannedFile,
    want_diff: bool,
) -> Result<UpdateFinding, ComposeError> {
    let path = file.path.clone();
    let new = &file.content;
    let previous = state.snapshot(&file.path)?;

    let Some(on_disk) = state.read_target(&file.path)? else {
        writer.write(file)?;
        return Ok(UpdateFinding::Created {
            path,
            ownership: Ownership::Template,
        });
    };

    if &on_disk == new {
        if previous.as_ref() != Some(new) {
            debug!(path = %path.display(), "refreshing stale snapshot");
            writer.snapshot(file)?;
        }
        return Ok(UpdateFinding::Unchanged {
            path,
            locally_modified: false,
        });
    }

    match previous {
        Some(previous) if previous == on_disk => {
            writer.write(file)?;
            Ok(UpdateFinding::Overwritten { path })
        }
        Some(previous) if &previous == new => {
            debug!(path = %path.display(), "local edits kept, no upstream change");
            Ok(UpdateFinding::Unchanged {
                path,
                locally_modified: true,
            })
        }
        previous => {
            let reason = if previous.is_some() {
                ConflictReason::LocallyModified
            } else {
                ConflictReason::NoPreviousRender
            };
            let merge = merge_preview(previous.as_deref(), &on_disk, new);
            let diff = want_diff.then(|| unified_diff(&on_disk, new)).flatten();
            warn!(path = %path.display(), %reason, %merge, "conflict");
            Ok(UpdateFinding::Conflict {
                path,
                reason,
                merge,
                diff,
            })
        }
    }
}

fn merge_preview(previous: Option<&[u8]>, on_disk: &[u8], new: &[u8]) -> MergePreview {
    let texts = (
        previous.and_then(|p| std::str::from_utf8(p).ok()),
        std::str::from_utf8(on_disk).ok(),
        std::str::from_utf8(new).ok(),
    );
    match texts {
        (Some(ancestor), Some(ours), Some(theirs)) => match diffy::merge(ancestor, ours, theirs) {
            Ok(_) => MergePreview::Clean,
            Err(_) => MergePreview::Overlapping,
        },
        _ => MergePreview::Unavailable,
    }
}

fn unified_diff(on_disk: &[u8], new: &[u8]) -> Option<String> {
    let ours = std::str::from_utf8(on_disk).ok()?;
    let theirs = std::str::from_utf8(new).ok()?;
    Some(diffy::create_patch(ours, theirs).to_string())
}

/// Files previously generated that are no longer in the plan.
fn find_orphans(
    manifest: &Manifest,
    state: &ProjectState,
    plan: &Plan,
    stored: &AnswersRecord,
    flags: &Flags,
    variables: &Variables,
) -> Result<Vec<UpdateFinding>, ComposeError> {
    let mut orphans = Vec::new();
    let mut reported: BTreeSet<PathBuf> = plan.files.iter().map(|f| f.path.clone()).collect();
    let mut path_unknown = false;
    for failure in &plan.failures {
        match &failure.path {
            Some(path) => {
                reported.insert(path.clone());
            }
            None => path_unknown = true,
        }
    }

    for source in &plan.excluded {
        let Some(entry) = manifest.entry(source) else {
            continue;
        };
        let Some(predicate) = &entry.flag_dependency else {
            continue;
        };
        let Ok(path) = entry.render_path(flags, variables) else {
            debug!(source = %source, "excluded entry's path does not render");
            continue;
        };
        if reported.contains(&path) || !state.target(&path).exists() {
            continue;
        }

        let was_included = predicate.evaluate(&stored.flags).unwrap_or(false);
        let has_snapshot = state.snapshot(&path)?.is_some();
        if !was_included && !has_snapshot {
            continue;
        }

        let changed = predicate
            .flags()
            .into_iter()
            .filter_map(|name| {
                let to = *flags.get(name)?;
                let from = stored.flags.get(name).copied();
                (from != Some(to)).then(|| FlagChange {
                    name: name.to_string(),
                    from,
                    to,
                })
            })
            .collect();
        let reason = OrphanReason::FlagExcluded {
            predicate: predicate.to_string(),
            changed,
        };
        warn!(path = %path.display(), %reason, "orphaned file left in place");
        reported.insert(path.clone());
        orphans.push(UpdateFinding::Orphaned { path, reason });
    }

    if path_unknown {
        debug!("a template path failed to render; skipping removed-file detection");
        return Ok(orphans);
    }

    for path in state.snapshot_paths()? {
        if reported.contains(&path) || !state.target(&path).exists() {
            continue;
        }
        warn!(path = %path.display(), "file no longer part of the template, left in place");
        reported.insert(path.clone());
        orphans.push(UpdateFinding::Orphaned {
            path,
            reason: OrphanReason::RemovedFromTemplate,
        });
    }

    Ok(orphans)
}
