//! Accepting hand-resolved conflicts.
//!
//! Resolving a path advances its previous-render snapshot to the current
//! render while keeping the on-disk content, so the next update treats the
//! file as locally modified with no upstream change.

use std::path::{Component, Path, PathBuf};
use tracing::info;

use super::bindings::{Overrides, resolve_bindings};
use super::plan::{build_plan, validate_configuration};
use super::writer::ProjectWriter;
use crate::errors::{ComposeError, ConfigIssue};
use crate::manifest::Manifest;
use crate::state::ProjectState;

/// Mark `paths` as resolved against the current template render.
///
/// Every path must be a template-owned file of the project; otherwise
/// nothing is recorded.
pub fn resolve(
    manifest: &Manifest,
    target: &Path,
    paths: &[PathBuf],
) -> Result<Vec<PathBuf>, ComposeError> {
    let state = ProjectState::new(target);
    let stored = state.load_answers()?;
    let bindings = resolve_bindings(&manifest.schema, Some(&stored), &Overrides::default(), None)?;
    validate_configuration(manifest)?;
    let plan = build_plan(manifest, &bindings.flags, &bindings.variables)?;

    let mut files = Vec::new();
    let mut issues = Vec::new();
    for path in paths {
        let relative = project_relative(target, path);
        match plan.template_owned().find(|f| f.path == relative) {
            Some(file) => files.push(file),
            None => issues.push(ConfigIssue::NotTemplateOwned { path: path.clone() }),
        }
    }
    if !issues.is_empty() {
        return Err(ComposeError::Configuration { issues });
    }

    let writer = ProjectWriter::new(&state);
    let mut resolved = Vec::new();
    for file in files {
        writer.snapshot(file)?;
        info!(path = %file.path.display(), "marked as resolved");
        resolved.push(file.path.clone());
    }
    Ok(resolved)
}

/// Normalize a user-supplied path to one relative to the project root.
///
/// A path that names a file inside the target (in any spelling that resolves
/// to it) is made relative to it; anything else is taken as project-relative.
fn project_relative(target: &Path, path: &Path) -> PathBuf {
    let lexical = path
        .strip_prefix(target)
        .ok()
        .filter(|rest| !rest.components().any(|c| matches!(c, Component::ParentDir)))
        .map(Path::to_path_buf);
    let path = lexical
        .or_else(|| {
            let target = std::fs::canonicalize(target).ok()?;
            let full = std::fs::canonicalize(path).ok()?;
            full.strip_prefix(&target).ok().map(Path::to_path_buf)
        })
        .unwrap_or_else(|| path.to_path_buf());
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
