//! Writes planned files into a project.

use std::path::Path;
use tracing::info;

use super::plan::PlannedFile;
use crate::errors::ComposeError;
use crate::schema::Ownership;
use crate::state::ProjectState;

/// Writes project files and their snapshots.
///
/// Refuses to replace an existing app-owned file no matter who asks.
pub struct ProjectWriter<'a> {
    state: &'a ProjectState,
}

impl<'a> ProjectWriter<'a> {
    pub fn new(state: &'a ProjectState) -> Self {
        Self { state }
    }

    /// Write a file's rendered content to its target path.
    ///
    /// Template-owned files also get their snapshot advanced.
    pub fn write(&self, file: &PlannedFile) -> Result<(), ComposeError> {
        let target = self.state.target(&file.path);
        if file.ownership == Ownership::App && target.exists() {
            return Err(ComposeError::OwnershipViolation {
                path: file.path.clone(),
            });
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ComposeError::io(parent, source))?;
        }
        std::fs::write(&target, &file.content).map_err(|source| ComposeError::io(&target, source))?;
        if file.executable {
            set_executable(&target)?;
        }
        info!(path = %file.path.display(), ownership = %file.ownership, "wrote file");

        if file.ownership == Ownership::Template {
            self.snapshot(file)?;
        }
        Ok(())
    }

    /// Record a file's render as the previous render without touching the file.
    pub fn snapshot(&self, file: &PlannedFile) -> Result<(), ComposeError> {
        self.state.write_snapshot(&file.path, &file.content)
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), ComposeError> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = std::fs::metadata(path)
        .map_err(|source| ComposeError::io(path, source))?
        .permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    std::fs::set_permissions(path, permissions).map_err(|source| ComposeError::io(path, source))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), ComposeError> {
    Ok(())
}
