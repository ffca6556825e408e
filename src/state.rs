//! Composer state kept inside a generated project.
//!
//! ```text
//! .stamp/
//! ├── answers.toml     # Flags, variables, template version (written last)
//! └── base/            # Previous render of every template-owned file
//!     └── common/core/app.py
//! ```
//!
//! The `base/` snapshots are the common ancestor for the three-way
//! comparison `update` performs, so no version-control system is needed.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::answers::AnswersRecord;
use crate::errors::ComposeError;

/// The name of the composer state directory inside a project.
pub const STATE_DIR: &str = ".stamp";

/// Answers file name inside the state directory.
pub const ANSWERS_FILE: &str = "answers.toml";

/// Snapshot directory name inside the state directory.
pub const BASE_DIR: &str = "base";

/// Handle on a project directory and its `.stamp/` state.
#[derive(Debug, Clone)]
pub struct ProjectState {
    root: PathBuf,
    state_dir: PathBuf,
}

impl ProjectState {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            state_dir: root.join(STATE_DIR),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn answers_path(&self) -> PathBuf {
        self.state_dir.join(ANSWERS_FILE)
    }

    pub fn base_dir(&self) -> PathBuf {
        self.state_dir.join(BASE_DIR)
    }

    /// Whether the directory holds a committed generation.
    pub fn is_generated(&self) -> bool {
        self.answers_path().is_file()
    }

    pub fn load_answers(&self) -> Result<AnswersRecord, ComposeError> {
        let path = self.answers_path();
        if !path.is_file() {
            return Err(ComposeError::Answers {
                path,
                message: "no answers record found; run 'stamp generate' first".to_string(),
            });
        }
        AnswersRecord::load(&path)
    }

    /// Write the answers record. This is the commit point of an operation.
    pub fn save_answers(&self, answers: &AnswersRecord) -> Result<(), ComposeError> {
        std::fs::create_dir_all(&self.state_dir)
            .map_err(|source| ComposeError::io(&self.state_dir, source))?;
        answers.save(&self.answers_path())
    }

    /// Absolute path of a project file.
    pub fn target(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    /// Current on-disk content of a project file.
    pub fn read_target(&self, relative: &Path) -> Result<Option<Vec<u8>>, ComposeError> {
        read_optional(&self.target(relative))
    }

    /// Previous render of a template-owned file.
    pub fn snapshot(&self, relative: &Path) -> Result<Option<Vec<u8>>, ComposeError> {
        read_optional(&self.base_dir().join(relative))
    }

    pub fn write_snapshot(&self, relative: &Path, content: &[u8]) -> Result<(), ComposeError> {
        let path = self.base_dir().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ComposeError::io(parent, source))?;
        }
        std::fs::write(&path, content).map_err(|source| ComposeError::io(&path, source))
    }

    /// Relative paths of every stored snapshot, sorted.
    pub fn snapshot_paths(&self) -> Result<Vec<PathBuf>, ComposeError> {
        let base = self.base_dir();
        if !base.is_dir() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for item in WalkDir::new(&base).sort_by_file_name() {
            let item = item.map_err(|e| {
                ComposeError::io(&base, std::io::Error::other(e.to_string()))
            })?;
            if item.file_type().is_file()
                && let Ok(relative) = item.path().strip_prefix(&base)
            {
                paths.push(relative.to_path_buf());
            }
        }
        Ok(paths)
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, ComposeError> {
    match std::fs::read(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ComposeError::io(path, source)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_fresh_directory_is_not_generated() {
        let dir = tempdir().unwrap();
        let state = ProjectState::new(dir.path());
        assert!(!state.is_generated());
        assert_eq!(state.state_dir(), dir.path().join(".stamp"));
    }

    #[test]
    fn test_load_answers_without_generation_errors() {
        let dir = tempdir().unwrap();
        let err = ProjectState::new(dir.path()).load_answers().unwrap_err();
        assert!(err.to_string().contains("stamp generate"));
    }

    #[test]
    fn test_save_answers_marks_generated() {
        let dir = tempdir().unwrap();
        let state = ProjectState::new(dir.path());
        let answers = AnswersRecord {
            template_version: "abc".into(),
            ..Default::default()
        };
        state.save_answers(&answers).unwrap();
        assert!(state.is_generated());
        assert_eq!(state.load_answers().unwrap(), answers);
    }

    #[test]
    fn test_snapshots_round_trip_and_list_sorted() {
        let dir = tempdir().unwrap();
        let state = ProjectState::new(dir.path());
        state
            .write_snapshot(Path::new("common/b.py"), b"b")
            .unwrap();
        state.write_snapshot(Path::new("a.txt"), b"a").unwrap();

        assert_eq!(
            state.snapshot(Path::new("common/b.py")).unwrap(),
            Some(b"b".to_vec())
        );
        assert_eq!(state.snapshot(Path::new("missing")).unwrap(), None);
        assert_eq!(
            state.snapshot_paths().unwrap(),
            vec![PathBuf::from("a.txt"), PathBuf::from("common/b.py")]
        );
    }

    #[test]
    fn test_read_target_missing_is_none() {
        let dir = tempdir().unwrap();
        let state = ProjectState::new(dir.path());
        assert_eq!(state.read_target(Path::new("nope.txt")).unwrap(), None);
        std::fs::write(dir.path().join("yes.txt"), "y").unwrap();
        assert_eq!(
            state.read_target(Path::new("yes.txt")).unwrap(),
            Some(b"y".to_vec())
        );
    }
}
