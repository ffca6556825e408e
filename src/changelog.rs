//! Template changelog: migration steps automated materialization can't perform.
//!
//! `CHANGELOG.toml` sits next to `template.toml` and is append-only:
//!
//! ```toml
//! [[entries]]
//! date = "2025-03-02"
//! description = "Moved the S3 client into common/storage"
//! migration_steps = [
//!     "Replace `from app.s3 import client` with `from common.storage import client`",
//! ]
//! ```
//!
//! A generated project records how many entries existed when it was last
//! generated or updated; everything after that is pending for the project.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::ComposeError;

/// Name of the changelog file inside a template directory.
pub const CHANGELOG_FILE: &str = "CHANGELOG.toml";

/// One authored template change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub date: NaiveDate,
    pub description: String,
    /// Manual actions a downstream project must take
    #[serde(default)]
    pub migration_steps: Vec<String>,
}

/// The ordered changelog of a template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changelog {
    #[serde(default)]
    pub entries: Vec<ChangelogEntry>,
}

impl Changelog {
    /// Load the changelog, or an empty one if the template has none.
    pub fn load_or_default(path: &Path) -> Result<Self, ComposeError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(path).map_err(|source| ComposeError::io(path, source))?;
        toml::from_str(&content).map_err(|e| ComposeError::Changelog {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries authored after a project recorded `seen` entries.
    ///
    /// A `seen` beyond the end (the template's changelog was rewritten)
    /// yields nothing rather than panicking.
    pub fn pending(&self, seen: usize) -> &[ChangelogEntry] {
        self.entries.get(seen..).unwrap_or(&[])
    }

    /// Entries whose dates go backwards, which suggests the log was edited
    /// out of order.
    pub fn out_of_order(&self) -> Vec<&ChangelogEntry> {
        self.entries
            .windows(2)
            .filter(|pair| pair[1].date < pair[0].date)
            .map(|pair| &pair[1])
            .collect()
    }
}
