//! The answers record persisted in every generated project.
//!
//! A flat TOML table: one key per flag (boolean) and per variable (string),
//! plus metadata keys prefixed with `_`:
//!
//! ```toml
//! # Generated by stamp. Changes here are picked up by the next `stamp update`.
//! _changelog_seen = 3
//! _commit = "9f2c..."
//! _template = "/src/templates/flask-backend"
//! _template_version = "3b1f0c9a7d21"
//! project_name = "inventory"
//! use_database = true
//! use_s3 = false
//! ```
//!
//! Keys are written sorted and without timestamps so identical inputs
//! produce identical files.

use std::path::Path;

use crate::compose::{Flags, Variables};
use crate::errors::ComposeError;

const HEADER: &str =
    "# Generated by stamp. Changes here are picked up by the next `stamp update`.\n";

const KEY_TEMPLATE_VERSION: &str = "_template_version";
const KEY_TEMPLATE: &str = "_template";
const KEY_COMMIT: &str = "_commit";
const KEY_CHANGELOG_SEEN: &str = "_changelog_seen";

/// Flag and variable values plus the template revision they were applied with.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnswersRecord {
    pub template_version: String,
    /// Template source the project was generated from
    pub template: Option<String>,
    pub commit: Option<String>,
    /// Number of changelog entries that existed at the last generate/update
    pub changelog_seen: usize,
    pub flags: Flags,
    pub variables: Variables,
}

impl AnswersRecord {
    /// Load from a file.
    pub fn load(path: &Path) -> Result<Self, ComposeError> {
        let content =
            std::fs::read_to_string(path).map_err(|source| ComposeError::io(path, source))?;
        Self::parse(&content).map_err(|message| ComposeError::Answers {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parse the flat TOML form.
    pub fn parse(content: &str) -> Result<Self, String> {
        let table: toml::Table = toml::from_str(content).map_err(|e| e.to_string())?;
        let mut record = AnswersRecord::default();

        for (key, value) in table {
            match key.as_str() {
                KEY_TEMPLATE_VERSION => record.template_version = expect_string(&key, value)?,
                KEY_TEMPLATE => record.template = Some(expect_string(&key, value)?),
                KEY_COMMIT => record.commit = Some(expect_string(&key, value)?),
                KEY_CHANGELOG_SEEN => {
                    let seen = value
                        .as_integer()
                        .ok_or_else(|| format!("'{}' must be an integer", key))?;
                    record.changelog_seen = usize::try_from(seen)
                        .map_err(|_| format!("'{}' must not be negative", key))?;
                }
                meta if meta.starts_with('_') => {
                    // Unknown metadata from a newer version; ignored.
                }
                _ => match value {
                    toml::Value::Boolean(flag) => {
                        record.flags.insert(key, flag);
                    }
                    toml::Value::String(text) => {
                        record.variables.insert(key, text);
                    }
                    other => {
                        return Err(format!(
                            "'{}' must be a boolean flag or a string variable, found {}",
                            key,
                            other.type_str()
                        ));
                    }
                },
            }
        }

        if record.template_version.is_empty() {
            return Err(format!("missing '{}'", KEY_TEMPLATE_VERSION));
        }
        Ok(record)
    }

    /// Render the flat TOML form.
    pub fn to_toml_string(&self) -> String {
        let mut table = toml::Table::new();
        table.insert(
            KEY_TEMPLATE_VERSION.to_string(),
            toml::Value::String(self.template_version.clone()),
        );
        if let Some(template) = &self.template {
            table.insert(KEY_TEMPLATE.to_string(), toml::Value::String(template.clone()));
        }
        if let Some(commit) = &self.commit {
            table.insert(KEY_COMMIT.to_string(), toml::Value::String(commit.clone()));
        }
        table.insert(
            KEY_CHANGELOG_SEEN.to_string(),
            toml::Value::Integer(self.changelog_seen as i64),
        );
        for (name, value) in &self.flags {
            table.insert(name.clone(), toml::Value::Boolean(*value));
        }
        for (name, value) in &self.variables {
            table.insert(name.clone(), toml::Value::String(value.clone()));
        }

        let mut out = HEADER.to_string();
        for (key, value) in &table {
            out.push_str(&format!("{} = {}\n", key, value));
        }
        out
    }

    /// Save to a file.
    pub fn save(&self, path: &Path) -> Result<(), ComposeError> {
        std::fs::write(path, self.to_toml_string()).map_err(|source| ComposeError::io(path, source))
    }
}

fn expect_string(key: &str, value: toml::Value) -> Result<String, String> {
    match value {
        toml::Value::String(text) => Ok(text),
        other => Err(format!("'{}' must be a string, found {}", key, other.type_str())),
    }
}
