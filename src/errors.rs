//! Typed error hierarchy for the template composer.
//!
//! `ComposeError` is what every library operation returns. Its two
//! aggregate variants carry itemized causes:
//! - `ConfigIssue`: the template schema, flag bindings or manifest are
//!   inconsistent. Always detected before any file is written.
//! - `RenderIssue`: a single template file (content or path) failed to
//!   render. Fatal for `generate`, scoped to one file for `update`.
//!
//! Update conflicts are not errors; see `compose::UpdateFinding`.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// One reason the template configuration cannot be composed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigIssue {
    #[error("{context} references undeclared flag '{name}'")]
    UndeclaredFlag { name: String, context: String },

    #[error("flag '{name}' has no value and no default")]
    UnboundFlag { name: String },

    #[error("variable '{name}' has no value and no default")]
    UnboundVariable { name: String },

    #[error("'{name}' is not a declared {expected}")]
    UnknownOverride { name: String, expected: String },

    #[error("invalid value '{value}' for flag '{name}' (expected true or false)")]
    InvalidFlagValue { name: String, value: String },

    #[error("'{name}' is not a valid {what} name")]
    InvalidName { name: String, what: String },

    #[error("'{name}' is declared both as a flag and as a variable")]
    NameClash { name: String },

    #[error("{context}: invalid predicate '{expression}': {message}")]
    InvalidPredicate {
        expression: String,
        context: String,
        message: String,
    },

    #[error("invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("'{first}' and '{second}' both render to '{path}'")]
    DuplicateTarget {
        path: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("{path} already holds a generated project (use update)")]
    AlreadyGenerated { path: PathBuf },

    #[error("{path} is not a template-owned file of this project")]
    NotTemplateOwned { path: PathBuf },
}

/// One reason a template file failed to render.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderIssue {
    #[error("line {line}: unresolved variable '{name}'")]
    UnresolvedVariable { name: String, line: usize },

    #[error("line {line}: unknown flag '{name}' in condition")]
    UnknownFlag { name: String, line: usize },

    #[error("line {line}: unterminated '{open}' tag")]
    UnterminatedTag { open: String, line: usize },

    #[error("line {line}: unexpected '{tag}' without a matching 'if'")]
    UnexpectedTag { tag: String, line: usize },

    #[error("line {line}: unknown tag '{tag}'")]
    UnknownTag { tag: String, line: usize },

    #[error("line {line}: '{tag}' takes no condition")]
    UnexpectedCondition { tag: String, line: usize },

    #[error("line {line}: 'if' block is never closed with 'endif'")]
    UnclosedBlock { line: usize },

    #[error("line {line}: malformed condition '{expression}': {message}")]
    MalformedCondition {
        expression: String,
        message: String,
        line: usize,
    },

    #[error("templated file is not valid UTF-8")]
    InvalidUtf8,

    #[error("rendered path '{path}' is invalid: {reason}")]
    InvalidPath { path: String, reason: String },
}

/// A render failure tied to the template source it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderFailure {
    /// Template source path, relative to the template's `files/` directory
    pub source: PathBuf,
    pub issue: RenderIssue,
}

impl std::fmt::Display for RenderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.source.display(), self.issue)
    }
}

/// Errors from the composer library.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("Configuration error: {}", join_lines(.issues))]
    Configuration { issues: Vec<ConfigIssue> },

    #[error("Render error: {}", join_lines(.failures))]
    Render { failures: Vec<RenderFailure> },

    #[error("Refusing to overwrite app-owned file {path}")]
    OwnershipViolation { path: PathBuf },

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid template schema {path}: {message}")]
    Schema { path: PathBuf, message: String },

    #[error("Invalid answers record {path}: {message}")]
    Answers { path: PathBuf, message: String },

    #[error("Invalid changelog {path}: {message}")]
    Changelog { path: PathBuf, message: String },

    #[error("Prompt failed: {0}")]
    Prompt(String),
}

impl ComposeError {
    /// Shorthand for a configuration error with a single issue.
    pub fn config(issue: ConfigIssue) -> Self {
        ComposeError::Configuration {
            issues: vec![issue],
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ComposeError::Io {
            path: path.into(),
            source,
        }
    }
}

fn join_lines<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_lists_every_issue() {
        let err = ComposeError::Configuration {
            issues: vec![
                ConfigIssue::UnboundFlag {
                    name: "use_s3".into(),
                },
                ConfigIssue::UnboundVariable {
                    name: "project_name".into(),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("use_s3"));
        assert!(msg.contains("project_name"));
    }

    #[test]
    fn render_error_names_source_and_variable() {
        let err = ComposeError::Render {
            failures: vec![RenderFailure {
                source: PathBuf::from("common/app.py.jinja"),
                issue: RenderIssue::UnresolvedVariable {
                    name: "project_name".into(),
                    line: 3,
                },
            }],
        };
        let msg = err.to_string();
        assert!(msg.contains("common/app.py.jinja"));
        assert!(msg.contains("line 3"));
        assert!(msg.contains("project_name"));
    }

    #[test]
    fn issues_serialize_with_kind_tag() {
        let issue = ConfigIssue::UndeclaredFlag {
            name: "use_s4".into(),
            context: "rule 'common/**'".into(),
        };
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["kind"], "undeclared_flag");
        assert_eq!(json["name"], "use_s4");
    }

    #[test]
    fn ownership_violation_is_matchable() {
        let err = ComposeError::OwnershipViolation {
            path: PathBuf::from("app/startup.py"),
        };
        assert!(matches!(err, ComposeError::OwnershipViolation { .. }));
        assert!(err.to_string().contains("app/startup.py"));
    }

    #[test]
    fn io_error_carries_path_and_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ComposeError::io("/tmp/x", io_err);
        match &err {
            ComposeError::Io { path, source } => {
                assert_eq!(path, &PathBuf::from("/tmp/x"));
                assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
            }
            _ => panic!("Expected Io"),
        }
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ComposeError::Prompt("x".into()));
        assert_std_error(&ConfigIssue::UnboundFlag { name: "x".into() });
        assert_std_error(&RenderIssue::InvalidUtf8);
    }
}
