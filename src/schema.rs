//! Template schema: the `template.toml` at the root of every template.
//!
//! The schema declares the feature flags and variables a template accepts
//! and the ownership rules that classify each file under `files/`.
//!
//! # Schema File Format
//!
//! ```toml
//! [template]
//! name = "flask-backend"
//! templated_suffix = ".jinja"
//! exclude = ["**/__pycache__/**"]
//!
//! [flags.use_database]
//! default = true
//! help = "SQLAlchemy models, Alembic migrations and a database health check"
//!
//! [variables.project_name]
//! help = "Python package name of the generated app"
//!
//! [[files]]
//! pattern = "common/storage/**"
//! ownership = "template"
//! when = "use_s3"
//!
//! [[files]]
//! pattern = "app/**"
//! ownership = "app"
//! ```
//!
//! Rules are checked in order and the first matching rule classifies a file.
//! Files no rule matches are template-owned and always included.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use crate::errors::{ComposeError, ConfigIssue};
use crate::predicate::{Predicate, RESERVED_WORDS};

/// Name of the schema file inside a template directory.
pub const SCHEMA_FILE: &str = "template.toml";

/// Directory inside a template holding the files to materialize.
pub const FILES_DIR: &str = "files";

static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap());

/// Who owns a generated file after first generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ownership {
    /// Regenerated on every update; the project must not hand-edit it.
    #[default]
    Template,
    /// Materialized once if absent, never touched again.
    App,
}

impl std::fmt::Display for Ownership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ownership::Template => write!(f, "template-owned"),
            Ownership::App => write!(f, "app-owned"),
        }
    }
}

/// `[template]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSection {
    /// Display name (defaults to the template directory name)
    #[serde(default)]
    pub name: Option<String>,
    /// Suffix marking files whose content is rendered; stripped from the output path
    #[serde(default = "default_templated_suffix")]
    pub templated_suffix: String,
    /// Glob patterns (relative to `files/`) that are never materialized
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_templated_suffix() -> String {
    ".jinja".to_string()
}

impl Default for TemplateSection {
    fn default() -> Self {
        Self {
            name: None,
            templated_suffix: default_templated_suffix(),
            exclude: Vec::new(),
        }
    }
}

/// `[flags.<name>]` declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagDecl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub help: String,
}

/// `[variables.<name>]` declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableDecl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub help: String,
}

/// One `[[files]]` ownership rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRule {
    /// Glob matched against the source path relative to `files/`
    pub pattern: String,
    #[serde(default)]
    pub ownership: Ownership,
    /// Flag predicate; the file is excluded when it evaluates false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
}

/// A rule with its pattern and predicate compiled.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub pattern: glob::Pattern,
    pub ownership: Ownership,
    pub when: Option<Predicate>,
}

/// The complete `template.toml` structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateToml {
    #[serde(default)]
    pub template: TemplateSection,
    #[serde(default)]
    pub flags: BTreeMap<String, FlagDecl>,
    #[serde(default)]
    pub variables: BTreeMap<String, VariableDecl>,
    #[serde(default)]
    pub files: Vec<FileRule>,
}

impl TemplateToml {
    /// Load a schema from a file.
    pub fn load(path: &Path) -> Result<Self, ComposeError> {
        let content =
            std::fs::read_to_string(path).map_err(|source| ComposeError::io(path, source))?;
        Self::parse(&content).map_err(|message| ComposeError::Schema {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parse a schema from a TOML string.
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Save the schema to a file.
    pub fn save(&self, path: &Path) -> Result<(), ComposeError> {
        let content = toml::to_string_pretty(self).map_err(|e| ComposeError::Schema {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|source| ComposeError::io(path, source))
    }

    pub fn is_flag(&self, name: &str) -> bool {
        self.flags.contains_key(name)
    }

    pub fn is_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Compile every rule, collecting every problem instead of stopping at the first.
    pub fn compile_rules(&self) -> Result<Vec<CompiledRule>, Vec<ConfigIssue>> {
        let mut issues = Vec::new();
        let mut rules = Vec::new();

        for rule in &self.files {
            let pattern = match glob::Pattern::new(&rule.pattern) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    issues.push(ConfigIssue::InvalidPattern {
                        pattern: rule.pattern.clone(),
                        message: e.to_string(),
                    });
                    None
                }
            };

            let context = format!("rule '{}'", rule.pattern);
            let when = match rule.when.as_deref().map(Predicate::parse) {
                None => None,
                Some(Ok(predicate)) => {
                    for name in predicate.flags() {
                        if !self.is_flag(name) {
                            issues.push(ConfigIssue::UndeclaredFlag {
                                name: name.to_string(),
                                context: context.clone(),
                            });
                        }
                    }
                    Some(predicate)
                }
                Some(Err(e)) => {
                    issues.push(ConfigIssue::InvalidPredicate {
                        expression: rule.when.clone().unwrap_or_default(),
                        context: context.clone(),
                        message: e.to_string(),
                    });
                    None
                }
            };

            if let Some(pattern) = pattern {
                rules.push(CompiledRule {
                    pattern,
                    ownership: rule.ownership,
                    when,
                });
            }
        }

        if issues.is_empty() {
            Ok(rules)
        } else {
            Err(issues)
        }
    }

    /// Compile the `exclude` patterns.
    pub fn compile_excludes(&self) -> Result<Vec<glob::Pattern>, Vec<ConfigIssue>> {
        let mut issues = Vec::new();
        let mut patterns = Vec::new();
        for raw in &self.template.exclude {
            match glob::Pattern::new(raw) {
                Ok(pattern) => patterns.push(pattern),
                Err(e) => issues.push(ConfigIssue::InvalidPattern {
                    pattern: raw.clone(),
                    message: e.to_string(),
                }),
            }
        }
        if issues.is_empty() {
            Ok(patterns)
        } else {
            Err(issues)
        }
    }

    /// Check declarations that make the schema unusable.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        for name in self.flags.keys() {
            if !is_valid_name(name) {
                issues.push(ConfigIssue::InvalidName {
                    name: name.clone(),
                    what: "flag".to_string(),
                });
            }
            if self.variables.contains_key(name) {
                issues.push(ConfigIssue::NameClash { name: name.clone() });
            }
        }
        for name in self.variables.keys() {
            if !is_valid_name(name) {
                issues.push(ConfigIssue::InvalidName {
                    name: name.clone(),
                    what: "variable".to_string(),
                });
            }
        }

        if let Err(rule_issues) = self.compile_rules() {
            issues.extend(rule_issues);
        }
        if let Err(exclude_issues) = self.compile_excludes() {
            issues.extend(exclude_issues);
        }

        issues
    }

    /// Non-fatal observations about the schema.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.template.templated_suffix.is_empty() {
            warnings.push("templated_suffix is empty: every file will be rendered".to_string());
        }

        let referenced: Vec<String> = self
            .files
            .iter()
            .filter_map(|rule| rule.when.as_deref())
            .filter_map(|when| Predicate::parse(when).ok())
            .flat_map(|p| p.flags().into_iter().map(String::from).collect::<Vec<_>>())
            .collect();
        for name in self.flags.keys() {
            if !referenced.contains(name) {
                warnings.push(format!(
                    "flag '{}' is not used by any [[files]] rule (only in-file conditions can use it)",
                    name
                ));
            }
        }

        for (index, rule) in self.files.iter().enumerate() {
            if self.files[..index]
                .iter()
                .any(|earlier| earlier.pattern == rule.pattern)
            {
                warnings.push(format!(
                    "rule '{}' is shadowed by an earlier rule with the same pattern",
                    rule.pattern
                ));
            }
        }

        warnings
    }

    /// Display name, falling back to the template directory name.
    pub fn display_name(&self, template_dir: &Path) -> String {
        self.template.name.clone().unwrap_or_else(|| {
            template_dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "template".to_string())
        })
    }
}

/// Whether `name` can be used as a flag or variable name.
///
/// Leading underscores are reserved for answers-record metadata keys.
pub fn is_valid_name(name: &str) -> bool {
    NAME_REGEX.is_match(name) && !RESERVED_WORDS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[template]
name = "flask-backend"
exclude = ["**/__pycache__/**"]

[flags.use_database]
default = true
help = "Database support"

[flags.use_s3]
default = false

[variables.project_name]
help = "Package name"

[variables.author]
default = "Unknown"

[[files]]
pattern = "common/storage/**"
when = "use_s3"

[[files]]
pattern = "app/**"
ownership = "app"
"#;

    #[test]
    fn test_parse_sample_schema() {
        let schema = TemplateToml::parse(SAMPLE).unwrap();
        assert_eq!(schema.template.name.as_deref(), Some("flask-backend"));
        assert_eq!(schema.template.templated_suffix, ".jinja");
        assert_eq!(schema.flags.len(), 2);
        assert_eq!(schema.flags["use_database"].default, Some(true));
        assert_eq!(schema.variables["project_name"].default, None);
        assert_eq!(schema.files.len(), 2);
        assert_eq!(schema.files[0].ownership, Ownership::Template);
        assert_eq!(schema.files[1].ownership, Ownership::App);
        assert!(schema.validate().is_empty());
    }

    #[test]
    fn test_empty_schema_uses_defaults() {
        let schema = TemplateToml::parse("").unwrap();
        assert!(schema.flags.is_empty());
        assert_eq!(schema.template.templated_suffix, ".jinja");
    }

    #[test]
    fn test_unknown_ownership_is_a_parse_error() {
        let result = TemplateToml::parse("[[files]]\npattern = \"x\"\nownership = \"user\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_rule_with_undeclared_flag_is_reported() {
        let schema =
            TemplateToml::parse("[[files]]\npattern = \"common/**\"\nwhen = \"use_s4\"\n").unwrap();
        let issues = schema.validate();
        assert_eq!(
            issues,
            vec![ConfigIssue::UndeclaredFlag {
                name: "use_s4".into(),
                context: "rule 'common/**'".into(),
            }]
        );
    }

    #[test]
    fn test_rule_with_malformed_predicate_is_reported() {
        let schema = TemplateToml::parse(
            "[flags.a]\ndefault = true\n[[files]]\npattern = \"x/**\"\nwhen = \"a and\"\n",
        )
        .unwrap();
        let issues = schema.validate();
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0], ConfigIssue::InvalidPredicate { .. }));
    }

    #[test]
    fn test_invalid_glob_is_reported() {
        let schema = TemplateToml::parse("[[files]]\npattern = \"[oops\"\n").unwrap();
        let issues = schema.validate();
        assert!(matches!(issues[0], ConfigIssue::InvalidPattern { .. }));
    }

    #[test]
    fn test_name_clash_and_invalid_names() {
        let schema = TemplateToml::parse(
            "[flags.shared]\n[variables.shared]\n[flags.and]\n[variables._hidden]\n",
        )
        .unwrap();
        let issues = schema.validate();
        assert!(issues.contains(&ConfigIssue::NameClash {
            name: "shared".into()
        }));
        assert!(issues.contains(&ConfigIssue::InvalidName {
            name: "and".into(),
            what: "flag".into()
        }));
        assert!(issues.contains(&ConfigIssue::InvalidName {
            name: "_hidden".into(),
            what: "variable".into()
        }));
    }

    #[test]
    fn test_warnings_flag_unused_flags_and_shadowed_rules() {
        let schema = TemplateToml::parse(
            "[flags.use_sse]\n[[files]]\npattern = \"a/**\"\n[[files]]\npattern = \"a/**\"\n",
        )
        .unwrap();
        let warnings = schema.warnings();
        assert!(warnings.iter().any(|w| w.contains("use_sse")));
        assert!(warnings.iter().any(|w| w.contains("shadowed")));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SCHEMA_FILE);
        let schema = TemplateToml::parse(SAMPLE).unwrap();
        schema.save(&path).unwrap();
        let reloaded = TemplateToml::load(&path).unwrap();
        assert_eq!(reloaded.flags, schema.flags);
        assert_eq!(reloaded.files, schema.files);
    }

    #[test]
    fn test_load_reports_path_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SCHEMA_FILE);
        std::fs::write(&path, "not = [valid").unwrap();
        let err = TemplateToml::load(&path).unwrap_err();
        assert!(matches!(err, ComposeError::Schema { .. }));
        assert!(err.to_string().contains("template.toml"));
    }

    #[test]
    fn test_display_name_falls_back_to_directory() {
        let schema = TemplateToml::default();
        assert_eq!(
            schema.display_name(Path::new("/templates/flask-backend")),
            "flask-backend"
        );
    }
}
