//! Template manifest: every file a template can materialize.
//!
//! Loading a template walks `files/` in sorted order, classifies each file
//! with the schema's ownership rules and computes the template version
//! identifier, a content hash of the schema and every file.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::changelog::{CHANGELOG_FILE, Changelog};
use crate::compose::{Flags, Variables};
use crate::errors::{ComposeError, ConfigIssue, RenderIssue};
use crate::predicate::Predicate;
use crate::render::{RenderContext, Template};
use crate::schema::{CompiledRule, FILES_DIR, Ownership, SCHEMA_FILE, TemplateToml};
use crate::state::STATE_DIR;

/// One template source file.
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    /// Source path relative to `files/`, always `/`-separated
    pub source: String,
    /// Output path template (source path minus the templated suffix)
    pub path_template: String,
    pub ownership: Ownership,
    pub flag_dependency: Option<Predicate>,
    pub is_templated: bool,
    pub executable: bool,
    pub content: Vec<u8>,
}

impl ManifestEntry {
    /// Whether the entry belongs in a project with these flags.
    pub fn is_included(&self, flags: &Flags) -> Result<bool, ComposeError> {
        match &self.flag_dependency {
            None => Ok(true),
            Some(predicate) => predicate.evaluate(flags).map_err(|unbound| {
                ComposeError::config(ConfigIssue::UndeclaredFlag {
                    name: unbound.0,
                    context: format!("'{}'", self.source),
                })
            }),
        }
    }

    /// Parse the path template.
    pub fn parse_path(&self) -> Result<Template, RenderIssue> {
        Template::parse(&self.path_template)
    }

    /// Parse the content template, if the entry is templated.
    pub fn parse_content(&self) -> Result<Option<Template>, RenderIssue> {
        if !self.is_templated {
            return Ok(None);
        }
        let text = std::str::from_utf8(&self.content).map_err(|_| RenderIssue::InvalidUtf8)?;
        Template::parse(text).map(Some)
    }

    /// Render the output path relative to the project root.
    pub fn render_path(&self, flags: &Flags, variables: &Variables) -> Result<PathBuf, RenderIssue> {
        let ctx = RenderContext { flags, variables };
        let rendered = self.parse_path()?.render(&ctx)?;
        validate_relative_path(&rendered)
    }

    /// Render the output bytes.
    pub fn render_content(&self, flags: &Flags, variables: &Variables) -> Result<Vec<u8>, RenderIssue> {
        match self.parse_content()? {
            None => Ok(self.content.clone()),
            Some(template) => {
                let ctx = RenderContext { flags, variables };
                template.render(&ctx).map(String::into_bytes)
            }
        }
    }
}

/// A loaded template.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Template directory
    pub root: PathBuf,
    pub schema: TemplateToml,
    /// Entries in sorted source order
    pub entries: Vec<ManifestEntry>,
    /// Content hash identifying this template revision
    pub version: String,
    /// HEAD commit of the git repository holding the template, if any
    pub commit: Option<String>,
    pub changelog: Changelog,
}

impl Manifest {
    /// Load the template at `root`.
    pub fn load(root: &Path) -> Result<Self, ComposeError> {
        let schema = TemplateToml::load(&root.join(SCHEMA_FILE))?;

        let mut issues = schema.validate();
        let rules = schema.compile_rules().unwrap_or_default();
        let excludes = schema.compile_excludes().unwrap_or_default();
        if !issues.is_empty() {
            issues.dedup();
            return Err(ComposeError::Configuration { issues });
        }

        let files_dir = root.join(FILES_DIR);
        let entries = collect_entries(&files_dir, &schema, &rules, &excludes)?;
        let schema_bytes = std::fs::read(root.join(SCHEMA_FILE))
            .map_err(|source| ComposeError::io(root.join(SCHEMA_FILE), source))?;
        let changelog_path = root.join(CHANGELOG_FILE);
        let changelog_bytes = match std::fs::read(&changelog_path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => return Err(ComposeError::io(changelog_path, source)),
        };
        let version =
            compute_template_version(&schema_bytes, &entries, changelog_bytes.as_deref());
        let commit = head_commit(root);
        let changelog = Changelog::load_or_default(&changelog_path)?;

        debug!(
            template = %root.display(),
            entries = entries.len(),
            version = %version,
            "loaded template manifest"
        );

        Ok(Self {
            root: root.to_path_buf(),
            schema,
            entries,
            version,
            commit,
            changelog,
        })
    }

    /// Flags referenced anywhere (rules, path templates, in-file conditions)
    /// that the schema does not declare.
    ///
    /// Files that fail to parse are skipped here; their syntax error surfaces
    /// when they are rendered.
    pub fn undeclared_flags(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        for entry in &self.entries {
            if let Some(predicate) = &entry.flag_dependency {
                for name in predicate.flags() {
                    if !self.schema.is_flag(name) {
                        issues.push(ConfigIssue::UndeclaredFlag {
                            name: name.to_string(),
                            context: format!("'{}'", entry.source),
                        });
                    }
                }
            }

            if let Ok(path) = entry.parse_path() {
                for (name, _) in path.condition_flags() {
                    if !self.schema.is_flag(&name) {
                        issues.push(ConfigIssue::UndeclaredFlag {
                            name,
                            context: format!("path of '{}'", entry.source),
                        });
                    }
                }
            }

            if let Ok(Some(content)) = entry.parse_content() {
                for (name, line) in content.condition_flags() {
                    if !self.schema.is_flag(&name) {
                        issues.push(ConfigIssue::UndeclaredFlag {
                            name,
                            context: format!("'{}' line {}", entry.source, line),
                        });
                    }
                }
            }
        }

        issues
    }

    pub fn entry(&self, source: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.source == source)
    }

    /// Patterns of `[[files]]` rules that match no template file.
    pub fn unmatched_rules(&self) -> Vec<String> {
        self.schema
            .compile_rules()
            .unwrap_or_default()
            .into_iter()
            .filter(|rule| !self.entries.iter().any(|e| rule.pattern.matches(&e.source)))
            .map(|rule| rule.pattern.as_str().to_string())
            .collect()
    }
}

fn collect_entries(
    files_dir: &Path,
    schema: &TemplateToml,
    rules: &[CompiledRule],
    excludes: &[glob::Pattern],
) -> Result<Vec<ManifestEntry>, ComposeError> {
    if !files_dir.is_dir() {
        return Err(ComposeError::Schema {
            path: files_dir.to_path_buf(),
            message: format!("template has no '{}/' directory", FILES_DIR),
        });
    }

    let suffix = schema.template.templated_suffix.as_str();
    let mut entries = Vec::new();

    for item in WalkDir::new(files_dir).sort_by_file_name() {
        let item = item.map_err(|e| {
            let path = e.path().unwrap_or(files_dir).to_path_buf();
            ComposeError::io(path, std::io::Error::other(e.to_string()))
        })?;
        if !item.file_type().is_file() {
            continue;
        }

        let relative = item
            .path()
            .strip_prefix(files_dir)
            .unwrap_or(item.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("/");

        if excludes.iter().any(|p| p.matches(&relative)) {
            debug!(source = %relative, "excluded by template settings");
            continue;
        }

        let rule = rules.iter().find(|r| r.pattern.matches(&relative));
        let is_templated = !suffix.is_empty() && relative.ends_with(suffix);
        let path_template = if is_templated {
            relative[..relative.len() - suffix.len()].to_string()
        } else {
            relative.clone()
        };

        let content =
            std::fs::read(item.path()).map_err(|source| ComposeError::io(item.path(), source))?;

        entries.push(ManifestEntry {
            path_template,
            ownership: rule.map(|r| r.ownership).unwrap_or_default(),
            flag_dependency: rule.and_then(|r| r.when.clone()),
            is_templated,
            executable: is_executable(item.path()),
            content,
            source: relative,
        });
    }

    Ok(entries)
}

/// Compute the template version identifier.
///
/// Hashes the schema, every (source path, executable bit, content) triple in
/// sorted order and the changelog, returning the first 12 hex characters.
pub fn compute_template_version(
    schema: &[u8],
    entries: &[ManifestEntry],
    changelog: Option<&[u8]>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(SCHEMA_FILE.as_bytes());
    hasher.update([0]);
    hasher.update(schema);
    hasher.update([0]);
    for entry in entries {
        hasher.update(entry.source.as_bytes());
        hasher.update([0, u8::from(entry.executable)]);
        hasher.update(&entry.content);
        hasher.update([0]);
    }
    if let Some(changelog) = changelog {
        hasher.update(CHANGELOG_FILE.as_bytes());
        hasher.update([0]);
        hasher.update(changelog);
    }
    let result = hasher.finalize();
    format!("{:x}", result)[..12].to_string()
}

/// Validate a rendered output path and turn it into a relative `PathBuf`.
pub fn validate_relative_path(rendered: &str) -> Result<PathBuf, RenderIssue> {
    let invalid = |reason: &str| RenderIssue::InvalidPath {
        path: rendered.to_string(),
        reason: reason.to_string(),
    };

    if rendered.starts_with('/') {
        return Err(invalid("absolute paths are not allowed"));
    }
    let segments: Vec<&str> = rendered.split('/').collect();
    if segments.iter().any(|s| s.trim().is_empty()) {
        return Err(invalid("empty path segment"));
    }
    if segments.iter().any(|s| *s == ".." || *s == ".") {
        return Err(invalid("'.' and '..' segments are not allowed"));
    }
    if segments[0] == STATE_DIR {
        return Err(invalid("path is inside the composer state directory"));
    }
    Ok(segments.iter().collect())
}

fn head_commit(root: &Path) -> Option<String> {
    let repo = git2::Repository::discover(root).ok()?;
    let head = repo.head().ok()?;
    let commit = head.peel_to_commit().ok()?;
    Some(commit.id().to_string())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn sample_template(root: &Path) {
        write(
            root,
            SCHEMA_FILE,
            r#"
[template]
exclude = ["**/*.pyc"]

[flags.use_s3]
default = false

[variables.project_name]
default = "demo"

[[files]]
pattern = "common/storage/**"
when = "use_s3"

[[files]]
pattern = "app/**"
ownership = "app"
"#,
        );
        write(root, "files/common/core/app.py.jinja", "name = '{{ project_name }}'\n");
        write(root, "files/common/storage/s3.py", "s3 = True\n");
        write(root, "files/app/startup.py", "def hooks(): pass\n");
        write(root, "files/app/cache.pyc", "junk");
    }

    #[test]
    fn test_load_classifies_entries() {
        let dir = tempdir().unwrap();
        sample_template(dir.path());
        let manifest = Manifest::load(dir.path()).unwrap();

        let sources: Vec<&str> = manifest.entries.iter().map(|e| e.source.as_str()).collect();
        assert_eq!(
            sources,
            vec![
                "app/startup.py",
                "common/core/app.py.jinja",
                "common/storage/s3.py"
            ]
        );

        let app = manifest.entry("app/startup.py").unwrap();
        assert_eq!(app.ownership, Ownership::App);
        assert!(app.flag_dependency.is_none());

        let core = manifest.entry("common/core/app.py.jinja").unwrap();
        assert!(core.is_templated);
        assert_eq!(core.path_template, "common/core/app.py");
        assert_eq!(core.ownership, Ownership::Template);

        let s3 = manifest.entry("common/storage/s3.py").unwrap();
        assert_eq!(s3.flag_dependency, Some(Predicate::Flag("use_s3".into())));
    }

    #[test]
    fn test_version_is_stable_and_content_sensitive() {
        let dir = tempdir().unwrap();
        sample_template(dir.path());
        let first = Manifest::load(dir.path()).unwrap().version;
        let second = Manifest::load(dir.path()).unwrap().version;
        assert_eq!(first, second);
        assert_eq!(first.len(), 12);

        write(dir.path(), "files/app/startup.py", "def hooks(): return 1\n");
        let third = Manifest::load(dir.path()).unwrap().version;
        assert_ne!(first, third);
    }

    #[test]
    fn test_version_covers_changelog_and_executable_bit() {
        let dir = tempdir().unwrap();
        sample_template(dir.path());
        let first = Manifest::load(dir.path()).unwrap().version;

        write(
            dir.path(),
            CHANGELOG_FILE,
            "[[entries]]\ndate = \"2025-03-15\"\ndescription = \"Add SSE\"\n",
        );
        let second = Manifest::load(dir.path()).unwrap().version;
        assert_ne!(first, second);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let script = dir.path().join("files/app/startup.py");
            fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
            let third = Manifest::load(dir.path()).unwrap().version;
            assert_ne!(second, third);
        }
    }

    #[test]
    fn test_missing_files_dir_is_schema_error() {
        let dir = tempdir().unwrap();
        write(dir.path(), SCHEMA_FILE, "");
        let err = Manifest::load(dir.path()).unwrap_err();
        assert!(matches!(err, ComposeError::Schema { .. }));
    }

    #[test]
    fn test_invalid_schema_fails_before_walking() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            SCHEMA_FILE,
            "[[files]]\npattern = \"x/**\"\nwhen = \"use_nothing\"\n",
        );
        let err = Manifest::load(dir.path()).unwrap_err();
        match err {
            ComposeError::Configuration { issues } => {
                assert!(matches!(issues[0], ConfigIssue::UndeclaredFlag { .. }));
            }
            other => panic!("Expected Configuration, got {other:?}"),
        }
    }

    #[test]
    fn test_undeclared_flag_in_file_condition_is_found() {
        let dir = tempdir().unwrap();
        sample_template(dir.path());
        write(
            dir.path(),
            "files/common/extra.py.jinja",
            "x\n{% if use_redis %}\nredis\n{% endif %}\n",
        );
        let manifest = Manifest::load(dir.path()).unwrap();
        let issues = manifest.undeclared_flags();
        assert_eq!(
            issues,
            vec![ConfigIssue::UndeclaredFlag {
                name: "use_redis".into(),
                context: "'common/extra.py.jinja' line 2".into(),
            }]
        );
    }

    #[test]
    fn test_render_path_substitutes_variables() {
        let dir = tempdir().unwrap();
        sample_template(dir.path());
        write(dir.path(), "files/{{ project_name }}/__init__.py", "");
        let manifest = Manifest::load(dir.path()).unwrap();
        let entry = manifest.entry("{{ project_name }}/__init__.py").unwrap();
        let variables: Variables = [("project_name".to_string(), "shop".to_string())].into();
        let path = entry.render_path(&Flags::new(), &variables).unwrap();
        assert_eq!(path, PathBuf::from("shop/__init__.py"));
    }

    #[test]
    fn test_unmatched_rules_are_listed() {
        let dir = tempdir().unwrap();
        sample_template(dir.path());
        fs::remove_file(dir.path().join("files/common/storage/s3.py")).unwrap();
        let manifest = Manifest::load(dir.path()).unwrap();
        assert_eq!(manifest.unmatched_rules(), vec!["common/storage/**".to_string()]);
    }

    #[test]
    fn test_validate_relative_path_rejects_escapes() {
        assert!(validate_relative_path("a/../b").is_err());
        assert!(validate_relative_path("/etc/passwd").is_err());
        assert!(validate_relative_path("a//b").is_err());
        assert!(validate_relative_path(".stamp/answers.toml").is_err());
        assert_eq!(
            validate_relative_path("a/b.txt").unwrap(),
            PathBuf::from("a/b.txt")
        );
    }
}
