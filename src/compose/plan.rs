//! Validation and in-memory rendering.
//!
//! Nothing here touches the target directory: a `Plan` is the complete set of
//! rendered paths and contents, computed before the first write.

use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

use super::{Flags, Variables};
use crate::errors::{ComposeError, ConfigIssue, RenderFailure, RenderIssue};
use crate::manifest::{Manifest, ManifestEntry};
use crate::schema::Ownership;

/// One file the project should contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    /// Template source path, relative to `files/`
    pub source: String,
    /// Target-relative output path
    pub path: PathBuf,
    pub ownership: Ownership,
    pub content: Vec<u8>,
    pub executable: bool,
}

/// An entry that failed to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanFailure {
    pub source: String,
    /// Output path, when the path itself rendered
    pub path: Option<PathBuf>,
    pub issue: RenderIssue,
}

impl PlanFailure {
    pub fn to_render_failure(&self) -> RenderFailure {
        RenderFailure {
            source: PathBuf::from(&self.source),
            issue: self.issue.clone(),
        }
    }
}

/// Everything a set of bindings produces from a manifest.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Included files, sorted by output path
    pub files: Vec<PlannedFile>,
    /// Sources whose flag dependency is false
    pub excluded: Vec<String>,
    pub failures: Vec<PlanFailure>,
}

impl Plan {
    pub fn file(&self, path: &std::path::Path) -> Option<&PlannedFile> {
        self.files.iter().find(|f| f.path == path)
    }

    pub fn template_owned(&self) -> impl Iterator<Item = &PlannedFile> {
        self.files
            .iter()
            .filter(|f| f.ownership == Ownership::Template)
    }
}

/// Check that every flag referenced by a rule predicate, a rendered path or
/// an in-file condition is declared.
pub fn validate_configuration(manifest: &Manifest) -> Result<(), ComposeError> {
    let mut issues = manifest.undeclared_flags();
    if issues.is_empty() {
        Ok(())
    } else {
        issues.dedup();
        Err(ComposeError::Configuration { issues })
    }
}

/// Render every included entry.
///
/// Render problems are collected per entry in `failures`; two entries
/// rendering to the same path is a configuration error.
pub fn build_plan(
    manifest: &Manifest,
    flags: &Flags,
    variables: &Variables,
) -> Result<Plan, ComposeError> {
    let mut plan = Plan::default();

    for entry in &manifest.entries {
        if !entry.is_included(flags)? {
            debug!(source = %entry.source, "excluded by flag dependency");
            plan.excluded.push(entry.source.clone());
            continue;
        }

        match render_entry(entry, flags, variables) {
            Ok(file) => plan.files.push(file),
            Err(failure) => {
                debug!(source = %entry.source, issue = %failure.issue, "render failed");
                plan.failures.push(failure);
            }
        }
    }

    check_duplicate_targets(&plan.files)?;
    plan.files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(plan)
}

fn render_entry(
    entry: &ManifestEntry,
    flags: &Flags,
    variables: &Variables,
) -> Result<PlannedFile, PlanFailure> {
    let path = entry
        .render_path(flags, variables)
        .map_err(|issue| PlanFailure {
            source: entry.source.clone(),
            path: None,
            issue,
        })?;
    let content = entry
        .render_content(flags, variables)
        .map_err(|issue| PlanFailure {
            source: entry.source.clone(),
            path: Some(path.clone()),
            issue,
        })?;

    Ok(PlannedFile {
        source: entry.source.clone(),
        path,
        ownership: entry.ownership,
        content,
        executable: entry.executable,
    })
}

fn check_duplicate_targets(files: &[PlannedFile]) -> Result<(), ComposeError> {
    let mut seen: BTreeMap<&PathBuf, &str> = BTreeMap::new();
    let mut issues = Vec::new();

    for file in files {
        if let Some(first) = seen.get(&file.path) {
            issues.push(ConfigIssue::DuplicateTarget {
                path: file.path.clone(),
                first: PathBuf::from(*first),
                second: PathBuf::from(&file.source),
            });
        } else {
            seen.insert(&file.path, &file.source);
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ComposeError::Configuration { issues })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn template(root: &Path) {
        write(
            root,
            "template.toml",
            r#"
[flags.use_s3]
default = false

[variables.name]
default = "demo"

[[files]]
pattern = "s3.txt"
when = "use_s3"

[[files]]
pattern = "app/**"
ownership = "app"
"#,
        );
        write(root, "files/readme.md.jinja", "# {{ name }}\n");
        write(root, "files/s3.txt", "bucket\n");
        write(root, "files/app/hooks.py", "pass\n");
    }

    fn flags(use_s3: bool) -> Flags {
        [("use_s3".to_string(), use_s3)].into()
    }

    fn vars() -> Variables {
        [("name".to_string(), "shop".to_string())].into()
    }

    #[test]
    fn test_plan_excludes_and_renders() {
        let dir = tempdir().unwrap();
        template(dir.path());
        let manifest = Manifest::load(dir.path()).unwrap();

        let plan = build_plan(&manifest, &flags(false), &vars()).unwrap();
        let paths: Vec<_> = plan.files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("app/hooks.py"), PathBuf::from("readme.md")]
        );
        assert_eq!(plan.excluded, vec!["s3.txt".to_string()]);
        assert_eq!(plan.file(Path::new("readme.md")).unwrap().content, b"# shop\n");
        assert_eq!(plan.template_owned().count(), 1);
    }

    #[test]
    fn test_render_failure_is_collected_per_entry() {
        let dir = tempdir().unwrap();
        template(dir.path());
        write(dir.path(), "files/broken.txt.jinja", "{{ missing }}\n");
        let manifest = Manifest::load(dir.path()).unwrap();

        let plan = build_plan(&manifest, &flags(true), &vars()).unwrap();
        assert_eq!(plan.failures.len(), 1);
        assert_eq!(plan.failures[0].source, "broken.txt.jinja");
        assert_eq!(plan.failures[0].path, Some(PathBuf::from("broken.txt")));
        assert_eq!(plan.files.len(), 3);
    }

    #[test]
    fn test_duplicate_targets_are_configuration_errors() {
        let dir = tempdir().unwrap();
        template(dir.path());
        write(dir.path(), "files/readme.md", "plain\n");
        let manifest = Manifest::load(dir.path()).unwrap();

        let err = build_plan(&manifest, &flags(false), &vars()).unwrap_err();
        match err {
            ComposeError::Configuration { issues } => {
                assert!(matches!(issues[0], ConfigIssue::DuplicateTarget { .. }));
            }
            other => panic!("Expected Configuration, got {other:?}"),
        }
    }

    #[test]
    fn test_undeclared_condition_flag_fails_validation() {
        let dir = tempdir().unwrap();
        template(dir.path());
        write(
            dir.path(),
            "files/extra.py.jinja",
            "{% if use_oidc %}\noidc\n{% endif %}\n",
        );
        let manifest = Manifest::load(dir.path()).unwrap();
        assert!(validate_configuration(&manifest).is_err());
    }
}
