//! First materialization of a template into a target directory.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::bindings::{Overrides, Prompter, resolve_bindings};
use super::plan::{build_plan, validate_configuration};
use super::writer::ProjectWriter;
use crate::answers::AnswersRecord;
use crate::errors::{ComposeError, ConfigIssue};
use crate::manifest::Manifest;
use crate::schema::Ownership;
use crate::state::ProjectState;

/// What `generate` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateOutcome {
    pub created: Vec<PathBuf>,
    /// App-owned files already present in the target
    pub skipped: Vec<PathBuf>,
    /// Template-owned files that already existed with other content and were
    /// overwritten (also listed in `created`)
    pub replaced: Vec<PathBuf>,
    /// Template sources left out by their flag dependency
    pub excluded: Vec<String>,
    pub answers: AnswersRecord,
}

/// Generate a project into `target`.
///
/// Configuration and render problems are all detected before the first
/// write; on error the target is left exactly as it was. The answers record
/// is written last.
pub fn generate(
    manifest: &Manifest,
    target: &Path,
    overrides: &Overrides,
    prompter: Option<&mut dyn Prompter>,
) -> Result<GenerateOutcome, ComposeError> {
    let state = ProjectState::new(target);
    if state.is_generated() {
        return Err(ComposeError::config(ConfigIssue::AlreadyGenerated {
            path: target.to_path_buf(),
        }));
    }

    let bindings = resolve_bindings(&manifest.schema, None, overrides, prompter)?;
    validate_configuration(manifest)?;
    let plan = build_plan(manifest, &bindings.flags, &bindings.variables)?;
    if !plan.failures.is_empty() {
        return Err(ComposeError::Render {
            failures: plan.failures.iter().map(|f| f.to_render_failure()).collect(),
        });
    }

    let writer = ProjectWriter::new(&state);
    let mut outcome = GenerateOutcome {
        excluded: plan.excluded.clone(),
        ..Default::default()
    };

    for file in &plan.files {
        if file.ownership == Ownership::App && state.target(&file.path).exists() {
            debug!(path = %file.path.display(), "app-owned file already present");
            outcome.skipped.push(file.path.clone());
            continue;
        }
        if file.ownership == Ownership::Template
            && let Some(existing) = state.read_target(&file.path)?
            && existing != file.content
        {
            warn!(path = %file.path.display(), "replacing existing file with the template's version");
            outcome.replaced.push(file.path.clone());
        }
        writer.write(file)?;
        outcome.created.push(file.path.clone());
    }

    outcome.answers = AnswersRecord {
        template_version: manifest.version.clone(),
        template: Some(manifest.root.display().to_string()),
        commit: manifest.commit.clone(),
        changelog_seen: manifest.changelog.len(),
        flags: bindings.flags,
        variables: bindings.variables,
    };
    state.save_answers(&outcome.answers)?;

    info!(
        target = %target.display(),
        created = outcome.created.len(),
        version = %manifest.version,
        "generated project"
    );
    Ok(outcome)
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

    fn template(root: &Path) {
        write(
            root,
            "template.toml",
            "[flags.x]\ndefault = false\n\n[[files]]\npattern = \"app/**\"\nownership = \"app\"\n",
        );
        write(root, "files/a.txt", "a\n");
        write(root, "files/app/c.txt", "c\n");
    }

    #[test]
    fn test_generate_writes_files_snapshots_and_answers() {
        let tpl = tempdir().unwrap();
        template(tpl.path());
        let manifest = Manifest::load(tpl.path()).unwrap();
        let out = tempdir().unwrap();

        let outcome = generate(&manifest, out.path(), &Overrides::default(), None).unwrap();
        assert_eq!(
            outcome.created,
            vec![PathBuf::from("a.txt"), PathBuf::from("app/c.txt")]
        );

        let state = ProjectState::new(out.path());
        assert!(state.is_generated());
        assert_eq!(state.snapshot(Path::new("a.txt")).unwrap(), Some(b"a\n".to_vec()));
        assert_eq!(state.snapshot(Path::new("app/c.txt")).unwrap(), None);
        assert_eq!(state.load_answers().unwrap().flags["x"], false);
    }

    #[test]
    fn test_generate_twice_is_rejected() {
        let tpl = tempdir().unwrap();
        template(tpl.path());
        let manifest = Manifest::load(tpl.path()).unwrap();
        let out = tempdir().unwrap();

        generate(&manifest, out.path(), &Overrides::default(), None).unwrap();
        let err = generate(&manifest, out.path(), &Overrides::default(), None).unwrap_err();
        assert!(err.to_string().contains("already holds a generated project"));
    }

    #[test]
    fn test_existing_app_owned_file_is_kept() {
        let tpl = tempdir().unwrap();
        template(tpl.path());
        let manifest = Manifest::load(tpl.path()).unwrap();
        let out = tempdir().unwrap();
        write(out.path(), "app/c.txt", "mine\n");

        let outcome = generate(&manifest, out.path(), &Overrides::default(), None).unwrap();
        assert_eq!(outcome.skipped, vec![PathBuf::from("app/c.txt")]);
        assert_eq!(fs::read_to_string(out.path().join("app/c.txt")).unwrap(), "mine\n");
    }

    #[test]
    fn test_existing_template_owned_file_is_reported_as_replaced() {
        let tpl = tempdir().unwrap();
        template(tpl.path());
        let manifest = Manifest::load(tpl.path()).unwrap();
        let out = tempdir().unwrap();
        write(out.path(), "a.txt", "old notes\n");

        let outcome = generate(&manifest, out.path(), &Overrides::default(), None).unwrap();
        assert_eq!(outcome.replaced, vec![PathBuf::from("a.txt")]);
        assert!(outcome.created.contains(&PathBuf::from("a.txt")));
        assert_eq!(fs::read_to_string(out.path().join("a.txt")).unwrap(), "a\n");
    }

    #[test]
    fn test_identical_existing_file_is_not_reported() {
        let tpl = tempdir().unwrap();
        template(tpl.path());
        let manifest = Manifest::load(tpl.path()).unwrap();
        let out = tempdir().unwrap();
        write(out.path(), "a.txt", "a\n");

        let outcome = generate(&manifest, out.path(), &Overrides::default(), None).unwrap();
        assert!(outcome.replaced.is_empty());
    }

    #[test]
    fn test_render_error_writes_nothing() {
        let tpl = tempdir().unwrap();
        template(tpl.path());
        write(tpl.path(), "files/z.txt.jinja", "{{ nope }}\n");
        let manifest = Manifest::load(tpl.path()).unwrap();
        let out = tempdir().unwrap();

        let err = generate(&manifest, out.path(), &Overrides::default(), None).unwrap_err();
        assert!(matches!(err, ComposeError::Render { .. }));
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
    }
}
