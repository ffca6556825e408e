//! `stamp changelog`.

use anyhow::Result;
use std::path::Path;

use stamp::report::{EXIT_OK, OutputFormat, render_changelog};
use stamp::state::ProjectState;

use super::{load_manifest, project_template};

pub fn cmd_changelog(
    target: &Path,
    template: Option<&Path>,
    all: bool,
    format: OutputFormat,
) -> Result<u8> {
    let manifest = load_manifest(&project_template(target, template)?)?;
    let entries = if all {
        manifest.changelog.entries.as_slice()
    } else {
        let answers = ProjectState::new(target).load_answers()?;
        manifest.changelog.pending(answers.changelog_seen)
    };

    for entry in manifest.changelog.out_of_order() {
        tracing::warn!(date = %entry.date, "changelog entry is dated before the one preceding it");
    }

    print!("{}", render_changelog(entries, format));
    Ok(EXIT_OK)
}
