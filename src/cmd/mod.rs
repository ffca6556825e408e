//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant. Handlers return the process
//! exit code; errors bubble up to `main`, which renders them.
//!
//! | Module      | Commands handled |
//! |-------------|------------------|
//! | `generate`  | `Generate`       |
//! | `update`    | `Update`         |
//! | `status`    | `Status`         |
//! | `resolve`   | `Resolve`        |
//! | `changelog` | `Changelog`      |
//! | `schema`    | `Schema`         |

pub mod changelog;
pub mod generate;
pub mod resolve;
pub mod schema;
pub mod status;
pub mod update;

pub use changelog::cmd_changelog;
pub use generate::cmd_generate;
pub use resolve::cmd_resolve;
pub use schema::cmd_schema;
pub use status::cmd_status;
pub use update::cmd_update;

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

use stamp::manifest::Manifest;
use stamp::state::ProjectState;

/// Load the template at `template`, resolving it to an absolute path so the
/// answers record stays valid from any working directory.
pub fn load_manifest(template: &Path) -> Result<Manifest> {
    let root = std::fs::canonicalize(template)
        .with_context(|| format!("Template directory not found: {}", template.display()))?;
    let manifest = Manifest::load(&root)?;
    for warning in manifest.schema.warnings() {
        tracing::debug!(template = %root.display(), "{}", warning);
    }
    Ok(manifest)
}

/// The template for an existing project: the explicit one, or the one its
/// answers record.
pub fn project_template(target: &Path, explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(template) = explicit {
        return Ok(template.to_path_buf());
    }
    let answers = ProjectState::new(target).load_answers()?;
    match answers.template {
        Some(template) => Ok(PathBuf::from(template)),
        None => bail!(
            "{} does not record its template; pass --template <dir>",
            target.display()
        ),
    }
}
