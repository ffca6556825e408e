//! `stamp status`.

use anyhow::Result;
use std::path::Path;

use stamp::compose::status;
use stamp::report::{EXIT_OK, OutputFormat, render_status};

use super::{load_manifest, project_template};

pub fn cmd_status(target: &Path, template: Option<&Path>, format: OutputFormat) -> Result<u8> {
    let manifest = load_manifest(&project_template(target, template)?)?;
    let report = status(&manifest, target)?;
    print!("{}", render_status(&report, format));
    Ok(EXIT_OK)
}
