//! `stamp update`.

use anyhow::Result;
use std::path::Path;

use stamp::compose::{Overrides, UpdateOptions, update};
use stamp::report::{EXIT_ATTENTION, EXIT_OK, OutputFormat, render_update};

use super::{load_manifest, project_template};

pub fn cmd_update(
    target: &Path,
    template: Option<&Path>,
    flags: &[(String, String)],
    vars: &[(String, String)],
    diff: bool,
    format: OutputFormat,
) -> Result<u8> {
    let manifest = load_manifest(&project_template(target, template)?)?;
    let options = UpdateOptions {
        overrides: Overrides::from_pairs(flags, vars)?,
        diff,
    };

    let result = update(&manifest, target, &options)?;
    print!("{}", render_update(&result, format));

    if result.needs_attention() {
        Ok(EXIT_ATTENTION)
    } else {
        Ok(EXIT_OK)
    }
}
