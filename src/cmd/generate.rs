//! `stamp generate`.

use anyhow::Result;
use std::path::Path;

use stamp::compose::{Overrides, Prompter, TerminalPrompter, generate};
use stamp::report::{EXIT_OK, OutputFormat, render_generate};

use super::load_manifest;

pub fn cmd_generate(
    template: &Path,
    target: &Path,
    flags: &[(String, String)],
    vars: &[(String, String)],
    interactive: bool,
    format: OutputFormat,
) -> Result<u8> {
    let manifest = load_manifest(template)?;
    let overrides = Overrides::from_pairs(flags, vars)?;

    let mut terminal = TerminalPrompter;
    let prompter: Option<&mut dyn Prompter> = if interactive {
        Some(&mut terminal)
    } else {
        None
    };

    let outcome = generate(&manifest, target, &overrides, prompter)?;
    print!("{}", render_generate(&outcome, target, format));
    Ok(EXIT_OK)
}
