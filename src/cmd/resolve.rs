//! `stamp resolve`.

use anyhow::Result;
use console::style;
use serde_json::json;
use std::path::{Path, PathBuf};

use stamp::compose::resolve;
use stamp::report::{EXIT_OK, OutputFormat};
use stamp::ui::icons::CHECK;

use super::{load_manifest, project_template};

pub fn cmd_resolve(
    target: &Path,
    paths: &[PathBuf],
    template: Option<&Path>,
    format: OutputFormat,
) -> Result<u8> {
    let manifest = load_manifest(&project_template(target, template)?)?;
    let resolved = resolve(&manifest, target, paths)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ "resolved": resolved }))?);
        }
        OutputFormat::Text => {
            for path in &resolved {
                println!("  {}{} {}", CHECK, path.display(), style("resolved").dim());
            }
        }
    }
    Ok(EXIT_OK)
}
