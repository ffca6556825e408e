//! `stamp schema`: template inspection and validation.

use anyhow::Result;
use console::style;
use serde_json::json;
use std::path::{Path, PathBuf};

use stamp::compose::validate_configuration;
use stamp::errors::{ComposeError, RenderFailure};
use stamp::manifest::Manifest;
use stamp::report::{EXIT_OK, OutputFormat};
use stamp::ui::icons::{CHECK, WARN};

use super::super::SchemaCommands;
use super::load_manifest;

const HELP_WIDTH: usize = 72;

pub fn cmd_schema(command: SchemaCommands, format: OutputFormat) -> Result<u8> {
    match command {
        SchemaCommands::Show { template } => show(&template, format),
        SchemaCommands::Validate { template } => validate(&template, format),
    }
}

fn show(template: &Path, format: OutputFormat) -> Result<u8> {
    let manifest = load_manifest(template)?;
    let schema = &manifest.schema;

    if format == OutputFormat::Json {
        let entries: Vec<_> = manifest
            .entries
            .iter()
            .map(|e| {
                json!({
                    "source": e.source,
                    "path": e.path_template,
                    "ownership": e.ownership,
                    "when": e.flag_dependency.as_ref().map(|p| p.to_string()),
                    "templated": e.is_templated,
                })
            })
            .collect();
        let body = json!({
            "name": schema.display_name(&manifest.root),
            "version": manifest.version,
            "commit": manifest.commit,
            "schema": schema,
            "entries": entries,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(EXIT_OK);
    }

    println!();
    println!(
        "Template {} (version {}, {} files)",
        style(schema.display_name(&manifest.root)).bold(),
        style(&manifest.version).cyan(),
        manifest.entries.len()
    );

    println!();
    println!("Flags");
    if schema.flags.is_empty() {
        println!("  (none)");
    }
    for (name, decl) in &schema.flags {
        let default = match decl.default {
            Some(value) => format!("default: {}", value),
            None => "required".to_string(),
        };
        println!("  {} {}", style(name).yellow(), style(default).dim());
        print_help(&decl.help);
    }

    println!();
    println!("Variables");
    if schema.variables.is_empty() {
        println!("  (none)");
    }
    for (name, decl) in &schema.variables {
        let default = match &decl.default {
            Some(value) => format!("default: \"{}\"", value),
            None => "required".to_string(),
        };
        println!("  {} {}", style(name).yellow(), style(default).dim());
        print_help(&decl.help);
    }

    println!();
    println!("Ownership rules (first match wins, default template-owned)");
    for (index, rule) in schema.files.iter().enumerate() {
        let when = rule
            .when
            .as_deref()
            .map(|w| format!(" when {}", w))
            .unwrap_or_default();
        println!(
            "  {}. {} {}{}",
            index + 1,
            rule.pattern,
            style(rule.ownership).cyan(),
            when
        );
    }
    println!();

    Ok(EXIT_OK)
}

fn print_help(help: &str) {
    if help.is_empty() {
        return;
    }
    for line in textwrap::wrap(help, HELP_WIDTH) {
        println!("      {}", style(line).dim());
    }
}

/// Every check `generate` would run, without any bindings.
fn validate(template: &Path, format: OutputFormat) -> Result<u8> {
    let manifest = load_manifest(template)?;
    validate_configuration(&manifest)?;
    check_syntax(&manifest)?;

    let mut warnings = manifest.schema.warnings();
    for pattern in manifest.unmatched_rules() {
        warnings.push(format!("rule '{}' matches no template file", pattern));
    }
    for entry in manifest.changelog.out_of_order() {
        warnings.push(format!(
            "changelog entry '{}' ({}) is dated before the one preceding it",
            entry.description, entry.date
        ));
    }

    match format {
        OutputFormat::Json => {
            let body = json!({
                "valid": true,
                "version": manifest.version,
                "warnings": warnings,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Text => {
            println!(
                "{}Template is valid ({} files, version {})",
                CHECK,
                manifest.entries.len(),
                manifest.version
            );
            for warning in &warnings {
                println!("  {}{}", WARN, warning);
            }
        }
    }
    Ok(EXIT_OK)
}

fn check_syntax(manifest: &Manifest) -> Result<(), ComposeError> {
    let mut failures = Vec::new();
    for entry in &manifest.entries {
        let parsed = entry.parse_path().and_then(|_| entry.parse_content());
        if let Err(issue) = parsed {
            failures.push(RenderFailure {
                source: PathBuf::from(&entry.source),
                issue,
            });
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(ComposeError::Render { failures })
    }
}
