//! Rendering results for people and for machines.
//!
//! Reports go to stdout and errors to stderr, both either as styled text or
//! as JSON (`--format json`). Every file line names the path and the reason.

use console::style;
use serde_json::json;
use std::path::Path;

use crate::changelog::ChangelogEntry;
use crate::compose::{FileState, GenerateOutcome, StatusReport, UpdateFinding, UpdateResult};
use crate::errors::ComposeError;
use crate::ui::icons::{
    CHECK, CONFLICT, CROSS, FILE_MOD, FILE_NEW, FILE_SAME, FILE_SKIP, MIGRATION, ORPHAN, SPARKLE,
    WARN,
};

/// Everything went through.
pub const EXIT_OK: u8 = 0;
/// Nothing (or nothing further) was written because of an error.
pub const EXIT_FATAL: u8 = 1;
/// The update finished but left conflicts or per-file failures.
pub const EXIT_ATTENTION: u8 = 3;

/// Output format for reports and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn to_json(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

pub fn render_generate(outcome: &GenerateOutcome, target: &Path, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(&json!({
            "target": target,
            "template_version": outcome.answers.template_version,
            "created": outcome.created,
            "skipped": outcome.skipped,
            "replaced": outcome.replaced,
            "excluded": outcome.excluded,
            "flags": outcome.answers.flags,
            "variables": outcome.answers.variables,
        })),
        OutputFormat::Text => {
            let mut out = String::new();
            for path in &outcome.created {
                if outcome.replaced.contains(path) {
                    out.push_str(&format!(
                        "  {}{} {}\n",
                        FILE_MOD,
                        style(path.display()).yellow(),
                        style("(replaced existing file)").dim()
                    ));
                } else {
                    out.push_str(&format!("  {}{}\n", FILE_NEW, style(path.display()).green()));
                }
            }
            for path in &outcome.skipped {
                out.push_str(&format!(
                    "  {}{} {}\n",
                    FILE_SKIP,
                    path.display(),
                    style("(app-owned, already present)").dim()
                ));
            }
            out.push_str(&format!(
                "\n{}Generated {} files into {} (template {})\n",
                SPARKLE,
                outcome.created.len(),
                target.display(),
                style(&outcome.answers.template_version).cyan()
            ));
            if !outcome.excluded.is_empty() {
                out.push_str(&format!(
                    "{}\n",
                    style(format!(
                        "{} template files excluded by flags",
                        outcome.excluded.len()
                    ))
                    .dim()
                ));
            }
            out
        }
    }
}

fn finding_line(finding: &UpdateFinding) -> Option<String> {
    let line = match finding {
        UpdateFinding::Created { path, ownership } => format!(
            "  {}{} {}",
            FILE_NEW,
            style(path.display()).green(),
            style(format!("created ({})", ownership)).dim()
        ),
        UpdateFinding::Overwritten { path } => format!(
            "  {}{} {}",
            FILE_MOD,
            style(path.display()).yellow(),
            style("overwritten").dim()
        ),
        UpdateFinding::Unchanged {
            path,
            locally_modified: true,
        } => format!(
            "  {}{} {}",
            FILE_SAME,
            path.display(),
            style("local edits kept, no upstream change").dim()
        ),
        UpdateFinding::Unchanged { .. } => return None,
        UpdateFinding::Skipped { path } => format!(
            "  {}{} {}",
            FILE_SKIP,
            path.display(),
            style("skipped (app-owned)").dim()
        ),
        UpdateFinding::Conflict {
            path,
            reason,
            merge,
            diff,
        } => {
            let mut line = format!(
                "  {}{} conflict: {}; {}",
                CONFLICT,
                style(path.display()).red().bold(),
                reason,
                merge
            );
            if let Some(diff) = diff {
                for diff_line in diff.lines() {
                    line.push_str(&format!("\n      {}", diff_line));
                }
            }
            line
        }
        UpdateFinding::Orphaned { path, reason } => format!(
            "  {}{} orphaned: {}",
            ORPHAN,
            style(path.display()).magenta(),
            reason
        ),
        UpdateFinding::Failed {
            path,
            source,
            issue,
        } => format!(
            "  {}{} failed: {} (template {})",
            CROSS,
            style(path.display()).red(),
            issue,
            source
        ),
        UpdateFinding::IoFailed { path, error } => format!(
            "  {}{} failed: {}",
            CROSS,
            style(path.display()).red(),
            error
        ),
    };
    Some(line)
}

pub fn render_update(result: &UpdateResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(&json!({
            "previous_version": result.previous_version,
            "version": result.version,
            "findings": result.findings,
            "created": result.created(),
            "overwritten": result.overwritten(),
            "unchanged": result.unchanged(),
            "skipped": result.skipped(),
            "conflicted": result.conflicted(),
            "orphaned": result.orphaned(),
            "failed": result.failed(),
            "dropped_answers": result.dropped_answers,
            "pending_changelog": result.pending_changelog,
        })),
        OutputFormat::Text => {
            let mut out = String::new();
            if result.previous_version == result.version {
                out.push_str(&format!(
                    "Template {} (unchanged)\n",
                    style(&result.version).cyan()
                ));
            } else {
                out.push_str(&format!(
                    "Template {} -> {}\n",
                    style(&result.previous_version).dim(),
                    style(&result.version).cyan()
                ));
            }
            for line in result.findings.iter().filter_map(finding_line) {
                out.push_str(&line);
                out.push('\n');
            }
            for name in &result.dropped_answers {
                out.push_str(&format!(
                    "  {}answer '{}' dropped: no longer declared by the template\n",
                    WARN, name
                ));
            }

            out.push_str(&format!(
                "\n{} created, {} overwritten, {} unchanged, {} skipped, {} conflicted, {} orphaned, {} failed\n",
                result.created().len(),
                result.overwritten().len(),
                result.unchanged().len(),
                result.skipped().len(),
                result.conflicted().len(),
                result.orphaned().len(),
                result.failed().len(),
            ));
            if result.needs_attention() {
                out.push_str(&format!(
                    "{}Resolve conflicts by hand, then run 'stamp resolve <target> <path>...'\n",
                    WARN
                ));
            } else {
                out.push_str(&format!("{}Project is up to date\n", CHECK));
            }
            out.push_str(&render_changelog_text(&result.pending_changelog));
            out
        }
    }
}

pub fn render_status(report: &StatusReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(&json!({
            "recorded_version": report.recorded_version,
            "current_version": report.current_version,
            "outdated": report.is_outdated(),
            "files": report.files,
            "pending_changelog": report.pending_changelog,
        })),
        OutputFormat::Text => {
            let mut out = String::new();
            if report.is_outdated() {
                out.push_str(&format!(
                    "{}Template changed: project has {}, template is {}\n",
                    WARN,
                    style(&report.recorded_version).dim(),
                    style(&report.current_version).cyan()
                ));
            } else {
                out.push_str(&format!(
                    "{}Template {} matches the project\n",
                    CHECK,
                    style(&report.current_version).cyan()
                ));
            }

            let drifted: Vec<_> = report.drifted().collect();
            if drifted.is_empty() {
                out.push_str("All template-owned files match the template\n");
            }
            for file in drifted {
                let state = match &file.state {
                    FileState::WouldConflict | FileState::RenderFailed { .. } => {
                        style(file.state.to_string()).red()
                    }
                    FileState::LocallyModified => style(file.state.to_string()).yellow(),
                    _ => style(file.state.to_string()).dim(),
                };
                out.push_str(&format!("  {} {}\n", file.path.display(), state));
            }
            out.push_str(&render_changelog_text(&report.pending_changelog));
            out
        }
    }
}

pub fn render_changelog(entries: &[ChangelogEntry], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(&json!({ "entries": entries })),
        OutputFormat::Text if entries.is_empty() => "No pending changelog entries\n".to_string(),
        OutputFormat::Text => render_changelog_text(entries),
    }
}

fn render_changelog_text(entries: &[ChangelogEntry]) -> String {
    let mut out = String::new();
    if entries.is_empty() {
        return out;
    }
    out.push_str(&format!("\n{}\n", style("Template changelog").bold()));
    for entry in entries {
        out.push_str(&format!(
            "  {} {}\n",
            style(entry.date).cyan(),
            entry.description
        ));
        for step in &entry.migration_steps {
            out.push_str(&format!("    {}{}\n", MIGRATION, step));
        }
    }
    out
}

/// Render a fatal error, itemizing configuration and render problems.
pub fn render_error(err: &anyhow::Error, format: OutputFormat) -> String {
    let compose = err.downcast_ref::<ComposeError>();
    match format {
        OutputFormat::Json => {
            let body = match compose {
                Some(ComposeError::Configuration { issues }) => json!({
                    "kind": "configuration",
                    "message": err.to_string(),
                    "issues": issues,
                }),
                Some(ComposeError::Render { failures }) => json!({
                    "kind": "render",
                    "message": err.to_string(),
                    "failures": failures,
                }),
                Some(ComposeError::OwnershipViolation { path }) => json!({
                    "kind": "ownership_violation",
                    "message": err.to_string(),
                    "path": path,
                }),
                _ => json!({
                    "kind": "error",
                    "message": format!("{:#}", err),
                }),
            };
            to_json(&json!({ "error": body }))
        }
        OutputFormat::Text => match compose {
            Some(ComposeError::Configuration { issues }) => {
                let mut out = format!("{}{}\n", CROSS, style("Configuration error").red().bold());
                for issue in issues {
                    out.push_str(&format!("  - {}\n", issue));
                }
                out
            }
            Some(ComposeError::Render { failures }) => {
                let mut out = format!("{}{}\n", CROSS, style("Render error").red().bold());
                for failure in failures {
                    out.push_str(&format!("  - {}\n", failure));
                }
                out
            }
            _ => format!("{}{} {:#}\n", CROSS, style("Error:").red().bold(), err),
        },
    }
}
