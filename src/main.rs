use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use stamp::report::{self, OutputFormat};

mod cmd;

#[derive(Parser)]
#[command(name = "stamp")]
#[command(version, about = "Feature-flag template composer")]
pub struct Cli {
    /// Debug logging to stderr (overridden by STAMP_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a new project from a template
    Generate {
        /// Template directory (holding template.toml and files/)
        template: PathBuf,

        /// Directory to generate into
        target: PathBuf,

        /// Set a flag (repeatable)
        #[arg(long = "flag", value_name = "NAME=VALUE", value_parser = parse_key_value)]
        flags: Vec<(String, String)>,

        /// Set a variable (repeatable)
        #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_key_value)]
        vars: Vec<(String, String)>,

        /// Prompt for every flag and variable not given on the command line
        #[arg(short, long)]
        interactive: bool,
    },
    /// Update a generated project to the current template
    Update {
        /// Generated project directory
        target: PathBuf,

        /// Template directory (defaults to the one recorded in the answers)
        #[arg(long)]
        template: Option<PathBuf>,

        /// Change a flag as part of this update (repeatable)
        #[arg(long = "flag", value_name = "NAME=VALUE", value_parser = parse_key_value)]
        flags: Vec<(String, String)>,

        /// Change a variable as part of this update (repeatable)
        #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_key_value)]
        vars: Vec<(String, String)>,

        /// Show a diff for every conflict
        #[arg(long)]
        diff: bool,
    },
    /// Show how a project has drifted from its template
    Status {
        target: PathBuf,

        #[arg(long)]
        template: Option<PathBuf>,
    },
    /// Accept hand-resolved conflicts
    Resolve {
        target: PathBuf,

        /// Project-relative paths of resolved files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[arg(long)]
        template: Option<PathBuf>,
    },
    /// Show template changelog entries the project has not seen
    Changelog {
        target: PathBuf,

        #[arg(long)]
        template: Option<PathBuf>,

        /// Show every entry, not only pending ones
        #[arg(long)]
        all: bool,
    },
    /// Inspect or validate a template schema
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },
}

#[derive(Subcommand, Clone)]
pub enum SchemaCommands {
    /// Show declared flags, variables and ownership rules
    Show { template: PathBuf },
    /// Validate template.toml and every template file
    Validate { template: PathBuf },
}

/// Parse a `NAME=VALUE` argument.
fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing name in '{}'", raw));
    }
    Ok((name.to_string(), value.to_string()))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    stamp::logging::init(cli.verbose, cli.format == OutputFormat::Json);

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprint!("{}", report::render_error(&err, cli.format));
            ExitCode::from(report::EXIT_FATAL)
        }
    }
}

fn run(cli: &Cli) -> Result<u8> {
    let format = cli.format;
    match &cli.command {
        Commands::Generate {
            template,
            target,
            flags,
            vars,
            interactive,
        } => cmd::cmd_generate(template, target, flags, vars, *interactive, format),
        Commands::Update {
            target,
            template,
            flags,
            vars,
            diff,
        } => cmd::cmd_update(target, template.as_deref(), flags, vars, *diff, format),
        Commands::Status { target, template } => {
            cmd::cmd_status(target, template.as_deref(), format)
        }
        Commands::Resolve {
            target,
            paths,
            template,
        } => cmd::cmd_resolve(target, paths, template.as_deref(), format),
        Commands::Changelog {
            target,
            template,
            all,
        } => cmd::cmd_changelog(target, template.as_deref(), *all, format),
        Commands::Schema { command } => cmd::cmd_schema(command.clone(), format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("use_s3=true").unwrap(),
            ("use_s3".to_string(), "true".to_string())
        );
        assert_eq!(
            parse_key_value("title=a=b").unwrap(),
            ("title".to_string(), "a=b".to_string())
        );
        assert!(parse_key_value("use_s3").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
