//! Flag and variable resolution.
//!
//! Values resolve in layers, later layers winning:
//!
//! 1. the schema default
//! 2. the project's stored answers (update only)
//! 3. explicit overrides (`--flag` / `--var`)
//!
//! Every problem is collected so one run reports all of them.

use dialoguer::{Confirm, Input, theme::ColorfulTheme};
use tracing::{debug, warn};

use super::{Flags, Variables};
use crate::answers::AnswersRecord;
use crate::errors::{ComposeError, ConfigIssue};
use crate::schema::{FlagDecl, TemplateToml, VariableDecl};

/// Values given explicitly on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub flags: Flags,
    pub variables: Variables,
}

impl Overrides {
    /// Build overrides from raw `name=value` pairs.
    pub fn from_pairs(
        flags: &[(String, String)],
        variables: &[(String, String)],
    ) -> Result<Self, ComposeError> {
        let mut overrides = Overrides::default();
        let mut issues = Vec::new();

        for (name, value) in flags {
            match parse_flag_value(value) {
                Some(parsed) => {
                    overrides.flags.insert(name.clone(), parsed);
                }
                None => issues.push(ConfigIssue::InvalidFlagValue {
                    name: name.clone(),
                    value: value.clone(),
                }),
            }
        }
        for (name, value) in variables {
            overrides.variables.insert(name.clone(), value.clone());
        }

        if issues.is_empty() {
            Ok(overrides)
        } else {
            Err(ComposeError::Configuration { issues })
        }
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty() && self.variables.is_empty()
    }
}

/// Parse a flag value: `true/false`, `yes/no`, `on/off`, `1/0`.
pub fn parse_flag_value(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Asks the operator for values that aren't otherwise known.
pub trait Prompter {
    fn ask_flag(&mut self, name: &str, decl: &FlagDecl) -> Result<bool, ComposeError>;
    fn ask_variable(&mut self, name: &str, decl: &VariableDecl) -> Result<String, ComposeError>;
}

/// Interactive terminal prompts.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn ask_flag(&mut self, name: &str, decl: &FlagDecl) -> Result<bool, ComposeError> {
        let theme = ColorfulTheme::default();
        let mut confirm = Confirm::with_theme(&theme).with_prompt(prompt_text(name, &decl.help));
        if let Some(default) = decl.default {
            confirm = confirm.default(default);
        }
        confirm
            .interact()
            .map_err(|e| ComposeError::Prompt(e.to_string()))
    }

    fn ask_variable(&mut self, name: &str, decl: &VariableDecl) -> Result<String, ComposeError> {
        let theme = ColorfulTheme::default();
        let mut input =
            Input::<String>::with_theme(&theme).with_prompt(prompt_text(name, &decl.help));
        if let Some(default) = &decl.default {
            input = input.default(default.clone());
        }
        input
            .interact_text()
            .map_err(|e| ComposeError::Prompt(e.to_string()))
    }
}

fn prompt_text(name: &str, help: &str) -> String {
    if help.is_empty() {
        name.to_string()
    } else {
        format!("{} ({})", name, help)
    }
}

/// Fully resolved values for every declared flag and variable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    pub flags: Flags,
    pub variables: Variables,
    /// Stored answers whose names the schema no longer declares
    pub dropped: Vec<String>,
}

/// Resolve every declared flag and variable.
///
/// With a prompter, anything not given by an override or a stored answer is
/// asked for (the schema default pre-filled) instead of taken silently.
pub fn resolve_bindings(
    schema: &TemplateToml,
    stored: Option<&AnswersRecord>,
    overrides: &Overrides,
    mut prompter: Option<&mut dyn Prompter>,
) -> Result<Bindings, ComposeError> {
    let mut issues = Vec::new();
    let mut bindings = Bindings::default();

    for name in overrides.flags.keys() {
        if !schema.is_flag(name) {
            issues.push(ConfigIssue::UnknownOverride {
                name: name.clone(),
                expected: "flag".to_string(),
            });
        }
    }
    for name in overrides.variables.keys() {
        if !schema.is_variable(name) {
            issues.push(ConfigIssue::UnknownOverride {
                name: name.clone(),
                expected: "variable".to_string(),
            });
        }
    }

    for (name, decl) in &schema.flags {
        let explicit = overrides
            .flags
            .get(name)
            .or_else(|| stored.and_then(|s| s.flags.get(name)))
            .copied();
        let value = match (explicit, prompter.as_deref_mut()) {
            (Some(value), _) => Some(value),
            (None, Some(prompter)) => Some(prompter.ask_flag(name, decl)?),
            (None, None) => decl.default,
        };
        match value {
            Some(value) => {
                debug!(flag = %name, value, "resolved flag");
                bindings.flags.insert(name.clone(), value);
            }
            None => issues.push(ConfigIssue::UnboundFlag { name: name.clone() }),
        }
    }

    for (name, decl) in &schema.variables {
        let explicit = overrides
            .variables
            .get(name)
            .or_else(|| stored.and_then(|s| s.variables.get(name)))
            .cloned();
        let value = match (explicit, prompter.as_deref_mut()) {
            (Some(value), _) => Some(value),
            (None, Some(prompter)) => Some(prompter.ask_variable(name, decl)?),
            (None, None) => decl.default.clone(),
        };
        match value {
            Some(value) => {
                debug!(variable = %name, value = %value, "resolved variable");
                bindings.variables.insert(name.clone(), value);
            }
            None => issues.push(ConfigIssue::UnboundVariable { name: name.clone() }),
        }
    }

    if let Some(stored) = stored {
        for name in stored.flags.keys() {
            if !schema.is_flag(name) {
                bindings.dropped.push(name.clone());
            }
        }
        for name in stored.variables.keys() {
            if !schema.is_variable(name) {
                bindings.dropped.push(name.clone());
            }
        }
        bindings.dropped.sort();
        for name in &bindings.dropped {
            warn!(answer = %name, "dropping stored answer the template no longer declares");
        }
    }

    if issues.is_empty() {
        Ok(bindings)
    } else {
        Err(ComposeError::Configuration { issues })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> TemplateToml {
        TemplateToml::parse(
            r#"
[flags.use_database]
default = true

[flags.use_s3]

[variables.project_name]

[variables.author]
default = "Unknown"
"#,
        )
        .unwrap()
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    struct Scripted {
        asked: Vec<String>,
    }

    impl Prompter for Scripted {
        fn ask_flag(&mut self, name: &str, _decl: &FlagDecl) -> Result<bool, ComposeError> {
            self.asked.push(name.to_string());
            Ok(true)
        }

        fn ask_variable(&mut self, name: &str, _decl: &VariableDecl) -> Result<String, ComposeError> {
            self.asked.push(name.to_string());
            Ok(format!("{}-answer", name))
        }
    }

    #[test]
    fn test_parse_flag_value_accepts_common_spellings() {
        for yes in ["true", "YES", "on", "1", " True "] {
            assert_eq!(parse_flag_value(yes), Some(true), "{yes}");
        }
        for no in ["false", "no", "OFF", "0"] {
            assert_eq!(parse_flag_value(no), Some(false), "{no}");
        }
        assert_eq!(parse_flag_value("maybe"), None);
    }

    #[test]
    fn test_from_pairs_collects_invalid_values() {
        let err = Overrides::from_pairs(&pairs(&[("a", "maybe"), ("b", "perhaps")]), &[])
            .unwrap_err();
        match err {
            ComposeError::Configuration { issues } => assert_eq!(issues.len(), 2),
            other => panic!("Expected Configuration, got {other:?}"),
        }
    }

    #[test]
    fn test_layers_override_defaults_and_stored() {
        let stored = AnswersRecord {
            template_version: "v1".into(),
            flags: [("use_database".to_string(), false), ("use_s3".to_string(), true)].into(),
            variables: [("project_name".to_string(), "shop".to_string())].into(),
            ..Default::default()
        };
        let overrides =
            Overrides::from_pairs(&pairs(&[("use_s3", "no")]), &pairs(&[("author", "Ada")]))
                .unwrap();

        let bindings = resolve_bindings(&schema(), Some(&stored), &overrides, None).unwrap();
        assert_eq!(bindings.flags["use_database"], false);
        assert_eq!(bindings.flags["use_s3"], false);
        assert_eq!(bindings.variables["project_name"], "shop");
        assert_eq!(bindings.variables["author"], "Ada");
    }

    #[test]
    fn test_unbound_names_are_all_reported() {
        let err = resolve_bindings(&schema(), None, &Overrides::default(), None).unwrap_err();
        match err {
            ComposeError::Configuration { issues } => {
                assert!(issues.contains(&ConfigIssue::UnboundFlag {
                    name: "use_s3".into()
                }));
                assert!(issues.contains(&ConfigIssue::UnboundVariable {
                    name: "project_name".into()
                }));
            }
            other => panic!("Expected Configuration, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_override_is_rejected() {
        let overrides = Overrides::from_pairs(&pairs(&[("use_redis", "true")]), &[]).unwrap();
        let err = resolve_bindings(&schema(), None, &overrides, None).unwrap_err();
        assert!(err.to_string().contains("use_redis"));
    }

    #[test]
    fn test_stored_answers_for_removed_names_are_dropped() {
        let stored = AnswersRecord {
            template_version: "v1".into(),
            flags: [("use_s3".to_string(), true), ("use_sse".to_string(), true)].into(),
            variables: [
                ("project_name".to_string(), "shop".to_string()),
                ("legacy".to_string(), "x".to_string()),
            ]
            .into(),
            ..Default::default()
        };
        let bindings =
            resolve_bindings(&schema(), Some(&stored), &Overrides::default(), None).unwrap();
        assert_eq!(bindings.dropped, vec!["legacy".to_string(), "use_sse".to_string()]);
        assert!(!bindings.flags.contains_key("use_sse"));
    }

    #[test]
    fn test_prompter_asks_for_values_not_given() {
        let overrides = Overrides::from_pairs(&pairs(&[("use_s3", "true")]), &[]).unwrap();
        let mut prompter = Scripted { asked: vec![] };
        let bindings =
            resolve_bindings(&schema(), None, &overrides, Some(&mut prompter)).unwrap();
        assert_eq!(
            prompter.asked,
            vec!["use_database", "author", "project_name"]
        );
        assert_eq!(bindings.variables["project_name"], "project_name-answer");
    }
}
