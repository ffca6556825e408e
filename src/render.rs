//! Template text: variable substitution and flag-gated blocks.
//!
//! Supported syntax:
//!
//! ```text
//! {{ project_name }}              substitute a variable (or a flag, as true/false)
//! {% if use_s3 and use_database %}
//! {% elif use_s3 %}
//! {% else %}
//! {% endif %}
//! ```
//!
//! A `{% ... %}` tag that is the only thing on its line swallows the whole
//! line, so disabled blocks don't leave blank lines behind. Conditions use the
//! same predicate language as `when = "..."` rules in `template.toml`.

use crate::compose::{Flags, Variables};
use crate::errors::RenderIssue;
use crate::predicate::Predicate;

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Var { name: String, line: usize },
    If { branches: Vec<Branch>, otherwise: Vec<Node> },
}

#[derive(Debug, Clone, PartialEq)]
struct Branch {
    condition: Predicate,
    line: usize,
    body: Vec<Node>,
}

/// Everything a template reads from its environment.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub flags: &'a Flags,
    pub variables: &'a Variables,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Text(String),
    Expr { content: String, line: usize },
    Stmt { content: String, line: usize },
}

impl Template {
    /// Parse template source.
    pub fn parse(source: &str) -> Result<Self, RenderIssue> {
        let mut tokens = lex(source)?;
        trim_standalone_tags(&mut tokens);
        let mut tokens = tokens.into_iter();
        let (nodes, terminator) = parse_nodes(&mut tokens)?;
        if let Some((tag, line)) = terminator {
            return Err(RenderIssue::UnexpectedTag { tag, line });
        }
        Ok(Template { nodes })
    }

    /// Flags referenced by conditions, with the line they appear on.
    pub fn condition_flags(&self) -> Vec<(String, usize)> {
        let mut out = Vec::new();
        collect_condition_flags(&self.nodes, &mut out);
        out
    }

    /// Names substituted with `{{ }}`, with their line.
    pub fn substitutions(&self) -> Vec<(String, usize)> {
        let mut out = Vec::new();
        collect_substitutions(&self.nodes, &mut out);
        out
    }

    /// Render against a flag/variable environment.
    pub fn render(&self, ctx: &RenderContext<'_>) -> Result<String, RenderIssue> {
        let mut out = String::new();
        render_nodes(&self.nodes, ctx, &mut out)?;
        Ok(out)
    }
}

/// Parse and render in one step.
pub fn render_str(source: &str, ctx: &RenderContext<'_>) -> Result<String, RenderIssue> {
    Template::parse(source)?.render(ctx)
}

fn lex(source: &str) -> Result<Vec<Token>, RenderIssue> {
    let mut tokens = Vec::new();
    let mut rest = source;
    let mut line = 1;

    loop {
        let next_expr = rest.find("{{");
        let next_stmt = rest.find("{%");
        let (start, is_stmt) = match (next_expr, next_stmt) {
            (None, None) => break,
            (Some(e), None) => (e, false),
            (None, Some(s)) => (s, true),
            (Some(e), Some(s)) => {
                if s < e {
                    (s, true)
                } else {
                    (e, false)
                }
            }
        };

        let text = &rest[..start];
        if !text.is_empty() {
            tokens.push(Token::Text(text.to_string()));
        }
        line += text.matches('\n').count();

        let (open, close) = if is_stmt { ("{%", "%}") } else { ("{{", "}}") };
        let after_open = &rest[start + 2..];
        let end = after_open
            .find(close)
            .ok_or_else(|| RenderIssue::UnterminatedTag {
                open: open.to_string(),
                line,
            })?;
        let inner = &after_open[..end];
        if inner.contains('\n') {
            return Err(RenderIssue::UnterminatedTag {
                open: open.to_string(),
                line,
            });
        }
        let content = inner.trim().to_string();
        tokens.push(if is_stmt {
            Token::Stmt { content, line }
        } else {
            Token::Expr { content, line }
        });

        rest = &after_open[end + 2..];
    }

    if !rest.is_empty() {
        tokens.push(Token::Text(rest.to_string()));
    }
    Ok(tokens)
}

fn is_blank(s: &str) -> bool {
    s.chars().all(|c| c == ' ' || c == '\t' || c == '\r')
}

/// Drop the surrounding whitespace and newline of statement tags that sit on
/// a line of their own.
///
/// Standalone-ness is decided on the untouched token stream first, then all
/// trims are applied, so adjacent standalone tags sharing one text token
/// don't affect each other's decision.
fn trim_standalone_tags(tokens: &mut [Token]) {
    let count = tokens.len();
    // Per text token: (bytes to drop from the start, byte offset to truncate at)
    let mut trims: Vec<(Option<usize>, Option<usize>)> = vec![(None, None); count];

    for i in 0..count {
        if !matches!(tokens[i], Token::Stmt { .. }) {
            continue;
        }

        let before_ok = if i == 0 {
            true
        } else {
            match &tokens[i - 1] {
                Token::Text(text) => match text.rfind('\n') {
                    Some(pos) => is_blank(&text[pos + 1..]),
                    None => i == 1 && is_blank(text),
                },
                _ => false,
            }
        };

        let after_ok = if i + 1 == count {
            true
        } else {
            match &tokens[i + 1] {
                Token::Text(text) => match text.find('\n') {
                    Some(pos) => is_blank(&text[..pos]),
                    None => i + 2 == count && is_blank(text),
                },
                _ => false,
            }
        };

        if !(before_ok && after_ok) {
            continue;
        }

        if i > 0
            && let Token::Text(text) = &tokens[i - 1]
        {
            let cut = text.rfind('\n').map(|pos| pos + 1).unwrap_or(0);
            trims[i - 1].1 = Some(cut);
        }
        if i + 1 < count
            && let Token::Text(text) = &tokens[i + 1]
        {
            let skip = text.find('\n').map(|pos| pos + 1).unwrap_or(text.len());
            trims[i + 1].0 = Some(skip);
        }
    }

    for (token, (skip, cut)) in tokens.iter_mut().zip(trims) {
        if let Token::Text(text) = token {
            let start = skip.unwrap_or(0);
            let end = cut.unwrap_or(text.len()).max(start);
            *text = text[start..end].to_string();
        }
    }
}

/// Parse nodes until the input ends or a branch terminator
/// (`elif`, `else`, `endif`) appears, which is returned to the caller.
fn parse_nodes<I>(tokens: &mut I) -> Result<(Vec<Node>, Option<(String, usize)>), RenderIssue>
where
    I: Iterator<Item = Token>,
{
    let mut nodes = Vec::new();

    while let Some(token) = tokens.next() {
        match token {
            Token::Text(text) => {
                if !text.is_empty() {
                    nodes.push(Node::Text(text));
                }
            }
            Token::Expr { content, line } => {
                if !is_identifier(&content) {
                    return Err(RenderIssue::UnknownTag {
                        tag: format!("{{{{ {} }}}}", content),
                        line,
                    });
                }
                nodes.push(Node::Var {
                    name: content,
                    line,
                });
            }
            Token::Stmt { content, line } => {
                let (keyword, rest) = split_keyword(&content);
                match keyword {
                    "if" => nodes.push(parse_if(tokens, rest, line)?),
                    "else" | "endif" if !rest.is_empty() => {
                        return Err(RenderIssue::UnexpectedCondition { tag: content, line });
                    }
                    "elif" | "else" | "endif" => {
                        return Ok((nodes, Some((content, line))));
                    }
                    _ => {
                        return Err(RenderIssue::UnknownTag { tag: content, line });
                    }
                }
            }
        }
    }

    Ok((nodes, None))
}

fn parse_if<I>(tokens: &mut I, condition: &str, line: usize) -> Result<Node, RenderIssue>
where
    I: Iterator<Item = Token>,
{
    let mut branches = Vec::new();
    let mut otherwise = Vec::new();
    let mut current = (parse_condition(condition, line)?, line);

    loop {
        let (body, terminator) = parse_nodes(tokens)?;
        let Some((tag, tag_line)) = terminator else {
            return Err(RenderIssue::UnclosedBlock { line });
        };
        branches.push(Branch {
            condition: current.0.clone(),
            line: current.1,
            body,
        });

        let (keyword, rest) = split_keyword(&tag);
        match keyword {
            "elif" => {
                current = (parse_condition(rest, tag_line)?, tag_line);
            }
            "else" => {
                let (body, terminator) = parse_nodes(tokens)?;
                match terminator {
                    Some((end, _)) if split_keyword(&end).0 == "endif" => {
                        otherwise = body;
                        break;
                    }
                    Some((other, other_line)) => {
                        return Err(RenderIssue::UnexpectedTag {
                            tag: other,
                            line: other_line,
                        });
                    }
                    None => return Err(RenderIssue::UnclosedBlock { line }),
                }
            }
            _ => break,
        }
    }

    Ok(Node::If {
        branches,
        otherwise,
    })
}

fn parse_condition(expression: &str, line: usize) -> Result<Predicate, RenderIssue> {
    Predicate::parse(expression).map_err(|err| RenderIssue::MalformedCondition {
        expression: expression.to_string(),
        message: err.to_string(),
        line,
    })
}

fn split_keyword(content: &str) -> (&str, &str) {
    match content.find(char::is_whitespace) {
        Some(pos) => (&content[..pos], content[pos..].trim()),
        None => (content, ""),
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn collect_condition_flags(nodes: &[Node], out: &mut Vec<(String, usize)>) {
    for node in nodes {
        if let Node::If {
            branches,
            otherwise,
        } = node
        {
            for branch in branches {
                for name in branch.condition.flags() {
                    out.push((name.to_string(), branch.line));
                }
                collect_condition_flags(&branch.body, out);
            }
            collect_condition_flags(otherwise, out);
        }
    }
}

fn collect_substitutions(nodes: &[Node], out: &mut Vec<(String, usize)>) {
    for node in nodes {
        match node {
            Node::Text(_) => {}
            Node::Var { name, line } => out.push((name.clone(), *line)),
            Node::If {
                branches,
                otherwise,
            } => {
                for branch in branches {
                    collect_substitutions(&branch.body, out);
                }
                collect_substitutions(otherwise, out);
            }
        }
    }
}

fn render_nodes(nodes: &[Node], ctx: &RenderContext<'_>, out: &mut String) -> Result<(), RenderIssue> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Var { name, line } => {
                if let Some(value) = ctx.variables.get(name) {
                    out.push_str(value);
                } else if let Some(flag) = ctx.flags.get(name) {
                    out.push_str(if *flag { "true" } else { "false" });
                } else {
                    return Err(RenderIssue::UnresolvedVariable {
                        name: name.clone(),
                        line: *line,
                    });
                }
            }
            Node::If {
                branches,
                otherwise,
            } => {
                let mut taken = None;
                for branch in branches {
                    let holds = branch.condition.evaluate(ctx.flags).map_err(|unbound| {
                        RenderIssue::UnknownFlag {
                            name: unbound.0,
                            line: branch.line,
                        }
                    })?;
                    if holds {
                        taken = Some(&branch.body);
                        break;
                    }
                }
                render_nodes(taken.unwrap_or(otherwise), ctx, out)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(flags: &[(&str, bool)], vars: &[(&str, &str)]) -> (Flags, Variables) {
        (
            flags.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn render(source: &str, flags: &[(&str, bool)], vars: &[(&str, &str)]) -> String {
        let (flags, variables) = env(flags, vars);
        let ctx = RenderContext {
            flags: &flags,
            variables: &variables,
        };
        render_str(source, &ctx).unwrap()
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(render("hello\nworld\n", &[], &[]), "hello\nworld\n");
    }

    #[test]
    fn test_variable_substitution() {
        assert_eq!(
            render("name = \"{{ project_name }}\"\n", &[], &[("project_name", "shop")]),
            "name = \"shop\"\n"
        );
    }

    #[test]
    fn test_flag_substitution_renders_bool() {
        assert_eq!(render("S3={{use_s3}}", &[("use_s3", true)], &[]), "S3=true");
    }

    #[test]
    fn test_standalone_if_lines_are_removed() {
        let source = "a\n{% if use_s3 %}\ns3\n{% endif %}\nb\n";
        assert_eq!(render(source, &[("use_s3", true)], &[]), "a\ns3\nb\n");
        assert_eq!(render(source, &[("use_s3", false)], &[]), "a\nb\n");
    }

    #[test]
    fn test_indented_standalone_tags_are_removed() {
        let source = "def f():\n    {% if use_db %}\n    db()\n    {% endif %}\n    pass\n";
        assert_eq!(
            render(source, &[("use_db", true)], &[]),
            "def f():\n    db()\n    pass\n"
        );
    }

    #[test]
    fn test_inline_if_keeps_surrounding_text() {
        let source = "x = {% if use_s3 %}1{% else %}0{% endif %}\n";
        assert_eq!(render(source, &[("use_s3", true)], &[]), "x = 1\n");
        assert_eq!(render(source, &[("use_s3", false)], &[]), "x = 0\n");
    }

    #[test]
    fn test_elif_chain() {
        let source = "{% if a %}\nA\n{% elif b %}\nB\n{% else %}\nC\n{% endif %}\n";
        assert_eq!(render(source, &[("a", false), ("b", true)], &[]), "B\n");
        assert_eq!(render(source, &[("a", true), ("b", true)], &[]), "A\n");
        assert_eq!(render(source, &[("a", false), ("b", false)], &[]), "C\n");
    }

    #[test]
    fn test_nested_blocks() {
        let source = "{% if a %}\n{% if b %}\nAB\n{% endif %}\nA\n{% endif %}\nend\n";
        assert_eq!(render(source, &[("a", true), ("b", true)], &[]), "AB\nA\nend\n");
        assert_eq!(render(source, &[("a", true), ("b", false)], &[]), "A\nend\n");
        assert_eq!(render(source, &[("a", false), ("b", true)], &[]), "end\n");
    }

    #[test]
    fn test_adjacent_standalone_tags() {
        let source = "{% if a %}\n{% endif %}\nx\n";
        assert_eq!(render(source, &[("a", true)], &[]), "x\n");
    }

    #[test]
    fn test_unresolved_variable_names_variable_and_line() {
        let (flags, variables) = env(&[], &[]);
        let ctx = RenderContext {
            flags: &flags,
            variables: &variables,
        };
        let err = render_str("ok\n{{ missing }}\n", &ctx).unwrap_err();
        assert_eq!(
            err,
            RenderIssue::UnresolvedVariable {
                name: "missing".into(),
                line: 2
            }
        );
    }

    #[test]
    fn test_unclosed_if_is_rejected() {
        let err = Template::parse("{% if a %}\nx\n").unwrap_err();
        assert_eq!(err, RenderIssue::UnclosedBlock { line: 1 });
    }

    #[test]
    fn test_stray_endif_is_rejected() {
        let err = Template::parse("x\n{% endif %}\n").unwrap_err();
        assert!(matches!(err, RenderIssue::UnexpectedTag { line: 2, .. }));
    }

    #[test]
    fn test_elif_after_else_is_rejected() {
        let err = Template::parse("{% if a %}\n{% else %}\n{% elif b %}\n{% endif %}\n").unwrap_err();
        assert!(matches!(err, RenderIssue::UnexpectedTag { line: 3, .. }));
    }

    #[test]
    fn test_else_with_condition_is_rejected() {
        let err = Template::parse("{% if a %}\nA\n{% else b %}\nB\n{% endif %}\n").unwrap_err();
        assert_eq!(
            err,
            RenderIssue::UnexpectedCondition {
                tag: "else b".into(),
                line: 3
            }
        );
        let err = Template::parse("{% if a %}\nA\n{% else if b %}\nB\n{% endif %}\n").unwrap_err();
        assert!(matches!(err, RenderIssue::UnexpectedCondition { line: 3, .. }));
    }

    #[test]
    fn test_endif_with_trailing_text_is_rejected() {
        let err = Template::parse("{% if a %}\nA\n{% endif trailing %}\n").unwrap_err();
        assert_eq!(
            err,
            RenderIssue::UnexpectedCondition {
                tag: "endif trailing".into(),
                line: 3
            }
        );
    }

    #[test]
    fn test_unterminated_tag_is_rejected() {
        let err = Template::parse("x {{ name\n").unwrap_err();
        assert!(matches!(err, RenderIssue::UnterminatedTag { line: 1, .. }));
    }

    #[test]
    fn test_unknown_statement_is_rejected() {
        let err = Template::parse("{% for x in y %}\n").unwrap_err();
        assert!(matches!(err, RenderIssue::UnknownTag { .. }));
    }

    #[test]
    fn test_malformed_condition_is_rejected() {
        let err = Template::parse("\n\n{% if a and %}\nx\n{% endif %}\n").unwrap_err();
        assert!(matches!(err, RenderIssue::MalformedCondition { line: 3, .. }));
    }

    #[test]
    fn test_condition_flags_are_collected_with_lines() {
        let template =
            Template::parse("{% if a %}\n{% if b or c %}\nx\n{% endif %}\n{% endif %}\n").unwrap();
        let names: Vec<(String, usize)> = template.condition_flags();
        assert_eq!(
            names,
            vec![("a".into(), 1), ("b".into(), 2), ("c".into(), 2)]
        );
    }

    #[test]
    fn test_same_flags_render_same_text() {
        let source = "{% if a %}\nyes\n{% else %}\nno\n{% endif %}\n";
        let first = render(source, &[("a", true)], &[]);
        let second = render(source, &[("a", true)], &[]);
        assert_eq!(first, second);
    }
}
