//! Lexical checks applied to model-generated SQL before it reaches the warehouse.

use crate::config::WriteMode;

/// Splits `sql` into statements, dropping comments.
///
/// Quoted strings and identifiers (`'`, `"`, `` ` ``) are kept intact, so
/// semicolons or comment markers inside them do not split anything.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            '-' if chars.peek() == Some(&'-') => skip_line(&mut chars, &mut current),
            '#' => skip_line(&mut chars, &mut current),
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                current.push(' ');
            }
            ';' => {
                push_statement(&mut statements, &mut current);
            }
            _ => current.push(c),
        }
    }
    push_statement(&mut statements, &mut current);
    statements
}

fn skip_line(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, current: &mut String) {
    for c in chars.by_ref() {
        if c == '\n' {
            break;
        }
    }
    current.push('\n');
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
    current.clear();
}

/// Returns the first keyword of a statement, uppercased.
fn leading_keyword(statement: &str) -> String {
    statement
        .trim_start_matches(|c: char| c == '(' || c.is_whitespace())
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
}

/// Checks `sql` against the configured write mode.
///
/// With `Blocked`, exactly one statement is allowed and it must start with
/// `SELECT` or `WITH`. With `Allowed`, only empty input is rejected.
pub fn check_write_mode(mode: WriteMode, sql: &str) -> Result<(), String> {
    let statements = split_statements(sql);
    if statements.is_empty() {
        return Err("The query is empty.".to_string());
    }
    if mode == WriteMode::Allowed {
        return Ok(());
    }
    if statements.len() > 1 {
        return Err(format!(
            "Write mode is BLOCKED: expected a single statement, found {}.",
            statements.len()
        ));
    }
    match leading_keyword(&statements[0]).as_str() {
        "SELECT" | "WITH" => Ok(()),
        other => Err(format!(
            "Write mode is BLOCKED: only read-only SELECT queries are allowed, got '{other}'."
        )),
    }
}

/// Checks a model-supplied project or dataset id before it is used.
///
/// Project ids may carry a domain prefix (`example.com:my-project`); dataset
/// ids are letters, digits and underscores only.
pub fn check_identifier(kind: IdentifierKind, value: &str) -> Result<(), String> {
    let valid = !value.is_empty()
        && value.len() <= 1024
        && match kind {
            IdentifierKind::Project => value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')),
            IdentifierKind::Dataset => value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_'),
        };
    if valid {
        Ok(())
    } else {
        Err(format!("'{value}' is not a valid {} id.", kind.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Project,
    Dataset,
}

impl IdentifierKind {
    fn as_str(self) -> &'static str {
        match self {
            IdentifierKind::Project => "project",
            IdentifierKind::Dataset => "dataset",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_accepts_select_and_with() {
        assert!(check_write_mode(WriteMode::Blocked, "SELECT 1").is_ok());
        assert!(check_write_mode(WriteMode::Blocked, "  with t AS (SELECT 1) SELECT * FROM t;").is_ok());
        assert!(check_write_mode(WriteMode::Blocked, "(SELECT 1) UNION ALL (SELECT 2)").is_ok());
    }

    #[test]
    fn blocked_ignores_leading_comments() {
        let sql = "-- count rows\n/* block\ncomment */ # another\nSELECT COUNT(*) FROM t";
        assert!(check_write_mode(WriteMode::Blocked, sql).is_ok());
    }

    #[test]
    fn blocked_rejects_mutations() {
        for sql in [
            "DELETE FROM t WHERE true",
            "INSERT INTO t VALUES (1)",
            "DROP TABLE t",
            "UPDATE t SET a = 1 WHERE true",
            "MERGE t USING s ON false WHEN NOT MATCHED THEN INSERT ROW",
        ] {
            assert!(check_write_mode(WriteMode::Blocked, sql).is_err(), "{sql}");
        }
    }

    #[test]
    fn blocked_rejects_multiple_statements() {
        let err = check_write_mode(WriteMode::Blocked, "SELECT 1; DROP TABLE t").unwrap_err();
        assert!(err.contains("single statement"));
    }

    #[test]
    fn semicolons_inside_strings_do_not_split() {
        let statements = split_statements("SELECT 'a;b' AS x, \"--\" AS y; ");
        assert_eq!(statements, vec!["SELECT 'a;b' AS x, \"--\" AS y"]);
    }

    #[test]
    fn allowed_passes_mutations_but_not_empty_input() {
        assert!(check_write_mode(WriteMode::Allowed, "DELETE FROM t WHERE true").is_ok());
        assert!(check_write_mode(WriteMode::Allowed, "  -- nothing\n ").is_err());
    }

    #[test]
    fn identifiers_reject_quoting_and_statements() {
        assert!(check_identifier(IdentifierKind::Project, "my-project-123").is_ok());
        assert!(check_identifier(IdentifierKind::Project, "example.com:my-project").is_ok());
        assert!(check_identifier(IdentifierKind::Dataset, "census_2024").is_ok());

        assert!(check_identifier(IdentifierKind::Dataset, "").is_err());
        assert!(check_identifier(IdentifierKind::Dataset, "my-dataset").is_err());
        assert!(check_identifier(
            IdentifierKind::Dataset,
            "x`.INFORMATION_SCHEMA.TABLES; DROP TABLE `p.d.t"
        )
        .is_err());
        assert!(check_identifier(IdentifierKind::Project, "p`; DROP TABLE t; --").is_err());
    }
}
