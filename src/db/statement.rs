//! Statement counting for model-written SQL.
//!
//! MySQL's text protocol accepts `;`-separated batches, so a reply such as
//! `SELECT ...; DELETE FROM orders` would run both halves. Everything the
//! pipeline executes goes through [`single_statement`] first.

use crate::db::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Counts the statements in `sql`, skipping `;` inside string literals,
/// quoted identifiers and comments. A lone trailing `;` is fine.
pub fn count_statements(sql: &str) -> usize {
    let mut state = Scan::Code;
    let mut chars = sql.chars().peekable();
    let mut count = 0;
    let mut pending = false;

    while let Some(c) = chars.next() {
        match state {
            Scan::Code => match c {
                '\'' | '"' | '`' => {
                    state = Scan::Quoted(c);
                    pending = true;
                }
                '#' => state = Scan::LineComment,
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = Scan::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = Scan::BlockComment;
                }
                ';' => {
                    if pending {
                        count += 1;
                        pending = false;
                    }
                }
                c if c.is_whitespace() => {}
                _ => pending = true,
            },
            Scan::Quoted(quote) => {
                if c == '\\' && quote != '`' {
                    chars.next();
                } else if c == quote {
                    // Doubled quote is an escaped quote
                    if chars.peek() == Some(&quote) {
                        chars.next();
                    } else {
                        state = Scan::Code;
                    }
                }
            }
            Scan::LineComment => {
                if c == '\n' {
                    state = Scan::Code;
                }
            }
            Scan::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = Scan::Code;
                }
            }
        }
    }

    if pending {
        count += 1;
    }
    count
}

/// Returns the trimmed statement when `sql` holds exactly one.
pub fn single_statement(sql: &str) -> Result<&str, DbError> {
    match count_statements(sql) {
        1 => Ok(sql.trim()),
        0 => Err(DbError::Execution("Query is empty".to_string())),
        n => Err(DbError::Execution(format!(
            "Only one SQL statement can be executed per request, found {}",
            n
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_semicolon_is_one_statement() {
        assert_eq!(count_statements("SELECT COUNT(*) FROM orders;"), 1);
        assert_eq!(count_statements("SELECT 1 ;  \n"), 1);
        assert_eq!(count_statements("SELECT 1; -- done"), 1);
    }

    #[test]
    fn batch_counts_every_statement() {
        assert_eq!(count_statements("SELECT * FROM orders; DELETE FROM orders;"), 2);
        assert_eq!(count_statements("SELECT 1;SELECT 2;SELECT 3"), 3);
    }

    #[test]
    fn semicolons_in_literals_and_comments_are_ignored() {
        assert_eq!(
            count_statements("SELECT * FROM notes WHERE body = 'a; b' AND tag = \"x;y\""),
            1
        );
        assert_eq!(count_statements("SELECT 'it''s; fine', `odd;name` FROM t"), 1);
        assert_eq!(count_statements("SELECT 'back\\'slash;' FROM t"), 1);
        assert_eq!(count_statements("SELECT 1 /* ; */ # ;\n"), 1);
    }

    #[test]
    fn empty_input_has_no_statements() {
        assert_eq!(count_statements(""), 0);
        assert_eq!(count_statements(" ; ;"), 0);
        assert_eq!(count_statements("-- nothing here"), 0);
    }

    #[test]
    fn single_statement_rejects_batches() {
        assert_eq!(single_statement("  SELECT 1;\n").ok(), Some("SELECT 1;"));

        match single_statement("SELECT 1; DELETE FROM orders;") {
            Err(DbError::Execution(msg)) => assert!(msg.contains("found 2"), "{}", msg),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
