//! Statement splitter
//!
//! Splits a DDL script into individual statements. The scanner walks the
//! script character by character and only treats a `;` as a terminator when it
//! is at the top level: outside single-quoted strings (`''` escaping),
//! double-quoted identifiers (`""` escaping), line and block comments, and
//! `$tag$ ... $tag$` dollar-quoted bodies. Splitting inside any of those
//! corrupts every downstream stage, so this file is deliberately paranoid.
//!
//! Comment text is replaced with a single space; string and dollar-quoted
//! bodies are preserved verbatim.

/// Split a script into trimmed, non-empty statements in source order
pub fn split_statements(script: &str) -> Vec<String> {
    let chars: Vec<char> = script.chars().collect();
    let n = chars.len();
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < n {
        let c = chars[i];
        match c {
            '\'' => i = copy_quoted(&chars, i, '\'', &mut current),
            '"' => i = copy_quoted(&chars, i, '"', &mut current),
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < n && chars[i] != '\n' {
                    i += 1;
                }
                current.push(' ');
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < n && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i = (i + 2).min(n);
                current.push(' ');
            }
            '$' => {
                if let Some(tag_end) = dollar_tag_end(&chars, i) {
                    i = copy_dollar_quoted(&chars, i, tag_end, &mut current);
                } else {
                    current.push(c);
                    i += 1;
                }
            }
            ';' => {
                push_statement(&mut statements, &mut current);
                i += 1;
            }
            _ => {
                current.push(c);
                i += 1;
            }
        }
    }

    push_statement(&mut statements, &mut current);
    statements
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
    current.clear();
}

/// Copy a quoted region starting at `start` (which holds the quote char),
/// honoring doubled-quote escapes. Returns the index after the closing quote.
fn copy_quoted(chars: &[char], start: usize, quote: char, out: &mut String) -> usize {
    let n = chars.len();
    out.push(quote);
    let mut i = start + 1;
    while i < n {
        out.push(chars[i]);
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                out.push(quote);
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    // Unterminated quote: consume to end of input rather than mis-splitting
    n
}

/// If `chars[start]` opens a dollar-quote tag (`$`, `$body$`, ...), return the
/// index of the closing `$` of the opening tag. Non-empty tags must start
/// with a letter or underscore; `$1$` is a positional parameter next to a
/// dollar sign, not a quote.
fn dollar_tag_end(chars: &[char], start: usize) -> Option<usize> {
    debug_assert_eq!(chars.get(start), Some(&'$'));
    let mut j = start + 1;
    while j < chars.len() {
        let c = chars[j];
        if c == '$' {
            return Some(j);
        }
        let valid = if j == start + 1 {
            c.is_ascii_alphabetic() || c == '_'
        } else {
            c.is_ascii_alphanumeric() || c == '_'
        };
        if !valid {
            return None;
        }
        j += 1;
    }
    None
}

/// Copy a dollar-quoted body verbatim, including both tags. Returns the index
/// after the closing tag (or end of input when unterminated).
fn copy_dollar_quoted(chars: &[char], start: usize, tag_end: usize, out: &mut String) -> usize {
    let n = chars.len();
    let tag: String = chars[start..=tag_end].iter().collect();
    let tag_chars: Vec<char> = tag.chars().collect();
    let tag_len = tag_chars.len();

    out.push_str(&tag);
    let mut i = tag_end + 1;
    while i < n {
        if chars[i] == '$' && i + tag_len <= n && chars[i..i + tag_len] == tag_chars[..] {
            out.push_str(&tag);
            return i + tag_len;
        }
        out.push(chars[i]);
        i += 1;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_basic_split() {
        let stmts = split_statements("CREATE TABLE a (id int); DROP TABLE b;");
        assert_eq!(stmts, vec!["CREATE TABLE a (id int)", "DROP TABLE b"]);
    }

    #[test]
    fn test_semicolon_inside_string_literal() {
        let stmts = split_statements("INSERT INTO t VALUES ('a;b'); SELECT 1;");
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "INSERT INTO t VALUES ('a;b')");
    }

    #[test]
    fn test_escaped_quote_in_string() {
        let stmts = split_statements("SELECT 'it''s; fine'; SELECT 2;");
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "SELECT 'it''s; fine'");
    }

    #[test]
    fn test_semicolon_in_quoted_identifier() {
        let stmts = split_statements("ALTER TABLE \"weird;name\" ADD COLUMN x int;");
        assert_eq!(stmts, vec!["ALTER TABLE \"weird;name\" ADD COLUMN x int"]);
    }

    #[test]
    fn test_line_comment_is_ignored() {
        let stmts = split_statements("SELECT 1; -- trailing; comment\nSELECT 2;");
        assert_eq!(stmts, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn test_block_comment_is_ignored() {
        let stmts = split_statements("SELECT /* a;b */ 1; SELECT 2;");
        assert_eq!(stmts, vec!["SELECT  1", "SELECT 2"]);
    }

    #[test]
    fn test_comment_only_script_yields_nothing() {
        assert!(split_statements("-- nothing here\n/* or; here */").is_empty());
        assert!(split_statements("   \n\t ").is_empty());
    }

    #[test]
    fn test_dollar_quoted_body_is_not_split() {
        let script =
            "CREATE FUNCTION f() RETURNS void AS $fn$ BEGIN SELECT 1; END; $fn$ LANGUAGE plpgsql; SELECT 3;";
        let stmts = split_statements(script);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("BEGIN SELECT 1; END;"));
        assert_eq!(stmts[1], "SELECT 3");
    }

    #[test]
    fn test_anonymous_dollar_quote() {
        let stmts = split_statements("DO $$ BEGIN NULL; END $$; SELECT 1;");
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("BEGIN NULL; END"));
    }

    #[test]
    fn test_dollar_sign_that_is_not_a_quote() {
        let stmts = split_statements("SELECT a$b FROM t; SELECT 2;");
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn test_digit_leading_tag_is_not_a_quote() {
        let stmts = split_statements("SELECT $1$note FROM t; SELECT 2;");
        assert_eq!(stmts, vec!["SELECT $1$note FROM t", "SELECT 2"]);

        // Underscore-leading tags still open a quoted body
        let stmts = split_statements("DO $_x$ BEGIN NULL; END $_x$; SELECT 1;");
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn test_trailing_statement_without_semicolon() {
        let stmts = split_statements("SELECT 1; SELECT 2");
        assert_eq!(stmts, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn test_unterminated_string_consumes_rest() {
        let stmts = split_statements("SELECT 'oops; SELECT 2;");
        assert_eq!(stmts.len(), 1);
    }
}
