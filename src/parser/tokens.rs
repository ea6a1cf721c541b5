//! Lexical primitives for statement parsing
//!
//! Small index-returning readers over character slices, plus a `Cursor`
//! convenience wrapper used by the statement parser. Unquoted identifiers are
//! case-folded to lowercase at read time; quoted identifiers strip the quotes
//! and preserve case. Paren-block and top-level splitting respect the same
//! quoting rules as the statement splitter.

use serde::{Deserialize, Serialize};

/// A possibly schema-qualified name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifiedName {
    pub schema: Option<String>,
    pub name: String,
}

impl QualifiedName {
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    /// Resolve to (schema, name), falling back to the default schema
    pub fn qualify(&self, default_schema: &str) -> (String, String) {
        (
            self.schema
                .clone()
                .unwrap_or_else(|| default_schema.to_string()),
            self.name.clone(),
        )
    }
}

impl std::fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Advance past ASCII whitespace
pub fn skip_ws(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

/// Read one identifier at `i`: `name` (lowercased) or `"Quoted Name"`
/// (case preserved, `""` unescaped). Returns (identifier, next index).
pub fn read_identifier(chars: &[char], i: usize) -> Option<(String, usize)> {
    let i = skip_ws(chars, i);
    let n = chars.len();
    if i >= n {
        return None;
    }

    if chars[i] == '"' {
        let mut out = String::new();
        let mut j = i + 1;
        while j < n {
            if chars[j] == '"' {
                if chars.get(j + 1) == Some(&'"') {
                    out.push('"');
                    j += 2;
                    continue;
                }
                return Some((out, j + 1));
            }
            out.push(chars[j]);
            j += 1;
        }
        return None; // unterminated
    }

    if !(chars[i].is_ascii_alphabetic() || chars[i] == '_') {
        return None;
    }
    let mut j = i;
    let mut out = String::new();
    while j < n && (chars[j].is_ascii_alphanumeric() || chars[j] == '_' || chars[j] == '$') {
        out.push(chars[j].to_ascii_lowercase());
        j += 1;
    }
    Some((out, j))
}

/// Read `name` or `schema.name` at `i`. Returns (qualified name, next index).
pub fn read_qualified_name(chars: &[char], i: usize) -> Option<(QualifiedName, usize)> {
    let (first, next) = read_identifier(chars, i)?;
    let after_ws = skip_ws(chars, next);
    if chars.get(after_ws) == Some(&'.') {
        if let Some((second, j)) = read_identifier(chars, after_ws + 1) {
            return Some((
                QualifiedName {
                    schema: Some(first),
                    name: second,
                },
                j,
            ));
        }
    }
    Some((QualifiedName { schema: None, name: first }, next))
}

/// Given the index of an opening `(`, return the content between the matching
/// parens (nesting- and quote-aware) and the index after the closing `)`.
pub fn read_paren_block(chars: &[char], open: usize) -> Option<(String, usize)> {
    let open = skip_ws(chars, open);
    if chars.get(open) != Some(&'(') {
        return None;
    }
    let n = chars.len();
    let mut depth = 1usize;
    let mut out = String::new();
    let mut i = open + 1;
    while i < n {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                let quote = c;
                out.push(c);
                i += 1;
                while i < n {
                    out.push(chars[i]);
                    if chars[i] == quote {
                        if chars.get(i + 1) == Some(&quote) {
                            out.push(quote);
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    i += 1;
                }
            }
            '(' => {
                depth += 1;
                out.push(c);
                i += 1;
            }
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((out, i + 1));
                }
                out.push(c);
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    None // unbalanced
}

/// Split a string at a delimiter, but only at paren depth 0 and outside
/// quoted regions. Parts are trimmed; empty parts are dropped.
pub fn split_top_level(input: &str, delim: char) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let n = chars.len();
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut i = 0;

    while i < n {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                let quote = c;
                current.push(c);
                i += 1;
                while i < n {
                    current.push(chars[i]);
                    if chars[i] == quote {
                        if chars.get(i + 1) == Some(&quote) {
                            current.push(quote);
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    i += 1;
                }
            }
            '(' => {
                depth += 1;
                current.push(c);
                i += 1;
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
                i += 1;
            }
            _ if c == delim && depth == 0 => {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed.to_string());
                }
                current.clear();
                i += 1;
            }
            _ => {
                current.push(c);
                i += 1;
            }
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        parts.push(trimmed.to_string());
    }
    parts
}

/// Cursor over a statement's characters, built on the index-based readers
#[derive(Debug, Clone)]
pub struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    pub fn skip_ws(&mut self) {
        self.pos = skip_ws(&self.chars, self.pos);
    }

    pub fn eof(&mut self) -> bool {
        self.skip_ws();
        self.pos >= self.chars.len()
    }

    pub fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.get(self.pos).copied()
    }

    /// Consume a single punctuation character if present
    pub fn eat_char(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume one bare keyword (case-insensitive, word-bounded)
    pub fn eat_keyword(&mut self, keyword: &str) -> bool {
        self.skip_ws();
        let kw: Vec<char> = keyword.chars().collect();
        let end = self.pos + kw.len();
        if end > self.chars.len() {
            return false;
        }
        for (offset, expected) in kw.iter().enumerate() {
            if !self.chars[self.pos + offset].eq_ignore_ascii_case(expected) {
                return false;
            }
        }
        // Word boundary: the keyword must not continue into an identifier
        if let Some(next) = self.chars.get(end) {
            if next.is_ascii_alphanumeric() || *next == '_' {
                return false;
            }
        }
        self.pos = end;
        true
    }

    /// Consume a sequence of keywords, all or nothing
    pub fn eat_keywords(&mut self, keywords: &[&str]) -> bool {
        let saved = self.pos;
        for kw in keywords {
            if !self.eat_keyword(kw) {
                self.pos = saved;
                return false;
            }
        }
        true
    }

    /// Check for a keyword without consuming it
    pub fn peek_keyword(&mut self, keyword: &str) -> bool {
        let saved = self.pos;
        let found = self.eat_keyword(keyword);
        self.pos = saved;
        found
    }

    pub fn read_identifier(&mut self) -> Option<String> {
        let (ident, next) = read_identifier(&self.chars, self.pos)?;
        self.pos = next;
        Some(ident)
    }

    pub fn read_qualified_name(&mut self) -> Option<QualifiedName> {
        let (name, next) = read_qualified_name(&self.chars, self.pos)?;
        self.pos = next;
        Some(name)
    }

    pub fn read_paren_block(&mut self) -> Option<String> {
        let (content, next) = read_paren_block(&self.chars, self.pos)?;
        self.pos = next;
        Some(content)
    }

    /// Everything left, trimmed
    pub fn rest(&mut self) -> String {
        self.skip_ws();
        self.chars[self.pos..].iter().collect::<String>().trim().to_string()
    }

    /// Read raw text until one of the stop keywords appears at paren depth 0
    /// outside quotes, or until end of input. Stops are word-bounded.
    pub fn read_until_keywords(&mut self, stops: &[&str]) -> String {
        self.skip_ws();
        let n = self.chars.len();
        let mut out = String::new();
        let mut depth = 0usize;

        while self.pos < n {
            if depth == 0 {
                let mut stopped = false;
                for stop in stops {
                    if self.at_word(stop) {
                        stopped = true;
                        break;
                    }
                }
                if stopped {
                    break;
                }
            }
            let c = self.chars[self.pos];
            match c {
                '\'' | '"' => {
                    let quote = c;
                    out.push(c);
                    self.pos += 1;
                    while self.pos < n {
                        out.push(self.chars[self.pos]);
                        if self.chars[self.pos] == quote {
                            if self.chars.get(self.pos + 1) == Some(&quote) {
                                out.push(quote);
                                self.pos += 2;
                                continue;
                            }
                            self.pos += 1;
                            break;
                        }
                        self.pos += 1;
                    }
                }
                '(' => {
                    depth += 1;
                    out.push(c);
                    self.pos += 1;
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    out.push(c);
                    self.pos += 1;
                }
                _ => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
        out.trim().to_string()
    }

    /// Is the word-bounded keyword present at the current position?
    fn at_word(&self, word: &str) -> bool {
        let kw: Vec<char> = word.chars().collect();
        let end = self.pos + kw.len();
        if end > self.chars.len() {
            return false;
        }
        for (offset, expected) in kw.iter().enumerate() {
            if !self.chars[self.pos + offset].eq_ignore_ascii_case(expected) {
                return false;
            }
        }
        // Must sit on a word boundary on both sides
        if self.pos > 0 {
            let prev = self.chars[self.pos - 1];
            if prev.is_ascii_alphanumeric() || prev == '_' {
                return false;
            }
        }
        if let Some(next) = self.chars.get(end) {
            if next.is_ascii_alphanumeric() || *next == '_' {
                return false;
            }
        }
        true
    }
}
