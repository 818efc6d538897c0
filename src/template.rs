use std::collections::HashMap;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::context::{value_to_display, Context};
use crate::errors::{ComposeError, Result};

/// Per-field custom regex fragments for matcher derivation. Fields without
/// an entry fall back to a non-greedy wildcard.
pub type FieldSpec = HashMap<String, String>;

const DEFAULT_FRAGMENT: &str = ".*?";

/// A message template. The same `{name}`-placeholder source is used both to
/// render text from a context and to recognise text it could have produced:
/// compilation derives a regex whose capture groups line up with `fields`.
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    pieces: Vec<Piece>,
    matcher: Regex,
    fields: Vec<String>,
}

#[derive(Debug, Clone)]
enum Piece {
    Literal(String),
    Field(String),
}

impl Template {
    /// Parse `source` and eagerly build the matching regex, so malformed
    /// templates are rejected before a cycle starts.
    pub fn compile(source: &str, overrides: &FieldSpec) -> Result<Self> {
        let pieces = scan_pieces(source)
            .map_err(|reason| ComposeError::AmbiguousTemplate {
                template: source.to_string(),
                reason,
            })?;

        let mut fields = Vec::new();
        let mut regexp = String::from("^");
        for piece in &pieces {
            match piece {
                Piece::Literal(lit) => regexp.push_str(&regex::escape(lit)),
                Piece::Field(name) => {
                    let fragment = overrides
                        .get(name)
                        .map(String::as_str)
                        .unwrap_or(DEFAULT_FRAGMENT);
                    regexp.push('(');
                    regexp.push_str(fragment);
                    regexp.push(')');
                    // One entry per occurrence; duplicates render the same
                    // literal value anyway.
                    fields.push(name.clone());
                }
            }
        }
        regexp.push('$');

        let matcher = Regex::new(&regexp).map_err(|e| ComposeError::AmbiguousTemplate {
            template: source.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            source: source.to_string(),
            pieces,
            matcher,
            fields,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Field names in order of appearance, aligned with the matcher's
    /// capture groups.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Substitute every placeholder from `ctx`. A name absent from the
    /// context is a hard error for this render attempt.
    pub fn render(&self, ctx: &Context) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        for piece in &self.pieces {
            match piece {
                Piece::Literal(lit) => out.push_str(lit),
                Piece::Field(name) => {
                    let value = ctx
                        .get(name)
                        .ok_or_else(|| ComposeError::MissingField(name.clone()))?;
                    out.push_str(&value_to_display(value));
                }
            }
        }
        Ok(out)
    }

    /// Render a single field against a raw record, as retraction does when
    /// comparing captured text to pool entries.
    pub fn render_field(name: &str, record: &Value) -> Option<String> {
        record.get(name).map(value_to_display)
    }

    /// Run the compiled matcher against `text`.
    pub fn matches<'t>(&self, text: &'t str) -> Option<Captures<'t>> {
        self.matcher.captures(text)
    }
}

/// Split a template into literal runs and `{identifier}` placeholders.
fn scan_pieces(source: &str) -> std::result::Result<Vec<Piece>, String> {
    let mut scanner = Scanner::new(source);
    let mut pieces = Vec::new();
    let mut literal = String::new();

    while let Some(c) = scanner.peek_char() {
        if c == '{' {
            scanner.consume_char('{');
            let name = scanner.parse_identifier()?;
            if !scanner.consume_char('}') {
                return Err(format!("unterminated placeholder `{{{name}`"));
            }
            if !literal.is_empty() {
                pieces.push(Piece::Literal(std::mem::take(&mut literal)));
            }
            pieces.push(Piece::Field(name));
        } else if c == '}' {
            return Err("stray `}` outside placeholder".into());
        } else {
            literal.push(c);
            scanner.advance(c);
        }
    }
    if !literal.is_empty() {
        pieces.push(Piece::Literal(literal));
    }
    Ok(pieces)
}

struct Scanner<'a> {
    s: &'a str,
    i: usize,
}

impl<'a> Scanner<'a> {
    fn new(s: &'a str) -> Self {
        Self { s, i: 0 }
    }

    fn parse_identifier(&mut self) -> std::result::Result<String, String> {
        let start = self.i;
        while let Some(c) = self.peek_char() {
            if c == '_' || c.is_ascii_alphanumeric() {
                self.i += 1;
            } else {
                break;
            }
        }
        if self.i == start {
            return Err("empty placeholder name".into());
        }
        Ok(self.s[start..self.i].to_string())
    }

    fn consume_char(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.i += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn advance(&mut self, c: char) {
        self.i += c.len_utf8();
    }

    fn peek_char(&self) -> Option<char> {
        self.s[self.i..].chars().next()
    }
}
