//! Parser for the placeholder syntax.
//!
//! ```text
//! interface {{ interface }}
//!  description {{ description }}
//!  switchport access vlan {{ vlan }}
//! literal braces: {{ "{{" }}
//! ```
//!
//! Everything outside `{{ ... }}` is copied verbatim. A placeholder holds either
//! a variable name or a double-quoted string literal.

use crate::error::{RenderError, Result};

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Verbatim text
    Text(String),
    /// A variable reference
    Variable {
        /// Variable name
        name: String,
        /// Line of the opening braces (1-indexed)
        line: usize,
        /// Column of the opening braces (1-indexed)
        column: usize,
    },
    /// A quoted string literal, emitted as-is
    Literal(String),
}

/// Character cursor that tracks line and column.
struct Cursor<'a> {
    source: &'a str,
    offset: usize,
    line: usize,
    column: usize,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.offset..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn position(&self) -> (usize, usize) {
        (self.line, self.column)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Advance over an ASCII token already checked with `starts_with`.
    fn skip(&mut self, token: &str) {
        for _ in token.chars() {
            self.bump();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }
}

/// Parse template source into segments.
pub fn parse(source: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut cursor = Cursor::new(source);

    while let Some(c) = cursor.peek() {
        if cursor.rest().starts_with("{{") {
            if !text.is_empty() {
                segments.push(Segment::Text(std::mem::take(&mut text)));
            }
            segments.push(parse_placeholder(&mut cursor)?);
        } else {
            text.push(c);
            cursor.bump();
        }
    }

    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }

    Ok(segments)
}

/// Parse one `{{ ... }}` block. The cursor sits on the opening braces.
fn parse_placeholder(cursor: &mut Cursor<'_>) -> Result<Segment> {
    let (line, column) = cursor.position();
    cursor.skip("{{");
    cursor.skip_whitespace();

    let segment = match cursor.peek() {
        None => return Err(RenderError::syntax(line, column, "unclosed placeholder")),
        Some('"') => Segment::Literal(parse_literal(cursor, line, column)?),
        Some(_) if cursor.rest().starts_with("}}") => {
            return Err(RenderError::syntax(line, column, "empty placeholder"));
        }
        Some(_) => {
            let (name_line, name_column) = cursor.position();
            let mut name = String::new();
            while let Some(c) = cursor.peek() {
                if c.is_whitespace() || cursor.rest().starts_with("}}") {
                    break;
                }
                name.push(c);
                cursor.bump();
            }
            validate_name(&name, name_line, name_column)?;
            Segment::Variable { name, line, column }
        }
    };

    cursor.skip_whitespace();
    if cursor.rest().starts_with("}}") {
        cursor.skip("}}");
        return Ok(segment);
    }

    if cursor.peek().is_none() || !cursor.rest().contains("}}") {
        return Err(RenderError::syntax(line, column, "unclosed placeholder"));
    }

    let (bad_line, bad_column) = cursor.position();
    let found = cursor.peek().unwrap_or(' ');
    Err(RenderError::syntax(
        bad_line,
        bad_column,
        format!("unexpected '{found}' in placeholder, expected '}}}}'"),
    ))
}

/// Parse a double-quoted literal with `\"` and `\\` escapes.
fn parse_literal(cursor: &mut Cursor<'_>, line: usize, column: usize) -> Result<String> {
    cursor.bump();
    let mut value = String::new();
    loop {
        match cursor.bump() {
            None => {
                return Err(RenderError::syntax(
                    line,
                    column,
                    "unterminated string literal",
                ));
            }
            Some('"') => return Ok(value),
            Some('\\') => match cursor.bump() {
                Some(escaped @ ('"' | '\\')) => value.push(escaped),
                Some('n') => value.push('\n'),
                Some(other) => {
                    value.push('\\');
                    value.push(other);
                }
                None => {
                    return Err(RenderError::syntax(
                        line,
                        column,
                        "unterminated string literal",
                    ));
                }
            },
            Some(c) => value.push(c),
        }
    }
}

/// Variable names: `[A-Za-z_][A-Za-z0-9_.-]*`
fn validate_name(name: &str, line: usize, column: usize) -> Result<()> {
    let mut chars = name.chars().enumerate();
    match chars.next() {
        Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {}
        Some((_, c)) => {
            return Err(RenderError::syntax(
                line,
                column,
                format!("invalid variable name '{name}': cannot start with '{c}'"),
            ));
        }
        None => return Err(RenderError::syntax(line, column, "empty placeholder")),
    }

    for (i, c) in chars {
        if !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')) {
            return Err(RenderError::syntax(
                line,
                column + i,
                format!("invalid character '{c}' in variable name '{name}'"),
            ));
        }
    }

    Ok(())
}
