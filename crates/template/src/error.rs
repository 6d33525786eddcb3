//! Error types for template rendering.
//!
//! Rendering fails in exactly two ways: the template text itself is malformed,
//! or it references variables the caller did not supply. Both are reported
//! before any output is produced.

use thiserror::Error;

/// The two categories of render failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderErrorKind {
    /// A placeholder references a variable that was not supplied
    MissingVariable,
    /// The template text is malformed
    SyntaxError,
}

impl RenderErrorKind {
    /// Stable machine-readable name, used in API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingVariable => "missing_variable",
            Self::SyntaxError => "syntax_error",
        }
    }
}

impl std::fmt::Display for RenderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while parsing or rendering a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// One or more placeholders have no matching variable
    #[error("missing variables: {}", names.join(", "))]
    MissingVariable {
        /// Every missing name, sorted and deduplicated
        names: Vec<String>,
    },

    /// The template could not be parsed
    #[error("syntax error at line {line}, column {column}: {message}")]
    SyntaxError {
        /// Line of the offending text (1-indexed)
        line: usize,
        /// Column of the offending text (1-indexed, in characters)
        column: usize,
        /// What was wrong
        message: String,
    },
}

impl RenderError {
    /// Get the error category.
    pub fn kind(&self) -> RenderErrorKind {
        match self {
            Self::MissingVariable { .. } => RenderErrorKind::MissingVariable,
            Self::SyntaxError { .. } => RenderErrorKind::SyntaxError,
        }
    }

    /// Human-readable detail without the category prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::MissingVariable { names } => names.join(", "),
            Self::SyntaxError {
                line,
                column,
                message,
            } => format!("line {line}, column {column}: {message}"),
        }
    }

    pub(crate) fn syntax(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::SyntaxError {
            line,
            column,
            message: message.into(),
        }
    }
}

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, RenderError>;
