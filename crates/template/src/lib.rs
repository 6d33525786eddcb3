//! # Template
//!
//! Strict placeholder templates for device configuration and command text.
//!
//! Rendering is all-or-nothing: every placeholder must have a matching
//! variable, otherwise the render fails with the complete list of missing
//! names and nothing is produced.
//!
//! ## Example
//!
//! ```
//! use template::{render, Variables};
//!
//! let vars: Variables = [("port", "Gi0/1"), ("vlan", "120")].into_iter().collect();
//! let payload = render("interface {{ port }}\n switchport access vlan {{ vlan }}", &vars)?;
//! assert_eq!(payload.as_str(), "interface Gi0/1\n switchport access vlan 120");
//! # Ok::<(), template::RenderError>(())
//! ```

pub mod error;
pub mod parser;
pub mod variables;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub use error::{RenderError, RenderErrorKind, Result};
pub use parser::Segment;
pub use variables::Variables;

/// A parsed template, ready to render any number of times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parse template source, failing on malformed placeholders.
    pub fn parse(source: &str) -> Result<Self> {
        Ok(Self {
            segments: parser::parse(source)?,
        })
    }

    /// Names of all variables the template references, sorted and unique.
    pub fn placeholders(&self) -> BTreeSet<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Variable { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Render with the given variables.
    ///
    /// All placeholders are checked before any substitution happens.
    pub fn render(&self, variables: &Variables) -> Result<RenderedPayload> {
        let missing: Vec<String> = self
            .placeholders()
            .into_iter()
            .filter(|name| !variables.contains(name))
            .map(str::to_string)
            .collect();

        if !missing.is_empty() {
            return Err(RenderError::MissingVariable { names: missing });
        }

        let mut text = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(t) | Segment::Literal(t) => text.push_str(t),
                Segment::Variable { name, .. } => {
                    // checked above
                    text.push_str(variables.get(name).unwrap_or_default());
                }
            }
        }

        Ok(RenderedPayload::new(text))
    }
}

/// Parse and render in one step.
pub fn render(source: &str, variables: &Variables) -> Result<RenderedPayload> {
    Template::parse(source)?.render(variables)
}

/// The text produced by a render, sent unchanged to every device of a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderedPayload {
    text: String,
}

impl RenderedPayload {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Build a payload from raw commands, one per line, without rendering.
    pub fn from_commands<S: AsRef<str>>(commands: &[S]) -> Self {
        let lines: Vec<&str> = commands.iter().map(AsRef::as_ref).collect();
        Self::new(lines.join("\n"))
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl std::fmt::Display for RenderedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

impl AsRef<str> for RenderedPayload {
    fn as_ref(&self) -> &str {
        &self.text
    }
}
