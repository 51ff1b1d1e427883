use indexmap::IndexMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::expander::{ExpandError, MacroExpander};

/// Macros keyed by name, in the order they were first seen.
pub type MacroMap = IndexMap<String, MacroDef>;

/// Why a single macro definition could not be built.
#[derive(Debug, Error)]
pub enum MacroError {
    #[error("invalid macro name \"{0}\"")]
    InvalidName(String),

    #[error("macro \"{0}\" has an empty body")]
    EmptyBody(String),

    #[error("macro \"{0}\" has unbalanced quotes in its body")]
    UnbalancedQuotes(String),

    #[error("failed to expand macro \"{name}\": {source}")]
    Expansion {
        name: String,
        #[source]
        source: ExpandError,
    },
}

/// One macro definition extracted from a policy source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MacroDef {
    name: String,
    raw_expansion: String,
    source_file: PathBuf,
    source_line: usize,
    expanded_value: Option<String>,
}

impl MacroDef {
    /// Validate and build a macro, expanding its body when an expander is given.
    ///
    /// `source_line` is 1-based.
    pub fn new(
        name: impl Into<String>,
        raw_expansion: impl Into<String>,
        source_file: impl Into<PathBuf>,
        source_line: usize,
        expander: Option<&dyn MacroExpander>,
    ) -> Result<Self, MacroError> {
        let name = name.into();
        let raw_expansion = raw_expansion.into();

        if !is_macro_name(&name) {
            return Err(MacroError::InvalidName(name));
        }
        if raw_expansion.trim().is_empty() {
            return Err(MacroError::EmptyBody(name));
        }
        if !quotes_balanced(&raw_expansion) {
            return Err(MacroError::UnbalancedQuotes(name));
        }

        let expanded_value = match expander {
            Some(expander) => match expander.expand(&name, &raw_expansion) {
                Ok(value) => Some(value),
                Err(source) => return Err(MacroError::Expansion { name, source }),
            },
            None => None,
        };

        Ok(Self {
            name,
            raw_expansion,
            source_file: source_file.into(),
            source_line,
            expanded_value,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raw_expansion(&self) -> &str {
        &self.raw_expansion
    }

    pub fn source_file(&self) -> &Path {
        &self.source_file
    }

    pub fn source_line(&self) -> usize {
        self.source_line
    }

    pub fn expanded_value(&self) -> Option<&str> {
        self.expanded_value.as_deref()
    }

    /// The expanded value if there is one, otherwise the raw body.
    pub fn value(&self) -> &str {
        self.expanded_value().unwrap_or(&self.raw_expansion)
    }
}

/// m4 identifier: a letter or underscore followed by letters, digits or underscores.
pub fn is_macro_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// m4 opens quotes with a backtick and closes them with an apostrophe.
fn quotes_balanced(body: &str) -> bool {
    let mut depth = 0usize;
    for c in body.chars() {
        match c {
            '`' => depth += 1,
            '\'' => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            _ => {}
        }
    }
    depth == 0
}
