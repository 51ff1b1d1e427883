//! Plugin registry built from an explicit candidate table.
//!
//! Each candidate carries the name it is registered under and a loader. A
//! candidate with a reserved name, a failing loader, or a plugin that reports
//! a different name is left out; none of this is fatal to building the
//! registry.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use super::builtin;
use super::MacroPlugin;

pub type PluginLoader = fn() -> Result<Box<dyn MacroPlugin>, PluginLoadError>;

const KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "crate",
    "do", "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl",
    "in", "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "self", "Self", "static", "struct", "super", "trait", "true", "try", "type",
    "typeof", "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

#[derive(Debug, Error)]
pub enum PluginLoadError {
    #[error("reserved plugin name \"{0}\"")]
    ReservedName(String),

    #[error("failed to load plugin \"{name}\": {reason}")]
    Load { name: String, reason: String },

    #[error("plugin listed as \"{candidate}\" calls itself \"{plugin}\"")]
    NameMismatch { candidate: String, plugin: String },

    #[error("plugin \"{0}\" is already registered")]
    Duplicate(String),
}

/// A plugin that may be registered, identified by name.
pub struct PluginCandidate {
    pub name: String,
    pub load: PluginLoader,
}

impl PluginCandidate {
    pub fn new(name: impl Into<String>, load: PluginLoader) -> Self {
        Self {
            name: name.into(),
            load,
        }
    }
}

/// Valid plugins keyed by name. Iteration is in name order.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Box<dyn MacroPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry of the plugins compiled into this crate.
    pub fn builtin() -> Self {
        Self::discover(builtin::candidates())
    }

    pub fn discover(candidates: impl IntoIterator<Item = PluginCandidate>) -> Self {
        let mut registry = Self::new();
        for candidate in candidates {
            let name = candidate.name.clone();
            match registry.load_candidate(candidate) {
                Ok(()) => debug!("Found plugin \"{}\"", name),
                Err(e) => debug!("Invalid plugin \"{}\": {}", name, e),
            }
        }
        registry
    }

    fn load_candidate(&mut self, candidate: PluginCandidate) -> Result<(), PluginLoadError> {
        if !is_valid_plugin_name(&candidate.name) {
            return Err(PluginLoadError::ReservedName(candidate.name));
        }

        let plugin = (candidate.load)()?;
        if plugin.name() != candidate.name {
            return Err(PluginLoadError::NameMismatch {
                candidate: candidate.name,
                plugin: plugin.name().to_string(),
            });
        }

        self.register(plugin)
    }

    pub fn register(&mut self, plugin: Box<dyn MacroPlugin>) -> Result<(), PluginLoadError> {
        let name = plugin.name().to_string();
        if !is_valid_plugin_name(&name) {
            return Err(PluginLoadError::ReservedName(name));
        }

        match self.plugins.entry(name) {
            Entry::Occupied(entry) => Err(PluginLoadError::Duplicate(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(plugin);
                Ok(())
            }
        }
    }

    /// Drop the named plugins; unknown names are ignored.
    pub fn without<S: AsRef<str>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        for name in names {
            if self.plugins.remove(name.as_ref()).is_some() {
                debug!("Disabled plugin \"{}\"", name.as_ref());
            }
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn MacroPlugin> {
        self.plugins.get(name).map(|p| &**p)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Sorted plugin names.
    pub fn names(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn MacroPlugin> + '_ {
        self.plugins.values().map(|p| &**p)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// Plugin names are identifiers that are neither private (`_` prefix) nor keywords.
pub fn is_valid_plugin_name(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    starts_ok
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !KEYWORDS.contains(&name)
}
