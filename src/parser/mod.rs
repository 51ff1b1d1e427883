//! Macro file parsing through format plugins.
//!
//! A [`MacroParser`] owns a [`PluginRegistry`], routes every input file to the
//! first plugin that recognizes it, and merges the per-file results with an
//! [`Aggregator`]. File- and macro-level failures are logged and skipped; only
//! a failure to set up the m4 expander aborts a run.

pub mod aggregate;
pub mod builtin;
pub mod registry;

pub use aggregate::Aggregator;
pub use registry::{PluginCandidate, PluginLoadError, PluginLoader, PluginRegistry};

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::expander::{ExpanderOptions, M4Expander, MacroExpander};
use crate::macros::MacroMap;

/// A plugin could not produce macros for a file.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("plugin \"{plugin}\" can't handle {}", .path.display())]
    Unrecognized { plugin: String, path: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Capability contract for a macro file format.
pub trait MacroPlugin {
    /// Registry key, unique among registered plugins.
    fn name(&self) -> &str;

    fn recognizes(&self, path: &Path) -> bool;

    /// Extract the macros defined in `path`.
    ///
    /// Fails with [`ExtractError::Unrecognized`] when `recognizes(path)` is false.
    fn extract(&self, path: &Path, expander: &dyn MacroExpander)
        -> Result<MacroMap, ExtractError>;
}

pub struct MacroParser {
    registry: PluginRegistry,
    options: ExpanderOptions,
}

impl MacroParser {
    /// Builtin plugins minus the ones disabled in `config`.
    pub fn new(config: &Config) -> Self {
        let registry = PluginRegistry::builtin().without(&config.disabled_plugins);
        Self::with_registry(registry, config.expander_options())
    }

    pub fn with_registry(registry: PluginRegistry, options: ExpanderOptions) -> Self {
        Self { registry, options }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Caller-owned scratch directory handed to the expander, if any.
    pub fn tmpdir(&self) -> Option<&Path> {
        self.options.tmpdir.as_deref()
    }

    /// Names of the plugins this parser can route files to.
    pub fn expects(&self) -> BTreeSet<String> {
        self.registry.names().into_iter().map(String::from).collect()
    }

    /// First plugin, in name order, that recognizes `file`.
    pub fn select_plugin(&self, file: &Path) -> Option<&dyn MacroPlugin> {
        let mut claimants = self.registry.iter().filter(|p| p.recognizes(file));
        let chosen = claimants.next()?;

        let ignored: Vec<&str> = claimants.map(|p| p.name()).collect();
        if !ignored.is_empty() {
            warn!(
                "\"{}\" is claimed by several plugins; using \"{}\", ignoring {}",
                file.display(),
                chosen.name(),
                ignored.join(", ")
            );
        }
        Some(chosen)
    }

    /// Run one plugin on one file. Extraction errors are logged and yield `None`.
    pub fn extract_one(
        &self,
        file: &Path,
        plugin: &dyn MacroPlugin,
        expander: &dyn MacroExpander,
    ) -> Option<MacroMap> {
        match plugin.extract(file, expander) {
            Ok(macros) => {
                info!("Parsed {} macros from \"{}\"", macros.len(), file.display());
                Some(macros)
            }
            Err(e) => {
                warn!("{}", e);
                warn!("Could not parse \"{}\"", file.display());
                None
            }
        }
    }

    /// Parse `files` in order with a fresh m4 expander.
    ///
    /// Returns `None` when the expander cannot be set up; no plugin runs in
    /// that case. A managed scratch directory is removed before returning.
    pub fn parse<P: AsRef<Path>>(&self, files: &[P]) -> Option<MacroMap> {
        let expander = match M4Expander::new(files, &self.options) {
            Ok(expander) => expander,
            Err(e) => {
                error!("{}", e);
                return None;
            }
        };
        Some(self.parse_with(files, &expander))
    }

    /// Parse `files` in order with a caller-owned expander.
    pub fn parse_with<P: AsRef<Path>>(
        &self,
        files: &[P],
        expander: &dyn MacroExpander,
    ) -> MacroMap {
        let mut aggregator = Aggregator::new();

        for file in files {
            let file: &Path = file.as_ref();
            let Some(plugin) = self.select_plugin(file) else {
                debug!("No parser for \"{}\"", file.display());
                continue;
            };

            debug!(
                "Parsing macros from \"{}\" with plugin \"{}\"",
                file.display(),
                plugin.name()
            );
            if let Some(macros) = self.extract_one(file, plugin, expander) {
                aggregator.merge(macros);
            }
        }

        aggregator.finish()
    }
}
