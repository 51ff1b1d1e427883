use regex::Regex;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::expander::MacroExpander;
use crate::macros::{MacroDef, MacroMap};
use crate::parser::{ExtractError, MacroPlugin, PluginLoadError};

pub const PLUGIN_NAME: &str = "global_macros";

const MACRO_FILE: &str = "global_macros";

/// Plugin for the `global_macros` file, which holds one m4 `define` per line.
pub struct GlobalMacrosPlugin {
    definition: Regex,
}

impl GlobalMacrosPlugin {
    pub fn new() -> Result<Self, PluginLoadError> {
        let definition =
            Regex::new(r"^define\(`([^']+)',\s+`([^']+)'").map_err(|e| PluginLoadError::Load {
                name: PLUGIN_NAME.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { definition })
    }

    /// Scan `source` as the contents of `path`. Malformed macros are logged
    /// and skipped.
    pub fn extract_from_str(
        &self,
        path: &Path,
        source: &str,
        expander: Option<&dyn MacroExpander>,
    ) -> MacroMap {
        let mut macros = MacroMap::new();

        for (idx, line) in source.lines().enumerate() {
            let Some(caps) = self.definition.captures(line) else {
                continue;
            };
            let name = &caps[1];
            let lineno = idx + 1;

            match MacroDef::new(name, &caps[2], path, lineno, expander) {
                Ok(def) => {
                    macros.insert(name.to_string(), def);
                }
                Err(e) => {
                    warn!("{}", e);
                    warn!("Macro \"{}\" is at {}:{}", name, path.display(), lineno);
                }
            }
        }

        macros
    }
}

impl MacroPlugin for GlobalMacrosPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn recognizes(&self, path: &Path) -> bool {
        path.file_name().is_some_and(|n| n == MACRO_FILE)
    }

    fn extract(
        &self,
        path: &Path,
        expander: &dyn MacroExpander,
    ) -> Result<MacroMap, ExtractError> {
        if !self.recognizes(path) {
            return Err(ExtractError::Unrecognized {
                plugin: PLUGIN_NAME.to_string(),
                path: path.to_path_buf(),
            });
        }

        let source = fs::read_to_string(path).map_err(|source| ExtractError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(self.extract_from_str(path, &source, Some(expander)))
    }
}
