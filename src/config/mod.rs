use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::expander::ExpanderOptions;

pub const CONFIG_FILE: &str = ".policymacros.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// m4 binary used to expand macros
    #[serde(default = "default_m4")]
    pub m4: PathBuf,

    /// Scratch directory for m4 state; a temporary one is used when unset
    #[serde(default)]
    pub tmpdir: Option<PathBuf>,

    /// Extra m4 definitions, e.g. build variant flags
    #[serde(default)]
    pub extra_defs: BTreeMap<String, String>,

    /// Builtin plugins to leave out of the registry
    #[serde(default)]
    pub disabled_plugins: BTreeSet<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            m4: default_m4(),
            tmpdir: None,
            extra_defs: BTreeMap::new(),
            disabled_plugins: BTreeSet::new(),
        }
    }
}

impl Config {
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn expander_options(&self) -> ExpanderOptions {
        ExpanderOptions {
            m4: self.m4.clone(),
            tmpdir: self.tmpdir.clone(),
            extra_defs: self.extra_defs.clone(),
        }
    }
}

fn default_m4() -> PathBuf {
    PathBuf::from("m4")
}
