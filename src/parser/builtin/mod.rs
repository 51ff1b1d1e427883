//! Plugins compiled into the crate.

pub mod global_macros;

pub use global_macros::GlobalMacrosPlugin;

use crate::parser::{MacroPlugin, PluginCandidate, PluginLoadError};

/// Every builtin plugin, in the form the registry discovers them.
pub fn candidates() -> Vec<PluginCandidate> {
    vec![PluginCandidate::new(
        global_macros::PLUGIN_NAME,
        load_global_macros,
    )]
}

fn load_global_macros() -> Result<Box<dyn MacroPlugin>, PluginLoadError> {
    Ok(Box::new(GlobalMacrosPlugin::new()?))
}
