//! Plugin-driven extraction of m4 macro definitions from security policy
//! sources.
//!
//! [`parser::MacroParser`] routes each input file to the format plugin that
//! recognizes it and merges the results, later files overriding earlier ones.

pub mod cli;
pub mod config;
pub mod expander;
pub mod formatter;
pub mod macros;
pub mod parser;

pub use config::Config;
pub use expander::{ExpanderOptions, M4Expander, MacroExpander};
pub use macros::{MacroDef, MacroError, MacroMap};
pub use parser::{ExtractError, MacroParser, MacroPlugin, PluginRegistry};
