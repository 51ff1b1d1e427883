use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::formatter;
use crate::parser::MacroParser;

#[derive(Parser)]
#[command(
    name = "policy-macros",
    about = "Extract m4 macro definitions from security policy sources",
    version,
    author
)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract macros from policy files; later files override earlier ones
    Parse {
        /// Policy files or directories, in layering order
        #[arg(required = true)]
        paths: Vec<String>,

        /// Output as JSON
        #[arg(short = 'j', long = "json")]
        json: bool,

        /// Directory holding .policymacros.json
        #[arg(short = 'c', long = "config-dir", default_value = ".")]
        config_dir: String,
    },

    /// List the macro file plugins that are enabled
    Plugins {
        /// Directory holding .policymacros.json
        #[arg(short = 'c', long = "config-dir", default_value = ".")]
        config_dir: String,
    },
}

pub fn parse(paths: &[String], json: bool, config_dir: &str) -> Result<()> {
    let config = Config::load_from_dir(Path::new(config_dir))?;
    let parser = MacroParser::new(&config);
    let files = collect_files(paths)?;

    let Some(macros) = parser.parse(&files) else {
        bail!("Could not set up m4 with {}", config.m4.display());
    };

    if json {
        println!("{}", formatter::render_json(&macros)?);
        return Ok(());
    }

    if macros.is_empty() {
        println!("{} No macros found in {} files", "!".yellow(), files.len());
        return Ok(());
    }

    println!("{}", formatter::render_text(&macros));
    println!(
        "\n{} {} macros from {} files",
        "✓".green(),
        macros.len(),
        files.len()
    );
    Ok(())
}

pub fn plugins(config_dir: &str) -> Result<()> {
    let config = Config::load_from_dir(Path::new(config_dir))?;
    let parser = MacroParser::new(&config);

    let names = parser.expects();
    if names.is_empty() {
        println!("{} No plugins enabled", "!".yellow());
        return Ok(());
    }

    println!("{}", "Plugins:".bold());
    for name in names {
        println!("  {}", name);
    }
    Ok(())
}

/// Expand `paths` into files, keeping argument order. Directories are walked
/// in file name order.
pub fn collect_files(paths: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        let path = Path::new(path);
        if path.is_file() {
            files.push(path.to_path_buf());
            continue;
        }
        if !path.is_dir() {
            bail!("No such file or directory: {}", path.display());
        }

        let walker = WalkBuilder::new(path)
            .standard_filters(true)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let entry =
                entry.with_context(|| format!("Failed to walk {}", path.display()))?;
            if entry.file_type().is_some_and(|ft| ft.is_file()) {
                files.push(entry.into_path());
            }
        }
    }

    Ok(files)
}
