use anyhow::Result;
use clap::Parser as ClapParser;
use policy_macros::cli::{self, Cli, Commands};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    let cli_args = Cli::parse();

    let log_level = if cli_args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match cli_args.command {
        Commands::Parse {
            paths,
            json,
            config_dir,
        } => {
            cli::parse(&paths, json, &config_dir)?;
        }
        Commands::Plugins { config_dir } => {
            cli::plugins(&config_dir)?;
        }
    }

    Ok(())
}
