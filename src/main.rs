mod app;
mod cli;
mod config;
mod db;
mod http;
mod logging;
mod paths;

use anyhow::Result;
use clap::Parser;

use crate::cli::Command;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let log_file = match cli.command {
        Some(Command::Tui) | None => Some(paths::log_file_path()?),
        Some(_) => None,
    };
    logging::init_logging(cli.verbose, log_file.as_deref())?;

    let settings = config::Settings::from_env()?;
    tracing::debug!(db = %settings.database_path.display(), "loaded settings");
    app::run(cli, &settings)
}
