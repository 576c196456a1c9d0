use std::process::ExitCode;

use clap::Parser;
use tarla_cli::Cli;
use tarla_core::config::{AppConfig, LogFormat};
use tracing::Level;

fn init_logging(config: &AppConfig) {
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(log_level);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    // Commands report config errors themselves; logging falls back to defaults.
    let config = AppConfig::load(cli.load_options()).unwrap_or_default();
    init_logging(&config);
    tarla_cli::run_with(cli)
}
