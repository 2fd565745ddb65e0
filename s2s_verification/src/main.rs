mod cli;

use std::process;

use anyhow::{Context, Result};
use clap::Parser;

use s2s_verification::build;
use s2s_verification::config::Config;
use s2s_verification::logging::{self, LogLevel, Stage};

use crate::cli::Cli;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        logging::error(Stage::System, None, &format!("{e:#}"));
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    config.apply_environment();
    cli.apply(&mut config);

    logging::init_logger(
        LogLevel::raised_by(config.logging.level, cli.verbose),
        config.logging.file.as_deref(),
        config.logging.timestamps,
    );
    logging::info(
        Stage::System,
        None,
        &format!(
            "input {} -> output {}",
            config.io.input.display(),
            config.io.outdir.display()
        ),
    );

    build::run(&config).context("building verification datasets")?;
    Ok(())
}
