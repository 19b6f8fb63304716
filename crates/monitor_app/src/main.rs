mod app;
mod cli;
mod effects;
mod logging;
mod persistence;
mod render;

use std::process::ExitCode;

use clap::Parser;
use monitor_logging::monitor_error;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    logging::initialize(cli.log, cli.verbose);

    match app::run(cli) {
        Ok(code) => code,
        Err(err) => {
            monitor_error!("{:#}", err);
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
