use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

mod cli;
mod cmd;
mod loader;
mod request;
mod settings;
mod tracing_init;

use cli::{Cli, Commands};
use settings::GatekeepSettings;

/// Exit status for `check` when the request is denied.
const EXIT_DENIED: i32 = 1;
/// Exit status for failures (bad rules, bad input, unreadable files).
const EXIT_ERROR: i32 = 2;

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_init::init_tracing(cli.verbose);
    info!(args = ?std::env::args(), "gatekeep started");

    let settings = match GatekeepSettings::load() {
        Ok(s) => s,
        Err(e) => {
            error!("Settings error: {:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(EXIT_ERROR);
        }
    };

    match cli.command {
        Commands::Check {
            rules,
            request,
            json,
        } => {
            let result = settings
                .rules_path(rules.as_deref())
                .and_then(|path| {
                    cmd::check::run(&path, &request, false, json || settings.json_output)
                });
            match result {
                Ok(true) => {}
                Ok(false) => std::process::exit(EXIT_DENIED),
                Err(e) => {
                    error!("Check error: {:#}", e);
                    eprintln!("Error: {:#}", e);
                    std::process::exit(EXIT_ERROR);
                }
            }
        }
        Commands::Explain {
            rules,
            request,
            json,
        } => {
            let result = settings
                .rules_path(rules.as_deref())
                .and_then(|path| {
                    cmd::check::run(&path, &request, true, json || settings.json_output)
                });
            if let Err(e) = result {
                error!("Explain error: {:#}", e);
                eprintln!("Error: {:#}", e);
                std::process::exit(EXIT_ERROR);
            }
        }
        Commands::Validate { rules, json } => {
            let result = settings
                .rules_path(rules.as_deref())
                .and_then(|path| cmd::validate::run(&path, json || settings.json_output));
            if let Err(e) = result {
                error!("Validate error: {:#}", e);
                eprintln!("Error: {:#}", e);
                std::process::exit(EXIT_ERROR);
            }
        }
        Commands::Score { matchers } => {
            if let Err(e) = cmd::score::run(&matchers) {
                error!("Score error: {:#}", e);
                eprintln!("Error: {:#}", e);
                std::process::exit(EXIT_ERROR);
            }
        }
    }

    Ok(())
}
