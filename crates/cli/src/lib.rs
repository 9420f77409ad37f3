pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "dossier",
    about = "Dossier listing investigation CLI",
    long_about = "Run property investigations, inspect configuration, and check credential readiness.",
    after_help = "Examples:\n  dossier investigate --address \"520 Leavenworth St, San Francisco, CA\" --price 1,200,000\n  dossier doctor --json\n  dossier config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Investigate a listing and print the JSON result or error envelope")]
    Investigate {
        #[arg(long, help = "Street address of the listing")]
        address: String,
        #[arg(long, help = "Asking price, e.g. \"$1,200,000\"")]
        price: String,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and report which API credentials are configured")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Investigate { address, price } => commands::investigate::run(&address, &price),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
