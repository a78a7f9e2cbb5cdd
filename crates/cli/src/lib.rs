pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "routewatch",
    about = "Routewatch operator CLI",
    long_about = "Operate Routewatch readiness checks, migrations, config inspection, demo \
                  seeding, and one-shot report generation.",
    after_help = "Examples:\n  routewatch doctor --json\n  routewatch config\n  routewatch generate"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Check config, API key format, database, PDF converter, and search gateway")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo company profile so a fresh database can generate reports")]
    Seed,
    #[command(about = "Run one compliance report generation end to end and print a summary")]
    Generate,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Generate => commands::generate::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
