pub mod commands;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "citabot",
    about = "Citabot operator CLI",
    long_about = "Inspect configuration, check collaborator readiness, exercise the time normalizer and chat with the booking dialog locally.",
    after_help = "Examples:\n  citabot doctor --json\n  citabot config\n  citabot normalize date \"pasado mañana\"\n  citabot chat --identity 5215550001"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and report which collaborators are ready")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run the date or time normalizer on a phrase")]
    Normalize {
        #[command(subcommand)]
        target: NormalizeTarget,
    },
    #[command(about = "Chat with the booking dialog on stdin using in-memory backends")]
    Chat {
        #[arg(long, default_value = "local-operator", help = "Sender identity for the session")]
        identity: String,
        #[arg(long, help = "Display name reported for the sender")]
        name: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum NormalizeTarget {
    Date {
        phrase: String,
        #[arg(long, help = "Reference day as YYYY-MM-DD (defaults to today)")]
        today: Option<NaiveDate>,
    },
    Time {
        phrase: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Normalize { target: NormalizeTarget::Date { phrase, today } } => {
            commands::normalize::date(&phrase, today)
        }
        Command::Normalize { target: NormalizeTarget::Time { phrase } } => {
            commands::normalize::time(&phrase)
        }
        Command::Chat { identity, name } => commands::chat::run(&identity, name.as_deref()),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
