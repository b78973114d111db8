pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "concierge",
    about = "Concierge operator CLI",
    long_about = "Operate concierge migrations, demo data, config inspection, readiness \
                  checks, and one-shot support turns.",
    after_help = "Examples:\n  concierge doctor --json\n  concierge config\n  concierge chat \
                  --conversation conv-1 --user a4ab87 \"how to reserve an event\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending migrations to both stores and return structured output")]
    Migrate,
    #[command(about = "Load the deterministic demo dataset into the crm store")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, knowledge corpus, and store connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one support turn for a conversation and print the response")]
    Chat {
        #[arg(long, help = "Conversation id to continue or create")]
        conversation: String,
        #[arg(long, help = "User id bound to the conversation")]
        user: String,
        #[arg(help = "The user message")]
        message: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Chat { conversation, user, message } => {
            commands::chat::run(&conversation, &user, &message)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
