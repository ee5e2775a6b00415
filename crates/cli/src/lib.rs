pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "trestle",
    about = "Trestle operator CLI",
    long_about = "Talk to the integration engine through the action broker: one-shot requests, an interactive session, and configuration, catalog, and readiness inspection.",
    after_help = "Examples:\n  trestle ask what is the production status\n  trestle ask --json \"list lookup tables\"\n  trestle chat\n  trestle doctor --json\n  trestle config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Send one request through the action broker and print the reply")]
    Ask {
        #[arg(required = true, num_args = 1.., help = "The request text")]
        message: Vec<String>,
        #[arg(long, help = "Emit the full reply record as JSON")]
        json: bool,
        #[arg(long, help = "Engine namespace override for this request")]
        namespace: Option<String>,
    },
    #[command(about = "Interactive broker session reading requests from stdin")]
    Chat {
        #[arg(long, help = "Engine namespace override for the session")]
        namespace: Option<String>,
    },
    #[command(about = "Print the capability catalog with operation classes and approval gates")]
    Catalog {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, engine reachability, and chat model readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ask { message, json, namespace } => {
            commands::ask::run(&message.join(" "), json, namespace)
        }
        Command::Chat { namespace } => commands::chat::run(namespace),
        Command::Catalog { json } => {
            commands::CommandResult { exit_code: 0, output: commands::catalog::run(json) }
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    // The chat session prints as it goes and ends with no trailing output.
    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}
