pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::parse::StateArg;

#[derive(Debug, Parser)]
#[command(
    name = "roomservice",
    about = "Room-service assistant operator CLI",
    long_about = "Inspect configuration, apply migrations, check readiness and debug guest-message parsing.",
    after_help = "Examples:\n  roomservice doctor --json\n  roomservice config\n  roomservice parse --menu menus/aurora.toml \"2 pizzas for room 105\""
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to the TOML config file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, tenant menu files and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run the guest-message parser against a menu file")]
    Parse {
        #[arg(long, help = "TOML menu file with [[items]] entries")]
        menu: PathBuf,
        #[arg(long, value_enum, default_value = "main-menu", help = "Conversation state to parse in")]
        state: StateArg,
        #[arg(long, help = "Treat the guest as having a cart waiting for a room number")]
        pending_cart: bool,
        #[arg(help = "Guest message text")]
        text: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(config_path),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(config_path) }
        }
        Command::Doctor { json } => commands::doctor::run(config_path, json),
        Command::Parse { menu, state, pending_cart, text } => {
            commands::parse::run(&menu, state, pending_cart, &text)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
