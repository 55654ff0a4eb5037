pub mod commands;

use clap::{Parser, Subcommand};
use scoop_core::config::{LogFormat, LoggingConfig};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "scoop",
    about = "Scoop ice cream ordering bot",
    long_about = "Chat with the ordering bot and operate its storage, config, and readiness.",
    after_help = "Examples:\n  scoop chat --in-memory\n  scoop doctor --json\n  scoop config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive ordering conversation on stdin/stdout")]
    Chat {
        #[arg(
            long,
            default_value = commands::chat::DEFAULT_CONVERSATION,
            help = "Conversation to resume or start"
        )]
        conversation: String,
        #[arg(long, help = "Keep dialog state in memory instead of the configured database")]
        in_memory: bool,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, order recognition readiness, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Chat { conversation, in_memory } => {
            commands::chat::run(commands::chat::ChatArgs { conversation, in_memory })
        }
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}

/// Installs the global subscriber. Logs go to stderr so stdout stays a clean transcript.
pub fn init_logging(config: &LoggingConfig) {
    use tracing::Level;

    let log_level = config.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    // A subscriber may already be installed when several commands run in one process.
    let _ = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
