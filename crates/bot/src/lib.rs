pub mod bootstrap;
pub mod commands;
pub mod events;
pub mod poll_store;
pub mod runtime;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tradebot_core::config::LoadOptions;

#[derive(Debug, Parser)]
#[command(
    name = "tradebot",
    about = "TF2 trading bot",
    long_about = "Run the trading engine, inspect effective configuration, and summarize persisted poll data.",
    after_help = "Examples:\n  tradebot run\n  tradebot check-config\n  tradebot --config tradebot.toml poll-data --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a TOML config file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start the bot and process trade offers until interrupted")]
    Run,
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    CheckConfig,
    #[command(about = "Summarize persisted offer states and reserved items")]
    PollData {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config.clone(),
            ..LoadOptions::default()
        }
    }
}

pub async fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();

    let result = match cli.command {
        Command::Run => {
            return match runtime::run(options).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(error) => {
                    eprintln!("tradebot failed: {error:#}");
                    ExitCode::FAILURE
                }
            };
        }
        Command::CheckConfig => commands::check_config::run(options),
        Command::PollData { json } => commands::poll_data::run(options, json).await,
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
