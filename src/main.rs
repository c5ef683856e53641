mod api;
mod cli;
mod commands;
mod config;
mod console;
mod error;
mod input;
mod markdown;
mod spinner;

use clap::Parser;
use std::process::exit;
use tracing_subscriber::EnvFilter;

use api::GeminiClient;
use cli::Cli;
use commands::Session;
use config::ConfigStore;
use console::Console;
use input::TerminalInput;

#[tokio::main]
async fn main() {
    // Logs go to stderr so they never mix with the rendered answer; RUST_LOG overrides.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let input = match TerminalInput::new() {
        Ok(input) => input,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            exit(1);
        }
    };

    let mut session = Session::new(
        ConfigStore::new(&cli.config_file),
        GeminiClient::new(cli.api, cli.model_id),
        input,
        Console::stdout(),
    );

    if let Err(e) = session.run(&cli.args).await {
        eprintln!("ERROR: {:#}", e);
        exit(1);
    }
}
