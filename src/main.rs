mod api;
mod app;
mod chat;
mod commands;
mod config;
mod errors;
mod logging;
mod output;
mod parse;
mod tui;

use clap::{Parser, Subcommand};

use crate::app::Runtime;
use crate::chat::ResponseMode;
use crate::commands::ask::AskArgs;
use crate::commands::config::ConfigCommand;
use crate::commands::tui::TuiArgs;
use crate::errors::CliError;
use crate::output::{OutputMode, print_error};

#[derive(Debug, Parser)]
#[command(
    name = "chatbox",
    version,
    about = "Terminal chat client for the image and text question-answering backend."
)]
struct Cli {
    #[arg(long, global = true)]
    profile: Option<String>,
    #[arg(long = "api-url", global = true)]
    api_url: Option<String>,
    /// Response mode: stream the reply as it is generated, or wait for one JSON payload
    #[arg(long, global = true, value_enum)]
    mode: Option<ResponseMode>,
    /// Milliseconds to wait for a response (and between stream chunks); 0 waits forever
    #[arg(long, global = true)]
    timeout: Option<u64>,
    #[arg(long, global = true)]
    json: bool,
    #[arg(long, global = true)]
    quiet: bool,
    #[arg(long, global = true)]
    verbose: bool,
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Send one question and print the reply
    Ask(AskArgs),
    /// Interactive chat
    Tui(TuiArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let output = OutputMode {
        json: cli.json,
        quiet: cli.quiet,
        verbose: cli.verbose,
        debug: cli.debug,
    };

    match logging::init_tracing(cli.debug) {
        Ok(dir) => output.print_verbose(&format!("logging to {}", dir.display())),
        Err(err) => output.print_verbose(&format!("logging disabled: {err}")),
    }

    let result = run(cli, output.clone()).await;
    if let Err(err) = result {
        tracing::error!(error = %err, code = err.exit_code(), "command failed");
        if !err.is_reported() {
            print_error(&err, &output);
        }
        std::process::exit(err.exit_code());
    }
}

async fn run(cli: Cli, output: OutputMode) -> Result<(), CliError> {
    let config = config::load_config()?;
    let config_path = config::config_path()?;

    let mut runtime = Runtime {
        output,
        config,
        config_path,
        profile_override: cli.profile,
        api_url_override: cli.api_url,
        mode_override: cli.mode,
        timeout_override: cli.timeout,
    };

    match cli.command {
        Commands::Config { command } => commands::config::handle(&mut runtime, command).await,
        Commands::Ask(args) => commands::ask::handle(&runtime, args).await,
        Commands::Tui(args) => commands::tui::handle(&runtime, args).await,
    }
}
