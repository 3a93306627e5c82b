pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

use std::process::ExitCode;

use clap::Parser;

use crate::cli::{Cli, Command};
use crate::error::SwError;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "warn" }),
    )
    .init();

    let result = run(&cli).await;

    match result {
        Ok(output) => match crate::output::emit(cli.output, &output) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                let e = SwError::Json(e);
                crate::output::emit_error(cli.output, e.code(), &e.to_string());
                e.exit_code()
            }
        },
        Err(e) => {
            crate::output::emit_error(cli.output, e.code(), &e.to_string());
            e.exit_code()
        }
    }
}

async fn run(cli: &Cli) -> Result<serde_json::Value, SwError> {
    let config = commands::load_config(cli.config.as_deref())?;
    let offline = matches!(&cli.command, Command::Fetch(args) if args.offline);
    let worker = commands::open_worker(config, &cli.cache_dir, commands::network(offline)?)?;

    match &cli.command {
        Command::Install => commands::install(&worker).await,
        Command::Activate => commands::activate(&worker).await,
        Command::Fetch(args) => commands::fetch(&worker, args).await,
        Command::Caches => commands::caches(&worker),
        Command::Version => commands::version(&worker).await,
        Command::Enqueue(args) => commands::enqueue(&worker, args),
        Command::Sync(args) => commands::sync(&worker, args).await,
        Command::Push(args) => commands::push(&worker, args),
    }
}
