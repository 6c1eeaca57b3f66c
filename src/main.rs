use clap::Parser;
use dqtrade::cli::Cli;
use dqtrade::error::Result;

mod main_commands;
mod main_runtime;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    main_commands::run(cli).await
}
