use dqtrade::cli::{Cli, Commands};
use dqtrade::config::AppConfig;
use dqtrade::error::{Result, TraderError};
use std::path::PathBuf;
use tracing::error;

use crate::main_runtime::{init_logging, init_logging_simple};

mod eval;
mod info;
mod train;

/// Dispatch a parsed command line
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Train(args) => {
            let mut config = load_config(&cli.config)?;
            args.apply(&mut config);
            init_logging(&config.logging);
            validate(&config)?;
            train::run_train(config, args.run_dir.map(PathBuf::from)).await
        }
        Commands::Eval {
            model,
            data,
            episodes,
            output,
        } => {
            let mut config = load_config(&cli.config)?;
            if data.is_some() {
                config.data.csv_path = data;
            }
            init_logging(&config.logging);
            validate(&config)?;
            eval::run_eval(&config, &model, episodes, output.as_deref())
        }
        Commands::Info { run_dir } => {
            init_logging_simple();
            info::run_info(&run_dir)
        }
    }
}

fn load_config(dir: &str) -> Result<AppConfig> {
    Ok(AppConfig::load_from(dir)?)
}

fn validate(config: &AppConfig) -> Result<()> {
    config.validate().map_err(|errors| {
        for e in &errors {
            error!("Invalid config: {}", e);
        }
        TraderError::config(errors.join("; "))
    })
}
