use clap::{Args, Parser, Subcommand};

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "dqtrade")]
#[command(version)]
#[command(about = "DQN crypto trading agent: train, evaluate and inspect runs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory (default.toml, $DQTRADE_ENV.toml)
    #[arg(short, long, default_value = "config", global = true)]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a DQN agent on a Feature Frame CSV
    Train(TrainArgs),
    /// Evaluate a saved model with greedy episodes
    Eval {
        /// Model path (with or without the .mpk extension)
        #[arg(short, long)]
        model: String,
        /// Feature Frame CSV (defaults to data.csv_path)
        #[arg(short, long)]
        data: Option<String>,
        /// Number of evaluation episodes
        #[arg(short, long, default_value = "10")]
        episodes: usize,
        /// Write the report as JSON to this file
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Show the latest checkpoint of a run directory
    Info {
        /// Run directory
        run_dir: String,
    },
}

/// Training flags; every value overrides the config file
#[derive(Args, Debug, Clone, Default)]
pub struct TrainArgs {
    /// Feature Frame CSV
    #[arg(short, long)]
    pub data: Option<String>,
    /// Run directory; an existing one is resumed from its latest checkpoint
    #[arg(long)]
    pub run_dir: Option<String>,
    /// Directory that receives new run directories
    #[arg(short, long)]
    pub output: Option<String>,
    /// Total number of training episodes
    #[arg(short, long)]
    pub episodes: Option<usize>,
    /// Observation window size
    #[arg(long)]
    pub window: Option<usize>,
    /// Replay batch size
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Learning rate
    #[arg(long)]
    pub lr: Option<f64>,
    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,
}

impl TrainArgs {
    /// Apply the flags on top of a loaded config
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(data) = &self.data {
            config.data.csv_path = Some(data.clone());
        }
        if let Some(output) = &self.output {
            config.training.output_dir = output.clone();
        }
        if let Some(episodes) = self.episodes {
            config.training.episodes = episodes;
        }
        if let Some(window) = self.window {
            config.environment.window_size = window;
        }
        if let Some(batch_size) = self.batch_size {
            config.agent.batch_size = batch_size;
        }
        if let Some(lr) = self.lr {
            config.agent.learning_rate = lr;
        }
        if self.seed.is_some() {
            config.agent.seed = self.seed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_train_flags() {
        let cli = Cli::parse_from([
            "dqtrade", "train", "--data", "btc.csv", "-e", "50", "--lr", "0.0005", "--seed", "3",
        ]);
        let Commands::Train(args) = cli.command else {
            panic!("expected train");
        };
        assert_eq!(cli.config, "config");

        let mut config = AppConfig::default();
        args.apply(&mut config);
        assert_eq!(config.data.csv_path.as_deref(), Some("btc.csv"));
        assert_eq!(config.training.episodes, 50);
        assert_eq!(config.agent.learning_rate, 0.0005);
        assert_eq!(config.agent.seed, Some(3));
        assert_eq!(config.agent.batch_size, 64);
    }

    #[test]
    fn test_parse_eval_and_info() {
        let cli = Cli::parse_from(["dqtrade", "eval", "-m", "runs/x/best_model"]);
        assert!(matches!(cli.command, Commands::Eval { episodes: 10, .. }));

        let cli = Cli::parse_from(["dqtrade", "--config", "cfg", "info", "runs/x"]);
        assert_eq!(cli.config, "cfg");
        assert!(matches!(cli.command, Commands::Info { ref run_dir } if run_dir == "runs/x"));
    }
}
