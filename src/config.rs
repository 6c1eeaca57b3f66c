use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::rl::config::{DqnConfig, TradingEnvConfig, TrainingConfig};
use crate::rl::data::CLOSE_COLUMN;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub data: DataConfig,
    pub environment: TradingEnvConfig,
    pub agent: DqnConfig,
    pub training: TrainingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Feature Frame CSV produced by the data pipeline
    #[serde(default)]
    pub csv_path: Option<String>,
    /// Trading pair, used in run directory names (e.g., "BTC/USDT")
    pub symbol: String,
    /// Candle timeframe (e.g., "1h")
    pub timeframe: String,
    /// Fraction of rows used for training; the rest validates
    pub train_split: f64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            csv_path: None,
            symbol: "BTC/USDT".to_string(),
            timeframe: "1h".to_string(),
            train_split: 0.8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted console logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info,dqtrade=debug".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            environment: TradingEnvConfig::with_features(default_feature_columns()),
            agent: DqnConfig::default(),
            training: TrainingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// OHLCV plus the indicator columns emitted by the data pipeline
pub fn default_feature_columns() -> Vec<String> {
    [
        "open", "high", "low", "close", "volume", "sma_20", "ema_20", "rsi_14", "macd",
        "macd_signal", "bb_upper", "bb_lower", "atr_14",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let defaults = AppConfig::default();
        let env = &defaults.environment;
        let agent = &defaults.agent;
        let training = &defaults.training;

        let builder = Config::builder()
            // Start with default values
            .set_default("data.symbol", defaults.data.symbol.clone())?
            .set_default("data.timeframe", defaults.data.timeframe.clone())?
            .set_default("data.train_split", defaults.data.train_split)?
            .set_default("environment.feature_columns", env.feature_columns.clone())?
            .set_default("environment.window_size", env.window_size as i64)?
            .set_default("environment.initial_balance", env.initial_balance)?
            .set_default("environment.commission_fee", env.commission_fee)?
            .set_default("environment.use_risk_adjusted_rewards", env.use_risk_adjusted_rewards)?
            .set_default("agent.learning_rate", agent.learning_rate)?
            .set_default("agent.discount_factor", agent.discount_factor)?
            .set_default("agent.exploration_rate", agent.exploration_rate)?
            .set_default("agent.exploration_decay", agent.exploration_decay)?
            .set_default("agent.exploration_min", agent.exploration_min)?
            .set_default("agent.batch_size", agent.batch_size as i64)?
            .set_default("agent.memory_size", agent.memory_size as i64)?
            .set_default("agent.update_target_every", agent.update_target_every as i64)?
            .set_default("training.episodes", training.episodes as i64)?
            .set_default("training.validation_every", training.validation_every as i64)?
            .set_default("training.checkpoint_every", training.checkpoint_every as i64)?
            .set_default("logging.level", defaults.logging.level.clone())?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("DQTRADE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (DQTRADE_AGENT__BATCH_SIZE, etc.)
            .add_source(
                Environment::with_prefix("DQTRADE")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // Data split
        if self.data.train_split <= 0.0 || self.data.train_split >= 1.0 {
            errors.push("data.train_split must be between 0 and 1".to_string());
        }

        // Environment
        let env = &self.environment;
        if env.feature_columns.is_empty() {
            errors.push("environment.feature_columns must not be empty".to_string());
        } else if !env.feature_columns.iter().any(|c| c == CLOSE_COLUMN) {
            errors.push(format!(
                "environment.feature_columns must include '{CLOSE_COLUMN}'"
            ));
        }
        if env.window_size == 0 {
            errors.push("environment.window_size must be positive".to_string());
        }
        if env.initial_balance <= 0.0 {
            errors.push("environment.initial_balance must be positive".to_string());
        }
        if !(0.0..1.0).contains(&env.commission_fee) {
            errors.push("environment.commission_fee must be in [0, 1)".to_string());
        }

        // Agent
        let agent = &self.agent;
        if agent.learning_rate <= 0.0 {
            errors.push("agent.learning_rate must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&agent.discount_factor) {
            errors.push("agent.discount_factor must be in [0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&agent.exploration_rate) {
            errors.push("agent.exploration_rate must be in [0, 1]".to_string());
        }
        if agent.exploration_min > agent.exploration_rate {
            errors.push("agent.exploration_min must not exceed exploration_rate".to_string());
        }
        if agent.exploration_decay <= 0.0 || agent.exploration_decay > 1.0 {
            errors.push("agent.exploration_decay must be in (0, 1]".to_string());
        }
        if agent.batch_size == 0 {
            errors.push("agent.batch_size must be positive".to_string());
        }
        if agent.memory_size < agent.batch_size {
            errors.push("agent.memory_size must be at least batch_size".to_string());
        }

        // Training
        if self.training.episodes == 0 {
            errors.push("training.episodes must be positive".to_string());
        }
        if self.training.validation_every == 0 || self.training.checkpoint_every == 0 {
            errors.push(
                "training.validation_every and checkpoint_every must be positive".to_string(),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.environment.state_size(), 13 * 10 + 2);
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = AppConfig::default();
        config.data.train_split = 1.5;
        config.environment.feature_columns = vec!["rsi_14".to_string()];
        config.agent.memory_size = 8;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[1].contains("close"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            r#"
[data]
csv_path = "data/btc_1h.csv"

[environment]
feature_columns = ["close", "rsi_14"]
window_size = 5

[agent]
batch_size = 32
seed = 7
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.data.csv_path.as_deref(), Some("data/btc_1h.csv"));
        assert_eq!(config.data.train_split, 0.8);
        assert_eq!(config.environment.window_size, 5);
        assert_eq!(config.environment.commission_fee, 0.001);
        assert_eq!(config.agent.batch_size, 32);
        assert_eq!(config.agent.seed, Some(7));
        assert_eq!(config.training.validation_every, 10);
        assert!(config.validate().is_ok());
    }
}
