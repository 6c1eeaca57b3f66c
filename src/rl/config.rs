//! RL Configuration
//!
//! Configuration structs for the trading environment, the DQN agent and the
//! training loop.

use serde::{Deserialize, Serialize};

use crate::rl::core::NUM_DISCRETE_ACTIONS;

/// Trading environment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingEnvConfig {
    /// Feature columns the Feature Frame must contain, in state order
    #[serde(default)]
    pub feature_columns: Vec<String>,
    /// Number of past rows flattened into each observation
    pub window_size: usize,
    /// Starting account equity
    pub initial_balance: f64,
    /// Commission as a fraction of traded notional (0.001 = 0.1%)
    pub commission_fee: f64,
    /// Use the intra-episode Sharpe-like reward instead of raw step returns
    pub use_risk_adjusted_rewards: bool,
    /// Returns required (strictly more than) before the Sharpe-like reward kicks in
    #[serde(default = "default_sharpe_min_returns")]
    pub sharpe_min_returns: usize,
    /// Upper clip for balance / initial_balance in the observation
    #[serde(default = "default_max_balance_ratio")]
    pub max_balance_ratio: f64,
}

fn default_sharpe_min_returns() -> usize {
    5
}

fn default_max_balance_ratio() -> f64 {
    10.0
}

impl Default for TradingEnvConfig {
    fn default() -> Self {
        Self {
            feature_columns: Vec::new(),
            window_size: 10,
            initial_balance: 10_000.0,
            commission_fee: 0.001,
            use_risk_adjusted_rewards: true,
            sharpe_min_returns: default_sharpe_min_returns(),
            max_balance_ratio: default_max_balance_ratio(),
        }
    }
}

impl TradingEnvConfig {
    /// Config with an explicit feature schema and default hyperparameters
    pub fn with_features<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            feature_columns: columns.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Observation length for this schema: features * window + balance + position
    pub fn state_size(&self) -> usize {
        self.feature_columns.len() * self.window_size + 2
    }
}

/// DQN agent hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DqnConfig {
    /// Learning rate
    pub learning_rate: f64,
    /// Discount factor (gamma)
    pub discount_factor: f64,
    /// Initial exploration rate (epsilon)
    pub exploration_rate: f64,
    /// Multiplicative decay applied after every training replay
    pub exploration_decay: f64,
    /// Exploration floor
    pub exploration_min: f64,
    /// Mini-batch size
    pub batch_size: usize,
    /// Replay memory capacity
    pub memory_size: usize,
    /// Replay calls between hard target-network syncs
    pub update_target_every: usize,
    /// Number of discrete actions
    #[serde(default = "default_action_size")]
    pub action_size: usize,
    /// First hidden layer width
    #[serde(default = "default_hidden_dim")]
    pub hidden_dim: usize,
    /// Second hidden layer width
    #[serde(default = "default_second_hidden_dim")]
    pub second_hidden_dim: usize,
    /// Dropout probability after each hidden layer
    #[serde(default = "default_dropout")]
    pub dropout: f64,
    /// Seed for weight init, exploration and replay sampling
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_action_size() -> usize {
    NUM_DISCRETE_ACTIONS
}

fn default_hidden_dim() -> usize {
    128
}

fn default_second_hidden_dim() -> usize {
    64
}

fn default_dropout() -> f64 {
    0.2
}

impl Default for DqnConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            discount_factor: 0.95,
            exploration_rate: 1.0,
            exploration_decay: 0.995,
            exploration_min: 0.01,
            batch_size: 64,
            memory_size: 10_000,
            update_target_every: 5,
            action_size: default_action_size(),
            hidden_dim: default_hidden_dim(),
            second_hidden_dim: default_second_hidden_dim(),
            dropout: default_dropout(),
            seed: None,
        }
    }
}

/// Training loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Total episodes (including those restored from a checkpoint)
    pub episodes: usize,
    /// Run a validation episode every N episodes
    pub validation_every: usize,
    /// Persist a resumable checkpoint every N episodes
    pub checkpoint_every: usize,
    /// Greedy episodes run when scoring a new best model
    #[serde(default = "default_evaluation_episodes")]
    pub evaluation_episodes: usize,
    /// Directory that receives per-run directories
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Keep only the newest N checkpoints (all when unset)
    #[serde(default)]
    pub keep_checkpoints: Option<usize>,
}

fn default_evaluation_episodes() -> usize {
    1
}

fn default_output_dir() -> String {
    "./outputs".to_string()
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            episodes: 1000,
            validation_every: 10,
            checkpoint_every: 10,
            evaluation_episodes: default_evaluation_episodes(),
            output_dir: default_output_dir(),
            keep_checkpoints: None,
        }
    }
}
