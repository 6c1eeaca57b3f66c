pub mod cli;
pub mod config;
pub mod coordination;
pub mod error;
pub mod rl;

pub use config::AppConfig;
pub use coordination::{CancellationToken, ShutdownSignal};
pub use error::{Result, TraderError};
pub use rl::{
    Agent, DqnAgent, DqnConfig, FeatureFrame, TradingEnvConfig, TradingEnvironment, TrainingConfig,
    TrainingLoop,
};
