//! Reinforcement Learning Module
//!
//! DQN trading research on top of the Burn framework.
//!
//! # Features
//!
//! - **Feature Frame**: explicit column schema, CSV loading, chronological split
//! - **Environment**: windowed state, commission and leverage adjusted PnL,
//!   Sharpe-like reward shaping
//! - **Action Space**: seven discrete actions mapped to `[position, leverage]`
//! - **Algorithm**: DQN with experience replay and a hard-synced target network
//! - **Training**: validation, best-model evaluation, checkpoint/resume and
//!   cooperative cancellation

pub mod algorithms;
pub mod config;
pub mod core;
pub mod data;
pub mod environment;
pub mod memory;
pub mod networks;
pub mod training;

use burn::backend::Autodiff;
use burn_ndarray::NdArray;

/// CPU training backend
pub type DefaultBackend = Autodiff<NdArray<f32>>;

// Config exports
pub use config::{DqnConfig, TradingEnvConfig, TrainingConfig};

// Core exports
pub use core::{
    convert_discrete_to_continuous_action, ContinuousAction, RewardFunction, StateEncoder,
    TradeAction, NUM_DISCRETE_ACTIONS,
};

// Data exports
pub use data::FeatureFrame;

// Memory exports
pub use memory::{ReplayBuffer, Transition};

// Algorithm exports
pub use algorithms::{build_dqn_agent, Agent, DqnAgent};

// Environment exports
pub use environment::{RenderMode, StepInfo, StepResult, TradingEnvironment};

// Training exports
pub use training::{evaluate_agent, EvaluationReport, TrainingHistory, TrainingLoop, TrainingOutcome};
