//! RL Algorithms
//!
//! The agent interface used by the training loop and its DQN implementation.

pub mod dqn;

use std::path::Path;

use crate::error::Result;

pub use dqn::{build_dqn_agent, history_file, model_file, AgentHistory, DqnAgent};

/// Value-based trading agent
#[cfg_attr(test, mockall::automock)]
pub trait Agent {
    /// Pick a discrete action index; explores only when `training`
    fn act(&mut self, state: &[f32], training: bool) -> usize;

    /// Store a transition in replay memory
    fn remember(&mut self, state: Vec<f32>, action: usize, reward: f64, next_state: Vec<f32>, done: bool);

    /// One gradient update from replay memory, returning the loss
    fn replay(&mut self) -> Result<f32>;

    /// Persist weights and training history
    fn save(&self, path: &Path) -> Result<()>;

    /// Restore weights and training history
    fn load(&mut self, path: &Path) -> Result<()>;

    fn exploration_rate(&self) -> f64;

    fn set_exploration_rate(&mut self, rate: f64);

    /// Transitions currently held in replay memory
    fn memory_len(&self) -> usize;
}
