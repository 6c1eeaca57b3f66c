//! Core RL abstractions
//!
//! Fundamental types for state representation, actions, and rewards.

pub mod action;
pub mod reward;
pub mod state;

pub use action::{
    convert_discrete_to_continuous_action, ContinuousAction, TradeAction, ACTION_HIGH, ACTION_LOW,
    NUM_DISCRETE_ACTIONS,
};
pub use reward::{
    mean_std, reward_for, RewardFunction, RewardTransition, SharpeLikeReward,
    SimpleReturnReward,
};
pub use state::{AccountObservation, StateEncoder, WindowStateEncoder, ACCOUNT_FEATURES};
