//! Neural Network Architectures
//!
//! Q-value network used by the DQN agent.

pub mod q_network;

pub use q_network::{tensor_values, QNetwork, QNetworkConfig};
