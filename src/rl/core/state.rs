//! State Representation
//!
//! Flattens a sliding window of feature rows plus account features into the
//! observation vector fed to the Q-network.

use serde::{Deserialize, Serialize};
use tracing::error;

/// Account features appended after the feature window
pub const ACCOUNT_FEATURES: usize = 2;

/// Account state visible to the agent
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AccountObservation {
    pub balance: f64,
    pub initial_balance: f64,
    pub position: f64,
}

/// Trait for encoding a window of rows into a state vector
pub trait StateEncoder: Send + Sync {
    /// Encode `window` (row-major, all features of row t then t+1) and the account
    fn encode(&self, window: &[f64], account: &AccountObservation) -> Vec<f32>;

    /// Get the output dimension
    fn output_dim(&self) -> usize;
}

/// Row-major window encoder
#[derive(Debug, Clone)]
pub struct WindowStateEncoder {
    num_features: usize,
    window_size: usize,
    max_balance_ratio: f64,
}

impl WindowStateEncoder {
    pub fn new(num_features: usize, window_size: usize, max_balance_ratio: f64) -> Self {
        Self {
            num_features,
            window_size,
            max_balance_ratio,
        }
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// `clip(balance / initial_balance, 0, max_balance_ratio)`
    pub fn balance_ratio(&self, account: &AccountObservation) -> f64 {
        if account.initial_balance <= 0.0 {
            return 0.0;
        }
        let ratio = account.balance / account.initial_balance;
        if ratio.is_finite() {
            ratio.clamp(0.0, self.max_balance_ratio)
        } else {
            0.0
        }
    }
}

impl StateEncoder for WindowStateEncoder {
    fn encode(&self, window: &[f64], account: &AccountObservation) -> Vec<f32> {
        let expected = self.output_dim();
        let mut features = Vec::with_capacity(expected);

        features.extend(window.iter().map(|v| *v as f32));
        features.push(self.balance_ratio(account) as f32);
        features.push(account.position as f32);

        if features.len() != expected {
            // Fallback only: a mismatch means the frame and schema disagree
            error!(
                expected,
                actual = features.len(),
                "state shape mismatch, padding/truncating observation"
            );
            features.resize(expected, 0.0);
        }

        features
    }

    fn output_dim(&self) -> usize {
        self.num_features * self.window_size + ACCOUNT_FEATURES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(balance: f64, position: f64) -> AccountObservation {
        AccountObservation {
            balance,
            initial_balance: 1000.0,
            position,
        }
    }

    #[test]
    fn test_row_major_layout() {
        let encoder = WindowStateEncoder::new(2, 2, 10.0);
        let window = [1.0, 2.0, 3.0, 4.0];
        let state = encoder.encode(&window, &account(500.0, -0.25));
        assert_eq!(state, vec![1.0, 2.0, 3.0, 4.0, 0.5, -0.25]);
        assert_eq!(state.len(), encoder.output_dim());
    }

    #[test]
    fn test_balance_ratio_clipped() {
        let encoder = WindowStateEncoder::new(1, 1, 10.0);
        let state = encoder.encode(&[0.0], &account(50_000.0, 0.0));
        assert_eq!(state[1], 10.0);
        let state = encoder.encode(&[0.0], &account(-10.0, 0.0));
        assert_eq!(state[1], 0.0);
    }

    #[test]
    fn test_mismatch_is_padded_or_truncated() {
        let encoder = WindowStateEncoder::new(2, 2, 10.0);
        let short = encoder.encode(&[1.0, 2.0], &account(1000.0, 0.0));
        assert_eq!(short.len(), 6);
        let long = encoder.encode(&[1.0; 7], &account(1000.0, 0.0));
        assert_eq!(long.len(), 6);
    }
}
