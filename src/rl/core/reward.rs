//! Reward Functions
//!
//! Per-step reward signals for the trading environment.

use tracing::warn;

/// Standard deviation below which the Sharpe-like ratio is not computed
pub const MIN_RETURN_STD: f64 = 1e-8;

/// Information needed to compute a reward for one step
#[derive(Debug, Clone, Copy)]
pub struct RewardTransition<'a> {
    /// Fractional balance change over this step
    pub step_return: f64,
    /// Every step return of the episode so far, including this one
    pub episode_returns: &'a [f64],
}

/// Trait for computing rewards
pub trait RewardFunction: Send + Sync {
    /// Compute the reward for a transition
    fn compute(&self, transition: &RewardTransition<'_>) -> f64;

    /// Whether the environment must keep the per-episode return series
    fn tracks_returns(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str;
}

/// Reward equal to the raw step return
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleReturnReward;

impl RewardFunction for SimpleReturnReward {
    fn compute(&self, transition: &RewardTransition<'_>) -> f64 {
        sanitize(transition.step_return)
    }

    fn name(&self) -> &'static str {
        "simple_return"
    }
}

/// Intra-episode Sharpe-like reward
///
/// Once more than `min_returns` step returns have accumulated, the reward is
/// `mean(returns) / std(returns)` (population std). With a degenerate spread
/// the reward falls back to the step return, or 0 when the mean is also 0.
/// Below the threshold the reward is the step return.
#[derive(Debug, Clone, Copy)]
pub struct SharpeLikeReward {
    min_returns: usize,
}

impl SharpeLikeReward {
    pub fn new(min_returns: usize) -> Self {
        Self { min_returns }
    }

    pub fn min_returns(&self) -> usize {
        self.min_returns
    }
}

impl Default for SharpeLikeReward {
    fn default() -> Self {
        Self::new(5)
    }
}

impl RewardFunction for SharpeLikeReward {
    fn compute(&self, transition: &RewardTransition<'_>) -> f64 {
        let returns = transition.episode_returns;
        if returns.len() <= self.min_returns {
            return sanitize(transition.step_return);
        }

        let (mean, std) = mean_std(returns);
        let reward = if std > MIN_RETURN_STD {
            mean / std
        } else if mean != 0.0 {
            transition.step_return
        } else {
            0.0
        };
        sanitize(reward)
    }

    fn tracks_returns(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "sharpe_like"
    }
}

/// Build the reward function selected by the environment config
pub fn reward_for(use_risk_adjusted_rewards: bool, min_returns: usize) -> Box<dyn RewardFunction> {
    if use_risk_adjusted_rewards {
        Box::new(SharpeLikeReward::new(min_returns))
    } else {
        Box::new(SimpleReturnReward)
    }
}

/// Mean and population standard deviation
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn sanitize(reward: f64) -> f64 {
    if reward.is_finite() {
        reward
    } else {
        warn!(reward, "non-finite reward replaced with 0");
        0.0
    }
}
