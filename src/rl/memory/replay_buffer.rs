//! Replay Buffer
//!
//! Bounded FIFO experience replay for off-policy learning.

use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::warn;

/// A single transition in the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// State features before action
    pub state: Vec<f32>,
    /// Discrete action index taken
    pub action: usize,
    /// Reward received (always finite)
    pub reward: f32,
    /// Next state features
    pub next_state: Vec<f32>,
    /// Whether episode terminated
    pub done: bool,
}

impl Transition {
    /// Create a new transition; a non-finite reward is stored as 0
    pub fn new(state: Vec<f32>, action: usize, reward: f64, next_state: Vec<f32>, done: bool) -> Self {
        let reward = if reward.is_finite() {
            reward as f32
        } else {
            warn!(reward, "non-finite reward stored as 0");
            0.0
        };
        Self {
            state,
            action,
            reward,
            next_state,
            done,
        }
    }
}

/// Column-wise view of a sampled batch
#[derive(Debug, Clone, Default)]
pub struct TransitionBatch {
    /// Row-major `[batch, state_size]`
    pub states: Vec<f32>,
    pub actions: Vec<usize>,
    pub rewards: Vec<f32>,
    /// Row-major `[batch, state_size]`
    pub next_states: Vec<f32>,
    /// 1.0 for terminal transitions
    pub dones: Vec<f32>,
}

impl TransitionBatch {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Replay buffer for experience storage
#[derive(Debug)]
pub struct ReplayBuffer {
    /// Storage for transitions
    buffer: VecDeque<Transition>,
    /// Maximum capacity
    capacity: usize,
}

impl ReplayBuffer {
    /// Create a new replay buffer with given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a transition, evicting the oldest when full
    pub fn push(&mut self, transition: Transition) {
        if self.capacity == 0 {
            return;
        }
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(transition);
    }

    /// Sample up to `batch_size` distinct transitions uniformly at random
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Vec<&Transition> {
        let amount = batch_size.min(self.buffer.len());
        index::sample(rng, self.buffer.len(), amount)
            .into_iter()
            .map(|i| &self.buffer[i])
            .collect()
    }

    /// Stack transitions into flat columns
    pub fn to_batch(batch: &[&Transition]) -> TransitionBatch {
        let mut out = TransitionBatch::default();
        for t in batch {
            out.states.extend_from_slice(&t.state);
            out.actions.push(t.action);
            out.rewards.push(t.reward);
            out.next_states.extend_from_slice(&t.next_state);
            out.dones.push(if t.done { 1.0 } else { 0.0 });
        }
        out
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buffer.iter()
    }

    /// Clear all transitions
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Get current number of transitions
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn transition(i: usize) -> Transition {
        Transition::new(vec![i as f32], i % 7, i as f64, vec![i as f32 + 1.0], false)
    }

    #[test]
    fn test_fifo_eviction() {
        let mut buffer = ReplayBuffer::new(5);
        for i in 0..8 {
            buffer.push(transition(i));
        }
        assert_eq!(buffer.len(), 5);
        let kept: Vec<f32> = buffer.iter().map(|t| t.state[0]).collect();
        assert_eq!(kept, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_sample_without_replacement() {
        let mut buffer = ReplayBuffer::new(100);
        for i in 0..50 {
            buffer.push(transition(i));
        }
        let mut rng = StdRng::seed_from_u64(7);
        let batch = buffer.sample(32, &mut rng);
        assert_eq!(batch.len(), 32);
        let unique: HashSet<u32> = batch.iter().map(|t| t.state[0] as u32).collect();
        assert_eq!(unique.len(), 32);

        assert_eq!(buffer.sample(500, &mut rng).len(), 50);
    }

    #[test]
    fn test_non_finite_reward_coerced() {
        let t = Transition::new(vec![0.0], 0, f64::NAN, vec![0.0], true);
        assert_eq!(t.reward, 0.0);
        let t = Transition::new(vec![0.0], 0, f64::NEG_INFINITY, vec![0.0], true);
        assert_eq!(t.reward, 0.0);
    }

    #[test]
    fn test_to_batch_columns() {
        let a = Transition::new(vec![1.0, 2.0], 3, 0.5, vec![3.0, 4.0], false);
        let b = Transition::new(vec![5.0, 6.0], 1, -0.5, vec![7.0, 8.0], true);
        let batch = ReplayBuffer::to_batch(&[&a, &b]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.states, vec![1.0, 2.0, 5.0, 6.0]);
        assert_eq!(batch.actions, vec![3, 1]);
        assert_eq!(batch.dones, vec![0.0, 1.0]);
    }
}
