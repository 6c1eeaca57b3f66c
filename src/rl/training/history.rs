//! Training History
//!
//! Episode-level arrays recorded by the training loop and persisted with
//! every checkpoint.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// Episode-level training history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub train_rewards: Vec<f64>,
    pub val_rewards: Vec<f64>,
    pub train_profits: Vec<f64>,
    pub val_profits: Vec<f64>,
    pub exploration_rates: Vec<f64>,
    /// Episode index of each training entry; failed episodes leave gaps
    #[serde(default)]
    pub train_episodes: Vec<usize>,
    /// Episode index of each validation entry
    #[serde(default)]
    pub val_episodes: Vec<usize>,
}

/// One row of `training_history.csv`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub episode: usize,
    pub train_reward: f64,
    pub train_profit: f64,
    pub exploration_rate: f64,
    pub val_reward: Option<f64>,
    pub val_profit: Option<f64>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_train(
        &mut self,
        episode: usize,
        reward: f64,
        profit: f64,
        exploration_rate: f64,
    ) {
        self.train_episodes.push(episode);
        self.train_rewards.push(reward);
        self.train_profits.push(profit);
        self.exploration_rates.push(exploration_rate);
    }

    pub fn record_validation(&mut self, episode: usize, reward: f64, profit: f64) {
        self.val_rewards.push(reward);
        self.val_profits.push(profit);
        self.val_episodes.push(episode);
    }

    /// Completed training episodes
    pub fn train_len(&self) -> usize {
        self.train_rewards.len()
    }

    pub fn val_len(&self) -> usize {
        self.val_rewards.len()
    }

    /// Truncate each group of arrays to its shortest member
    ///
    /// Training arrays grow once per episode and validation arrays once per
    /// validation run, so each group is aligned separately. Returns whether
    /// anything was cut (a partial write).
    pub fn truncate_to_consistent(&mut self) -> bool {
        let train_len = self.aligned_train_len();
        let mut val_len = self.val_rewards.len().min(self.val_profits.len());
        let legacy_val_index = self.val_episodes.is_empty() && val_len > 0;
        if !legacy_val_index {
            val_len = val_len.min(self.val_episodes.len());
        }

        let before = self.lengths();
        self.train_episodes.truncate(train_len);
        self.train_rewards.truncate(train_len);
        self.train_profits.truncate(train_len);
        self.exploration_rates.truncate(train_len);
        self.val_rewards.truncate(val_len);
        self.val_profits.truncate(val_len);
        self.val_episodes.truncate(val_len);

        let cut = before != self.lengths();
        if cut {
            warn!(
                ?before,
                after = ?self.lengths(),
                "training history arrays had inconsistent lengths, truncated"
            );
        }
        cut
    }

    /// Shortest training array; histories written before `train_episodes`
    /// existed are indexed by position
    fn aligned_train_len(&self) -> usize {
        let len = self
            .train_rewards
            .len()
            .min(self.train_profits.len())
            .min(self.exploration_rates.len());
        let legacy_train_index = self.train_episodes.is_empty() && len > 0;
        if legacy_train_index {
            len
        } else {
            len.min(self.train_episodes.len())
        }
    }

    fn train_episode(&self, index: usize) -> usize {
        self.train_episodes.get(index).copied().unwrap_or(index)
    }

    fn lengths(&self) -> [usize; 7] {
        [
            self.train_episodes.len(),
            self.train_rewards.len(),
            self.val_rewards.len(),
            self.train_profits.len(),
            self.val_profits.len(),
            self.exploration_rates.len(),
            self.val_episodes.len(),
        ]
    }

    /// Highest validation profit so far
    pub fn best_val_profit(&self) -> Option<f64> {
        self.val_profits
            .iter()
            .copied()
            .filter(|p| p.is_finite())
            .fold(None, |best, p| Some(best.map_or(p, |b: f64| b.max(p))))
    }

    /// Flatten into per-episode rows with validation columns filled on
    /// validation episodes
    pub fn rows(&self) -> Vec<HistoryRow> {
        (0..self.aligned_train_len())
            .map(|index| {
                let episode = self.train_episode(index);
                let val_idx = self.val_episodes.iter().position(|e| *e == episode);
                HistoryRow {
                    episode,
                    train_reward: self.train_rewards[index],
                    train_profit: self.train_profits[index],
                    exploration_rate: self.exploration_rates[index],
                    val_reward: val_idx.and_then(|i| self.val_rewards.get(i).copied()),
                    val_profit: val_idx.and_then(|i| self.val_profits.get(i).copied()),
                }
            })
            .collect()
    }

    /// Write `training_history.csv`
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for row in self.rows() {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> TrainingHistory {
        let mut history = TrainingHistory::new();
        for episode in 0..12 {
            history.record_train(episode, episode as f64, 10.0 * episode as f64, 0.9);
            if episode % 10 == 0 {
                history.record_validation(episode, 1.0, episode as f64 - 5.0);
            }
        }
        history
    }

    #[test]
    fn test_truncation_is_per_group() {
        let mut history = sample();
        assert!(!history.truncate_to_consistent());
        assert_eq!(history.train_len(), 12);
        assert_eq!(history.val_len(), 2);

        history.train_rewards.push(1.0);
        history.val_profits.push(3.0);
        assert!(history.truncate_to_consistent());
        assert_eq!(history.train_rewards.len(), 12);
        assert_eq!(history.train_episodes.len(), 12);
        assert_eq!(history.val_profits.len(), 2);
    }

    #[test]
    fn test_best_val_profit() {
        assert_eq!(sample().best_val_profit(), Some(5.0));
        assert_eq!(TrainingHistory::new().best_val_profit(), None);
    }

    #[test]
    fn test_rows_align_validation() {
        let rows = sample().rows();
        assert_eq!(rows.len(), 12);
        assert_eq!(rows[0].val_profit, Some(-5.0));
        assert_eq!(rows[1].val_profit, None);
        assert_eq!(rows[10].val_reward, Some(1.0));
    }

    #[test]
    fn test_rows_keep_episode_numbers_across_gaps() {
        let mut history = TrainingHistory::new();
        for episode in [0, 2, 3] {
            history.record_train(episode, episode as f64, 100.0 + episode as f64, 0.9);
        }
        history.record_validation(0, 1.0, 10.0);
        history.record_validation(2, 2.0, 20.0);

        let rows = history.rows();
        let episodes: Vec<usize> = rows.iter().map(|r| r.episode).collect();
        assert_eq!(episodes, vec![0, 2, 3]);
        assert_eq!(rows[1].train_profit, 102.0);
        assert_eq!(rows[1].val_profit, Some(20.0));
        assert_eq!(rows[2].train_profit, 103.0);
        assert_eq!(rows[2].val_profit, None);
    }

    #[test]
    fn test_csv_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("training_history.csv");
        sample().write_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("episode,train_reward,train_profit,exploration_rate,val_reward,val_profit")
        );
        assert_eq!(lines.count(), 12);
    }

    #[test]
    fn test_json_without_val_episodes() {
        let json = r#"{"train_rewards":[1.0],"val_rewards":[2.0],"train_profits":[3.0],
            "val_profits":[4.0],"exploration_rates":[0.5]}"#;
        let mut history: TrainingHistory = serde_json::from_str(json).unwrap();
        assert!(!history.truncate_to_consistent());
        assert_eq!(history.val_len(), 1);
        assert_eq!(history.rows()[0].episode, 0);
    }
}
