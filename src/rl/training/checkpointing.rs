//! Model Checkpointing
//!
//! Resumable training state under `<run_dir>/checkpoints`:
//! `model_episode_{N}.mpk`, `history_episode_{N}.json` and
//! `state_episode_{N}.json`. The state file is written last and marks a
//! complete checkpoint.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::history::TrainingHistory;
use crate::error::{Result, TraderError};
use crate::rl::algorithms::{history_file, model_file, Agent};

/// Checkpoint directory name inside a run directory
pub const CHECKPOINT_DIR: &str = "checkpoints";

const STATE_PREFIX: &str = "state_episode_";

/// Contents of `state_episode_{N}.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub episode: usize,
    pub exploration_rate: f64,
    pub timestamp: String,
}

/// A checkpoint found on disk
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub state: CheckpointState,
    /// Model path without extension, as passed to `Agent::load`
    pub model_path: PathBuf,
    pub history: TrainingHistory,
}

/// Checkpointer for saving and loading training state
#[derive(Debug, Clone)]
pub struct Checkpointer {
    /// Directory for checkpoints
    checkpoint_dir: PathBuf,
    /// Maximum checkpoints to keep (None keeps all)
    max_checkpoints: Option<usize>,
}

impl Checkpointer {
    /// Checkpointer for a run directory
    pub fn new<P: AsRef<Path>>(run_dir: P) -> Self {
        Self {
            checkpoint_dir: run_dir.as_ref().join(CHECKPOINT_DIR),
            max_checkpoints: None,
        }
    }

    /// Keep only the newest `max` checkpoints
    pub fn with_retention(mut self, max: Option<usize>) -> Self {
        self.max_checkpoints = max.filter(|m| *m > 0);
        self
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    /// Model path (without extension) for an episode
    pub fn model_path(&self, episode: usize) -> PathBuf {
        self.checkpoint_dir.join(format!("model_episode_{episode}"))
    }

    pub fn history_path(&self, episode: usize) -> PathBuf {
        self.checkpoint_dir
            .join(format!("history_episode_{episode}.json"))
    }

    pub fn state_path(&self, episode: usize) -> PathBuf {
        self.checkpoint_dir.join(format!("{STATE_PREFIX}{episode}.json"))
    }

    /// Persist agent weights, history and state for `episode`
    ///
    /// History arrays are truncated to consistent lengths before writing.
    /// Failures are logged and returned.
    pub fn save<A: Agent + ?Sized>(
        &self,
        agent: &A,
        episode: usize,
        history: &TrainingHistory,
    ) -> Result<PathBuf> {
        self.write(agent, episode, history).map_err(|e| {
            error!(episode, error = %e, "failed to write checkpoint");
            e
        })
    }

    fn write<A: Agent + ?Sized>(
        &self,
        agent: &A,
        episode: usize,
        history: &TrainingHistory,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.checkpoint_dir)?;

        let mut history = history.clone();
        history.truncate_to_consistent();

        let model_path = self.model_path(episode);
        agent.save(&model_path)?;

        serde_json::to_writer(File::create(self.history_path(episode))?, &history)?;

        let state = CheckpointState {
            episode,
            exploration_rate: agent.exploration_rate(),
            timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        let state_path = self.state_path(episode);
        serde_json::to_writer_pretty(File::create(&state_path)?, &state)?;

        info!(episode, epsilon = state.exploration_rate, "Saved checkpoint");

        self.cleanup_old_checkpoints();
        Ok(state_path)
    }

    /// Episodes with a state file, ascending
    pub fn list_episodes(&self) -> Vec<usize> {
        let mut episodes = Vec::new();

        if let Ok(entries) = fs::read_dir(&self.checkpoint_dir) {
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Some(episode) = parse_state_episode(name) {
                        episodes.push(episode);
                    }
                }
            }
        }

        episodes.sort_unstable();
        episodes
    }

    /// Latest checkpoint episode
    pub fn latest_episode(&self) -> Option<usize> {
        self.list_episodes().into_iter().last()
    }

    /// Load the checkpoint for `episode`
    pub fn load(&self, episode: usize) -> Result<Checkpoint> {
        let state: CheckpointState = read_json(&self.state_path(episode))?;
        let model_path = self.model_path(episode);
        if !model_file(&model_path).exists() {
            return Err(TraderError::Checkpoint(format!(
                "checkpoint {episode} has no model file"
            )));
        }

        let history_path = self.history_path(episode);
        let mut history = if history_path.exists() {
            read_json(&history_path)?
        } else {
            warn!(episode, "checkpoint has no history file, starting empty history");
            TrainingHistory::default()
        };
        history.truncate_to_consistent();

        Ok(Checkpoint {
            state,
            model_path,
            history,
        })
    }

    /// Load the most recent checkpoint, if any
    pub fn load_latest(&self) -> Result<Option<Checkpoint>> {
        match self.latest_episode() {
            Some(episode) => self.load(episode).map(Some),
            None => Ok(None),
        }
    }

    /// Check if a checkpoint exists
    pub fn exists(&self, episode: usize) -> bool {
        self.state_path(episode).exists()
    }

    /// Cleanup old checkpoints keeping only max_checkpoints
    fn cleanup_old_checkpoints(&self) {
        let Some(max) = self.max_checkpoints else {
            return;
        };
        let episodes = self.list_episodes();
        if episodes.len() <= max {
            return;
        }

        let to_remove = episodes.len() - max;
        for episode in episodes.into_iter().take(to_remove) {
            let model = self.model_path(episode);
            // State first so a half-removed checkpoint is never picked up
            for path in [
                self.state_path(episode),
                self.history_path(episode),
                model_file(&model),
                history_file(&model),
            ] {
                if let Err(e) = fs::remove_file(&path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove old checkpoint file {:?}: {}", path, e);
                    }
                }
            }
            info!(episode, "Removed old checkpoint");
        }
    }
}

fn parse_state_episode(name: &str) -> Option<usize> {
    name.strip_prefix(STATE_PREFIX)?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)
        .map_err(|e| TraderError::Checkpoint(format!("failed to open {}: {e}", path.display())))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Generate a run directory name: `{symbol}_{timeframe}_{YYYYmmdd_HHMMSS}`
pub fn run_dir_name(symbol: &str, timeframe: &str) -> String {
    let now = chrono::Local::now();
    format!(
        "{}_{}_{}",
        symbol.replace('/', ""),
        timeframe,
        now.format("%Y%m%d_%H%M%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::algorithms::MockAgent;
    use tempfile::tempdir;

    fn mock_agent(epsilon: f64) -> MockAgent {
        let mut agent = MockAgent::new();
        agent.expect_save().returning(|path| {
            fs::write(model_file(path), b"weights")?;
            fs::write(history_file(path), b"{}")?;
            Ok(())
        });
        agent.expect_exploration_rate().return_const(epsilon);
        agent
    }

    #[test]
    fn test_checkpoint_paths() {
        let checkpointer = Checkpointer::new("/tmp/run");
        assert_eq!(
            checkpointer.model_path(10),
            PathBuf::from("/tmp/run/checkpoints/model_episode_10")
        );
        assert!(checkpointer
            .state_path(10)
            .ends_with("checkpoints/state_episode_10.json"));
    }

    #[test]
    fn test_parse_state_episode() {
        assert_eq!(parse_state_episode("state_episode_120.json"), Some(120));
        assert_eq!(parse_state_episode("state_episode_x.json"), None);
        assert_eq!(parse_state_episode("history_episode_3.json"), None);
    }

    #[test]
    fn test_save_and_load_latest() {
        let dir = tempdir().unwrap();
        let checkpointer = Checkpointer::new(dir.path());
        assert!(checkpointer.load_latest().unwrap().is_none());

        let mut history = TrainingHistory::new();
        history.record_train(0, 1.0, 2.0, 0.9);
        history.record_validation(0, 0.5, 1.5);

        checkpointer.save(&mock_agent(0.9), 0, &history).unwrap();
        history.record_train(10, 3.0, 4.0, 0.8);
        checkpointer.save(&mock_agent(0.8), 10, &history).unwrap();

        let latest = checkpointer.load_latest().unwrap().unwrap();
        assert_eq!(latest.state.episode, 10);
        assert_eq!(latest.state.exploration_rate, 0.8);
        assert_eq!(latest.history, history);
        assert_eq!(checkpointer.list_episodes(), vec![0, 10]);
    }

    #[test]
    fn test_retention() {
        let dir = tempdir().unwrap();
        let checkpointer = Checkpointer::new(dir.path()).with_retention(Some(2));
        let history = TrainingHistory::new();
        for episode in [0, 10, 20] {
            checkpointer.save(&mock_agent(0.5), episode, &history).unwrap();
        }
        assert_eq!(checkpointer.list_episodes(), vec![10, 20]);
        assert!(!model_file(&checkpointer.model_path(0)).exists());
    }

    #[test]
    fn test_save_error_is_returned() {
        let dir = tempdir().unwrap();
        let checkpointer = Checkpointer::new(dir.path());
        let mut agent = MockAgent::new();
        agent
            .expect_save()
            .returning(|_| Err(TraderError::Checkpoint("disk full".into())));
        agent.expect_exploration_rate().return_const(0.5);
        assert!(checkpointer
            .save(&agent, 3, &TrainingHistory::new())
            .is_err());
        assert!(!checkpointer.exists(3));
    }

    #[test]
    fn test_run_dir_name() {
        let name = run_dir_name("BTC/USDT", "1h");
        assert!(name.starts_with("BTCUSDT_1h_"));
        assert_eq!(name.len(), "BTCUSDT_1h_".len() + 15);
    }
}
