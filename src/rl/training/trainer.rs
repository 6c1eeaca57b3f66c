//! Training Loop
//!
//! Episode state machine: train, validate every N episodes, checkpoint every
//! N episodes, keep the best model by validation profit, resume from the
//! latest checkpoint and stop cooperatively on cancellation.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use super::checkpointing::Checkpointer;
use super::evaluation::{evaluate_agent, EvaluationReport, EVALUATION_HISTORY_FILE};
use super::history::TrainingHistory;
use super::report::{save_trade_chart, write_training_report, BEST_TRADES_CHART};
use crate::coordination::shutdown::CancellationToken;
use crate::error::Result;
use crate::rl::algorithms::{model_file, Agent};
use crate::rl::config::TrainingConfig;
use crate::rl::environment::TradingEnvironment;

/// Model path (without extension) of the best validation model
pub const BEST_MODEL: &str = "best_model";
/// Model path (without extension) of the model after the last episode
pub const FINAL_MODEL: &str = "final_model";

/// Result of a single episode
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeResult {
    /// Sum of step rewards
    pub total_reward: f64,
    /// `balance - initial_balance` at episode end
    pub total_profit: f64,
    pub steps: usize,
    /// Steps where the position changed
    pub trades: usize,
    /// Replay loss (training episodes only)
    pub loss: Option<f32>,
}

/// What a completed run produced
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub best_model_path: Option<PathBuf>,
    pub final_model_path: PathBuf,
    pub history: TrainingHistory,
    pub best_validation_profit: Option<f64>,
}

/// Play one episode from `reset()` to `done`
///
/// With `training` the agent explores, every transition is remembered and
/// `replay()` runs once at the end. Otherwise actions are greedy and memory
/// is left untouched.
pub fn run_episode<A: Agent + ?Sized>(
    env: &mut TradingEnvironment,
    agent: &mut A,
    training: bool,
) -> Result<EpisodeResult> {
    let mut state = env.reset();
    let mut result = EpisodeResult::default();

    while !env.is_done() {
        let action = agent.act(&state, training);
        let step = env.step_discrete(action)?;

        result.total_reward += step.reward;
        result.steps += 1;
        if step.info.trade_executed {
            result.trades += 1;
        }
        if training {
            agent.remember(state, action, step.reward, step.observation.clone(), step.done);
        }
        state = step.observation;
    }

    if training {
        result.loss = Some(agent.replay()?);
    }
    result.total_profit = env.total_profit();
    Ok(result)
}

/// DQN training loop over a training and a validation environment
pub struct TrainingLoop<A: Agent> {
    config: TrainingConfig,
    run_dir: PathBuf,
    agent: A,
    train_env: TradingEnvironment,
    val_env: TradingEnvironment,
    checkpointer: Checkpointer,
    cancel: CancellationToken,
    history: TrainingHistory,
    best_val_profit: Option<f64>,
}

impl<A: Agent> TrainingLoop<A> {
    pub fn new(
        config: TrainingConfig,
        run_dir: impl Into<PathBuf>,
        agent: A,
        train_env: TradingEnvironment,
        val_env: TradingEnvironment,
    ) -> Self {
        let run_dir = run_dir.into();
        let checkpointer = Checkpointer::new(&run_dir).with_retention(config.keep_checkpoints);
        Self {
            config,
            run_dir,
            agent,
            train_env,
            val_env,
            checkpointer,
            cancel: CancellationToken::new(),
            history: TrainingHistory::new(),
            best_val_profit: None,
        }
    }

    /// Poll `token` at the top of every episode
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn into_agent(self) -> A {
        self.agent
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    pub fn checkpointer(&self) -> &Checkpointer {
        &self.checkpointer
    }

    /// Run until `config.episodes` episodes exist in the history
    ///
    /// Returns `Ok(None)` when cancelled; the last completed episode is
    /// checkpointed first. Failed episodes are logged, checkpointed and
    /// skipped. Checkpoint write failures abort the run.
    pub fn run(&mut self) -> Result<Option<TrainingOutcome>> {
        fs::create_dir_all(&self.run_dir)?;

        let start = self.resume()?;
        let total = self.config.episodes;
        let mut last_completed = start.checked_sub(1);

        info!(
            start,
            total,
            run_dir = %self.run_dir.display(),
            "Starting training"
        );

        for episode in start..total {
            if self.cancel.is_cancelled() {
                self.checkpoint_on_cancel(last_completed)?;
                return Ok(None);
            }

            match self.train_episode(episode) {
                Ok(()) => {
                    last_completed = Some(episode);
                    if episode % self.config.checkpoint_every.max(1) == 0 {
                        self.checkpointer.save(&self.agent, episode, &self.history)?;
                    }
                }
                Err(e) => {
                    error!(episode, error = %e, "Episode failed, checkpointing and continuing");
                    self.checkpointer.save(&self.agent, episode, &self.history)?;
                }
            }
        }

        self.finish().map(Some)
    }

    /// Restore the latest checkpoint and return the first episode to run
    fn resume(&mut self) -> Result<usize> {
        let Some(checkpoint) = self.checkpointer.load_latest()? else {
            info!("No checkpoint found, starting fresh");
            return Ok(0);
        };

        self.agent.load(&checkpoint.model_path)?;
        self.agent
            .set_exploration_rate(checkpoint.state.exploration_rate);
        self.history = checkpoint.history;
        self.best_val_profit = self.history.best_val_profit();

        info!(
            episode = checkpoint.state.episode,
            epsilon = checkpoint.state.exploration_rate,
            saved_at = %checkpoint.state.timestamp,
            "Resumed from checkpoint"
        );
        Ok(checkpoint.state.episode + 1)
    }

    fn checkpoint_on_cancel(&mut self, last_completed: Option<usize>) -> Result<()> {
        match last_completed {
            Some(episode) => {
                warn!(episode, "Training cancelled, saving checkpoint");
                self.checkpointer.save(&self.agent, episode, &self.history)?;
            }
            None => warn!("Training cancelled before any episode completed, nothing to checkpoint"),
        }
        Ok(())
    }

    fn train_episode(&mut self, episode: usize) -> Result<()> {
        let result = run_episode(&mut self.train_env, &mut self.agent, true)?;
        let epsilon = self.agent.exploration_rate();
        self.history
            .record_train(episode, result.total_reward, result.total_profit, epsilon);

        info!(
            episode = episode + 1,
            total = self.config.episodes,
            reward = result.total_reward,
            profit = result.total_profit,
            trades = result.trades,
            epsilon,
            loss = result.loss.unwrap_or_default(),
            "Episode finished"
        );

        if episode % self.config.validation_every.max(1) == 0 {
            self.validate(episode)?;
        }
        Ok(())
    }

    fn validate(&mut self, episode: usize) -> Result<()> {
        let result = run_episode(&mut self.val_env, &mut self.agent, false)?;
        self.history
            .record_validation(episode, result.total_reward, result.total_profit);
        info!(
            episode = episode + 1,
            reward = result.total_reward,
            profit = result.total_profit,
            "Validation"
        );

        let is_best = self
            .best_val_profit
            .map_or(true, |best| result.total_profit > best);
        if is_best {
            self.best_val_profit = Some(result.total_profit);
            self.save_best(episode)?;
        }
        Ok(())
    }

    fn save_best(&mut self, episode: usize) -> Result<()> {
        let best_path = self.run_dir.join(BEST_MODEL);
        self.agent.save(&best_path)?;
        info!(
            episode = episode + 1,
            profit = self.best_val_profit.unwrap_or_default(),
            "New best model saved"
        );

        // Chart before evaluation resets the validation environment
        save_trade_chart(
            &self.val_env,
            &self.run_dir.join(BEST_TRADES_CHART),
            &format!("Best validation episode {}", episode + 1),
        )?;

        if self.config.evaluation_episodes == 0 {
            return Ok(());
        }
        let report = evaluate_agent(
            &mut self.val_env,
            &mut self.agent,
            self.config.evaluation_episodes,
        )?;
        let report_path = self.run_dir.join(EVALUATION_HISTORY_FILE);
        let previous = EvaluationReport::load(&report_path).unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring unreadable evaluation history");
            None
        });
        report.log(previous.as_ref());
        report.save(&report_path)
    }

    fn finish(&mut self) -> Result<TrainingOutcome> {
        let final_model_path = self.run_dir.join(FINAL_MODEL);
        self.agent.save(&final_model_path)?;

        self.history.truncate_to_consistent();
        write_training_report(&self.run_dir, &self.history)?;

        let best = self.run_dir.join(BEST_MODEL);
        let best_model_path = model_file(&best).exists().then_some(best);
        debug!(best = ?best_model_path, "training outputs");

        info!(
            episodes = self.history.train_len(),
            best_validation_profit = self.best_val_profit.unwrap_or_default(),
            "Training complete"
        );

        Ok(TrainingOutcome {
            best_model_path,
            final_model_path,
            history: self.history.clone(),
            best_validation_profit: self.best_val_profit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TraderError;
    use crate::rl::algorithms::{history_file, MockAgent};
    use crate::rl::config::TradingEnvConfig;
    use crate::rl::data::FeatureFrame;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    const ROWS: usize = 12;
    const WINDOW: usize = 4;

    fn env() -> TradingEnvironment {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let rows = (0..ROWS).map(|i| vec![100.0 + i as f64, 0.5]).collect();
        let ts = (0..ROWS).map(|i| start + Duration::hours(i as i64)).collect();
        let frame =
            FeatureFrame::new(vec!["close".into(), "rsi".into()], rows, Some(ts)).unwrap();
        let mut config = TradingEnvConfig::with_features(["close", "rsi"]);
        config.window_size = WINDOW;
        TradingEnvironment::new(frame, config).unwrap()
    }

    fn training_config(episodes: usize) -> TrainingConfig {
        TrainingConfig {
            episodes,
            validation_every: 2,
            checkpoint_every: 2,
            evaluation_episodes: 1,
            ..Default::default()
        }
    }

    /// Agent that holds, saves stub files and never fails
    fn holding_agent() -> MockAgent {
        let mut agent = MockAgent::new();
        agent.expect_act().returning(|_, _| 3);
        agent.expect_remember().returning(|_, _, _, _, _| ());
        agent.expect_replay().returning(|| Ok(0.5));
        agent.expect_exploration_rate().return_const(0.5);
        agent.expect_save().returning(|path| {
            fs::write(model_file(path), b"weights")?;
            fs::write(history_file(path), b"{}")?;
            Ok(())
        });
        agent
    }

    #[test]
    fn test_run_episode_training_remembers_and_replays() {
        let mut env = env();
        let mut agent = MockAgent::new();
        agent.expect_act().withf(|_, training| *training).returning(|_, _| 6);
        agent
            .expect_remember()
            .times(ROWS - WINDOW)
            .returning(|_, _, _, _, _| ());
        agent.expect_replay().times(1).returning(|| Ok(1.25));

        let result = run_episode(&mut env, &mut agent, true).unwrap();
        assert_eq!(result.steps, ROWS - WINDOW);
        assert_eq!(result.trades, 1);
        assert_eq!(result.loss, Some(1.25));
        assert!(result.total_profit > 0.0);
    }

    #[test]
    fn test_run_episode_greedy_leaves_memory_alone() {
        let mut env = env();
        let mut agent = MockAgent::new();
        agent.expect_act().withf(|_, training| !*training).returning(|_, _| 3);
        agent.expect_remember().times(0);
        agent.expect_replay().times(0);

        let result = run_episode(&mut env, &mut agent, false).unwrap();
        assert_eq!(result.total_profit, 0.0);
        assert_eq!(result.loss, None);
    }

    #[test]
    fn test_invalid_action_fails_episode() {
        let mut env = env();
        let mut agent = MockAgent::new();
        agent.expect_act().returning(|_, _| 9);
        let err = run_episode(&mut env, &mut agent, true).unwrap_err();
        assert!(matches!(err, TraderError::InvalidAction { index: 9, .. }));
    }

    #[test]
    fn test_full_run_writes_artifacts() {
        let dir = tempdir().unwrap();
        let mut training = TrainingLoop::new(training_config(5), dir.path(), holding_agent(), env(), env());

        let outcome = training.run().unwrap().unwrap();
        assert_eq!(outcome.history.train_len(), 5);
        assert_eq!(outcome.history.val_episodes, vec![0, 2, 4]);
        assert_eq!(outcome.best_validation_profit, Some(0.0));
        assert_eq!(outcome.best_model_path, Some(dir.path().join(BEST_MODEL)));
        assert_eq!(training.checkpointer().list_episodes(), vec![0, 2, 4]);
        for file in [
            "final_model.mpk",
            "training_history.csv",
            "training_history.svg",
            "exploration_rate.svg",
            "best_validation_trades.svg",
            EVALUATION_HISTORY_FILE,
        ] {
            assert!(dir.path().join(file).exists(), "missing {file}");
        }
    }

    #[test]
    fn test_cancel_before_first_episode_skips_checkpoint() {
        let dir = tempdir().unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let mut agent = MockAgent::new();
        agent.expect_save().times(0);
        agent.expect_act().times(0);

        let mut training = TrainingLoop::new(training_config(5), dir.path(), agent, env(), env())
            .with_cancellation(token);
        assert!(training.run().unwrap().is_none());
        assert!(training.checkpointer().list_episodes().is_empty());
    }

    #[test]
    fn test_cancel_checkpoints_last_completed_episode() {
        let dir = tempdir().unwrap();
        let token = CancellationToken::new();
        let trigger = token.clone();
        let replays = Arc::new(AtomicUsize::new(0));

        let mut agent = MockAgent::new();
        agent.expect_act().returning(|_, _| 3);
        agent.expect_remember().returning(|_, _, _, _, _| ());
        agent.expect_exploration_rate().return_const(0.5);
        agent.expect_save().returning(|path| {
            fs::write(model_file(path), b"weights")?;
            Ok(())
        });
        let counter = Arc::clone(&replays);
        agent.expect_replay().returning(move || {
            // Cancel while episode 1 is running
            if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                trigger.cancel();
            }
            Ok(0.0)
        });

        let mut training = TrainingLoop::new(training_config(10), dir.path(), agent, env(), env())
            .with_cancellation(token);
        assert!(training.run().unwrap().is_none());
        assert_eq!(replays.load(Ordering::SeqCst), 2);
        assert_eq!(training.checkpointer().list_episodes(), vec![0, 1]);
        assert_eq!(training.history().train_len(), 2);
    }

    #[test]
    fn test_failed_episode_is_checkpointed_and_skipped() {
        let dir = tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut agent = MockAgent::new();
        agent.expect_act().returning(|_, _| 3);
        agent.expect_remember().returning(|_, _, _, _, _| ());
        agent.expect_exploration_rate().return_const(0.5);
        agent.expect_save().returning(|path| {
            fs::write(model_file(path), b"weights")?;
            Ok(())
        });
        let counter = Arc::clone(&calls);
        agent.expect_replay().returning(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                Err(TraderError::Model("nan in loss".into()))
            } else {
                Ok(0.0)
            }
        });

        let mut training = TrainingLoop::new(training_config(4), dir.path(), agent, env(), env());
        let outcome = training.run().unwrap().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(outcome.history.train_len(), 3);
        assert!(training.checkpointer().exists(1));

        let rows = outcome.history.rows();
        let episodes: Vec<usize> = rows.iter().map(|r| r.episode).collect();
        assert_eq!(episodes, vec![0, 2, 3]);
        assert_eq!(outcome.history.val_episodes, vec![0, 2]);
        assert!(rows[1].val_profit.is_some());
        assert!(rows[2].val_profit.is_none());
    }

    #[test]
    fn test_checkpoint_failure_aborts_run() {
        let dir = tempdir().unwrap();
        let mut agent = MockAgent::new();
        agent.expect_act().returning(|_, _| 3);
        agent.expect_remember().returning(|_, _, _, _, _| ());
        agent.expect_replay().returning(|| Ok(0.0));
        agent.expect_exploration_rate().return_const(0.5);
        agent
            .expect_save()
            .returning(|_| Err(TraderError::Checkpoint("read-only".into())));

        let mut training = TrainingLoop::new(training_config(4), dir.path(), agent, env(), env());
        assert!(training.run().is_err());
    }

    #[test]
    fn test_resume_continues_after_checkpoint() {
        let dir = tempdir().unwrap();
        let mut first = TrainingLoop::new(training_config(3), dir.path(), holding_agent(), env(), env());
        first.run().unwrap().unwrap();

        let mut agent = holding_agent();
        agent
            .expect_load()
            .withf(|path| path.ends_with("model_episode_2"))
            .times(1)
            .returning(|_| Ok(()));
        agent
            .expect_set_exploration_rate()
            .withf(|rate| (*rate - 0.5).abs() < 1e-12)
            .times(1)
            .return_const(());

        let mut resumed = TrainingLoop::new(training_config(6), dir.path(), agent, env(), env());
        let outcome = resumed.run().unwrap().unwrap();
        assert_eq!(outcome.history.train_len(), 6);
        assert_eq!(outcome.history.val_episodes, vec![0, 2, 4]);
    }
}
