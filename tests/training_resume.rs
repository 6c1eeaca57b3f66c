//! Training loop with the real DQN agent: resume parity and saved artifacts.

use burn_ndarray::NdArrayDevice;
use chrono::{Duration, TimeZone, Utc};
use dqtrade::rl::training::{Checkpointer, BEST_MODEL, FINAL_MODEL};
use dqtrade::rl::{
    build_dqn_agent, Agent, DefaultBackend, DqnConfig, FeatureFrame, TradingEnvConfig,
    TradingEnvironment, TrainingConfig, TrainingLoop,
};
use tempfile::tempdir;

const WINDOW: usize = 5;

fn frame(rows: usize, phase: f64) -> FeatureFrame {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let values = (0..rows)
        .map(|i| {
            let t = i as f64 + phase;
            vec![100.0 + 5.0 * (t / 3.0).sin(), 0.5 + 0.4 * (t / 5.0).cos()]
        })
        .collect();
    let timestamps = (0..rows).map(|i| start + Duration::hours(i as i64)).collect();
    FeatureFrame::new(vec!["close".into(), "rsi_14".into()], values, Some(timestamps)).unwrap()
}

fn envs() -> (TradingEnvironment, TradingEnvironment) {
    let mut config = TradingEnvConfig::with_features(["close", "rsi_14"]);
    config.window_size = WINDOW;
    (
        TradingEnvironment::new(frame(40, 0.0), config.clone()).unwrap(),
        TradingEnvironment::new(frame(20, 40.0), config).unwrap(),
    )
}

fn agent_config() -> DqnConfig {
    DqnConfig {
        exploration_decay: 0.9,
        batch_size: 8,
        memory_size: 500,
        update_target_every: 3,
        hidden_dim: 16,
        second_hidden_dim: 8,
        seed: Some(11),
        ..Default::default()
    }
}

fn training_loop(
    episodes: usize,
    run_dir: &std::path::Path,
) -> TrainingLoop<impl Agent> {
    let (train_env, val_env) = envs();
    let agent = build_dqn_agent::<DefaultBackend>(
        agent_config(),
        train_env.state_size(),
        NdArrayDevice::default(),
    )
    .unwrap();
    let config = TrainingConfig {
        episodes,
        validation_every: 10,
        checkpoint_every: 10,
        evaluation_episodes: 1,
        ..Default::default()
    };
    TrainingLoop::new(config, run_dir, agent, train_env, val_env)
}

#[test]
fn resumed_run_matches_uninterrupted_run() {
    let straight_dir = tempdir().unwrap();
    let mut straight = training_loop(20, straight_dir.path());
    let straight_outcome = straight.run().unwrap().unwrap();

    let resumed_dir = tempdir().unwrap();
    let mut first_half = training_loop(11, resumed_dir.path());
    first_half.run().unwrap().unwrap();
    assert_eq!(
        Checkpointer::new(resumed_dir.path()).latest_episode(),
        Some(10)
    );

    let mut second_half = training_loop(20, resumed_dir.path());
    let resumed_outcome = second_half.run().unwrap().unwrap();

    let expected_epsilon = 0.9f64.powi(20);
    let straight_epsilon = straight.agent().exploration_rate();
    let resumed_epsilon = second_half.agent().exploration_rate();
    assert!((straight_epsilon - expected_epsilon).abs() < 1e-12);
    assert!((straight_epsilon - resumed_epsilon).abs() < 1e-12);

    let (a, b) = (&straight_outcome.history, &resumed_outcome.history);
    assert_eq!(a.train_len(), 20);
    assert_eq!(a.train_len(), b.train_len());
    assert_eq!(a.val_len(), b.val_len());
    assert_eq!(a.exploration_rates.len(), b.exploration_rates.len());
    assert_eq!(a.val_episodes, vec![0, 10]);
    assert_eq!(a.val_episodes, b.val_episodes);
}

#[test]
fn run_directory_holds_models_history_and_charts() {
    let dir = tempdir().unwrap();
    let mut training = training_loop(3, dir.path());
    let outcome = training.run().unwrap().unwrap();

    assert_eq!(outcome.final_model_path, dir.path().join(FINAL_MODEL));
    assert_eq!(outcome.best_model_path, Some(dir.path().join(BEST_MODEL)));
    assert!(outcome.best_validation_profit.is_some());
    for file in [
        "final_model.mpk",
        "final_model.history.json",
        "best_model.mpk",
        "training_history.csv",
        "training_history.svg",
        "exploration_rate.svg",
        "best_validation_trades.svg",
        "evaluation_history.json",
        "checkpoints/model_episode_0.mpk",
        "checkpoints/history_episode_0.json",
        "checkpoints/state_episode_0.json",
    ] {
        assert!(dir.path().join(file).exists(), "missing {file}");
    }

    let csv = std::fs::read_to_string(dir.path().join("training_history.csv")).unwrap();
    assert_eq!(csv.lines().count(), 4);
}

#[test]
fn final_model_reloads_with_identical_predictions() {
    let dir = tempdir().unwrap();
    let mut training = training_loop(2, dir.path());
    let outcome = training.run().unwrap().unwrap();
    let trained = training.into_agent();

    let (env, _) = envs();
    let mut restored = build_dqn_agent::<DefaultBackend>(
        agent_config(),
        env.state_size(),
        NdArrayDevice::default(),
    )
    .unwrap();
    restored.load(&outcome.final_model_path).unwrap();

    let state = vec![0.5f32; env.state_size()];
    let mut greedy_trained = trained;
    let mut greedy_restored = restored;
    assert_eq!(
        greedy_trained.act(&state, false),
        greedy_restored.act(&state, false)
    );
}
