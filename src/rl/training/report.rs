//! Training artifacts written into the run directory.

use std::path::{Path, PathBuf};

use tracing::info;

use super::history::TrainingHistory;
use crate::error::Result;
use crate::rl::environment::{ChartPanel, Series, SvgChart, TradingEnvironment};

pub const HISTORY_CSV: &str = "training_history.csv";
pub const HISTORY_CHART: &str = "training_history.svg";
pub const EXPLORATION_CHART: &str = "exploration_rate.svg";
pub const BEST_TRADES_CHART: &str = "best_validation_trades.svg";

/// Four-panel chart of train/validation rewards and profits
pub fn history_chart(history: &TrainingHistory) -> SvgChart {
    let validation = |values: &[f64]| -> Vec<(f64, f64)> {
        history
            .val_episodes
            .iter()
            .zip(values)
            .map(|(episode, v)| (*episode as f64, *v))
            .collect()
    };

    SvgChart::new("Training history")
        .with_panel(ChartPanel::new("Training rewards").with_series(Series::indexed(
            "train_reward",
            "#1f77b4",
            &history.train_rewards,
        )))
        .with_panel(ChartPanel::new("Training profits").with_series(Series::indexed(
            "train_profit",
            "#2ca02c",
            &history.train_profits,
        )))
        .with_panel(ChartPanel::new("Validation rewards").with_series(Series::new(
            "val_reward",
            "#ff7f0e",
            validation(&history.val_rewards),
        )))
        .with_panel(ChartPanel::new("Validation profits").with_series(Series::new(
            "val_profit",
            "#d62728",
            validation(&history.val_profits),
        )))
}

pub fn exploration_chart(history: &TrainingHistory) -> SvgChart {
    SvgChart::new("Exploration rate").with_panel(
        ChartPanel::new("Epsilon").with_series(Series::indexed(
            "exploration_rate",
            "#9467bd",
            &history.exploration_rates,
        )),
    )
}

/// Write the CSV and charts for the whole run
pub fn write_training_report(run_dir: &Path, history: &TrainingHistory) -> Result<Vec<PathBuf>> {
    let csv_path = run_dir.join(HISTORY_CSV);
    history.write_csv(&csv_path)?;

    let history_path = run_dir.join(HISTORY_CHART);
    history_chart(history).save(&history_path)?;

    let exploration_path = run_dir.join(EXPLORATION_CHART);
    exploration_chart(history).save(&exploration_path)?;

    info!(run_dir = %run_dir.display(), "Saved training history and charts");
    Ok(vec![csv_path, history_path, exploration_path])
}

/// Chart of the episode just played on `env`
pub fn save_trade_chart(env: &TradingEnvironment, path: &Path, title: &str) -> Result<()> {
    env.episode_chart(title).save(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_chart_has_four_panels() {
        let mut history = TrainingHistory::new();
        history.record_train(0, 1.0, 2.0, 1.0);
        history.record_validation(0, 0.5, 0.1);
        let chart = history_chart(&history);
        assert_eq!(chart.panels.len(), 4);
        assert!(chart.to_svg().contains("Validation profits"));
    }

    #[test]
    fn test_write_training_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = TrainingHistory::new();
        for episode in 0..3 {
            history.record_train(episode, episode as f64, 1.0, 0.9);
        }
        let paths = write_training_report(dir.path(), &history).unwrap();
        assert_eq!(paths.len(), 3);
        assert!(paths.iter().all(|p| p.exists()));
    }
}
