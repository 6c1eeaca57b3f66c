//! Model Evaluation
//!
//! Greedy evaluation episodes and the trading metrics reported for the best
//! model. Ratios are annualised with √252 periods.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::rl::algorithms::Agent;
use crate::rl::core::mean_std;
use crate::rl::environment::TradingEnvironment;

/// File name of the persisted report inside a run directory
pub const EVALUATION_HISTORY_FILE: &str = "evaluation_history.json";

const PERIODS_PER_YEAR: f64 = 252.0;

/// Metrics of a single greedy episode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMetrics {
    pub total_profit: f64,
    pub win_rate: f64,
    pub profit_per_trade: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub trades: usize,
}

/// Averages over all evaluation episodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub episodes: usize,
    pub avg_total_profit: f64,
    pub avg_win_rate: f64,
    pub avg_profit_per_trade: f64,
    pub avg_max_drawdown: f64,
    pub avg_sharpe_ratio: f64,
    pub avg_sortino_ratio: f64,
    pub avg_trades_per_episode: f64,
}

/// Change of one metric between two reports
#[derive(Debug, Clone, PartialEq)]
pub struct MetricChange {
    pub name: &'static str,
    pub previous: f64,
    pub current: f64,
    pub improved: bool,
}

impl MetricChange {
    /// Relative change in percent (0 when the previous value is 0)
    pub fn change_pct(&self) -> f64 {
        if self.previous == 0.0 {
            0.0
        } else {
            (self.current - self.previous) / self.previous.abs() * 100.0
        }
    }
}

impl EvaluationReport {
    fn from_episodes(metrics: &[EpisodeMetrics]) -> Self {
        let n = metrics.len();
        if n == 0 {
            return Self::default();
        }
        let avg = |f: fn(&EpisodeMetrics) -> f64| metrics.iter().map(f).sum::<f64>() / n as f64;
        Self {
            episodes: n,
            avg_total_profit: avg(|m| m.total_profit),
            avg_win_rate: avg(|m| m.win_rate),
            avg_profit_per_trade: avg(|m| m.profit_per_trade),
            avg_max_drawdown: avg(|m| m.max_drawdown),
            avg_sharpe_ratio: avg(|m| m.sharpe_ratio),
            avg_sortino_ratio: avg(|m| m.sortino_ratio),
            avg_trades_per_episode: avg(|m| m.trades as f64),
        }
    }

    /// Per-metric comparison against an earlier report
    ///
    /// Drawdown improves when it shrinks; every other metric when it grows.
    pub fn compare(&self, previous: &EvaluationReport) -> Vec<MetricChange> {
        let metrics: [(&'static str, f64, f64, bool); 7] = [
            ("avg_total_profit", previous.avg_total_profit, self.avg_total_profit, true),
            ("avg_win_rate", previous.avg_win_rate, self.avg_win_rate, true),
            ("avg_profit_per_trade", previous.avg_profit_per_trade, self.avg_profit_per_trade, true),
            ("avg_max_drawdown", previous.avg_max_drawdown, self.avg_max_drawdown, false),
            ("avg_sharpe_ratio", previous.avg_sharpe_ratio, self.avg_sharpe_ratio, true),
            ("avg_sortino_ratio", previous.avg_sortino_ratio, self.avg_sortino_ratio, true),
            (
                "avg_trades_per_episode",
                previous.avg_trades_per_episode,
                self.avg_trades_per_episode,
                true,
            ),
        ];
        metrics
            .into_iter()
            .map(|(name, previous, current, higher_is_better)| MetricChange {
                name,
                previous,
                current,
                improved: if higher_is_better {
                    current > previous
                } else {
                    current < previous
                },
            })
            .collect()
    }

    /// Log the report, and its changes if there is an earlier one
    pub fn log(&self, previous: Option<&EvaluationReport>) {
        info!(
            episodes = self.episodes,
            avg_total_profit = self.avg_total_profit,
            avg_win_rate = self.avg_win_rate,
            avg_max_drawdown = self.avg_max_drawdown,
            avg_sharpe_ratio = self.avg_sharpe_ratio,
            "Evaluation results"
        );
        let Some(previous) = previous else {
            return;
        };
        let changes = self.compare(previous);
        for change in &changes {
            info!(
                metric = change.name,
                previous = change.previous,
                current = change.current,
                change_pct = format!("{:+.2}", change.change_pct()),
                improved = change.improved,
                "metric change"
            );
        }
        let improved = changes.iter().filter(|c| c.improved).count();
        info!("{}/{} metrics improved", improved, changes.len());
    }

    /// Read a report written by [`EvaluationReport::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let report = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        Ok(Some(report))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        serde_json::to_writer_pretty(File::create(path)?, self)?;
        Ok(())
    }
}

/// Run `episodes` greedy episodes and average their metrics
///
/// Nothing is written to the agent's replay memory.
pub fn evaluate_agent<A: Agent + ?Sized>(
    env: &mut TradingEnvironment,
    agent: &mut A,
    episodes: usize,
) -> Result<EvaluationReport> {
    let mut metrics = Vec::with_capacity(episodes);
    for episode in 0..episodes {
        let m = evaluate_episode(env, agent)?;
        debug!(episode, profit = m.total_profit, trades = m.trades, "evaluation episode");
        metrics.push(m);
    }
    Ok(EvaluationReport::from_episodes(&metrics))
}

fn evaluate_episode<A: Agent + ?Sized>(
    env: &mut TradingEnvironment,
    agent: &mut A,
) -> Result<EpisodeMetrics> {
    let mut state = env.reset();
    let mut trade_profits = Vec::new();

    while !env.is_done() {
        let action = agent.act(&state, false);
        let result = env.step_discrete(action)?;
        if result.info.trade_executed {
            trade_profits.push(result.info.trade_profit);
        }
        state = result.observation;
    }

    let equity: Vec<f64> = env.account_history().iter().map(|s| s.balance).collect();
    let returns = equity_returns(&equity);
    let trades = trade_profits.len();
    let (win_rate, profit_per_trade) = if trades == 0 {
        (0.0, 0.0)
    } else {
        let wins = trade_profits.iter().filter(|p| **p > 0.0).count();
        (
            wins as f64 / trades as f64,
            trade_profits.iter().sum::<f64>() / trades as f64,
        )
    };

    Ok(EpisodeMetrics {
        total_profit: env.total_profit(),
        win_rate,
        profit_per_trade,
        max_drawdown: max_drawdown(&equity),
        sharpe_ratio: sharpe_ratio(&returns),
        sortino_ratio: sortino_ratio(&returns),
        trades,
    })
}

/// Step returns of an equity curve, skipping non-positive bases
pub fn equity_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

/// Annualised Sharpe ratio (0 for flat or empty returns)
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let (mean, std) = mean_std(returns);
    if std == 0.0 || !std.is_finite() {
        return 0.0;
    }
    mean / std * PERIODS_PER_YEAR.sqrt()
}

/// Annualised Sortino ratio
///
/// Returns 0 when there are no negative returns so the value stays
/// serialisable.
pub fn sortino_ratio(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let negatives: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if negatives.is_empty() {
        return 0.0;
    }
    let downside = (negatives.iter().map(|r| r * r).sum::<f64>() / negatives.len() as f64).sqrt();
    if downside == 0.0 {
        return 0.0;
    }
    mean / downside * PERIODS_PER_YEAR.sqrt()
}

/// Largest peak-to-trough decline as a fraction of the peak
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0_f64;
    for &value in equity {
        peak = peak.max(value);
        if peak > 0.0 {
            worst = worst.max((peak - value) / peak);
        }
    }
    worst
}
