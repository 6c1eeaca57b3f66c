//! Trading Environment for RL Training
//!
//! Gym-like reset/step simulator over a Feature Frame: a single asset, a
//! single continuous position and one decision per row.
//!
//! PnL is marked to market on the newly adopted position over the current
//! row's price move (`target_position * balance * price_change * leverage`).
//! No entry price is tracked per lot; trained models depend on this
//! approximation.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::render::{ChartPanel, Marker, MarkerKind, RenderMode, Series, SvgChart};
use crate::error::{Result, TraderError};
use crate::rl::config::TradingEnvConfig;
use crate::rl::core::{
    convert_discrete_to_continuous_action, reward_for, AccountObservation, ContinuousAction,
    RewardFunction, RewardTransition, StateEncoder, WindowStateEncoder, ACTION_HIGH, ACTION_LOW,
    NUM_DISCRETE_ACTIONS,
};
use crate::rl::data::{FeatureFrame, CLOSE_COLUMN};

/// One executed step, as logged by the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub step: usize,
    pub price: f64,
    /// Position adopted by this step
    pub position: f64,
    /// Signed change from the previous position
    pub position_change: f64,
    pub leverage: f64,
    /// Balance after commission and PnL
    pub balance: f64,
    pub commission: f64,
}

/// Account snapshot after a step (or at reset)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub step: usize,
    pub balance: f64,
    pub position: f64,
    pub leverage: f64,
}

/// Bounds of the continuous action space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionSpace {
    pub low: [f64; 2],
    pub high: [f64; 2],
}

/// Shape of the observation vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationSpace {
    pub shape: usize,
    pub low: f32,
    pub high: f32,
}

/// Result of taking a step in the environment
#[derive(Debug, Clone)]
pub struct StepResult {
    /// New observation after action
    pub observation: Vec<f32>,
    /// Reward signal
    pub reward: f64,
    /// Whether episode is done
    pub done: bool,
    /// Additional info
    pub info: StepInfo,
}

/// Additional step information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// `balance - initial_balance`
    pub total_profit: f64,
    /// Number of logged trade records this episode
    pub total_trades: usize,
    pub current_price: f64,
    pub position: f64,
    /// Leverage applied on this step
    pub leverage: f64,
    pub balance: f64,
    /// Whether the position changed
    pub trade_executed: bool,
    /// Balance change over this step
    pub step_profit: f64,
    /// Balance change if the position changed, otherwise 0
    pub trade_profit: f64,
}

/// Trading environment for RL training
pub struct TradingEnvironment {
    config: TradingEnvConfig,
    frame: FeatureFrame,
    close: Vec<f64>,
    encoder: WindowStateEncoder,
    reward_fn: Box<dyn RewardFunction>,
    current_step: usize,
    balance: f64,
    position: f64,
    leverage: f64,
    trades: Vec<TradeRecord>,
    account_history: Vec<AccountSnapshot>,
    returns: Vec<f64>,
    done: bool,
    last_render: Option<String>,
}

impl std::fmt::Debug for TradingEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingEnvironment")
            .field("rows", &self.frame.len())
            .field("state_size", &self.state_size())
            .field("reward", &self.reward_fn.name())
            .field("current_step", &self.current_step)
            .field("balance", &self.balance)
            .field("position", &self.position)
            .field("done", &self.done)
            .finish()
    }
}

impl TradingEnvironment {
    /// Create a new trading environment
    ///
    /// The frame's numeric columns must be exactly `config.feature_columns`
    /// (any order); observations follow the config order.
    pub fn new(frame: FeatureFrame, config: TradingEnvConfig) -> Result<Self> {
        validate_config(&config)?;

        if frame.is_empty() {
            return Err(TraderError::config("feature frame is empty"));
        }
        if !frame.has_column(CLOSE_COLUMN) {
            return Err(TraderError::config(format!(
                "feature frame lacks required '{CLOSE_COLUMN}' column"
            )));
        }
        if !frame.has_time_reference() {
            return Err(TraderError::config(
                "feature frame lacks a time reference (timestamp or date column)",
            ));
        }
        if frame.len() < config.window_size {
            return Err(TraderError::config(format!(
                "feature frame has {} rows, fewer than window_size {}",
                frame.len(),
                config.window_size
            )));
        }

        let frame = frame.select(&config.feature_columns)?;
        let close = frame
            .close()
            .ok_or_else(|| TraderError::config("close column vanished after schema selection"))?;
        let encoder = WindowStateEncoder::new(
            frame.width(),
            config.window_size,
            config.max_balance_ratio,
        );
        let reward_fn = reward_for(config.use_risk_adjusted_rewards, config.sharpe_min_returns);

        info!(
            state_size = encoder.output_dim(),
            window = config.window_size,
            rows = frame.len(),
            reward = reward_fn.name(),
            "trading environment initialized"
        );
        debug!(features = ?config.feature_columns, "state feature columns");

        let mut env = Self {
            current_step: config.window_size,
            balance: config.initial_balance,
            position: 0.0,
            leverage: 0.0,
            trades: Vec::new(),
            account_history: Vec::new(),
            returns: Vec::new(),
            done: false,
            last_render: None,
            config,
            frame,
            close,
            encoder,
            reward_fn,
        };
        env.reset();
        Ok(env)
    }

    /// Reset the environment for a new episode
    pub fn reset(&mut self) -> Vec<f32> {
        let initial = self.config.initial_balance;
        self.current_step = self.config.window_size;
        self.balance = initial;
        self.position = 0.0;
        self.leverage = 0.0;
        self.trades.clear();
        self.account_history.clear();
        self.account_history.push(AccountSnapshot {
            step: self.current_step.saturating_sub(1),
            balance: initial,
            position: 0.0,
            leverage: 0.0,
        });
        self.returns.clear();
        self.done = self.current_step >= self.frame.len();

        debug!(balance = initial, "environment reset");
        self.observation()
    }

    /// Take a step with a `[target_position, leverage]` action
    ///
    /// After the episode ends this is a no-op returning `done = true` and a
    /// zero reward until `reset()` is called.
    pub fn step(&mut self, action: ContinuousAction) -> StepResult {
        if self.done {
            warn!(
                step = self.current_step,
                "step called on a finished episode; call reset() first"
            );
            return StepResult {
                observation: self.observation(),
                reward: 0.0,
                done: true,
                info: self.info(0.0, false, 0.0),
            };
        }

        let action = action.clipped();
        let (target_position, leverage) = (action.position, action.leverage);

        let current_price = self.close[self.current_step];
        let previous_price = self.close[self.current_step - 1];
        let balance_before = self.balance;

        // Commission on the change in exposure
        let position_change = target_position - self.position;
        let transaction_cost =
            position_change.abs() * current_price * self.config.commission_fee * leverage;
        self.balance -= transaction_cost;

        let price_change = if previous_price != 0.0 {
            (current_price - previous_price) / previous_price
        } else {
            warn!(step = self.current_step, "previous price is zero, treating price change as 0");
            0.0
        };

        if target_position != 0.0 {
            self.balance += target_position * self.balance * price_change * leverage;
        }

        self.position = target_position;
        self.leverage = leverage;

        self.trades.push(TradeRecord {
            step: self.current_step,
            price: current_price,
            position: target_position,
            position_change,
            leverage,
            balance: self.balance,
            commission: transaction_cost,
        });
        self.account_history.push(AccountSnapshot {
            step: self.current_step,
            balance: self.balance,
            position: self.position,
            leverage,
        });

        let step_return = if balance_before != 0.0 {
            (self.balance - balance_before) / balance_before
        } else {
            0.0
        };
        if self.reward_fn.tracks_returns() {
            self.returns.push(step_return);
        }
        let reward = self.reward_fn.compute(&RewardTransition {
            step_return,
            episode_returns: &self.returns,
        });

        self.current_step += 1;
        self.done = self.balance <= 0.0 || self.current_step >= self.frame.len();

        let step_profit = self.balance - balance_before;
        let info = self.info(current_price, position_change != 0.0, step_profit);
        StepResult {
            observation: self.observation(),
            reward,
            done: self.done,
            info,
        }
    }

    /// Take a step with a discrete action index
    pub fn step_discrete(&mut self, action_idx: usize) -> Result<StepResult> {
        let action = convert_discrete_to_continuous_action(action_idx)?;
        Ok(self.step(action))
    }

    /// Current observation: the window `[current_step - window, current_step)`
    /// followed by the clipped balance ratio and the position
    pub fn observation(&self) -> Vec<f32> {
        let end = self.current_step.min(self.frame.len());
        let start = end.saturating_sub(self.config.window_size);
        let window = self.frame.rows_slice(start, end).unwrap_or(&[]);
        self.encoder.encode(
            window,
            &AccountObservation {
                balance: self.balance,
                initial_balance: self.config.initial_balance,
                position: self.position,
            },
        )
    }

    fn info(&self, current_price: f64, trade_executed: bool, step_profit: f64) -> StepInfo {
        StepInfo {
            total_profit: self.balance - self.config.initial_balance,
            total_trades: self.trades.len(),
            current_price,
            position: self.position,
            leverage: self.leverage,
            balance: self.balance,
            trade_executed,
            step_profit,
            trade_profit: if trade_executed { step_profit } else { 0.0 },
        }
    }

    /// Observation length: `features * window_size + 2`
    pub fn state_size(&self) -> usize {
        self.encoder.output_dim()
    }

    pub fn action_size(&self) -> usize {
        NUM_DISCRETE_ACTIONS
    }

    pub fn action_space(&self) -> ActionSpace {
        ActionSpace {
            low: ACTION_LOW,
            high: ACTION_HIGH,
        }
    }

    pub fn observation_space(&self) -> ObservationSpace {
        ObservationSpace {
            shape: self.state_size(),
            low: f32::NEG_INFINITY,
            high: f32::INFINITY,
        }
    }

    pub fn config(&self) -> &TradingEnvConfig {
        &self.config
    }

    pub fn frame(&self) -> &FeatureFrame {
        &self.frame
    }

    pub fn len(&self) -> usize {
        self.frame.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// Leverage applied on the last step
    pub fn leverage(&self) -> f64 {
        self.leverage
    }

    pub fn total_profit(&self) -> f64 {
        self.balance - self.config.initial_balance
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn account_history(&self) -> &[AccountSnapshot] {
        &self.account_history
    }

    /// Step returns accumulated for the risk-adjusted reward
    pub fn returns(&self) -> &[f64] {
        &self.returns
    }

    /// Visualize the episode so far
    ///
    /// `Human` logs a summary and returns `None`; `Svg` returns the document
    /// (price with buy/sell markers, balance) and caches it until `close()`.
    pub fn render(&mut self, mode: RenderMode) -> Option<String> {
        match mode {
            RenderMode::Human => {
                info!(
                    step = self.current_step,
                    balance = self.balance,
                    position = self.position,
                    profit = self.total_profit(),
                    trades = self.trades.len(),
                    "episode state"
                );
                None
            }
            RenderMode::Svg => {
                let svg = self.episode_chart("Trading episode").to_svg();
                self.last_render = Some(svg.clone());
                Some(svg)
            }
        }
    }

    /// Price/balance chart of the episode so far
    pub fn episode_chart(&self, title: &str) -> SvgChart {
        let end = self.current_step.min(self.close.len());
        let prices: Vec<(f64, f64)> = (0..end).map(|i| (i as f64, self.close[i])).collect();
        let markers = self
            .trades
            .iter()
            .filter(|t| t.position_change != 0.0)
            .map(|t| Marker {
                x: t.step as f64,
                y: t.price,
                kind: if t.position_change > 0.0 {
                    MarkerKind::Buy
                } else {
                    MarkerKind::Sell
                },
            })
            .collect();
        let balance: Vec<(f64, f64)> = self
            .account_history
            .iter()
            .map(|s| (s.step as f64, s.balance))
            .collect();

        SvgChart::new(title)
            .with_panel(
                ChartPanel::new("Price")
                    .with_series(Series::new("close", "#1f77b4", prices))
                    .with_markers(markers),
            )
            .with_panel(
                ChartPanel::new("Balance").with_series(Series::new("balance", "#ff7f0e", balance)),
            )
    }

    /// Last SVG render, if any
    pub fn last_render(&self) -> Option<&str> {
        self.last_render.as_deref()
    }

    /// Release render resources
    pub fn close(&mut self) {
        self.last_render = None;
    }
}

fn validate_config(config: &TradingEnvConfig) -> Result<()> {
    if config.window_size == 0 {
        return Err(TraderError::config("window_size must be at least 1"));
    }
    if !(config.initial_balance.is_finite() && config.initial_balance > 0.0) {
        return Err(TraderError::config(format!(
            "initial_balance must be positive, got {}",
            config.initial_balance
        )));
    }
    if !(config.commission_fee.is_finite() && config.commission_fee >= 0.0) {
        return Err(TraderError::config(format!(
            "commission_fee must be a non-negative fraction, got {}",
            config.commission_fee
        )));
    }
    if config.feature_columns.is_empty() {
        return Err(TraderError::config("feature_columns must not be empty"));
    }
    Ok(())
}
