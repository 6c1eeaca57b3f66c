//! Deep Q-Network agent
//!
//! Online/target Q-network pair with epsilon-greedy action selection and
//! experience replay. The target network is the inference view of the
//! online network, hard-synced every `update_target_every` replay calls.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::nn::loss::{MseLoss, Reduction};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::Agent;
use crate::error::{Result, TraderError};
use crate::rl::config::DqnConfig;
use crate::rl::memory::{ReplayBuffer, Transition};
use crate::rl::networks::{tensor_values, QNetwork, QNetworkConfig};

/// Extension of persisted weights
pub const MODEL_EXTENSION: &str = "mpk";

/// Extension of the history file written next to the weights
pub const HISTORY_EXTENSION: &str = "history.json";

/// Per-replay training history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentHistory {
    pub loss: Vec<f32>,
    pub mae: Vec<f32>,
    pub exploration_rate: Vec<f64>,
}

/// Weights file for a model path (`<path>.mpk`)
pub fn model_file(path: &Path) -> PathBuf {
    path.with_extension(MODEL_EXTENSION)
}

/// History file for a model path (`<path>.history.json`)
pub fn history_file(path: &Path) -> PathBuf {
    path.with_extension(HISTORY_EXTENSION)
}

/// DQN agent
pub struct DqnAgent<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<QNetwork<B>, B>,
{
    config: DqnConfig,
    state_size: usize,
    model: QNetwork<B>,
    /// Inference view of `model`, refreshed after every weight change
    inference_model: QNetwork<B::InnerBackend>,
    target_model: QNetwork<B::InnerBackend>,
    optimizer: O,
    memory: ReplayBuffer,
    rng: StdRng,
    device: B::Device,
    exploration_rate: f64,
    replay_count: usize,
    history: AgentHistory,
}

/// Build a DQN agent optimised with Adam
pub fn build_dqn_agent<B: AutodiffBackend>(
    config: DqnConfig,
    state_size: usize,
    device: B::Device,
) -> Result<DqnAgent<B, impl Optimizer<QNetwork<B>, B>>> {
    let optimizer = AdamConfig::new().init::<B, QNetwork<B>>();
    DqnAgent::new(config, state_size, optimizer, device)
}

impl<B, O> DqnAgent<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<QNetwork<B>, B>,
{
    /// Create a new agent; `state_size` must match the environment
    pub fn new(config: DqnConfig, state_size: usize, optimizer: O, device: B::Device) -> Result<Self> {
        validate_config(&config, state_size)?;

        let rng = match config.seed {
            Some(seed) => {
                B::seed(seed);
                StdRng::seed_from_u64(seed)
            }
            None => StdRng::from_entropy(),
        };

        let model: QNetwork<B> = QNetworkConfig::new(state_size)
            .with_action_size(config.action_size)
            .with_hidden_dim(config.hidden_dim)
            .with_second_hidden_dim(config.second_hidden_dim)
            .with_dropout(config.dropout)
            .init(&device);
        let inference_model = model.valid();
        let target_model = inference_model.clone();

        info!(
            state_size,
            action_size = config.action_size,
            memory = config.memory_size,
            batch = config.batch_size,
            "DQN agent created"
        );

        Ok(Self {
            memory: ReplayBuffer::new(config.memory_size),
            exploration_rate: config.exploration_rate,
            config,
            state_size,
            model,
            inference_model,
            target_model,
            optimizer,
            rng,
            device,
            replay_count: 0,
            history: AgentHistory::default(),
        })
    }

    pub fn config(&self) -> &DqnConfig {
        &self.config
    }

    pub fn state_size(&self) -> usize {
        self.state_size
    }

    pub fn action_size(&self) -> usize {
        self.config.action_size
    }

    pub fn memory(&self) -> &ReplayBuffer {
        &self.memory
    }

    /// Replay calls that performed a gradient step
    pub fn replay_count(&self) -> usize {
        self.replay_count
    }

    pub fn history(&self) -> &AgentHistory {
        &self.history
    }

    pub fn model(&self) -> &QNetwork<B> {
        &self.model
    }

    pub fn inference_model(&self) -> &QNetwork<B::InnerBackend> {
        &self.inference_model
    }

    pub fn target_model(&self) -> &QNetwork<B::InnerBackend> {
        &self.target_model
    }

    /// Whether the target network currently equals the online network
    pub fn target_in_sync(&self) -> Result<bool> {
        let online = self.inference_model.flat_parameters()?;
        let target = self.target_model.flat_parameters()?;
        Ok(online == target)
    }

    /// Q-values of the online network (inference mode)
    pub fn predict(&self, state: &[f32]) -> Result<Vec<f32>> {
        if state.len() != self.state_size {
            return Err(TraderError::StateShapeMismatch {
                expected: self.state_size,
                actual: state.len(),
            });
        }
        let input = Tensor::<B::InnerBackend, 2>::from_data(
            TensorData::new(state.to_vec(), [1, self.state_size]),
            &self.device,
        );
        let q_values = tensor_values(self.inference_model.forward(input))?;
        if q_values.iter().any(|q| !q.is_finite()) {
            return Err(TraderError::Model("non-finite Q-values".into()));
        }
        Ok(q_values)
    }

    /// Hard-copy online weights into the target network
    pub fn update_target_model(&mut self) {
        self.target_model = self.inference_model.clone();
        debug!(replay = self.replay_count, "target network synced");
    }

    fn random_action(&mut self) -> usize {
        self.rng.gen_range(0..self.config.action_size)
    }

    fn decay_exploration(&mut self) {
        if self.exploration_rate > self.config.exploration_min {
            self.exploration_rate =
                (self.exploration_rate * self.config.exploration_decay).max(self.config.exploration_min);
        }
    }

    fn train_batch(&mut self) -> Result<(f32, f32)> {
        let batch = {
            let sampled = self.memory.sample(self.config.batch_size, &mut self.rng);
            ReplayBuffer::to_batch(&sampled)
        };
        let n = batch.len();
        let actions = self.config.action_size;
        let gamma = self.config.discount_factor as f32;

        // Bootstrap from the target network
        let next_states = Tensor::<B::InnerBackend, 2>::from_data(
            TensorData::new(batch.next_states, [n, self.state_size]),
            &self.device,
        );
        let max_next = tensor_values(self.target_model.forward(next_states).max_dim(1))?;

        let states_data = TensorData::new(batch.states, [n, self.state_size]);
        let current = tensor_values(
            self.inference_model
                .forward(Tensor::<B::InnerBackend, 2>::from_data(states_data.clone(), &self.device)),
        )?;

        // Overwrite only the taken action's Q-value in each row
        let mut targets = current;
        for row in 0..n {
            let target = batch.rewards[row] + (1.0 - batch.dones[row]) * gamma * max_next[row];
            targets[row * actions + batch.actions[row]] = target;
        }

        let states = Tensor::<B, 2>::from_data(states_data, &self.device);
        let targets = Tensor::<B, 2>::from_data(TensorData::new(targets, [n, actions]), &self.device);

        let output = self.model.forward(states);
        let mae = (output.clone() - targets.clone())
            .abs()
            .mean()
            .into_scalar()
            .elem::<f32>();
        let loss = MseLoss::new().forward(output, targets, Reduction::Mean);
        let loss_value = loss.clone().into_scalar().elem::<f32>();

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self
            .optimizer
            .step(self.config.learning_rate, self.model.clone(), grads);
        self.inference_model = self.model.valid();

        Ok((loss_value, mae))
    }
}

impl<B, O> Agent for DqnAgent<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<QNetwork<B>, B>,
{
    fn act(&mut self, state: &[f32], training: bool) -> usize {
        if training && self.rng.gen::<f64>() < self.exploration_rate {
            return self.random_action();
        }

        match self.predict(state) {
            Ok(q_values) => q_values
                .iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, q)| if *q > best.1 { (i, *q) } else { best })
                .0,
            Err(e) => {
                warn!(error = %e, "prediction failed, falling back to a random action");
                self.random_action()
            }
        }
    }

    fn remember(&mut self, state: Vec<f32>, action: usize, reward: f64, next_state: Vec<f32>, done: bool) {
        if state.len() != self.state_size
            || next_state.len() != self.state_size
            || action >= self.config.action_size
        {
            warn!(
                state = state.len(),
                next_state = next_state.len(),
                action,
                "malformed transition dropped"
            );
            return;
        }
        self.memory
            .push(Transition::new(state, action, reward, next_state, done));
    }

    fn replay(&mut self) -> Result<f32> {
        if self.memory.len() < self.config.batch_size {
            return Ok(0.0);
        }

        let (mut loss, mut mae) = self.train_batch()?;
        if !loss.is_finite() || !mae.is_finite() {
            warn!(loss, mae, "non-finite training loss recorded as 0");
            loss = 0.0;
            mae = 0.0;
        }

        self.replay_count += 1;
        if self.replay_count % self.config.update_target_every.max(1) == 0 {
            self.update_target_model();
        }
        self.decay_exploration();

        self.history.loss.push(loss);
        self.history.mae.push(mae);
        self.history.exploration_rate.push(self.exploration_rate);

        debug!(
            loss,
            mae,
            epsilon = self.exploration_rate,
            replay = self.replay_count,
            "replay step"
        );
        Ok(loss)
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let weights = model_file(path);
        self.model
            .clone()
            .save_file(weights.clone(), &recorder)
            .map_err(|e| TraderError::Checkpoint(format!("failed to save {}: {e:?}", weights.display())))?;

        let history = history_file(path);
        serde_json::to_writer_pretty(File::create(&history)?, &self.history)?;

        debug!(path = %weights.display(), "agent saved");
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        let weights = model_file(path);
        if !weights.exists() {
            return Err(TraderError::Checkpoint(format!(
                "model not found: {}",
                weights.display()
            )));
        }

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.model = self
            .model
            .clone()
            .load_file(weights.clone(), &recorder, &self.device)
            .map_err(|e| TraderError::Checkpoint(format!("failed to load {}: {e:?}", weights.display())))?;
        self.inference_model = self.model.valid();
        self.update_target_model();

        let history = history_file(path);
        if history.exists() {
            self.history = serde_json::from_reader(BufReader::new(File::open(&history)?))?;
        } else {
            warn!(path = %history.display(), "no agent history next to model, starting empty");
            self.history = AgentHistory::default();
        }

        info!(path = %weights.display(), "agent loaded");
        Ok(())
    }

    fn exploration_rate(&self) -> f64 {
        self.exploration_rate
    }

    fn set_exploration_rate(&mut self, rate: f64) {
        self.exploration_rate = rate.clamp(self.config.exploration_min, 1.0);
    }

    fn memory_len(&self) -> usize {
        self.memory.len()
    }
}

fn validate_config(config: &DqnConfig, state_size: usize) -> Result<()> {
    if state_size == 0 {
        return Err(TraderError::config("state_size must be positive"));
    }
    if config.action_size == 0 {
        return Err(TraderError::config("action_size must be positive"));
    }
    if config.batch_size == 0 {
        return Err(TraderError::config("batch_size must be positive"));
    }
    if config.memory_size < config.batch_size {
        return Err(TraderError::config(format!(
            "memory_size {} is smaller than batch_size {}",
            config.memory_size, config.batch_size
        )));
    }
    if !(0.0..=1.0).contains(&config.discount_factor) {
        return Err(TraderError::config("discount_factor must be in [0, 1]"));
    }
    if !(0.0..1.0).contains(&config.dropout) {
        return Err(TraderError::config("dropout must be in [0, 1)"));
    }
    if config.exploration_min > config.exploration_rate {
        return Err(TraderError::config(
            "exploration_min must not exceed the initial exploration_rate",
        ));
    }
    Ok(())
}
