//! Q-Network
//!
//! Action-value network mapping a state vector to one Q-value per discrete
//! action: input -> 128 (relu, dropout) -> 64 (relu, dropout) -> actions.

use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, Relu};
use burn::prelude::*;

use crate::error::TraderError;
use crate::rl::core::NUM_DISCRETE_ACTIONS;

/// Q-network configuration
#[derive(Config, Debug)]
pub struct QNetworkConfig {
    /// State vector length
    pub input_dim: usize,
    /// Number of discrete actions
    #[config(default = "NUM_DISCRETE_ACTIONS")]
    pub action_size: usize,
    /// First hidden layer width
    #[config(default = "128")]
    pub hidden_dim: usize,
    /// Second hidden layer width
    #[config(default = "64")]
    pub second_hidden_dim: usize,
    /// Dropout probability after each hidden layer
    #[config(default = "0.2")]
    pub dropout: f64,
}

/// Dense Q-network
#[derive(Module, Debug)]
pub struct QNetwork<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    q_head: Linear<B>,
    dropout: Dropout,
    activation: Relu,
}

impl QNetworkConfig {
    /// Initialize the network
    pub fn init<B: Backend>(&self, device: &B::Device) -> QNetwork<B> {
        QNetwork {
            fc1: LinearConfig::new(self.input_dim, self.hidden_dim).init(device),
            fc2: LinearConfig::new(self.hidden_dim, self.second_hidden_dim).init(device),
            q_head: LinearConfig::new(self.second_hidden_dim, self.action_size).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> QNetwork<B> {
    /// Forward pass returning `[batch, action_size]` Q-values
    ///
    /// Dropout is only active on autodiff backends.
    pub fn forward(&self, state: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.fc1.forward(state));
        let x = self.dropout.forward(x);
        let x = self.activation.forward(self.fc2.forward(x));
        let x = self.dropout.forward(x);
        self.q_head.forward(x)
    }

    /// Input width expected by the first layer
    pub fn input_dim(&self) -> usize {
        self.fc1.weight.dims()[0]
    }

    /// Number of Q-values produced
    pub fn action_size(&self) -> usize {
        self.q_head.weight.dims()[1]
    }

    /// All weights and biases flattened in layer order
    pub fn flat_parameters(&self) -> crate::error::Result<Vec<f32>> {
        let mut out = Vec::new();
        for layer in [&self.fc1, &self.fc2, &self.q_head] {
            out.extend(tensor_values(layer.weight.val())?);
            if let Some(bias) = &layer.bias {
                out.extend(tensor_values(bias.val())?);
            }
        }
        Ok(out)
    }
}

/// Copy a tensor's values to the host
pub fn tensor_values<B: Backend, const D: usize>(
    tensor: Tensor<B, D>,
) -> crate::error::Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| TraderError::Model(format!("failed to read tensor data: {e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let network = QNetworkConfig::new(12).init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 2>::zeros([4, 12], &device);
        let output = network.forward(input);
        assert_eq!(output.dims(), [4, NUM_DISCRETE_ACTIONS]);
        assert_eq!(network.input_dim(), 12);
        assert_eq!(network.action_size(), NUM_DISCRETE_ACTIONS);
    }

    #[test]
    fn test_inference_is_deterministic_without_autodiff() {
        let device = Default::default();
        let network = QNetworkConfig::new(6).init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 2>::ones([1, 6], &device);
        let a = tensor_values(network.forward(input.clone())).unwrap();
        let b = tensor_values(network.forward(input)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_flat_parameters_len() {
        let device = Default::default();
        let network = QNetworkConfig::new(3)
            .with_hidden_dim(4)
            .with_second_hidden_dim(2)
            .init::<TestBackend>(&device);
        let expected = 3 * 4 + 4 + 4 * 2 + 2 + 2 * NUM_DISCRETE_ACTIONS + NUM_DISCRETE_ACTIONS;
        assert_eq!(network.flat_parameters().unwrap().len(), expected);
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q_network.json");
        let config = QNetworkConfig::new(9).with_dropout(0.1);
        config.save(&path).unwrap();

        let loaded = QNetworkConfig::load(&path).unwrap();
        assert_eq!(loaded.input_dim, 9);
        assert_eq!(loaded.action_size, NUM_DISCRETE_ACTIONS);
        assert_eq!(loaded.hidden_dim, 128);
        assert_eq!(loaded.dropout, 0.1);
    }
}
