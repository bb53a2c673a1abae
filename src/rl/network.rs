//! Function approximators for the deep agents
//!
//! All networks map the 4-dimensional observation to their outputs through two
//! hidden layers:
//!
//! ```text
//! QNetwork:      4 → 24 (ReLU) → 24 (ReLU) → num_actions   action values
//! ActorNetwork:  4 → 24 (tanh) → 24 (tanh) → num_actions   action logits
//! CriticNetwork: 4 → 24 (ReLU) → 24 (ReLU) → 1             state value
//! ```
//!
//! The actor and critic are independent towers (no shared trunk). They live
//! together in [`ActorCriticNetwork`] only so one optimizer can step both from
//! the combined PPO loss.
//!
//! # Example
//!
//! ```rust
//! use rl_sandbox::rl::{MlpConfig, QNetwork};
//! use burn::backend::ndarray::NdArrayDevice;
//! use burn::backend::NdArray;
//! use burn::tensor::Tensor;
//!
//! type Backend = NdArray<f32>;
//!
//! let device = NdArrayDevice::default();
//! let network: QNetwork<Backend> = MlpConfig::new(2).init_q_network(&device);
//!
//! let states = Tensor::zeros([8, 4], &device);
//! assert_eq!(network.forward(states).dims(), [8, 2]);
//! ```

use burn::{
    module::Module,
    nn::{Linear, LinearConfig},
    tensor::{
        Tensor,
        activation::{relu, softmax, tanh},
        backend::Backend,
    },
};

use crate::env::OBSERVATION_DIM;

/// Layer sizes shared by all sandbox networks
#[derive(Debug, Clone)]
pub struct MlpConfig {
    /// Observation width (default: 4)
    pub input_dim: usize,

    /// Width of both hidden layers (default: 24)
    pub hidden_dim: usize,

    /// Number of discrete actions
    pub num_actions: usize,
}

impl MlpConfig {
    pub fn new(num_actions: usize) -> Self {
        Self {
            input_dim: OBSERVATION_DIM,
            hidden_dim: 24,
            num_actions,
        }
    }

    pub fn init_q_network<B: Backend>(&self, device: &B::Device) -> QNetwork<B> {
        QNetwork {
            fc1: LinearConfig::new(self.input_dim, self.hidden_dim).init(device),
            fc2: LinearConfig::new(self.hidden_dim, self.hidden_dim).init(device),
            out: LinearConfig::new(self.hidden_dim, self.num_actions).init(device),
        }
    }

    pub fn init_actor_critic<B: Backend>(&self, device: &B::Device) -> ActorCriticNetwork<B> {
        ActorCriticNetwork {
            actor: ActorNetwork {
                fc1: LinearConfig::new(self.input_dim, self.hidden_dim).init(device),
                fc2: LinearConfig::new(self.hidden_dim, self.hidden_dim).init(device),
                logits: LinearConfig::new(self.hidden_dim, self.num_actions).init(device),
            },
            critic: CriticNetwork {
                fc1: LinearConfig::new(self.input_dim, self.hidden_dim).init(device),
                fc2: LinearConfig::new(self.hidden_dim, self.hidden_dim).init(device),
                value: LinearConfig::new(self.hidden_dim, 1).init(device),
            },
        }
    }
}

/// State-action value network used by the DQN agent
#[derive(Module, Debug)]
pub struct QNetwork<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    out: Linear<B>,
}

impl<B: Backend> QNetwork<B> {
    /// `[batch, 4]` states → `[batch, num_actions]` action values
    pub fn forward(&self, states: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = relu(self.fc1.forward(states));
        let x = relu(self.fc2.forward(x));
        self.out.forward(x)
    }

    /// Every weight and bias flattened in layer order
    pub fn parameter_values(&self) -> Vec<f32> {
        [&self.fc1, &self.fc2, &self.out]
            .into_iter()
            .flat_map(linear_values)
            .collect()
    }
}

/// Policy tower producing action logits
#[derive(Module, Debug)]
pub struct ActorNetwork<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    logits: Linear<B>,
}

impl<B: Backend> ActorNetwork<B> {
    pub fn forward(&self, states: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = tanh(self.fc1.forward(states));
        let x = tanh(self.fc2.forward(x));
        self.logits.forward(x)
    }

    /// Action probability simplex, `[batch, num_actions]`
    pub fn probabilities(&self, states: Tensor<B, 2>) -> Tensor<B, 2> {
        softmax(self.forward(states), 1)
    }
}

/// Value tower producing a scalar per state
#[derive(Module, Debug)]
pub struct CriticNetwork<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    value: Linear<B>,
}

impl<B: Backend> CriticNetwork<B> {
    /// `[batch, 4]` states → `[batch, 1]` values
    pub fn forward(&self, states: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = relu(self.fc1.forward(states));
        let x = relu(self.fc2.forward(x));
        self.value.forward(x)
    }
}

/// Independent actor and critic held in one module
#[derive(Module, Debug)]
pub struct ActorCriticNetwork<B: Backend> {
    pub actor: ActorNetwork<B>,
    pub critic: CriticNetwork<B>,
}

impl<B: Backend> ActorCriticNetwork<B> {
    /// Returns `(probabilities [batch, num_actions], values [batch, 1])`
    pub fn forward(&self, states: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let probs = self.actor.probabilities(states.clone());
        let values = self.critic.forward(states);
        (probs, values)
    }
}

fn linear_values<B: Backend>(layer: &Linear<B>) -> Vec<f32> {
    let mut values: Vec<f32> = layer.weight.val().into_data().iter::<f32>().collect();
    if let Some(bias) = &layer.bias {
        values.extend(bias.val().into_data().iter::<f32>());
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};
    use burn::module::AutodiffModule;
    use burn::tensor::{Distribution, TensorData};

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    #[test]
    fn test_q_network_shapes() {
        let device = NdArrayDevice::default();
        for num_actions in [2, 4] {
            let network = MlpConfig::new(num_actions).init_q_network::<TestBackend>(&device);
            for batch_size in [1, 16, 64] {
                let states = Tensor::zeros([batch_size, 4], &device);
                assert_eq!(network.forward(states).dims(), [batch_size, num_actions]);
            }
        }
    }

    #[test]
    fn test_actor_probabilities_sum_to_one() {
        let device = NdArrayDevice::default();
        let network = MlpConfig::new(4).init_actor_critic::<TestBackend>(&device);

        let states = Tensor::random([8, 4], Distribution::Uniform(-1.0, 1.0), &device);
        let (probs, values) = network.forward(states);

        assert_eq!(probs.dims(), [8, 4]);
        assert_eq!(values.dims(), [8, 1]);

        let sums: TensorData = probs.sum_dim(1).into_data();
        for sum in sums.iter::<f32>() {
            assert!((sum - 1.0).abs() < 1e-5, "row sums to {}", sum);
        }
    }

    #[test]
    fn test_parameter_values_count() {
        let device = NdArrayDevice::default();
        let network = MlpConfig::new(2).init_q_network::<TestBackend>(&device);
        // (4*24 + 24) + (24*24 + 24) + (24*2 + 2)
        assert_eq!(network.parameter_values().len(), 120 + 600 + 50);
    }

    #[test]
    fn test_valid_copy_preserves_weights() {
        let device = NdArrayDevice::default();
        let network = MlpConfig::new(2).init_q_network::<TestAutodiffBackend>(&device);
        let copy = network.valid();
        assert_eq!(network.parameter_values(), copy.parameter_values());
    }

    #[test]
    fn test_critic_gradient_flow() {
        let device = NdArrayDevice::default();
        let network = MlpConfig::new(2).init_actor_critic::<TestAutodiffBackend>(&device);

        let states = Tensor::ones([2, 4], &device).require_grad();
        let (probs, values) = network.forward(states.clone());
        let loss = values.sum() + probs.sum();
        let grads = loss.backward();

        assert!(states.grad(&grads).is_some());
    }
}
