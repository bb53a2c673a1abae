//! Deep Q-learning agent with experience replay and a target network
//!
//! Each `learn` call stores the transition, hard-syncs the target network
//! every `target_update_freq` calls, performs one gradient step on a batch
//! sampled without replacement once the memory holds more than a batch, and
//! finally decays epsilon. Targets follow the Double-DQN rule: the online
//! network picks the next action, the target network values it.

use anyhow::Context;
use burn::{
    module::{AutodiffModule, Module},
    optim::{Adam, AdamConfig, GradientsParams, Optimizer, adaptor::OptimizerAdaptor},
    record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder},
    tensor::{ElementConversion, Tensor, TensorData, backend::AutodiffBackend, backend::Backend},
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::agent::{Transition, UpdateReport, scale_observation};
use super::config::DqnConfig;
use super::network::{MlpConfig, QNetwork};
use super::replay::ReplayMemory;
use super::tabular::argmax;
use crate::env::{OBSERVATION_DIM, Observation};

const HUBER_DELTA: f32 = 1.0;

/// Value network agent
///
/// # Example
///
/// ```rust
/// use rl_sandbox::rl::{DqnAgent, DqnConfig, TrainingBackend, default_device};
///
/// let mut agent = DqnAgent::<TrainingBackend>::new(
///     2,
///     DqnConfig::default(),
///     [1.0; 4],
///     default_device(),
/// );
/// let action = agent.act(&[0.0; 4], true);
/// assert!(action < 2);
/// ```
pub struct DqnAgent<B: AutodiffBackend> {
    /// Live hyperparameters, read on every call
    pub hypers: DqnConfig,

    online: QNetwork<B>,

    /// Hard copy of `online`, never trained directly
    target: QNetwork<B::InnerBackend>,

    optim: OptimizerAdaptor<Adam, QNetwork<B>, B>,
    memory: ReplayMemory,
    learn_steps: u64,
    num_actions: usize,
    input_scale: Observation,
    rng: StdRng,
    device: B::Device,
}

impl<B: AutodiffBackend> DqnAgent<B> {
    pub fn new(
        num_actions: usize,
        hypers: DqnConfig,
        input_scale: Observation,
        device: B::Device,
    ) -> Self {
        Self::with_rng(num_actions, hypers, input_scale, device, StdRng::from_entropy())
    }

    pub fn with_seed(
        num_actions: usize,
        hypers: DqnConfig,
        input_scale: Observation,
        device: B::Device,
        seed: u64,
    ) -> Self {
        Self::with_rng(num_actions, hypers, input_scale, device, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        num_actions: usize,
        hypers: DqnConfig,
        input_scale: Observation,
        device: B::Device,
        rng: StdRng,
    ) -> Self {
        let online = MlpConfig::new(num_actions).init_q_network::<B>(&device);
        let target = online.valid();
        let memory = ReplayMemory::new(hypers.memory_capacity);

        Self {
            hypers,
            online,
            target,
            optim: AdamConfig::new().init(),
            memory,
            learn_steps: 0,
            num_actions,
            input_scale,
            rng,
            device,
        }
    }

    /// Epsilon-greedy over the online network's action values
    pub fn act(&mut self, state: &Observation, deterministic: bool) -> usize {
        if !deterministic && self.rng.gen::<f32>() < self.hypers.epsilon {
            return self.rng.gen_range(0..self.num_actions);
        }
        let q_values = self.q_values(state);
        argmax(&q_values)
    }

    /// Online network's action values for one state
    pub fn q_values(&self, state: &Observation) -> Vec<f32> {
        let network = self.online.valid();
        let input = self.batch_tensor::<B::InnerBackend>(std::slice::from_ref(state));
        network.forward(input).into_data().iter::<f32>().collect()
    }

    pub fn learn(&mut self, transition: Transition) -> Option<UpdateReport> {
        if self.memory.capacity() != self.hypers.memory_capacity {
            self.memory.set_capacity(self.hypers.memory_capacity);
        }
        self.memory.push(transition);

        self.learn_steps += 1;
        if self.learn_steps % self.hypers.target_update_freq as u64 == 0 {
            self.sync_target();
            debug!(learn_steps = self.learn_steps, "target network synced");
        }

        let report = if self.memory.len() > self.hypers.batch_size {
            Some(self.replay())
        } else {
            None
        };

        if self.hypers.epsilon > self.hypers.epsilon_min {
            self.hypers.epsilon *= self.hypers.epsilon_decay;
        }

        report
    }

    /// One gradient step on a sampled batch; returns the Huber loss
    fn replay(&mut self) -> UpdateReport {
        let batch = self.memory.sample(self.hypers.batch_size, &mut self.rng);
        let n = batch.len();
        let na = self.num_actions;

        let states: Vec<Observation> = batch.iter().map(|t| t.state).collect();
        let next_states: Vec<Observation> = batch.iter().map(|t| t.next_state).collect();

        let inner = self.online.valid();
        let current = values(inner.forward(self.batch_tensor(&states)));
        let next_online = values(inner.forward(self.batch_tensor(&next_states)));
        let next_target = values(self.target.forward(self.batch_tensor(&next_states)));

        // Non-taken actions keep the current prediction so only the taken
        // action contributes to the loss
        let mut targets = current;
        for (i, t) in batch.iter().enumerate() {
            let row = i * na;
            targets[row + t.action] = if t.done {
                t.reward
            } else {
                let next_action = argmax(&next_online[row..row + na]);
                t.reward + self.hypers.gamma * next_target[row + next_action]
            };
        }

        let predictions = self.online.forward(self.batch_tensor::<B>(&states));
        let targets = Tensor::<B, 2>::from_data(TensorData::new(targets, [n, na]), &self.device);
        let loss = huber_loss(predictions, targets);
        let loss_value = loss.clone().into_scalar().elem::<f32>();

        let grads = GradientsParams::from_grads(loss.backward(), &self.online);
        self.online = self
            .optim
            .step(self.hypers.alpha, self.online.clone(), grads);

        UpdateReport::Value { loss: loss_value }
    }

    /// Hard-copy the online weights into the target network
    pub fn sync_target(&mut self) {
        self.target = self.online.valid();
    }

    /// Cold restart: fresh networks, optimizer and memory
    pub fn reset(&mut self) {
        self.online = MlpConfig::new(self.num_actions).init_q_network::<B>(&self.device);
        self.target = self.online.valid();
        self.optim = AdamConfig::new().init();
        self.memory = ReplayMemory::new(self.hypers.memory_capacity);
        self.hypers.epsilon = self.hypers.epsilon_start;
        self.learn_steps = 0;
    }

    pub fn num_actions(&self) -> usize {
        self.num_actions
    }

    pub fn learn_steps(&self) -> u64 {
        self.learn_steps
    }

    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    pub fn online(&self) -> &QNetwork<B> {
        &self.online
    }

    pub fn target(&self) -> &QNetwork<B::InnerBackend> {
        &self.target
    }

    pub(crate) fn weights_to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        NamedMpkBytesRecorder::<FullPrecisionSettings>::new()
            .record(self.online.clone().into_record(), ())
            .context("Failed to encode value network weights")
    }

    /// Replace the online weights, then rebuild the optimizer and target
    pub(crate) fn load_weights(&mut self, bytes: Vec<u8>, learn_steps: u64) -> anyhow::Result<()> {
        let record = NamedMpkBytesRecorder::<FullPrecisionSettings>::new()
            .load(bytes, &self.device)
            .context("Failed to decode value network weights")?;
        self.online = self.online.clone().load_record(record);
        self.optim = AdamConfig::new().init();
        self.sync_target();
        self.learn_steps = learn_steps;
        Ok(())
    }

    fn batch_tensor<K: Backend<Device = B::Device>>(&self, states: &[Observation]) -> Tensor<K, 2> {
        let data: Vec<f32> = states
            .iter()
            .flat_map(|s| scale_observation(s, &self.input_scale))
            .collect();
        Tensor::from_data(TensorData::new(data, [states.len(), OBSERVATION_DIM]), &self.device)
    }
}

fn values<K: Backend>(tensor: Tensor<K, 2>) -> Vec<f32> {
    tensor.into_data().iter::<f32>().collect()
}

/// Smooth L1 loss with mean reduction
fn huber_loss<K: Backend>(predictions: Tensor<K, 2>, targets: Tensor<K, 2>) -> Tensor<K, 1> {
    let error = (predictions - targets).abs();
    let quadratic = error.clone().clamp_max(HUBER_DELTA);
    let linear = error - quadratic.clone();
    (quadratic.clone() * quadratic * 0.5 + linear * HUBER_DELTA).mean()
}
