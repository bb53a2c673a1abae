//! PPO-style actor-critic agent
//!
//! `act` evaluates the actor and critic once and hands back a [`PolicyTrace`]
//! (log probability and value) inside the [`Decision`]; the caller threads it
//! into the matching `learn` call. A training pass runs when the rollout
//! reaches `rollout_size` or an episode ends, after which the rollout is
//! discarded.

use anyhow::Context;
use burn::{
    module::{AutodiffModule, Module},
    optim::{Adam, AdamConfig, GradientsParams, Optimizer, adaptor::OptimizerAdaptor},
    record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder},
    tensor::{
        ElementConversion, Int, Tensor, TensorData,
        backend::{AutodiffBackend, Backend},
    },
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::agent::{Decision, PolicyTrace, Transition, UpdateReport, scale_observation};
use super::buffer::{RolloutBuffer, compute_gae, normalize_advantages};
use super::config::PpoConfig;
use super::network::{ActorCriticNetwork, MlpConfig};
use super::tabular::argmax;
use crate::env::{OBSERVATION_DIM, Observation};

/// Floor applied to probabilities before taking logarithms
const PROB_FLOOR: f32 = 1e-7;

/// Actor-critic agent trained with the clipped surrogate objective
///
/// # Example
///
/// ```rust
/// use rl_sandbox::rl::{PpoAgent, PpoConfig, TrainingBackend, default_device};
///
/// let mut agent = PpoAgent::<TrainingBackend>::new(
///     2,
///     PpoConfig::default(),
///     [1.0; 4],
///     default_device(),
/// );
/// let decision = agent.act(&[0.0; 4], false);
/// assert!(decision.action < 2);
/// assert!(decision.trace.is_some());
/// ```
pub struct PpoAgent<B: AutodiffBackend> {
    /// Live hyperparameters, read on every call
    pub hypers: PpoConfig,

    network: ActorCriticNetwork<B>,
    optim: OptimizerAdaptor<Adam, ActorCriticNetwork<B>, B>,
    buffer: RolloutBuffer,
    training_step: u64,
    num_actions: usize,
    input_scale: Observation,
    rng: StdRng,
    device: B::Device,
}

impl<B: AutodiffBackend> PpoAgent<B> {
    pub fn new(
        num_actions: usize,
        hypers: PpoConfig,
        input_scale: Observation,
        device: B::Device,
    ) -> Self {
        Self::with_rng(num_actions, hypers, input_scale, device, StdRng::from_entropy())
    }

    pub fn with_seed(
        num_actions: usize,
        hypers: PpoConfig,
        input_scale: Observation,
        device: B::Device,
        seed: u64,
    ) -> Self {
        Self::with_rng(num_actions, hypers, input_scale, device, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        num_actions: usize,
        hypers: PpoConfig,
        input_scale: Observation,
        device: B::Device,
        rng: StdRng,
    ) -> Self {
        let network = MlpConfig::new(num_actions).init_actor_critic::<B>(&device);
        let buffer = RolloutBuffer::new(hypers.rollout_size);

        Self {
            hypers,
            network,
            optim: AdamConfig::new().init(),
            buffer,
            training_step: 0,
            num_actions,
            input_scale,
            rng,
            device,
        }
    }

    /// Sample (or, when `deterministic`, pick the most probable) action
    pub fn act(&mut self, state: &Observation, deterministic: bool) -> Decision {
        let network = self.network.valid();
        let (probs, value) = network.forward(self.batch_tensor(std::slice::from_ref(state)));

        let probs: Vec<f32> = probs.into_data().iter::<f32>().collect();
        let value = value.into_scalar().elem::<f32>();

        let action = if deterministic {
            argmax(&probs)
        } else {
            sample_categorical(&probs, &mut self.rng)
        };

        Decision {
            action,
            trace: Some(PolicyTrace {
                log_prob: probs[action].max(PROB_FLOOR).ln(),
                value,
            }),
        }
    }

    /// Buffer the transition; train when the rollout is full or the episode ended
    ///
    /// A transition without a trace (one not produced by this agent's `act`)
    /// is ignored.
    pub fn learn(&mut self, transition: Transition, trace: Option<PolicyTrace>) -> Option<UpdateReport> {
        let trace = trace?;
        self.buffer.push(
            transition.state,
            transition.action,
            transition.reward,
            transition.done,
            trace.log_prob,
            trace.value,
            transition.next_state,
        );

        self.buffer.set_capacity(self.hypers.rollout_size);
        if self.buffer.is_full() || transition.done {
            Some(self.train())
        } else {
            None
        }
    }

    fn train(&mut self) -> UpdateReport {
        let n = self.buffer.len();
        let config = self.hypers.clone();

        let last_value = match self.buffer.last_next_state() {
            Some(next_state) if !self.buffer.last_done() => self.state_value(&next_state),
            _ => 0.0,
        };

        let (mut advantages, returns) = compute_gae(
            self.buffer.rewards(),
            self.buffer.values(),
            self.buffer.dones(),
            last_value,
            config.gamma,
            config.lambda,
        );
        normalize_advantages(&mut advantages);

        let states: Tensor<B, 2> = self.batch_tensor(self.buffer.states());
        let actions_data: Vec<i64> = self.buffer.actions().iter().map(|&a| a as i64).collect();
        let actions = Tensor::<B, 1, Int>::from_data(TensorData::new(actions_data, [n]), &self.device);
        let old_log_probs = self.vector(self.buffer.log_probs().to_vec());
        let advantages = self.vector(advantages);
        let returns = self.vector(returns);

        let mut total_policy_loss = 0.0;
        let mut total_value_loss = 0.0;
        let mut total_entropy = 0.0;

        for _epoch in 0..config.train_epochs {
            let (probs, values) = self.network.forward(states.clone());

            let (policy_loss, entropy) = compute_policy_loss(
                probs,
                actions.clone(),
                old_log_probs.clone(),
                advantages.clone(),
                config.clip_ratio,
            );
            let value_loss = compute_value_loss(values, returns.clone());

            // L = L_clip + c_v * L_value - c_e * H
            let total_loss = policy_loss.clone() + value_loss.clone() * config.value_coef
                - entropy.clone() * config.entropy_coef;

            let grads = GradientsParams::from_grads(total_loss.backward(), &self.network);
            self.network = self
                .optim
                .step(config.learning_rate, self.network.clone(), grads);

            total_policy_loss += policy_loss.into_scalar().elem::<f32>();
            total_value_loss += value_loss.into_scalar().elem::<f32>();
            total_entropy += entropy.into_scalar().elem::<f32>();
        }

        self.buffer.clear();
        self.training_step += 1;

        let epochs = config.train_epochs as f32;
        let report = UpdateReport::PolicyGradient {
            policy_loss: total_policy_loss / epochs,
            value_loss: total_value_loss / epochs,
            entropy: total_entropy / epochs,
        };
        debug!(rollout = n, training_step = self.training_step, ?report, "ppo update");
        report
    }

    /// Critic estimate for a single state
    pub fn state_value(&self, state: &Observation) -> f32 {
        let network = self.network.valid();
        network
            .critic
            .forward(self.batch_tensor(std::slice::from_ref(state)))
            .into_scalar()
            .elem::<f32>()
    }

    /// Discard the rollout and rebuild both towers and the optimizer
    pub fn reset(&mut self) {
        self.network = MlpConfig::new(self.num_actions).init_actor_critic::<B>(&self.device);
        self.optim = AdamConfig::new().init();
        self.buffer = RolloutBuffer::new(self.hypers.rollout_size);
        self.training_step = 0;
    }

    pub fn num_actions(&self) -> usize {
        self.num_actions
    }

    pub fn training_step(&self) -> u64 {
        self.training_step
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn network(&self) -> &ActorCriticNetwork<B> {
        &self.network
    }

    pub(crate) fn weights_to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        NamedMpkBytesRecorder::<FullPrecisionSettings>::new()
            .record(self.network.clone().into_record(), ())
            .context("Failed to encode actor-critic weights")
    }

    /// Replace the weights and start a fresh optimizer and rollout
    pub(crate) fn load_weights(&mut self, bytes: Vec<u8>, training_step: u64) -> anyhow::Result<()> {
        let record = NamedMpkBytesRecorder::<FullPrecisionSettings>::new()
            .load(bytes, &self.device)
            .context("Failed to decode actor-critic weights")?;
        self.network = self.network.clone().load_record(record);
        self.optim = AdamConfig::new().init();
        self.buffer.clear();
        self.training_step = training_step;
        Ok(())
    }

    fn batch_tensor<K: Backend<Device = B::Device>>(&self, states: &[Observation]) -> Tensor<K, 2> {
        let data: Vec<f32> = states
            .iter()
            .flat_map(|s| scale_observation(s, &self.input_scale))
            .collect();
        Tensor::from_data(TensorData::new(data, [states.len(), OBSERVATION_DIM]), &self.device)
    }

    fn vector(&self, data: Vec<f32>) -> Tensor<B, 1> {
        let n = data.len();
        Tensor::from_data(TensorData::new(data, [n]), &self.device)
    }
}

/// Clipped surrogate loss and mean entropy
///
/// ```text
/// r = exp(log π_new(a|s) - log π_old(a|s))
/// L = -mean(min(r * A, clip(r, 1-ε, 1+ε) * A))
/// H = -mean(Σ π log π)
/// ```
fn compute_policy_loss<K: Backend>(
    probs: Tensor<K, 2>,
    actions: Tensor<K, 1, Int>,
    old_log_probs: Tensor<K, 1>,
    advantages: Tensor<K, 1>,
    clip_ratio: f32,
) -> (Tensor<K, 1>, Tensor<K, 1>) {
    let log_probs_all = probs.clone().clamp_min(PROB_FLOOR).log();
    let new_log_probs = log_probs_all
        .clone()
        .gather(1, actions.unsqueeze_dim(1))
        .squeeze::<1>(1);

    let ratio = (new_log_probs - old_log_probs).exp();
    let surr1 = ratio.clone() * advantages.clone();
    let surr2 = ratio.clamp(1.0 - clip_ratio, 1.0 + clip_ratio) * advantages;
    let policy_loss = surr1.min_pair(surr2).neg().mean();

    let entropy = (probs * log_probs_all).sum_dim(1).neg().mean();

    (policy_loss, entropy)
}

/// Mean squared error between critic values `[batch, 1]` and returns `[batch]`
fn compute_value_loss<K: Backend>(values: Tensor<K, 2>, returns: Tensor<K, 1>) -> Tensor<K, 1> {
    let diff = values.squeeze::<1>(1) - returns;
    (diff.clone() * diff).mean()
}

/// Sample an index from a probability vector
fn sample_categorical<R: Rng + ?Sized>(probs: &[f32], rng: &mut R) -> usize {
    let random_val: f32 = rng.sample(rand::distributions::Standard);
    let mut cumsum = 0.0;

    for (idx, &prob) in probs.iter().enumerate() {
        cumsum += prob;
        if random_val < cumsum {
            return idx;
        }
    }

    // Rounding can leave the cumulative sum just below 1
    probs.len() - 1
}
