//! Rollout buffer for on-policy trajectory collection
//!
//! Stores the transitions of the current rollout together with the log
//! probability and value estimate recorded when each action was chosen, and
//! computes advantages with Generalized Advantage Estimation (GAE). The buffer
//! is cleared after every training pass; data never survives a policy update.

use crate::env::Observation;

/// On-policy rollout storage
///
/// # Example
///
/// ```rust
/// use rl_sandbox::rl::RolloutBuffer;
///
/// let mut buffer = RolloutBuffer::new(128);
/// buffer.push([0.0; 4], 1, 1.0, false, -0.69, 0.5, [0.1, 0.0, 0.0, 0.0]);
///
/// assert_eq!(buffer.len(), 1);
/// assert!(!buffer.is_full());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RolloutBuffer {
    states: Vec<Observation>,
    actions: Vec<usize>,
    rewards: Vec<f32>,
    dones: Vec<bool>,
    log_probs: Vec<f32>,
    values: Vec<f32>,

    /// Successor of the most recent transition, used to bootstrap the tail
    last_next_state: Option<Observation>,

    capacity: usize,
}

impl RolloutBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            states: Vec::with_capacity(capacity),
            actions: Vec::with_capacity(capacity),
            rewards: Vec::with_capacity(capacity),
            dones: Vec::with_capacity(capacity),
            log_probs: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            last_next_state: None,
            capacity,
        }
    }

    /// Add a transition with its acquisition-time log probability and value
    #[allow(clippy::too_many_arguments)]
    pub fn push(
        &mut self,
        state: Observation,
        action: usize,
        reward: f32,
        done: bool,
        log_prob: f32,
        value: f32,
        next_state: Observation,
    ) {
        self.states.push(state);
        self.actions.push(action);
        self.rewards.push(reward);
        self.dones.push(done);
        self.log_probs.push(log_prob);
        self.values.push(value);
        self.last_next_state = Some(next_state);
    }

    /// Capacity can change between rollouts when the hyperparameters change
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    pub fn is_full(&self) -> bool {
        self.states.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn states(&self) -> &[Observation] {
        &self.states
    }

    pub fn actions(&self) -> &[usize] {
        &self.actions
    }

    pub fn rewards(&self) -> &[f32] {
        &self.rewards
    }

    pub fn dones(&self) -> &[bool] {
        &self.dones
    }

    pub fn log_probs(&self) -> &[f32] {
        &self.log_probs
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Whether the last stored step ended its episode
    pub fn last_done(&self) -> bool {
        self.dones.last().copied().unwrap_or(true)
    }

    pub fn last_next_state(&self) -> Option<Observation> {
        self.last_next_state
    }

    pub fn clear(&mut self) {
        self.states.clear();
        self.actions.clear();
        self.rewards.clear();
        self.dones.clear();
        self.log_probs.clear();
        self.values.clear();
        self.last_next_state = None;
    }
}

/// Generalized Advantage Estimation over one rollout
///
/// Iterates backwards through the rollout:
///
/// ```text
/// δ_t   = r_t + γ * V_{t+1} * (1 - done_t) - V_t
/// gae_t = δ_t + γλ * (1 - done_t) * gae_{t+1}
/// R_t   = gae_t + V_t
/// ```
///
/// where `V_{n}` is `last_value`. Returns `(advantages, returns)`, both
/// unnormalized.
pub fn compute_gae(
    rewards: &[f32],
    values: &[f32],
    dones: &[bool],
    last_value: f32,
    gamma: f32,
    lambda: f32,
) -> (Vec<f32>, Vec<f32>) {
    let n = rewards.len();
    let mut advantages = vec![0.0; n];
    let mut returns = vec![0.0; n];

    let mut next_value = last_value;
    let mut gae = 0.0;

    for t in (0..n).rev() {
        let mask = if dones[t] { 0.0 } else { 1.0 };
        let delta = rewards[t] + gamma * next_value * mask - values[t];
        gae = delta + gamma * lambda * mask * gae;

        advantages[t] = gae;
        returns[t] = gae + values[t];
        next_value = values[t];
    }

    (advantages, returns)
}

/// Shift to zero mean and scale to unit variance
pub fn normalize_advantages(advantages: &mut [f32]) {
    let n = advantages.len();
    if n == 0 {
        return;
    }
    let mean = advantages.iter().sum::<f32>() / n as f32;
    let variance = advantages.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / n as f32;
    let std = (variance + 1e-8).sqrt();

    for a in advantages.iter_mut() {
        *a = (*a - mean) / std;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_constant(buffer: &mut RolloutBuffer, done: bool) {
        buffer.push([0.0; 4], 0, 1.0, done, -0.7, 0.5, [0.0; 4]);
    }

    #[test]
    fn test_buffer_fills_to_capacity() {
        let mut buffer = RolloutBuffer::new(5);
        for _ in 0..5 {
            push_constant(&mut buffer, false);
        }
        assert_eq!(buffer.len(), 5);
        assert!(buffer.is_full());
        assert!(!buffer.last_done());
    }

    #[test]
    fn test_buffer_clear() {
        let mut buffer = RolloutBuffer::new(10);
        for _ in 0..5 {
            push_constant(&mut buffer, false);
        }
        buffer.clear();

        assert!(buffer.is_empty());
        assert!(buffer.last_next_state().is_none());
    }

    #[test]
    fn test_last_next_state_tracks_latest_push() {
        let mut buffer = RolloutBuffer::new(10);
        buffer.push([0.0; 4], 0, 0.0, false, 0.0, 0.0, [1.0, 0.0, 0.0, 0.0]);
        buffer.push([1.0, 0.0, 0.0, 0.0], 1, 0.0, false, 0.0, 0.0, [2.0, 0.0, 0.0, 0.0]);
        assert_eq!(buffer.last_next_state(), Some([2.0, 0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_gae_closed_form_three_steps() {
        let (gamma, lambda) = (0.9, 0.8);
        let (advantages, returns) =
            compute_gae(&[1.0; 3], &[0.5; 3], &[false; 3], 0.5, gamma, lambda);

        // δ = 1 + 0.9 * 0.5 - 0.5 = 0.95 for every step
        // A2 = 0.95
        // A1 = 0.95 + 0.72 * 0.95 = 1.634
        // A0 = 0.95 + 0.72 * 1.634 = 2.12648
        let expected = [2.12648, 1.634, 0.95];
        for (a, e) in advantages.iter().zip(expected) {
            assert!((a - e).abs() < 1e-5, "{a} != {e}");
        }
        for (r, a) in returns.iter().zip(&advantages) {
            assert!((r - (a + 0.5)).abs() < 1e-6);
        }
        assert!(advantages[0] > advantages[1] && advantages[1] > advantages[2]);
    }

    #[test]
    fn test_gae_terminal_step_does_not_bootstrap() {
        let (advantages, returns) =
            compute_gae(&[1.0, 1.0], &[0.5, 0.5], &[false, true], 100.0, 0.99, 0.95);

        // Terminal step: δ = 1 - 0.5, no contribution from last_value
        assert!((advantages[1] - 0.5).abs() < 1e-6);
        assert!((returns[1] - 1.0).abs() < 1e-6);

        let delta0 = 1.0 + 0.99 * 0.5 - 0.5;
        assert!((advantages[0] - (delta0 + 0.99 * 0.95 * 0.5)).abs() < 1e-5);
    }

    #[test]
    fn test_gae_empty_rollout() {
        let (advantages, returns) = compute_gae(&[], &[], &[], 0.0, 0.99, 0.95);
        assert!(advantages.is_empty());
        assert!(returns.is_empty());
    }

    #[test]
    fn test_advantage_normalization() {
        let mut advantages: Vec<f32> = (0..10).map(|i| i as f32).collect();
        normalize_advantages(&mut advantages);

        let n = advantages.len() as f32;
        let mean: f32 = advantages.iter().sum::<f32>() / n;
        let variance: f32 = advantages.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / n;

        assert!(mean.abs() < 1e-5);
        assert!((variance.sqrt() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_normalization_of_constant_advantages_is_finite() {
        let mut advantages = vec![0.3; 4];
        normalize_advantages(&mut advantages);
        assert!(advantages.iter().all(|a| a.is_finite() && a.abs() < 1e-3));
    }
}
