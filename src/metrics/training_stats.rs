//! Training statistics tracking
//!
//! Rolling windows over episode outcomes and update losses, used for the
//! periodic progress log and the session report.

use std::collections::VecDeque;

use crate::rl::UpdateReport;

/// Training statistics tracker with rolling averages
///
/// # Example
///
/// ```rust
/// use rl_sandbox::metrics::TrainingStats;
/// use rl_sandbox::rl::UpdateReport;
///
/// let mut stats = TrainingStats::new(100);
/// stats.record_episode(15.5, 150, true);
/// stats.record_update(&UpdateReport::Value { loss: 0.05 });
///
/// assert_eq!(stats.total_episodes(), 1);
/// println!("{}", stats.format_summary());
/// ```
#[derive(Debug, Clone)]
pub struct TrainingStats {
    /// Episode rewards (rolling window)
    episode_rewards: VecDeque<f32>,

    /// Episode lengths in steps (rolling window)
    episode_lengths: VecDeque<usize>,

    /// Whether each episode ended by termination rather than the step budget
    episode_terminated: VecDeque<bool>,

    /// Value losses: Huber loss for DQN, critic MSE for PPO (rolling window)
    value_losses: VecDeque<f32>,

    /// Clipped surrogate losses (rolling window)
    policy_losses: VecDeque<f32>,

    /// Policy entropies (rolling window)
    entropies: VecDeque<f32>,

    total_episodes: usize,
    total_steps: usize,
    total_updates: usize,

    /// Best single-episode reward seen
    best_reward: Option<f32>,

    window_size: usize,
}

impl TrainingStats {
    pub fn new(window_size: usize) -> Self {
        Self {
            episode_rewards: VecDeque::with_capacity(window_size),
            episode_lengths: VecDeque::with_capacity(window_size),
            episode_terminated: VecDeque::with_capacity(window_size),
            value_losses: VecDeque::with_capacity(window_size),
            policy_losses: VecDeque::with_capacity(window_size),
            entropies: VecDeque::with_capacity(window_size),
            total_episodes: 0,
            total_steps: 0,
            total_updates: 0,
            best_reward: None,
            window_size,
        }
    }

    /// Record the completion of an episode
    ///
    /// `terminated` is true when the environment signalled the end (goal
    /// reached, pole fallen) and false when the step budget ran out.
    pub fn record_episode(&mut self, reward: f32, length: usize, terminated: bool) {
        Self::push_deque(&mut self.episode_rewards, reward, self.window_size);
        Self::push_deque(&mut self.episode_lengths, length, self.window_size);
        Self::push_deque(&mut self.episode_terminated, terminated, self.window_size);
        self.total_episodes += 1;
        self.total_steps += length;
        self.best_reward = Some(self.best_reward.map_or(reward, |best| best.max(reward)));
    }

    pub fn record_update(&mut self, report: &UpdateReport) {
        match *report {
            UpdateReport::Value { loss } => {
                Self::push_deque(&mut self.value_losses, loss, self.window_size);
            }
            UpdateReport::PolicyGradient {
                policy_loss,
                value_loss,
                entropy,
            } => {
                Self::push_deque(&mut self.policy_losses, policy_loss, self.window_size);
                Self::push_deque(&mut self.value_losses, value_loss, self.window_size);
                Self::push_deque(&mut self.entropies, entropy, self.window_size);
            }
        }
        self.total_updates += 1;
    }

    /// Mean episode reward over the rolling window, 0.0 when empty
    pub fn mean_episode_reward(&self) -> f32 {
        Self::mean(&self.episode_rewards)
    }

    pub fn mean_episode_length(&self) -> f32 {
        let sum: usize = self.episode_lengths.iter().sum();
        if self.episode_lengths.is_empty() {
            0.0
        } else {
            sum as f32 / self.episode_lengths.len() as f32
        }
    }

    /// Fraction of windowed episodes that ended by termination
    pub fn termination_rate(&self) -> f32 {
        if self.episode_terminated.is_empty() {
            0.0
        } else {
            let count = self.episode_terminated.iter().filter(|t| **t).count();
            count as f32 / self.episode_terminated.len() as f32
        }
    }

    pub fn mean_value_loss(&self) -> f32 {
        Self::mean(&self.value_losses)
    }

    pub fn mean_policy_loss(&self) -> f32 {
        Self::mean(&self.policy_losses)
    }

    pub fn mean_entropy(&self) -> f32 {
        Self::mean(&self.entropies)
    }

    pub fn best_reward(&self) -> Option<f32> {
        self.best_reward
    }

    pub fn total_episodes(&self) -> usize {
        self.total_episodes
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn total_updates(&self) -> usize {
        self.total_updates
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// One-line summary of the current statistics
    pub fn format_summary(&self) -> String {
        let mut summary = format!(
            "Episodes: {} | Steps: {} | Reward: {:.2} | Len: {:.1} | Done: {:.0}%",
            self.total_episodes,
            self.total_steps,
            self.mean_episode_reward(),
            self.mean_episode_length(),
            self.termination_rate() * 100.0,
        );
        if !self.value_losses.is_empty() {
            summary.push_str(&format!(" | V_Loss: {:.4}", self.mean_value_loss()));
        }
        if !self.policy_losses.is_empty() {
            summary.push_str(&format!(
                " | P_Loss: {:.4} | Entropy: {:.4}",
                self.mean_policy_loss(),
                self.mean_entropy()
            ));
        }
        summary
    }

    fn mean(deque: &VecDeque<f32>) -> f32 {
        if deque.is_empty() {
            0.0
        } else {
            deque.iter().sum::<f32>() / deque.len() as f32
        }
    }

    fn push_deque<T>(deque: &mut VecDeque<T>, value: T, window_size: usize) {
        if deque.len() >= window_size {
            deque.pop_front();
        }
        deque.push_back(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_update(policy_loss: f32, value_loss: f32, entropy: f32) -> UpdateReport {
        UpdateReport::PolicyGradient {
            policy_loss,
            value_loss,
            entropy,
        }
    }

    #[test]
    fn test_record_episode() {
        let mut stats = TrainingStats::new(100);
        stats.record_episode(10.0, 50, true);

        assert_eq!(stats.total_episodes(), 1);
        assert_eq!(stats.total_steps(), 50);
        assert!((stats.mean_episode_reward() - 10.0).abs() < 1e-5);
        assert!((stats.mean_episode_length() - 50.0).abs() < 1e-5);
        assert_eq!(stats.termination_rate(), 1.0);
        assert_eq!(stats.best_reward(), Some(10.0));
    }

    #[test]
    fn test_record_updates_by_kind() {
        let mut stats = TrainingStats::new(100);
        stats.record_update(&UpdateReport::Value { loss: 0.5 });
        stats.record_update(&policy_update(0.02, 0.1, 0.8));

        assert_eq!(stats.total_updates(), 2);
        assert!((stats.mean_value_loss() - 0.3).abs() < 1e-5);
        assert!((stats.mean_policy_loss() - 0.02).abs() < 1e-5);
        assert!((stats.mean_entropy() - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_rolling_average() {
        let mut stats = TrainingStats::new(3);

        stats.record_episode(1.0, 10, false);
        stats.record_episode(2.0, 20, false);
        stats.record_episode(3.0, 30, true);
        assert!((stats.mean_episode_reward() - 2.0).abs() < 1e-5);

        // A 4th episode evicts the first
        stats.record_episode(4.0, 40, true);
        assert_eq!(stats.total_episodes(), 4);
        assert!((stats.mean_episode_reward() - 3.0).abs() < 1e-5);
        assert!((stats.termination_rate() - 2.0 / 3.0).abs() < 1e-5);
        assert_eq!(stats.total_steps(), 100);
        assert_eq!(stats.best_reward(), Some(4.0));
    }

    #[test]
    fn test_best_reward_handles_negative_rewards() {
        let mut stats = TrainingStats::new(10);
        stats.record_episode(-50.0, 3, true);
        stats.record_episode(-20.0, 8, true);
        stats.record_episode(-70.0, 1, true);
        assert_eq!(stats.best_reward(), Some(-20.0));
    }

    #[test]
    fn test_format_summary() {
        let mut stats = TrainingStats::new(100);
        stats.record_episode(15.5, 150, true);
        let summary = stats.format_summary();
        assert!(summary.contains("Episodes: 1"));
        assert!(summary.contains("Steps: 150"));
        assert!(summary.contains("Reward: 15.50"));
        assert!(summary.contains("Done: 100%"));
        assert!(!summary.contains("V_Loss"));

        stats.record_update(&policy_update(0.02, 0.05, 0.8));
        let summary = stats.format_summary();
        assert!(summary.contains("V_Loss: 0.0500"));
        assert!(summary.contains("P_Loss: 0.0200"));
        assert!(summary.contains("Entropy: 0.8000"));
    }

    #[test]
    fn test_empty_stats() {
        let stats = TrainingStats::new(100);
        assert_eq!(stats.mean_episode_reward(), 0.0);
        assert_eq!(stats.mean_episode_length(), 0.0);
        assert_eq!(stats.termination_rate(), 0.0);
        assert_eq!(stats.mean_value_loss(), 0.0);
        assert_eq!(stats.best_reward(), None);
    }
}
