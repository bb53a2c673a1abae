//! Agent hyperparameter configuration
//!
//! Each agent owns one of these structs as its live `hypers`. Configuration
//! front-ends may mutate fields directly (or through the string-keyed `set`)
//! between calls; agents read them on every `act`/`learn`, so a change takes
//! effect on the next call and never retroactively.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SandboxError};
use crate::params::ParamSpec;

fn unknown(owner: &'static str, name: &str) -> SandboxError {
    SandboxError::UnknownParameter {
        owner,
        name: name.to_string(),
    }
}

fn check_unit(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(SandboxError::invalid(format!(
            "{name} must be in [0, 1], got {value}"
        )));
    }
    Ok(())
}

/// Hyperparameters for tabular Q-learning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TabularConfig {
    /// Probability of a uniformly random action
    pub epsilon: f32,
    /// Learning rate
    pub alpha: f32,
    /// Discount factor
    pub gamma: f32,
    /// Width of the buckets used to build state keys
    ///
    /// Integer grid coordinates are exact for any width that divides 1.
    pub bin_width: f32,
}

impl Default for TabularConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.1,
            alpha: 0.1,
            gamma: 0.9,
            bin_width: 0.1,
        }
    }
}

impl TabularConfig {
    pub const SPECS: &'static [ParamSpec] = &[
        ParamSpec::ranged("epsilon", "Curiosity (ε)", 0.0, 1.0, 0.01, 0.1),
        ParamSpec::ranged("alpha", "Learning Rate (α)", 0.01, 1.0, 0.01, 0.1),
        ParamSpec::ranged("gamma", "Future Bias (γ)", 0.0, 1.0, 0.01, 0.9),
    ];

    pub fn set(&mut self, name: &str, value: f32) -> Result<()> {
        match name {
            "epsilon" => self.epsilon = value,
            "alpha" => self.alpha = value,
            "gamma" => self.gamma = value,
            "bin_width" => self.bin_width = value,
            _ => return Err(unknown("tabular Q-learning", name)),
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        check_unit("epsilon", self.epsilon)?;
        check_unit("gamma", self.gamma)?;
        if self.alpha <= 0.0 || self.alpha > 1.0 {
            return Err(SandboxError::invalid(format!(
                "alpha must be in (0, 1], got {}",
                self.alpha
            )));
        }
        if self.bin_width <= 0.0 {
            return Err(SandboxError::invalid(format!(
                "bin_width must be positive, got {}",
                self.bin_width
            )));
        }
        Ok(())
    }
}

/// Hyperparameters for the DQN-style value network agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DqnConfig {
    /// Exploration rate, decayed on every `learn`
    pub epsilon: f32,
    /// Value `reset` restores epsilon to
    pub epsilon_start: f32,
    /// Multiplicative decay per learn step
    pub epsilon_decay: f32,
    /// Decay stops once epsilon is at or below this floor
    pub epsilon_min: f32,
    /// Adam learning rate
    pub alpha: f64,
    pub gamma: f32,
    /// Transitions per gradient step
    pub batch_size: usize,
    /// Learn steps between hard target-network syncs
    pub target_update_freq: usize,
    /// Replay memory capacity; shrinking it evicts the oldest transitions on the next `learn`
    pub memory_capacity: usize,
}

impl Default for DqnConfig {
    fn default() -> Self {
        Self {
            epsilon: 1.0,
            epsilon_start: 1.0,
            epsilon_decay: 0.995,
            epsilon_min: 0.01,
            alpha: 0.001,
            gamma: 0.95,
            batch_size: 64,
            target_update_freq: 500,
            memory_capacity: 2000,
        }
    }
}

impl DqnConfig {
    pub const SPECS: &'static [ParamSpec] = &[
        ParamSpec::ranged("epsilon", "Curiosity (ε)", 0.0, 1.0, 0.01, 1.0),
        ParamSpec::ranged("alpha", "Learning Rate (α)", 0.0001, 0.01, 0.0001, 0.001),
        ParamSpec::ranged("gamma", "Future Bias (γ)", 0.0, 1.0, 0.01, 0.95),
    ];

    pub fn set(&mut self, name: &str, value: f32) -> Result<()> {
        match name {
            "epsilon" => self.epsilon = value,
            "epsilon_decay" => self.epsilon_decay = value,
            "epsilon_min" => self.epsilon_min = value,
            "alpha" => self.alpha = value as f64,
            "gamma" => self.gamma = value,
            "batch_size" => self.batch_size = value as usize,
            "target_update_freq" => self.target_update_freq = value as usize,
            "memory_capacity" => self.memory_capacity = value as usize,
            _ => return Err(unknown("value network", name)),
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        check_unit("epsilon", self.epsilon)?;
        check_unit("epsilon_start", self.epsilon_start)?;
        check_unit("epsilon_min", self.epsilon_min)?;
        check_unit("gamma", self.gamma)?;
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            return Err(SandboxError::invalid(format!(
                "epsilon_decay must be in (0, 1], got {}",
                self.epsilon_decay
            )));
        }
        if self.alpha <= 0.0 {
            return Err(SandboxError::invalid(format!(
                "alpha must be positive, got {}",
                self.alpha
            )));
        }
        if self.batch_size == 0 {
            return Err(SandboxError::invalid("batch_size must be at least 1"));
        }
        if self.target_update_freq == 0 {
            return Err(SandboxError::invalid("target_update_freq must be at least 1"));
        }
        if self.memory_capacity <= self.batch_size {
            return Err(SandboxError::invalid(format!(
                "memory_capacity ({}) must exceed batch_size ({})",
                self.memory_capacity, self.batch_size
            )));
        }
        Ok(())
    }
}

/// Hyperparameters for the PPO-style actor-critic agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PpoConfig {
    /// Discount factor for future rewards
    pub gamma: f32,

    /// GAE lambda, trading bias (low) against variance (high)
    pub lambda: f32,

    /// Ratio clipping range ε of the surrogate objective
    pub clip_ratio: f32,

    /// Adam learning rate
    pub learning_rate: f64,

    /// Weight of the entropy bonus
    pub entropy_coef: f32,

    /// Weight of the critic's squared error
    pub value_coef: f32,

    /// Optimization passes over each rollout
    pub train_epochs: usize,

    /// Transitions collected before a training pass (episode ends also trigger one)
    pub rollout_size: usize,
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            lambda: 0.95,
            clip_ratio: 0.2,
            learning_rate: 0.001,
            entropy_coef: 0.01,
            value_coef: 0.5,
            train_epochs: 4,
            rollout_size: 128,
        }
    }
}

impl PpoConfig {
    pub const SPECS: &'static [ParamSpec] = &[
        ParamSpec::ranged("gamma", "Future Bias (γ)", 0.9, 0.999, 0.001, 0.99),
        ParamSpec::ranged("learning_rate", "Learning Rate (α)", 0.0001, 0.01, 0.0001, 0.001),
        ParamSpec::ranged("entropy_coef", "Curiosity / Randomness", 0.0, 0.1, 0.01, 0.01),
    ];

    pub fn set(&mut self, name: &str, value: f32) -> Result<()> {
        match name {
            "gamma" => self.gamma = value,
            "lambda" => self.lambda = value,
            "clip_ratio" => self.clip_ratio = value,
            "learning_rate" => self.learning_rate = value as f64,
            "entropy_coef" => self.entropy_coef = value,
            "value_coef" => self.value_coef = value,
            "train_epochs" => self.train_epochs = value as usize,
            "rollout_size" => self.rollout_size = value as usize,
            _ => return Err(unknown("actor-critic", name)),
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        check_unit("gamma", self.gamma)?;
        check_unit("lambda", self.lambda)?;
        if self.clip_ratio <= 0.0 || self.clip_ratio > 1.0 {
            return Err(SandboxError::invalid(format!(
                "clip_ratio must be in (0, 1], got {}",
                self.clip_ratio
            )));
        }
        if self.learning_rate <= 0.0 {
            return Err(SandboxError::invalid(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.entropy_coef < 0.0 || self.value_coef < 0.0 {
            return Err(SandboxError::invalid("loss coefficients must be non-negative"));
        }
        if self.train_epochs == 0 {
            return Err(SandboxError::invalid("train_epochs must be at least 1"));
        }
        if self.rollout_size == 0 {
            return Err(SandboxError::invalid("rollout_size must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(TabularConfig::default().validate().is_ok());
        assert!(DqnConfig::default().validate().is_ok());
        assert!(PpoConfig::default().validate().is_ok());
    }

    #[test]
    fn test_specs_match_defaults() {
        let tabular = TabularConfig::default();
        for spec in TabularConfig::SPECS {
            let mut config = tabular.clone();
            config.set(spec.id, spec.default).unwrap();
            assert_eq!(config, tabular, "{} default mismatch", spec.id);
        }

        let ppo = PpoConfig::default();
        for spec in PpoConfig::SPECS {
            let mut config = ppo.clone();
            config.set(spec.id, spec.default).unwrap();
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_set_unknown_name() {
        let mut config = DqnConfig::default();
        assert!(matches!(
            config.set("momentum", 0.9),
            Err(SandboxError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn test_validation_gamma_out_of_range() {
        let mut config = PpoConfig::default();
        config.gamma = 1.5;
        assert!(config.validate().is_err());

        config.gamma = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_target_update_freq() {
        let config = DqnConfig {
            target_update_freq: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_memory_must_exceed_batch() {
        let config = DqnConfig {
            memory_capacity: 64,
            batch_size: 64,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_epsilon_decay() {
        let mut config = DqnConfig::default();
        config.epsilon_decay = 0.0;
        assert!(config.validate().is_err());
        config.epsilon_decay = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_clip_ratio() {
        let mut config = PpoConfig::default();
        config.clip_ratio = 0.0;
        assert!(config.validate().is_err());
        config.clip_ratio = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_custom_config_roundtrips_through_json() {
        let config = PpoConfig {
            learning_rate: 3e-4,
            train_epochs: 10,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let restored: PpoConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }
}
