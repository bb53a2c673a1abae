//! Sandbox configuration
//!
//! A [`SandboxConfig`] names the environment/agent pair and carries every
//! tunable: physics and reward parameters, agent hyperparameters and session
//! budgets. It loads from a JSON file in which every section is optional; CLI
//! flags are applied on top by the binary.

use std::path::Path;

use anyhow::Context;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::env::{BalanceConfig, BalanceEnv, EnvKind, Environment, GridConfig, GridEnv};
use crate::error::{Result, SandboxError};
use crate::modes::VisualizationSpeed;
use crate::rl::{Agent, AgentConfig, AgentKind};

/// Episode budget and pacing for one session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Episodes to run back-to-back
    pub episodes: usize,

    /// Maximum steps per episode
    pub step_budget: usize,

    /// Pause between steps so observers can render
    pub visualize: bool,

    pub speed: VisualizationSpeed,

    /// Restore the agent from the model store instead of a cold start
    pub resume: bool,

    /// Log progress every N episodes
    pub log_interval: usize,
}

impl SessionConfig {
    /// Default budgets for an environment
    pub fn for_env(env: EnvKind) -> Self {
        let (episodes, step_budget) = match env {
            EnvKind::Balance => (500, 500),
            EnvKind::Grid => (100, 200),
        };
        Self {
            episodes,
            step_budget,
            visualize: false,
            speed: VisualizationSpeed::default(),
            resume: false,
            log_interval: 10,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.step_budget == 0 {
            return Err(SandboxError::invalid("step_budget must be at least 1"));
        }
        if self.log_interval == 0 {
            return Err(SandboxError::invalid("log_interval must be at least 1"));
        }
        Ok(())
    }
}

/// Everything needed to build a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    pub env: EnvKind,

    /// Defaults to the environment's preferred agent
    pub agent: Option<AgentKind>,

    pub balance: BalanceConfig,
    pub grid: GridConfig,
    pub agents: AgentConfig,

    /// Defaults to the environment's budgets
    pub session: Option<SessionConfig>,

    /// Seed for environments and agents; entropy when absent
    pub seed: Option<u64>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            env: EnvKind::Balance,
            agent: None,
            balance: BalanceConfig::default(),
            grid: GridConfig::default(),
            agents: AgentConfig::default(),
            session: None,
            seed: None,
        }
    }
}

impl SandboxConfig {
    /// Load from a JSON file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        serde_json::from_str(&json).with_context(|| format!("Failed to parse config {:?}", path))
    }

    pub fn agent_kind(&self) -> AgentKind {
        self.agent.unwrap_or_else(|| AgentKind::default_for(self.env))
    }

    pub fn session(&self) -> SessionConfig {
        self.session
            .clone()
            .unwrap_or_else(|| SessionConfig::for_env(self.env))
    }

    pub fn session_mut(&mut self) -> &mut SessionConfig {
        let env = self.env;
        self.session.get_or_insert_with(|| SessionConfig::for_env(env))
    }

    pub fn validate(&self) -> Result<()> {
        match self.env {
            EnvKind::Balance => self.balance.validate()?,
            EnvKind::Grid => self.grid.validate()?,
        }
        self.agents.validate(self.agent_kind())?;
        self.session().validate()
    }

    /// Fails when the selected environment's configuration does not validate
    pub fn build_environment(&self) -> Result<Environment> {
        Ok(match (self.env, self.seed) {
            (EnvKind::Balance, Some(seed)) => BalanceEnv::with_seed(self.balance.clone(), seed)?.into(),
            (EnvKind::Balance, None) => BalanceEnv::new(self.balance.clone())?.into(),
            (EnvKind::Grid, Some(seed)) => GridEnv::with_seed(self.grid.clone(), seed)?.into(),
            (EnvKind::Grid, None) => GridEnv::new(self.grid.clone())?.into(),
        })
    }

    /// Build the configured agent sized for `env`
    pub fn build_agent<B: AutodiffBackend>(&self, env: &Environment, device: B::Device) -> Agent<B> {
        Agent::build(
            self.agent_kind(),
            &self.agents,
            env.num_actions(),
            env.observation_scale(),
            device,
            self.seed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::{TrainingBackend, default_device};
    use tempfile::TempDir;

    #[test]
    fn test_default_is_valid() {
        let config = SandboxConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent_kind(), AgentKind::ActorCritic);
        assert_eq!(config.session().episodes, 500);
    }

    #[test]
    fn test_grid_defaults() {
        let config = SandboxConfig {
            env: EnvKind::Grid,
            ..Default::default()
        };
        assert_eq!(config.agent_kind(), AgentKind::TabularQ);
        assert_eq!(config.session().episodes, 100);
        assert_eq!(config.session().step_budget, 200);
    }

    #[test]
    fn test_partial_json() {
        let json = r#"{
            "env": "grid",
            "agent": "dqn",
            "grid": { "rows": 6, "cols": 8, "obstacle_probability": 0.1,
                      "goal": 50.0, "survival": -1.0, "damage": -5.0, "progress_bonus": 0.1 },
            "seed": 7
        }"#;
        let config: SandboxConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.env, EnvKind::Grid);
        assert_eq!(config.agent_kind(), AgentKind::ValueNetwork);
        assert_eq!(config.grid.rows, 6);
        assert_eq!(config.agents, AgentConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sandbox.json");
        let config = SandboxConfig {
            env: EnvKind::Grid,
            seed: Some(3),
            ..Default::default()
        };
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        assert_eq!(SandboxConfig::from_file(&path).unwrap(), config);
        assert!(SandboxConfig::from_file(&temp_dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_invalid_grid_size_rejected() {
        let mut config = SandboxConfig {
            env: EnvKind::Grid,
            ..Default::default()
        };
        config.grid.rows = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_overrides() {
        let mut config = SandboxConfig::default();
        config.session_mut().episodes = 3;
        config.session_mut().visualize = true;
        assert_eq!(config.session().episodes, 3);
        assert_eq!(config.session().step_budget, 500);
        assert!(config.session().visualize);
    }

    #[test]
    fn test_build_pairs_agent_with_environment() {
        let config = SandboxConfig {
            env: EnvKind::Grid,
            agent: Some(AgentKind::ActorCritic),
            seed: Some(1),
            ..Default::default()
        };
        let env = config.build_environment().unwrap();
        let agent = config.build_agent::<TrainingBackend>(&env, default_device());
        assert_eq!(agent.num_actions(), 4);
        assert_eq!(agent.kind(), AgentKind::ActorCritic);
    }
}
