//! Environment state machines
//!
//! Two fixed environments are provided:
//! - [`BalanceEnv`]: cart-pole balancing with shaped rewards (2 actions)
//! - [`GridEnv`]: grid-world maze navigation (4 actions)
//!
//! Sessions hold them through the [`Environment`] tagged variant, which
//! exposes the shared `reset`/`step` capability plus read access to the
//! variant-specific fields used for rendering.

pub mod action;
pub mod balance;
pub mod grid;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub use action::{Direction, Position};
pub use balance::{BalanceConfig, BalanceEnv};
pub use grid::{Cell, GridConfig, GridEnv, NudgeTarget};

use crate::params::{ParamSpec, update_validated};

/// Fixed-length state vector shared by both environments
pub type Observation = [f32; 4];

/// Number of components in an [`Observation`]
pub const OBSERVATION_DIM: usize = 4;

/// Outcome of a single environment step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepResult {
    pub observation: Observation,
    pub reward: f32,
    pub done: bool,
}

/// Discriminant used by configuration, persistence and the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EnvKind {
    Balance,
    Grid,
}

impl EnvKind {
    /// Short identifier used in model names
    pub fn slug(&self) -> &'static str {
        match self {
            EnvKind::Balance => "balance",
            EnvKind::Grid => "grid",
        }
    }
}

/// One of the sandbox environments
#[derive(Debug, Clone)]
pub enum Environment {
    Balance(BalanceEnv),
    Grid(GridEnv),
}

impl Environment {
    pub fn kind(&self) -> EnvKind {
        match self {
            Environment::Balance(_) => EnvKind::Balance,
            Environment::Grid(_) => EnvKind::Grid,
        }
    }

    /// Display name of the variant
    pub fn name(&self) -> &'static str {
        match self {
            Environment::Balance(_) => BalanceEnv::NAME,
            Environment::Grid(_) => GridEnv::NAME,
        }
    }

    pub fn num_actions(&self) -> usize {
        match self {
            Environment::Balance(_) => BalanceEnv::NUM_ACTIONS,
            Environment::Grid(_) => GridEnv::NUM_ACTIONS,
        }
    }

    /// Divisors that bring observations to roughly unit scale
    ///
    /// Balance observations are already normalized; grid coordinates are
    /// divided by the grid dimensions.
    pub fn observation_scale(&self) -> Observation {
        match self {
            Environment::Balance(_) => [1.0; OBSERVATION_DIM],
            Environment::Grid(env) => {
                let (cols, rows) = (env.cols() as f32, env.rows() as f32);
                [cols, rows, cols, rows]
            }
        }
    }

    /// Start a training episode away from home
    ///
    /// Balance honours its `random_start` setting; the grid relocates the
    /// agent to a fresh random cell.
    pub fn reset_random(&mut self) -> Observation {
        match self {
            Environment::Balance(env) => {
                let randomize = env.config.random_start;
                env.reset(randomize)
            }
            Environment::Grid(env) => env.reset(false),
        }
    }

    /// Return to the home configuration
    pub fn reset_home(&mut self) -> Observation {
        match self {
            Environment::Balance(env) => env.reset(false),
            Environment::Grid(env) => env.reset(true),
        }
    }

    pub fn step(&mut self, action: usize) -> StepResult {
        match self {
            Environment::Balance(env) => env.step(action),
            Environment::Grid(env) => env.step(action),
        }
    }

    /// Observation for the current state without stepping
    pub fn observation(&self) -> Observation {
        match self {
            Environment::Balance(env) => env.observation(),
            Environment::Grid(env) => env.observation(),
        }
    }

    /// Set a reward or physics parameter by id
    ///
    /// A value that leaves the configuration invalid is rejected and the
    /// current one kept.
    pub fn set_param(&mut self, name: &str, value: f32) -> crate::Result<()> {
        match self {
            Environment::Balance(env) => update_validated(
                &mut env.config,
                |config| config.set(name, value),
                BalanceConfig::validate,
            ),
            Environment::Grid(env) => update_validated(
                &mut env.config,
                |config| config.set(name, value),
                GridConfig::validate,
            ),
        }
    }

    /// Reward parameter descriptions for configuration builders
    pub fn reward_specs(&self) -> &'static [ParamSpec] {
        match self {
            Environment::Balance(_) => BalanceConfig::REWARD_SPECS,
            Environment::Grid(_) => GridConfig::REWARD_SPECS,
        }
    }
}

impl From<BalanceEnv> for Environment {
    fn from(env: BalanceEnv) -> Self {
        Environment::Balance(env)
    }
}

impl From<GridEnv> for Environment {
    fn from(env: GridEnv) -> Self {
        Environment::Grid(env)
    }
}
