//! Cart-pole balancing environment
//!
//! A cart moves along a finite track while a hinged pole rests on top of it.
//! Each step the agent pushes the cart left (action 0) or right (action 1)
//! with a fixed force; the dynamics are integrated with explicit Euler over a
//! fixed time step. The episode ends when the cart leaves the track or the pole
//! tips beyond the angle threshold.
//!
//! Observations are normalized so that every component is roughly unit scale:
//! position by the track threshold, angle by the angle threshold and both
//! rates by [`RATE_SCALE`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{Observation, StepResult};
use crate::error::{Result, SandboxError};
use crate::params::ParamSpec;

/// Divisor applied to linear and angular velocity in observations
pub const RATE_SCALE: f32 = 10.0;

/// Half-width of the noise band for non-position components on reset
const RESET_NOISE: f32 = 0.05;

/// Half-width of the position band when the start is randomized
const RANDOM_START_SPAN: f32 = 1.0;

/// Physics and reward configuration for [`BalanceEnv`]
///
/// Every field is read on each `step`, so mutations apply immediately, even
/// in the middle of an episode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceConfig {
    pub gravity: f32,
    pub mass_cart: f32,
    pub mass_pole: f32,
    /// Half the pole length
    pub length: f32,
    pub force_mag: f32,
    /// Seconds between state updates
    pub tau: f32,
    pub x_threshold: f32,
    pub theta_threshold: f32,
    /// Start anywhere on the track instead of near the center
    pub random_start: bool,

    /// Reward for each surviving step
    pub survival: f32,
    /// Reward on the terminal step
    pub fall_penalty: f32,
    /// Weight of the squared normalized distance from center
    pub center_bias: f32,
    /// Weight of `x * x_dot` (motion directed away from center)
    pub drift_penalty: f32,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            gravity: 9.8,
            mass_cart: 1.0,
            mass_pole: 0.1,
            length: 0.5,
            force_mag: 10.0,
            tau: 0.02,
            x_threshold: 2.4,
            theta_threshold: 12.0 * 2.0 * std::f32::consts::PI / 360.0,
            random_start: false,
            survival: 1.0,
            fall_penalty: -50.0,
            center_bias: 0.8,
            drift_penalty: 0.1,
        }
    }
}

impl BalanceConfig {
    /// Reward parameters
    pub const REWARD_SPECS: &'static [ParamSpec] = &[
        ParamSpec::new("survival", "Survival Reward", 1.0),
        ParamSpec::new("fall_penalty", "Fall Penalty", -50.0),
        ParamSpec::ranged("center_bias", "Center Bias", 0.0, 2.0, 0.1, 0.8),
    ];

    /// Physics parameters exposed to advanced configuration
    pub const PHYSICS_SPECS: &'static [ParamSpec] = &[
        ParamSpec::ranged("gravity", "Gravity", 1.0, 20.0, 0.1, 9.8),
        ParamSpec::ranged("length", "Pole Length", 0.1, 2.0, 0.1, 0.5),
        ParamSpec::ranged("force_mag", "Push Force", 1.0, 30.0, 1.0, 10.0),
    ];

    /// Set a reward or physics parameter by id
    ///
    /// `random_start` accepts any non-zero value as `true`.
    pub fn set(&mut self, name: &str, value: f32) -> Result<()> {
        match name {
            "gravity" => self.gravity = value,
            "length" => self.length = value,
            "force_mag" => self.force_mag = value,
            "mass_cart" => self.mass_cart = value,
            "mass_pole" => self.mass_pole = value,
            "random_start" => self.random_start = value != 0.0,
            "survival" => self.survival = value,
            "fall_penalty" => self.fall_penalty = value,
            "center_bias" => self.center_bias = value,
            "drift_penalty" => self.drift_penalty = value,
            _ => {
                return Err(SandboxError::UnknownParameter {
                    owner: "balance environment",
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.length <= 0.0 {
            return Err(SandboxError::invalid(format!(
                "pole length must be positive, got {}",
                self.length
            )));
        }
        if self.mass_cart <= 0.0 || self.mass_pole <= 0.0 {
            return Err(SandboxError::invalid("masses must be positive"));
        }
        if self.tau <= 0.0 {
            return Err(SandboxError::invalid(format!(
                "tau must be positive, got {}",
                self.tau
            )));
        }
        if self.x_threshold <= 0.0 || self.theta_threshold <= 0.0 {
            return Err(SandboxError::invalid("termination thresholds must be positive"));
        }
        Ok(())
    }
}

/// Cart-pole environment state machine
#[derive(Debug, Clone)]
pub struct BalanceEnv {
    pub config: BalanceConfig,
    /// `[x, x_dot, theta, theta_dot]` in physical units
    state: [f32; 4],
    steps: usize,
    rng: StdRng,
}

impl BalanceEnv {
    pub const NAME: &'static str = "CartPole";
    pub const NUM_ACTIONS: usize = 2;

    /// Fails when `config` does not validate
    pub fn new(config: BalanceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_rng(config, StdRng::from_entropy()))
    }

    /// Create an environment with a reproducible noise source
    pub fn with_seed(config: BalanceConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_rng(config, StdRng::seed_from_u64(seed)))
    }

    fn with_rng(config: BalanceConfig, rng: StdRng) -> Self {
        let mut env = Self {
            config,
            state: [0.0; 4],
            steps: 0,
            rng,
        };
        env.reset(false);
        env
    }

    /// Draw a fresh start state and return its normalized observation
    pub fn reset(&mut self, randomize_start: bool) -> Observation {
        let position_span = if randomize_start {
            RANDOM_START_SPAN
        } else {
            RESET_NOISE
        };
        self.state = [
            self.rng.gen_range(-position_span..position_span),
            self.rng.gen_range(-RESET_NOISE..RESET_NOISE),
            self.rng.gen_range(-RESET_NOISE..RESET_NOISE),
            self.rng.gen_range(-RESET_NOISE..RESET_NOISE),
        ];
        self.steps = 0;
        self.observation()
    }

    /// Advance the dynamics by one time step
    ///
    /// Any action other than 1 pushes left.
    pub fn step(&mut self, action: usize) -> StepResult {
        let c = &self.config;
        let [mut x, mut x_dot, mut theta, mut theta_dot] = self.state;

        let total_mass = c.mass_pole + c.mass_cart;
        let pole_mass_length = c.mass_pole * c.length;
        let force = if action == 1 { c.force_mag } else { -c.force_mag };
        let (sin_theta, cos_theta) = theta.sin_cos();

        let temp = (force + pole_mass_length * theta_dot * theta_dot * sin_theta) / total_mass;
        let theta_acc = (c.gravity * sin_theta - cos_theta * temp)
            / (c.length * (4.0 / 3.0 - c.mass_pole * cos_theta * cos_theta / total_mass));
        let x_acc = temp - pole_mass_length * theta_acc * cos_theta / total_mass;

        x += c.tau * x_dot;
        x_dot += c.tau * x_acc;
        theta += c.tau * theta_dot;
        theta_dot += c.tau * theta_acc;

        self.state = [x, x_dot, theta, theta_dot];
        self.steps += 1;

        let done = x.abs() > c.x_threshold || theta.abs() > c.theta_threshold;
        let reward = if done {
            c.fall_penalty
        } else {
            let dist_ratio = x.abs() / c.x_threshold;
            c.survival - c.center_bias * dist_ratio * dist_ratio - c.drift_penalty * x * x_dot
        };

        StepResult {
            observation: self.observation(),
            reward,
            done,
        }
    }

    /// Current state scaled to roughly unit range
    pub fn observation(&self) -> Observation {
        let [x, x_dot, theta, theta_dot] = self.state;
        [
            x / self.config.x_threshold,
            x_dot / RATE_SCALE,
            theta / self.config.theta_threshold,
            theta_dot / RATE_SCALE,
        ]
    }

    /// Raw physical state `[x, x_dot, theta, theta_dot]`
    pub fn state(&self) -> [f32; 4] {
        self.state
    }

    /// Overwrite the physical state, e.g. to start from a known configuration
    pub fn set_state(&mut self, state: [f32; 4]) {
        self.state = state;
        self.steps = 0;
    }

    pub fn cart_position(&self) -> f32 {
        self.state[0]
    }

    pub fn pole_angle(&self) -> f32 {
        self.state[2]
    }

    /// Steps taken since the last reset
    pub fn steps(&self) -> usize {
        self.steps
    }
}
