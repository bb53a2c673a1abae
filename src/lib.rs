//! RL Sandbox - environments, learning agents and an interruptible training loop
//!
//! This library provides:
//! - Two environments: cart-pole balancing and a grid-world maze (env module)
//! - Tabular Q-learning, DQN and PPO agents on burn (rl module)
//! - Training and playback sessions with cooperative pacing (modes module)
//! - Rolling training statistics (metrics module)

pub mod config;
pub mod env;
pub mod error;
pub mod metrics;
pub mod modes;
pub mod params;
pub mod rl;

pub use error::{Result, SandboxError};
