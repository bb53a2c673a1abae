//! Learning agents
//!
//! Provides:
//! - Tabular Q-learning over bucketed state keys
//! - A DQN-style value network agent with replay memory and a target network
//! - A PPO-style actor-critic agent with GAE
//! - The [`Agent`] tagged variant sessions drive, and named model stores

pub mod agent;
pub mod backend;
pub mod buffer;
pub mod config;
pub mod dqn;
pub mod network;
pub mod persistence;
pub mod ppo;
pub mod replay;
pub mod tabular;

pub use agent::{Agent, AgentConfig, AgentKind, Decision, PolicyTrace, Transition, UpdateReport};
pub use backend::{InferenceBackend, TrainingBackend, default_device};
pub use buffer::{RolloutBuffer, compute_gae, normalize_advantages};
pub use config::{DqnConfig, PpoConfig, TabularConfig};
pub use dqn::DqnAgent;
pub use network::{ActorCriticNetwork, ActorNetwork, CriticNetwork, MlpConfig, QNetwork};
pub use persistence::{FileModelStore, MemoryModelStore, ModelMetadata, ModelStore, StoredModel, model_name};
pub use ppo::PpoAgent;
pub use replay::ReplayMemory;
pub use tabular::TabularAgent;
