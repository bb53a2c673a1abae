//! The agent tagged variant and the values exchanged with the episode runner

use burn::tensor::backend::AutodiffBackend;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::config::{DqnConfig, PpoConfig, TabularConfig};
use super::dqn::DqnAgent;
use super::persistence::{ModelMetadata, ModelStore, StoredModel};
use super::ppo::PpoAgent;
use super::tabular::{TabularAgent, TabularSnapshot};
use crate::env::{EnvKind, OBSERVATION_DIM, Observation};
use crate::error::{Result, SandboxError};
use crate::params::{self, ParamSpec, update_validated};

/// One `(state, action, reward, next_state, done)` tuple
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub state: Observation,
    pub action: usize,
    pub reward: f32,
    pub next_state: Observation,
    pub done: bool,
}

/// Policy statistics recorded at action time by the actor-critic agent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyTrace {
    /// Log probability of the chosen action under the acting policy
    pub log_prob: f32,
    /// Critic estimate for the state
    pub value: f32,
}

/// Result of `act`
///
/// Not `Clone`: each decision is consumed by exactly one `learn` call.
#[derive(Debug)]
pub struct Decision {
    pub action: usize,
    pub trace: Option<PolicyTrace>,
}

impl Decision {
    fn plain(action: usize) -> Self {
        Self { action, trace: None }
    }
}

/// Losses of one gradient update
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdateReport {
    Value {
        loss: f32,
    },
    PolicyGradient {
        policy_loss: f32,
        value_loss: f32,
        entropy: f32,
    },
}

/// Discriminant used by configuration, persistence and the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum AgentKind {
    /// Tabular Q-learning
    #[serde(rename = "tabular")]
    #[value(name = "tabular")]
    TabularQ,
    /// Value network with replay memory (DQN)
    #[serde(rename = "dqn")]
    #[value(name = "dqn")]
    ValueNetwork,
    /// Actor-critic (PPO)
    #[serde(rename = "ppo")]
    #[value(name = "ppo")]
    ActorCritic,
}

impl AgentKind {
    pub fn slug(&self) -> &'static str {
        match self {
            AgentKind::TabularQ => "tabular",
            AgentKind::ValueNetwork => "dqn",
            AgentKind::ActorCritic => "ppo",
        }
    }

    /// Agent used when a configuration does not name one
    pub fn default_for(env: EnvKind) -> Self {
        match env {
            EnvKind::Balance => AgentKind::ActorCritic,
            EnvKind::Grid => AgentKind::TabularQ,
        }
    }
}

/// Hyperparameters for whichever agent a session builds
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub tabular: TabularConfig,
    pub dqn: DqnConfig,
    pub ppo: PpoConfig,
}

impl AgentConfig {
    pub fn validate(&self, kind: AgentKind) -> Result<()> {
        match kind {
            AgentKind::TabularQ => self.tabular.validate(),
            AgentKind::ValueNetwork => self.dqn.validate(),
            AgentKind::ActorCritic => self.ppo.validate(),
        }
    }
}

/// Scale each component by the matching divisor
pub(crate) fn scale_observation(state: &Observation, scale: &Observation) -> Observation {
    let mut scaled = [0.0; OBSERVATION_DIM];
    for (out, (v, s)) in scaled.iter_mut().zip(state.iter().zip(scale)) {
        *out = v / s;
    }
    scaled
}

/// One of the sandbox agents
pub enum Agent<B: AutodiffBackend> {
    TabularQ(TabularAgent),
    ValueNetwork(DqnAgent<B>),
    ActorCritic(PpoAgent<B>),
}

impl<B: AutodiffBackend> Agent<B> {
    /// Build an agent of `kind` for an environment with `num_actions` actions
    ///
    /// `input_scale` divides observations before they reach a network.
    pub fn build(
        kind: AgentKind,
        config: &AgentConfig,
        num_actions: usize,
        input_scale: Observation,
        device: B::Device,
        seed: Option<u64>,
    ) -> Self {
        match (kind, seed) {
            (AgentKind::TabularQ, Some(seed)) => {
                Agent::TabularQ(TabularAgent::with_seed(num_actions, config.tabular.clone(), seed))
            }
            (AgentKind::TabularQ, None) => {
                Agent::TabularQ(TabularAgent::new(num_actions, config.tabular.clone()))
            }
            (AgentKind::ValueNetwork, Some(seed)) => Agent::ValueNetwork(DqnAgent::with_seed(
                num_actions,
                config.dqn.clone(),
                input_scale,
                device,
                seed,
            )),
            (AgentKind::ValueNetwork, None) => Agent::ValueNetwork(DqnAgent::new(
                num_actions,
                config.dqn.clone(),
                input_scale,
                device,
            )),
            (AgentKind::ActorCritic, Some(seed)) => Agent::ActorCritic(PpoAgent::with_seed(
                num_actions,
                config.ppo.clone(),
                input_scale,
                device,
                seed,
            )),
            (AgentKind::ActorCritic, None) => Agent::ActorCritic(PpoAgent::new(
                num_actions,
                config.ppo.clone(),
                input_scale,
                device,
            )),
        }
    }

    pub fn kind(&self) -> AgentKind {
        match self {
            Agent::TabularQ(_) => AgentKind::TabularQ,
            Agent::ValueNetwork(_) => AgentKind::ValueNetwork,
            Agent::ActorCritic(_) => AgentKind::ActorCritic,
        }
    }

    pub fn num_actions(&self) -> usize {
        match self {
            Agent::TabularQ(agent) => agent.num_actions(),
            Agent::ValueNetwork(agent) => agent.num_actions(),
            Agent::ActorCritic(agent) => agent.num_actions(),
        }
    }

    pub fn act(&mut self, state: &Observation, deterministic: bool) -> Decision {
        match self {
            Agent::TabularQ(agent) => Decision::plain(agent.act(state, deterministic)),
            Agent::ValueNetwork(agent) => Decision::plain(agent.act(state, deterministic)),
            Agent::ActorCritic(agent) => agent.act(state, deterministic),
        }
    }

    /// Learn from the transition produced by acting on `decision`
    pub fn learn(&mut self, transition: Transition, decision: Decision) -> Option<UpdateReport> {
        match self {
            Agent::TabularQ(agent) => {
                agent.learn(
                    &transition.state,
                    transition.action,
                    transition.reward,
                    &transition.next_state,
                    transition.done,
                );
                None
            }
            Agent::ValueNetwork(agent) => agent.learn(transition),
            Agent::ActorCritic(agent) => agent.learn(transition, decision.trace),
        }
    }

    /// Cold restart, discarding everything learned
    pub fn reset(&mut self) {
        match self {
            Agent::TabularQ(agent) => agent.reset(),
            Agent::ValueNetwork(agent) => agent.reset(),
            Agent::ActorCritic(agent) => agent.reset(),
        }
    }

    /// Set a hyperparameter by id; applies from the next call
    ///
    /// Values outside the published bounds, or that leave the agent's
    /// configuration invalid, are rejected and the current value is kept.
    pub fn set_hyper(&mut self, name: &str, value: f32) -> Result<()> {
        if let Some(spec) = params::find(self.hyper_specs(), name) {
            if !spec.accepts(value) {
                return Err(SandboxError::invalid(format!(
                    "{name} must be in [{}, {}], got {value}",
                    spec.min.unwrap_or(f32::NEG_INFINITY),
                    spec.max.unwrap_or(f32::INFINITY)
                )));
            }
        }
        match self {
            Agent::TabularQ(agent) => update_validated(
                &mut agent.hypers,
                |hypers| hypers.set(name, value),
                TabularConfig::validate,
            ),
            Agent::ValueNetwork(agent) => update_validated(
                &mut agent.hypers,
                |hypers| hypers.set(name, value),
                DqnConfig::validate,
            ),
            Agent::ActorCritic(agent) => update_validated(
                &mut agent.hypers,
                |hypers| hypers.set(name, value),
                PpoConfig::validate,
            ),
        }
    }

    pub fn hyper_specs(&self) -> &'static [ParamSpec] {
        match self {
            Agent::TabularQ(_) => TabularConfig::SPECS,
            Agent::ValueNetwork(_) => DqnConfig::SPECS,
            Agent::ActorCritic(_) => PpoConfig::SPECS,
        }
    }

    pub fn learn_steps(&self) -> u64 {
        match self {
            Agent::TabularQ(agent) => agent.learn_steps(),
            Agent::ValueNetwork(agent) => agent.learn_steps(),
            Agent::ActorCritic(agent) => agent.training_step(),
        }
    }

    /// Serialize the learned state into `store` under `name`
    pub fn save_model(
        &self,
        store: &mut dyn ModelStore,
        name: &str,
        env: EnvKind,
    ) -> anyhow::Result<()> {
        let weights = match self {
            Agent::TabularQ(agent) => serde_json::to_vec(&agent.snapshot())?,
            Agent::ValueNetwork(agent) => agent.weights_to_bytes()?,
            Agent::ActorCritic(agent) => agent.weights_to_bytes()?,
        };
        let metadata =
            ModelMetadata::new(self.kind(), env, self.num_actions(), self.learn_steps());
        store.put(name, StoredModel { metadata, weights })
    }

    /// Restore learned state from `store`
    ///
    /// Returns `false`, leaving the agent untouched, when the entry is missing,
    /// was saved for another agent, environment or action count, or does not
    /// decode for this agent.
    pub fn load_model(&mut self, store: &dyn ModelStore, name: &str, env: EnvKind) -> bool {
        let stored = match store.get(name) {
            Ok(Some(stored)) => stored,
            Ok(None) => return false,
            Err(err) => {
                warn!(model = name, error = %err, "failed to read stored model");
                return false;
            }
        };

        if stored.metadata.agent != self.kind() {
            warn!(
                model = name,
                stored = stored.metadata.agent.slug(),
                expected = self.kind().slug(),
                "stored model belongs to a different agent"
            );
            return false;
        }
        if stored.metadata.env != env {
            warn!(
                model = name,
                stored = stored.metadata.env.slug(),
                expected = env.slug(),
                "stored model was trained on a different environment"
            );
            return false;
        }
        if stored.metadata.num_actions != self.num_actions() {
            warn!(
                model = name,
                stored = stored.metadata.num_actions,
                expected = self.num_actions(),
                "stored model has a different action count"
            );
            return false;
        }

        let learn_steps = stored.metadata.learn_steps;
        let loaded = match self {
            Agent::TabularQ(agent) => serde_json::from_slice::<TabularSnapshot>(&stored.weights)
                .map_err(anyhow::Error::from)
                .and_then(|snapshot| {
                    if snapshot.num_actions != agent.num_actions() {
                        anyhow::bail!(
                            "stored table has {} actions, agent has {}",
                            snapshot.num_actions,
                            agent.num_actions()
                        );
                    }
                    agent.restore(snapshot);
                    Ok(())
                }),
            Agent::ValueNetwork(agent) => agent.load_weights(stored.weights, learn_steps),
            Agent::ActorCritic(agent) => agent.load_weights(stored.weights, learn_steps),
        };

        match loaded {
            Ok(()) => true,
            Err(err) => {
                warn!(model = name, error = %err, "failed to decode stored model");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::persistence::MemoryModelStore;
    use crate::rl::{TrainingBackend, default_device};

    fn build(kind: AgentKind, num_actions: usize) -> Agent<TrainingBackend> {
        Agent::build(
            kind,
            &AgentConfig::default(),
            num_actions,
            [1.0; 4],
            default_device(),
            Some(21),
        )
    }

    #[test]
    fn test_scale_observation() {
        assert_eq!(
            scale_observation(&[2.0, 3.0, 4.0, 5.0], &[2.0, 6.0, 8.0, 10.0]),
            [1.0, 0.5, 0.5, 0.5]
        );
    }

    #[test]
    fn test_default_agent_per_environment() {
        assert_eq!(AgentKind::default_for(EnvKind::Balance), AgentKind::ActorCritic);
        assert_eq!(AgentKind::default_for(EnvKind::Grid), AgentKind::TabularQ);
    }

    #[test]
    fn test_only_actor_critic_records_trace() {
        for kind in [AgentKind::TabularQ, AgentKind::ValueNetwork, AgentKind::ActorCritic] {
            let mut agent = build(kind, 4);
            let decision = agent.act(&[0.0; 4], false);
            assert!(decision.action < 4);
            assert_eq!(decision.trace.is_some(), kind == AgentKind::ActorCritic);
        }
    }

    #[test]
    fn test_set_hyper_dispatches() {
        let mut agent = build(AgentKind::ValueNetwork, 2);
        agent.set_hyper("gamma", 0.5).unwrap();
        match &agent {
            Agent::ValueNetwork(inner) => assert_eq!(inner.hypers.gamma, 0.5),
            _ => unreachable!(),
        }
        assert!(agent.set_hyper("lambda", 0.5).is_err());
        assert!(agent.set_hyper("epsilon", 1.5).is_err());
        assert_eq!(agent.hyper_specs().len(), 3);
    }

    #[test]
    fn test_load_missing_model_returns_false() {
        let store = MemoryModelStore::default();
        let mut agent = build(AgentKind::TabularQ, 4);
        assert!(!agent.load_model(&store, "grid-tabular", EnvKind::Grid));
    }

    #[test]
    fn test_tabular_model_roundtrip() {
        let mut store = MemoryModelStore::default();
        let mut agent = build(AgentKind::TabularQ, 4);
        let state = [1.0, 2.0, 3.0, 4.0];
        let transition = Transition {
            state,
            action: 2,
            reward: 10.0,
            next_state: state,
            done: true,
        };
        let decision = agent.act(&state, false);
        agent.learn(transition, decision);
        agent.save_model(&mut store, "grid-tabular", EnvKind::Grid).unwrap();

        let mut restored = build(AgentKind::TabularQ, 4);
        assert!(restored.load_model(&store, "grid-tabular", EnvKind::Grid));
        match (&agent, &restored) {
            (Agent::TabularQ(a), Agent::TabularQ(b)) => {
                assert_eq!(a.q_values(&state), b.q_values(&state));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_load_rejects_other_agent_kind() {
        let mut store = MemoryModelStore::default();
        build(AgentKind::TabularQ, 2)
            .save_model(&mut store, "shared", EnvKind::Balance)
            .unwrap();

        let mut agent = build(AgentKind::ActorCritic, 2);
        assert!(!agent.load_model(&store, "shared", EnvKind::Balance));
    }

    #[test]
    fn test_network_model_roundtrip() {
        let mut store = MemoryModelStore::default();
        let agent = build(AgentKind::ValueNetwork, 2);
        agent.save_model(&mut store, "balance-dqn", EnvKind::Balance).unwrap();

        let mut restored = Agent::<TrainingBackend>::build(
            AgentKind::ValueNetwork,
            &AgentConfig::default(),
            2,
            [1.0; 4],
            default_device(),
            Some(99),
        );
        assert!(restored.load_model(&store, "balance-dqn", EnvKind::Balance));
        match (&agent, &restored) {
            (Agent::ValueNetwork(a), Agent::ValueNetwork(b)) => {
                assert_eq!(a.online().parameter_values(), b.online().parameter_values());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_set_hyper_rejects_values_that_fail_validation() {
        let mut agent = build(AgentKind::ValueNetwork, 2);
        for (name, value) in [
            ("target_update_freq", 0.0),
            ("batch_size", 0.0),
            ("epsilon_decay", 0.0),
            ("memory_capacity", 0.0),
        ] {
            assert!(agent.set_hyper(name, value).is_err(), "{name} = {value}");
        }
        match &agent {
            Agent::ValueNetwork(inner) => assert_eq!(inner.hypers, DqnConfig::default()),
            _ => unreachable!(),
        }

        // still learns with the untouched configuration
        for step in 0..40 {
            let transition = Transition {
                state: [0.1; 4],
                action: step % 2,
                reward: 1.0,
                next_state: [0.2; 4],
                done: false,
            };
            let decision = agent.act(&transition.state, false);
            agent.learn(transition, decision);
        }
        assert_eq!(agent.learn_steps(), 40);

        let mut agent = build(AgentKind::ActorCritic, 2);
        assert!(agent.set_hyper("train_epochs", 0.0).is_err());
        assert!(agent.set_hyper("rollout_size", 0.0).is_err());
        match &agent {
            Agent::ActorCritic(inner) => assert_eq!(inner.hypers, PpoConfig::default()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_load_rejects_other_action_count() {
        let mut store = MemoryModelStore::default();
        build(AgentKind::ValueNetwork, 4)
            .save_model(&mut store, "wide", EnvKind::Balance)
            .unwrap();

        let mut agent = build(AgentKind::ValueNetwork, 2);
        let before = match &agent {
            Agent::ValueNetwork(inner) => inner.online().parameter_values(),
            _ => unreachable!(),
        };
        assert!(!agent.load_model(&store, "wide", EnvKind::Balance));
        match &agent {
            Agent::ValueNetwork(inner) => assert_eq!(inner.online().parameter_values(), before),
            _ => unreachable!(),
        }
        assert_eq!(agent.num_actions(), 2);
    }

    #[test]
    fn test_load_rejects_other_environment() {
        let mut store = MemoryModelStore::default();
        build(AgentKind::ActorCritic, 2)
            .save_model(&mut store, "ppo", EnvKind::Grid)
            .unwrap();

        let mut agent = build(AgentKind::ActorCritic, 2);
        assert!(!agent.load_model(&store, "ppo", EnvKind::Balance));
        assert!(agent.load_model(&store, "ppo", EnvKind::Grid));
    }
}
