//! Playback of a trained policy
//!
//! Acts deterministically without learning, one step per tick. When the
//! environment terminates it is returned home and playback stops.

use std::time::Duration;

use burn::tensor::backend::AutodiffBackend;
use tracing::info;

use super::control::{
    EpisodeSummary, SessionControl, SessionObserver, SessionState, playback_interval,
};
use super::train::check_action_space;
use crate::env::Environment;
use crate::error::Result;
use crate::rl::Agent;

pub struct PlaybackSession<B: AutodiffBackend> {
    env: Environment,
    agent: Agent<B>,
    control: SessionControl,
    tick: Duration,
    step_budget: usize,
}

impl<B: AutodiffBackend> PlaybackSession<B> {
    pub fn new(env: Environment, agent: Agent<B>, step_budget: usize) -> Result<Self> {
        check_action_space(&env, &agent)?;
        let tick = playback_interval(env.kind());

        Ok(Self {
            env,
            agent,
            control: SessionControl::default(),
            tick,
            step_budget,
        })
    }

    /// Override the per-environment tick
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn agent_mut(&mut self) -> &mut Agent<B> {
        &mut self.agent
    }

    /// Play one episode from the home position
    pub async fn play(&mut self, observer: &mut dyn SessionObserver) -> EpisodeSummary {
        self.control.clear_interrupt();
        self.control.set_state(SessionState::Running);

        let mut interval = tokio::time::interval(self.tick);
        let mut state = self.env.reset_home();
        let mut summary = EpisodeSummary {
            episode: 0,
            reward: 0.0,
            steps: 0,
            terminated: false,
            interrupted: false,
        };

        while summary.steps < self.step_budget {
            interval.tick().await;
            if self.control.is_interrupted() {
                summary.interrupted = true;
                break;
            }

            let action = self.agent.act(&state, true).action;
            let result = self.env.step(action);
            summary.reward += result.reward;
            summary.steps += 1;
            state = result.observation;
            observer.on_step(&self.env, &result);

            if result.done {
                summary.terminated = true;
                break;
            }
        }

        self.env.reset_home();
        self.control.set_state(if summary.interrupted {
            SessionState::Interrupted
        } else {
            SessionState::Idle
        });
        observer.on_episode_end(&summary);

        info!(
            env = self.env.name(),
            reward = summary.reward,
            steps = summary.steps,
            terminated = summary.terminated,
            "playback finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{BalanceConfig, BalanceEnv, GridConfig, GridEnv, StepResult};
    use crate::modes::NullObserver;
    use crate::rl::{AgentConfig, AgentKind, TrainingBackend, default_device};

    fn agent(kind: AgentKind, env: &Environment) -> Agent<TrainingBackend> {
        Agent::build(
            kind,
            &AgentConfig::default(),
            env.num_actions(),
            env.observation_scale(),
            default_device(),
            Some(4),
        )
    }

    #[tokio::test]
    async fn test_playback_is_deterministic() {
        let env: Environment = GridEnv::with_seed(GridConfig::default(), 12).unwrap().into();
        let policy = agent(AgentKind::ActorCritic, &env);
        let mut session = PlaybackSession::new(env, policy, 30)
            .unwrap()
            .with_tick(Duration::from_millis(1));

        let first = session.play(&mut NullObserver).await;
        let second = session.play(&mut NullObserver).await;

        assert_eq!(first.steps, second.steps);
        assert_eq!(first.reward, second.reward);
        assert!(first.steps <= 30);
    }

    #[tokio::test]
    async fn test_playback_does_not_learn() {
        let env: Environment = GridEnv::with_seed(GridConfig::default(), 8).unwrap().into();
        let policy = agent(AgentKind::TabularQ, &env);
        let mut session = PlaybackSession::new(env, policy, 20)
            .unwrap()
            .with_tick(Duration::from_millis(1));

        session.play(&mut NullObserver).await;
        assert_eq!(session.agent_mut().learn_steps(), 0);
        match session.env() {
            Environment::Grid(grid) => assert_eq!(grid.agent(), grid.spawn()),
            Environment::Balance(_) => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_playback_interrupt() {
        struct StopAfter(SessionControl, usize);
        impl SessionObserver for StopAfter {
            fn on_step(&mut self, _env: &Environment, _result: &StepResult) {
                self.1 -= 1;
                if self.1 == 0 {
                    self.0.interrupt();
                }
            }
        }

        let env: Environment = BalanceEnv::with_seed(BalanceConfig::default(), 2).unwrap().into();
        let policy = agent(AgentKind::ValueNetwork, &env);
        let mut session = PlaybackSession::new(env, policy, 500)
            .unwrap()
            .with_tick(Duration::from_millis(1));

        let mut observer = StopAfter(session.control(), 2);
        let summary = session.play(&mut observer).await;
        assert!(summary.steps <= 2);
        if !summary.terminated {
            assert!(summary.interrupted);
            assert_eq!(session.control().state(), SessionState::Interrupted);
        }
    }
}
