//! Training sessions
//!
//! A [`TrainingSession`] owns one environment and one agent for its whole
//! lifetime. Each episode resets the environment away from home and runs
//! act → step → learn until termination, the step budget, or the interrupt
//! flag. A session repeats episodes back-to-back, then persists the agent
//! and returns the environment home.
//!
//! # Example
//!
//! ```rust,no_run
//! use rl_sandbox::config::SandboxConfig;
//! use rl_sandbox::modes::{NullObserver, TrainingSession};
//! use rl_sandbox::rl::{MemoryModelStore, TrainingBackend, default_device};
//!
//! # async fn run() -> rl_sandbox::Result<()> {
//! let config = SandboxConfig::default();
//! let env = config.build_environment()?;
//! let agent = config.build_agent::<TrainingBackend>(&env, default_device());
//!
//! let mut session = TrainingSession::new(env, agent, config.session())?;
//! let mut store = MemoryModelStore::default();
//! let report = session.train(&mut store, &mut NullObserver).await?;
//! println!("{}", report.stats.format_summary());
//! # Ok(())
//! # }
//! ```

use burn::tensor::backend::AutodiffBackend;
use tracing::info;

use super::control::{EpisodeSummary, SessionControl, SessionObserver, SessionState, pace};
use crate::config::SessionConfig;
use crate::env::Environment;
use crate::error::{Result, SandboxError};
use crate::metrics::TrainingStats;
use crate::rl::{Agent, ModelStore, Transition, model_name};

/// Rolling window used by the session statistics
const STATS_WINDOW: usize = 100;

/// Outcome of a training session
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Episodes that ran to termination or the step budget
    pub episodes_completed: usize,
    pub state: SessionState,
    pub stats: TrainingStats,
}

/// Fail fast when the agent cannot drive the environment
pub(crate) fn check_action_space<B: AutodiffBackend>(
    env: &Environment,
    agent: &Agent<B>,
) -> Result<()> {
    if agent.num_actions() != env.num_actions() {
        return Err(SandboxError::ActionSpaceMismatch {
            agent: agent.num_actions(),
            environment: env.num_actions(),
        });
    }
    Ok(())
}

pub struct TrainingSession<B: AutodiffBackend> {
    env: Environment,
    agent: Agent<B>,
    config: SessionConfig,
    control: SessionControl,
    stats: TrainingStats,
}

impl<B: AutodiffBackend> TrainingSession<B> {
    pub fn new(env: Environment, agent: Agent<B>, config: SessionConfig) -> Result<Self> {
        check_action_space(&env, &agent)?;
        config.validate()?;
        let control = SessionControl::new(config.speed);

        Ok(Self {
            env,
            agent,
            config,
            control,
            stats: TrainingStats::new(STATS_WINDOW),
        })
    }

    /// Handle for interrupting the session or changing its speed
    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    pub fn state(&self) -> SessionState {
        self.control.state()
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Mutable access for configuration between sessions
    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn agent(&self) -> &Agent<B> {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut Agent<B> {
        &mut self.agent
    }

    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    pub fn stats(&self) -> &TrainingStats {
        &self.stats
    }

    /// Give back the environment and agent, e.g. for playback
    pub fn into_parts(self) -> (Environment, Agent<B>) {
        (self.env, self.agent)
    }

    /// Run one learning episode from a random start
    ///
    /// The interrupt flag is checked once per step, before acting.
    pub async fn run_episode(
        &mut self,
        episode: usize,
        observer: &mut dyn SessionObserver,
    ) -> EpisodeSummary {
        let kind = self.env.kind();
        let mut state = self.env.reset_random();
        let mut summary = EpisodeSummary {
            episode,
            reward: 0.0,
            steps: 0,
            terminated: false,
            interrupted: false,
        };

        while summary.steps < self.config.step_budget {
            if self.control.is_interrupted() {
                summary.interrupted = true;
                break;
            }

            let decision = self.agent.act(&state, false);
            let action = decision.action;
            let result = self.env.step(action);

            let transition = Transition {
                state,
                action,
                reward: result.reward,
                next_state: result.observation,
                done: result.done,
            };
            if let Some(report) = self.agent.learn(transition, decision) {
                self.stats.record_update(&report);
            }

            summary.reward += result.reward;
            summary.steps += 1;
            state = result.observation;
            observer.on_step(&self.env, &result);

            if self.config.visualize {
                pace(self.control.speed().step_delay(kind)).await;
            }

            if result.done {
                summary.terminated = true;
                break;
            }
        }

        summary
    }

    /// Run the configured number of episodes
    ///
    /// Stops early, keeping everything already learned, when the interrupt
    /// flag is observed. The agent is saved to `store` under
    /// `<env>-<agent>` either way.
    pub async fn train(
        &mut self,
        store: &mut dyn ModelStore,
        observer: &mut dyn SessionObserver,
    ) -> Result<SessionReport> {
        let name = model_name(self.env.kind(), self.agent.kind());
        self.control.clear_interrupt();
        self.control.set_state(SessionState::Running);

        if !(self.config.resume && self.agent.load_model(&*store, &name, self.env.kind())) {
            self.agent.reset();
        }

        info!(
            env = self.env.name(),
            agent = self.agent.kind().slug(),
            episodes = self.config.episodes,
            step_budget = self.config.step_budget,
            resumed = self.config.resume,
            "training started"
        );

        let mut completed = 0;
        let mut interrupted = false;
        for episode in 0..self.config.episodes {
            if self.control.is_interrupted() {
                interrupted = true;
                break;
            }

            let summary = self.run_episode(episode, observer).await;
            if summary.interrupted {
                interrupted = true;
                break;
            }

            completed += 1;
            self.stats
                .record_episode(summary.reward, summary.steps, summary.terminated);
            observer.on_episode_end(&summary);

            if completed % self.config.log_interval == 0 {
                info!("{}", self.stats.format_summary());
            }
        }

        let state = if interrupted {
            SessionState::Interrupted
        } else {
            SessionState::Idle
        };
        self.control.set_state(state);

        self.agent.save_model(store, &name, self.env.kind())?;
        self.env.reset_home();

        info!(
            model = %name,
            episodes_completed = completed,
            state = ?state,
            "training finished"
        );

        Ok(SessionReport {
            episodes_completed: completed,
            state,
            stats: self.stats.clone(),
        })
    }
}
