//! Shared session control: interrupt flag, pacing speed and session state
//!
//! A [`SessionControl`] is a cheap cloneable handle. The session reads it on
//! every step, while front-ends (a Ctrl-C handler, an observer) write to it.
//! Interruption is cooperative; it is only observed at step and episode
//! boundaries.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::env::{EnvKind, Environment, StepResult};

/// Lifecycle of a training or playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Running,
    Interrupted,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Running,
            2 => SessionState::Interrupted,
            _ => SessionState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SessionState::Idle => 0,
            SessionState::Running => 1,
            SessionState::Interrupted => 2,
        }
    }
}

/// Visualization speed settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum VisualizationSpeed {
    /// 50ms per step
    #[default]
    Slow,
    /// Balance yields without sleeping, grid waits 20ms per step
    Fast,
}

impl VisualizationSpeed {
    /// Pause after each visualized training step
    ///
    /// `None` means yield to the scheduler without sleeping.
    pub fn step_delay(&self, env: EnvKind) -> Option<Duration> {
        match (self, env) {
            (Self::Slow, _) => Some(Duration::from_millis(50)),
            (Self::Fast, EnvKind::Balance) => None,
            (Self::Fast, EnvKind::Grid) => Some(Duration::from_millis(20)),
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Slow => 0,
            Self::Fast => 1,
        }
    }

    fn from_u8(value: u8) -> Self {
        if value == 1 { Self::Fast } else { Self::Slow }
    }
}

/// Tick between playback steps
pub fn playback_interval(env: EnvKind) -> Duration {
    match env {
        EnvKind::Balance => Duration::from_millis(20),
        EnvKind::Grid => Duration::from_millis(150),
    }
}

/// Cooperative suspension point between steps
pub(crate) async fn pace(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => tokio::task::yield_now().await,
    }
}

/// Cloneable handle to a session's interrupt flag, speed and state
#[derive(Debug, Clone, Default)]
pub struct SessionControl {
    interrupted: Arc<AtomicBool>,
    speed: Arc<AtomicU8>,
    state: Arc<AtomicU8>,
}

impl SessionControl {
    pub fn new(speed: VisualizationSpeed) -> Self {
        let control = Self::default();
        control.set_speed(speed);
        control
    }

    /// Ask the session to stop at the next step or episode boundary
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn clear_interrupt(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Takes effect from the next step
    pub fn set_speed(&self, speed: VisualizationSpeed) {
        self.speed.store(speed.as_u8(), Ordering::Relaxed);
    }

    pub fn speed(&self) -> VisualizationSpeed {
        VisualizationSpeed::from_u8(self.speed.load(Ordering::Relaxed))
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }
}

/// Outcome of one episode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeSummary {
    /// Zero-based index within the session
    pub episode: usize,
    pub reward: f32,
    pub steps: usize,
    /// The environment signalled termination
    pub terminated: bool,
    /// The interrupt flag cut the episode short
    pub interrupted: bool,
}

/// Rendering and progress collaborator
///
/// Environment fields read through `env` are consistent with the step just
/// taken.
pub trait SessionObserver {
    fn on_step(&mut self, _env: &Environment, _result: &StepResult) {}

    fn on_episode_end(&mut self, _summary: &EpisodeSummary) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl SessionObserver for NullObserver {}
