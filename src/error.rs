//! Error types for the sandbox library

use thiserror::Error;

/// Errors surfaced by environments, agents and sessions
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SandboxError {
    #[error("unknown parameter '{name}' for {owner}")]
    UnknownParameter { owner: &'static str, name: String },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("action space mismatch: agent has {agent} actions, environment expects {environment}")]
    ActionSpaceMismatch { agent: usize, environment: usize },

    #[error("persistence failed: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl SandboxError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;
