//! Named model stores for saving and loading trained agents
//!
//! A stored model is an opaque weight blob plus [`ModelMetadata`]. Network
//! agents encode their weights with burn's named MessagePack recorder; the
//! tabular agent stores its Q-table as JSON. Two stores are provided:
//!
//! - [`MemoryModelStore`]: a map, used by tests and embedding front-ends
//! - [`FileModelStore`]: one directory, writing `<name>.mpk` (weights) and
//!   `<name>.meta.json` (metadata)

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::agent::AgentKind;
use crate::env::EnvKind;

/// Metadata saved with the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMetadata {
    /// Agent variant the weights belong to
    pub agent: AgentKind,

    /// Environment the agent was trained on
    pub env: EnvKind,

    /// Size of the action space the agent was built for
    pub num_actions: usize,

    /// Learn steps (or training passes) completed
    pub learn_steps: u64,

    /// Version identifier for compatibility checking
    pub version: String,
}

impl ModelMetadata {
    pub fn new(agent: AgentKind, env: EnvKind, num_actions: usize, learn_steps: u64) -> Self {
        Self {
            agent,
            env,
            num_actions,
            learn_steps,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Serialized agent state
#[derive(Debug, Clone, PartialEq)]
pub struct StoredModel {
    pub metadata: ModelMetadata,
    pub weights: Vec<u8>,
}

/// Storage medium for trained models, keyed by name
pub trait ModelStore {
    fn put(&mut self, name: &str, model: StoredModel) -> Result<()>;

    /// `Ok(None)` when no model is stored under `name`
    fn get(&self, name: &str) -> Result<Option<StoredModel>>;
}

/// Store name for an environment/agent pair, e.g. `grid-tabular`
pub fn model_name(env: EnvKind, agent: AgentKind) -> String {
    format!("{}-{}", env.slug(), agent.slug())
}

#[derive(Debug, Default)]
pub struct MemoryModelStore {
    models: HashMap<String, StoredModel>,
}

impl MemoryModelStore {
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl ModelStore for MemoryModelStore {
    fn put(&mut self, name: &str, model: StoredModel) -> Result<()> {
        self.models.insert(name.to_string(), model);
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<StoredModel>> {
        Ok(self.models.get(name).cloned())
    }
}

/// Directory-backed store
#[derive(Debug, Clone)]
pub struct FileModelStore {
    dir: PathBuf,
}

impl FileModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn weights_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.mpk"))
    }

    fn meta_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.meta.json"))
    }
}

impl ModelStore for FileModelStore {
    fn put(&mut self, name: &str, model: StoredModel) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create directory: {:?}", self.dir))?;

        let weights_path = self.weights_path(name);
        std::fs::write(&weights_path, &model.weights)
            .with_context(|| format!("Failed to write weights to {:?}", weights_path))?;

        let meta_path = self.meta_path(name);
        let meta_json =
            serde_json::to_string_pretty(&model.metadata).context("Failed to serialize metadata")?;
        std::fs::write(&meta_path, meta_json)
            .with_context(|| format!("Failed to write metadata to {:?}", meta_path))?;

        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<StoredModel>> {
        let meta_path = self.meta_path(name);
        let weights_path = self.weights_path(name);
        if !meta_path.exists() || !weights_path.exists() {
            return Ok(None);
        }

        let meta_json = std::fs::read_to_string(&meta_path)
            .with_context(|| format!("Failed to read metadata from {:?}", meta_path))?;
        let metadata: ModelMetadata =
            serde_json::from_str(&meta_json).context("Failed to deserialize metadata")?;
        let weights = std::fs::read(&weights_path)
            .with_context(|| format!("Failed to read weights from {:?}", weights_path))?;

        Ok(Some(StoredModel { metadata, weights }))
    }
}
