//! Static descriptions of tunable parameters
//!
//! Environments and agents publish tables of [`ParamSpec`] so that external
//! configuration builders (sliders, number inputs) can be generated without
//! knowing anything about the owning type. The tables carry no behavior; the
//! values themselves are changed through each config's `set` method.

use serde::Serialize;

use crate::error::Result;

/// Name, bounds and default of one tunable parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParamSpec {
    /// Key accepted by the owning config's `set`
    pub id: &'static str,
    /// Human readable label
    pub label: &'static str,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub step: Option<f32>,
    pub default: f32,
}

impl ParamSpec {
    pub const fn new(id: &'static str, label: &'static str, default: f32) -> Self {
        Self {
            id,
            label,
            min: None,
            max: None,
            step: None,
            default,
        }
    }

    pub const fn ranged(
        id: &'static str,
        label: &'static str,
        min: f32,
        max: f32,
        step: f32,
        default: f32,
    ) -> Self {
        Self {
            id,
            label,
            min: Some(min),
            max: Some(max),
            step: Some(step),
            default,
        }
    }

    /// Whether `value` lies within the declared bounds (unbounded sides always pass)
    pub fn accepts(&self, value: f32) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

/// Apply `change` to a copy of `config` and commit it only if the copy validates
///
/// Live configuration surfaces go through this so a rejected value never
/// reaches the owner.
pub(crate) fn update_validated<C: Clone>(
    config: &mut C,
    change: impl FnOnce(&mut C) -> Result<()>,
    validate: impl FnOnce(&C) -> Result<()>,
) -> Result<()> {
    let mut updated = config.clone();
    change(&mut updated)?;
    validate(&updated)?;
    *config = updated;
    Ok(())
}

/// Look up a spec by id
pub fn find<'a>(specs: &'a [ParamSpec], id: &str) -> Option<&'a ParamSpec> {
    specs.iter().find(|spec| spec.id == id)
}
