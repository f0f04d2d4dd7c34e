//! Runner configuration.

use fcp_eval::{EngineConfig, DEFAULT_GROWTH_BATCH};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Values that replace the protocol's own `inputs` definitions.
    pub input_overrides: BTreeMap<String, f64>,
    /// Output points a `while` range reserves each time it fills up.
    pub while_growth_batch: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            input_overrides: BTreeMap::new(),
            while_growth_batch: DEFAULT_GROWTH_BATCH,
        }
    }
}

impl RunnerConfig {
    pub fn with_input(mut self, name: impl Into<String>, value: f64) -> Self {
        self.input_overrides.insert(name.into(), value);
        self
    }

    pub(crate) fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            while_growth_batch: self.while_growth_batch,
        }
    }
}
