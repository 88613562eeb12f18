//! Runtime configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ScriptError;

/// Limits applied to each engine instance at creation.
///
/// Engines ignore settings they have no notion of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Heap limit in bytes.
    pub memory_limit: Option<usize>,
    /// Native stack limit in bytes.
    pub max_stack_size: Option<usize>,
    /// Allocation volume (bytes) between garbage collections.
    pub gc_threshold: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            memory_limit: Some(64 * 1024 * 1024),
            max_stack_size: Some(1024 * 1024),
            gc_threshold: None,
        }
    }
}

impl RuntimeConfig {
    /// No limits at all.
    pub fn unlimited() -> Self {
        Self {
            memory_limit: None,
            max_stack_size: None,
            gc_threshold: None,
        }
    }

    pub fn from_json(text: &str) -> Result<Self, ScriptError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}
