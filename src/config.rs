//! Bus configuration
//!
//! All types use camelCase JSON serialization so configs can be embedded
//! in application config files.

use crate::error::Result;
use crate::lock::LockStrategy;
use serde::{Deserialize, Serialize};

/// Configuration for an [`EventBus`](crate::EventBus)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusConfig {
    /// Label prefix for the bus's queues and locks (shows up in thread
    /// names and panic messages)
    pub label: String,

    /// Lock strategy used by the subscriber registry and sticky store
    pub lock_strategy: LockStrategy,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            label: "replaybus".to_string(),
            lock_strategy: LockStrategy::default(),
        }
    }
}

impl BusConfig {
    /// Create a config with a custom label and the default lock strategy
    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Parse a config from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the config to a JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
