//! Engine configuration
//!
//! Handles persistent storage of per-session engine settings.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{EngineError, Result};

/// File name used by [`EngineConfig::load`] and [`EngineConfig::save`]
pub const CONFIG_FILE_NAME: &str = "workflow-engine.json";

/// When node validation runs automatically
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidateTrigger {
    /// Re-validate affected nodes after every mutation
    OnChange,
    /// Only validate when asked (before submit/save)
    #[default]
    OnSubmit,
}

/// Which sibling outputs a node may reference
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ForwardReferencePolicy {
    /// Every sibling in the canvas is visible
    #[default]
    Permissive,
    /// Only siblings with a line path into the node
    Upstream,
}

/// Settings for one editing session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of undo entries kept; the oldest are dropped
    pub history_limit: usize,
    pub validate_trigger: ValidateTrigger,
    pub forward_references: ForwardReferencePolicy,
    /// zstd level of the checkpoints taken before undo/redo replay
    pub checkpoint_level: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            validate_trigger: ValidateTrigger::OnSubmit,
            forward_references: ForwardReferencePolicy::Permissive,
            checkpoint_level: 3,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json_str(contents: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(contents)
            .map_err(|e| EngineError::Config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.history_limit == 0 {
            return Err(EngineError::Config("history_limit must be at least 1".to_string()));
        }
        if !(1..=22).contains(&self.checkpoint_level) {
            return Err(EngineError::Config(format!(
                "checkpoint_level {} is outside 1..=22",
                self.checkpoint_level
            )));
        }
        Ok(())
    }

    /// Load configuration from a directory, falling back to defaults when absent
    pub async fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            log::debug!("No configuration at {:?}, using defaults", config_path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&config_path).await?;
        Self::from_json_str(&contents)
    }

    /// Save configuration to a directory
    pub async fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).await?;

        let config_path = dir.join(CONFIG_FILE_NAME);
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, contents).await?;

        log::info!("Configuration saved to {:?}", config_path);
        Ok(())
    }
}
