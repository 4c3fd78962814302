//! Configuration management
//!
//! Tunable thresholds for the completion-gating rules plus the default
//! location of the progress database. All fields have sensible defaults
//! so an empty config file (or none at all) yields a working engine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Minimum grade percentage for an assignment submission to count
    /// toward completion
    #[serde(default = "default_passing_grade")]
    pub passing_grade_percentage: f64,

    /// Completion threshold applied to modules that do not declare
    /// their own `minimum_completion_percentage`
    #[serde(default = "default_module_threshold")]
    pub default_module_completion_percentage: f64,

    /// Ceiling applied to a topic's percentage while a required
    /// assignment is still without a passing submission
    #[serde(default = "default_assignment_cap")]
    pub topic_assignment_cap: f64,

    /// Path to the SQLite database holding progress records
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

fn default_passing_grade() -> f64 {
    70.0
}

fn default_module_threshold() -> f64 {
    80.0
}

fn default_assignment_cap() -> f64 {
    99.0
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("academy-progress")
        .join("progress.db")
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            passing_grade_percentage: default_passing_grade(),
            default_module_completion_percentage: default_module_threshold(),
            topic_assignment_cap: default_assignment_cap(),
            database_path: default_database_path(),
        }
    }
}

impl ProgressConfig {
    /// Load configuration from a TOML file, falling back to defaults
    /// if the file does not exist
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config: ProgressConfig =
                toml::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the configuration as TOML
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }
}
