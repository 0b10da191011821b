//! Engine configuration.
//!
//! Everything a session needs besides the rule graph: buffer sizing and the
//! reference landmarks, how summaries are built, and whether step logging is
//! on. Stored as TOML; every section is optional.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::recorder::RecorderConfig;
use crate::summary::{FitMethod, SummaryBuilder};
use crate::types::{Frame, Landmark};
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Summary settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Coordinate frame classifiers see
    pub frame: Frame,
    /// Regression fit or two-point difference
    pub method: FitMethod,
    /// Landmarks to summarize; empty means all
    pub landmarks: Vec<Landmark>,
}

impl SummaryConfig {
    pub fn builder(&self) -> SummaryBuilder {
        SummaryBuilder::new(self.method)
            .with_landmarks(&self.landmarks)
            .with_frame(self.frame)
    }
}

/// Step log settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Record per-state weights and counts every step
    pub enabled: bool,
}

impl EngineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<()> {
        let recorder = &self.recorder;
        if recorder.capacity == 0 {
            return Err(Error::Config("capacity must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&recorder.reference_min_visibility) {
            return Err(Error::Config(format!(
                "reference_min_visibility must be in [0, 1], got {}",
                recorder.reference_min_visibility
            )));
        }
        if !(recorder.reference_ratio > 0.0 && recorder.reference_ratio <= 1.0) {
            return Err(Error::Config(format!(
                "reference_ratio must be in (0, 1], got {}",
                recorder.reference_ratio
            )));
        }
        if recorder.reference[0] == recorder.reference[1] {
            return Err(Error::Config(format!(
                "reference landmarks must differ, got {} twice",
                recorder.reference[0]
            )));
        }
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Save config to file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Generate TOML representation
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}
