//! Analysis configuration stored as JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compare::CompareConfig;
use crate::context::{PlotOutput, RunContext, DEFAULT_LOG_TARGET};
use crate::exposure::mask_bits;
use crate::filters::Filters;
use crate::flux::OutlierConfig;
use crate::matcher::MatchConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Settings for one analysis run.
///
/// Missing fields take their defaults, so a partial JSON file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub filters: Filters,
    pub matching: MatchConfig,
    pub outliers: OutlierConfig,
    pub compare: CompareConfig,
    /// Mask bits excluded from the background noise estimate
    pub noise_ignore_bits: u32,
    pub plots: PlotOutput,
    pub log_target: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            filters: Filters::new(["g", "r", "i", "z", "y"]),
            matching: MatchConfig::default(),
            outliers: OutlierConfig::default(),
            compare: CompareConfig::default(),
            noise_ignore_bits: mask_bits::DEFAULT_IGNORE,
            plots: PlotOutput::Disabled,
            log_target: DEFAULT_LOG_TARGET.to_string(),
        }
    }
}

impl AnalysisConfig {
    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Context handed to every analysis step
    pub fn run_context(&self) -> RunContext {
        RunContext::new(self.log_target.clone(), self.plots.clone())
    }
}
