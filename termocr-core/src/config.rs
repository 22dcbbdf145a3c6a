use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::document::{EngineName, TESSERACT_LATEST, TESSERACT_LEGACY, TESSERACT_LSTM};
use crate::export::ExportFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionMode {
    Speed,
    Quality,
    #[default]
    Combined,
}

impl RecognitionMode {
    /// Combined runs report each page twice, once per engine.
    pub fn progress_total(self, page_count: usize) -> usize {
        match self {
            RecognitionMode::Combined => page_count * 2 + 1,
            RecognitionMode::Speed | RecognitionMode::Quality => page_count + 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub mode: RecognitionMode,
    pub langs: Vec<String>,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            mode: RecognitionMode::default(),
            langs: vec!["eng".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExportConfig {
    pub default_format: ExportFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Half-width of the baseline slider.
    pub baseline_range: i32,
    /// Imported pages closer than this to the current page get an overlay refresh.
    pub overlay_warm_distance: usize,
    pub latest_alias: EngineName,
    /// Placeholder engines shown under the latest alias, highest priority first.
    pub fallback_engines: Vec<EngineName>,
    pub recognition: RecognitionConfig,
    pub export: ExportConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            baseline_range: 25,
            overlay_warm_distance: 2,
            latest_alias: EngineName::from(TESSERACT_LATEST),
            fallback_engines: vec![
                EngineName::from(TESSERACT_LSTM),
                EngineName::from(TESSERACT_LEGACY),
            ],
            recognition: RecognitionConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("failed to parse session config")
    }

    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid config file {:?}", path))
    }
}
