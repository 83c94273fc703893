use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::infrastructure::haar_cascade_detector::CascadeParams;
use crate::shared::constants::{
    CASCADE_MIN_NEIGHBORS, CASCADE_MIN_SIZE, CASCADE_SCALE_FACTOR, DEFAULT_MODELS_DIR,
    MIN_DETECTION_CONFIDENCE, NEURAL_MODEL_NAME,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Where the detector finds its assets and how it tunes each backend.
///
/// Every field is optional in the JSON file; missing ones take the
/// built-in defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub models_dir: PathBuf,
    /// File name of the neural model inside `models_dir`.
    pub neural_model: String,
    /// Where provisioning downloads `neural_model` from.
    pub neural_model_url: Option<String>,
    /// Explicit cascade file. Skips the directory search when set.
    pub cascade_path: Option<PathBuf>,
    /// Extra directories searched for the cascade before the models dir.
    pub cascade_dirs: Vec<PathBuf>,
    pub min_detection_confidence: f64,
    pub scale_factor: f64,
    pub min_neighbors: usize,
    pub min_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from(DEFAULT_MODELS_DIR),
            neural_model: NEURAL_MODEL_NAME.to_string(),
            neural_model_url: None,
            cascade_path: None,
            cascade_dirs: Vec::new(),
            min_detection_confidence: MIN_DETECTION_CONFIDENCE,
            scale_factor: CASCADE_SCALE_FACTOR,
            min_neighbors: CASCADE_MIN_NEIGHBORS,
            min_size: CASCADE_MIN_SIZE,
        }
    }
}

impl DetectorConfig {
    /// Per-user config file, e.g. `~/.config/facedetect/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("facedetect").join("config.json"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// The per-user config if one exists and parses, defaults otherwise.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path().filter(|p| p.exists()) else {
            return Self::default();
        };
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!("Ignoring config: {e}");
            Self::default()
        })
    }

    pub fn cascade_params(&self) -> CascadeParams {
        CascadeParams {
            scale_factor: self.scale_factor,
            min_neighbors: self.min_neighbors,
            min_size: self.min_size,
        }
    }
}
