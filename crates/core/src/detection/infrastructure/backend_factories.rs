use std::path::{Path, PathBuf};

use crate::config::DetectorConfig;
use crate::detection::domain::backend_error::BackendError;
use crate::detection::domain::backend_factory::BackendFactory;
use crate::detection::domain::detector_selector::DetectorSelector;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::infrastructure::cascade_locator::locate_cascade;
use crate::detection::infrastructure::haar_cascade_detector::{CascadeParams, HaarCascadeDetector};
use crate::detection::infrastructure::onnx_blazeface_detector::OnnxBlazefaceDetector;
use crate::shared::model_resolver::resolve_local;

/// Builds the BlazeFace ONNX backend from the models directory.
pub struct OnnxBlazefaceFactory {
    models_dir: PathBuf,
    model_name: String,
    confidence: f64,
}

impl OnnxBlazefaceFactory {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            models_dir: config.models_dir.clone(),
            model_name: config.neural_model.clone(),
            confidence: config.min_detection_confidence,
        }
    }

    /// The model file if it has been provisioned.
    pub fn model_path(&self) -> Option<PathBuf> {
        resolve_local(&self.model_name, &self.models_dir)
    }

    /// A provisioned `.tflite` build of the model, which ONNX Runtime
    /// cannot load.
    pub fn tflite_sibling(&self) -> Option<PathBuf> {
        let name = Path::new(&self.model_name).with_extension("tflite");
        if name.as_os_str() == self.model_name.as_str() {
            return None;
        }
        resolve_local(&name.to_string_lossy(), &self.models_dir)
    }
}

impl BackendFactory for OnnxBlazefaceFactory {
    fn name(&self) -> &str {
        "BlazeFace detector"
    }

    fn create(&self) -> Result<Box<dyn FaceDetector>, BackendError> {
        let Some(path) = self.model_path() else {
            let path = self.models_dir.join(&self.model_name);
            match self.tflite_sibling() {
                Some(tflite) => log::warn!(
                    "Found {} but the neural backend needs the ONNX export at {}",
                    tflite.display(),
                    path.display()
                ),
                None => log::warn!("Neural model not found at {}", path.display()),
            }
            return Err(BackendError::AssetMissing { path });
        };
        let detector = OnnxBlazefaceDetector::new(&path, self.confidence)
            .map_err(|e| BackendError::Construction(e.to_string()))?;
        Ok(Box::new(detector))
    }
}

/// Builds the Haar cascade backend, searching for the cascade on every
/// attempt so a file provisioned later is picked up.
pub struct HaarCascadeFactory {
    config: DetectorConfig,
}

impl HaarCascadeFactory {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn cascade_path(&self) -> PathBuf {
        locate_cascade(&self.config)
    }

    pub fn params(&self) -> CascadeParams {
        self.config.cascade_params()
    }
}

impl BackendFactory for HaarCascadeFactory {
    fn name(&self) -> &str {
        "Haar cascade detector"
    }

    fn create(&self) -> Result<Box<dyn FaceDetector>, BackendError> {
        let path = self.cascade_path();
        if !path.is_file() {
            log::warn!("Haar cascade not found at {}", path.display());
            return Err(BackendError::AssetMissing { path });
        }
        let detector = HaarCascadeDetector::load(&path, self.params())
            .map_err(|e| BackendError::Construction(e.to_string()))?;
        Ok(Box::new(detector))
    }
}

impl DetectorSelector {
    /// Selector wired to the BlazeFace and Haar cascade backends.
    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(
            Box::new(OnnxBlazefaceFactory::new(config)),
            Box::new(HaarCascadeFactory::new(config)),
        )
    }
}
