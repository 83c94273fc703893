use std::path::Path;

use crate::detection::domain::backend_error::BackendError;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::infrastructure::haar_cascade::{CascadeError, HaarCascade};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::{CASCADE_MIN_NEIGHBORS, CASCADE_MIN_SIZE, CASCADE_SCALE_FACTOR};
use crate::shared::frame::Frame;

/// Pyramid parameters for the classical detector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CascadeParams {
    pub scale_factor: f64,
    pub min_neighbors: usize,
    pub min_size: u32,
}

impl Default for CascadeParams {
    fn default() -> Self {
        Self {
            scale_factor: CASCADE_SCALE_FACTOR,
            min_neighbors: CASCADE_MIN_NEIGHBORS,
            min_size: CASCADE_MIN_SIZE,
        }
    }
}

/// Classical face detector: grayscale conversion, then a Haar cascade scan.
pub struct HaarCascadeDetector {
    cascade: HaarCascade,
    params: CascadeParams,
}

impl HaarCascadeDetector {
    pub fn new(cascade: HaarCascade, params: CascadeParams) -> Result<Self, CascadeError> {
        if params.scale_factor.is_nan() || params.scale_factor <= 1.0 {
            return Err(CascadeError::Invalid(format!(
                "scale factor must be greater than 1, got {}",
                params.scale_factor
            )));
        }
        Ok(Self { cascade, params })
    }

    pub fn load(path: &Path, params: CascadeParams) -> Result<Self, CascadeError> {
        Self::new(HaarCascade::load(path)?, params)
    }

    pub fn params(&self) -> CascadeParams {
        self.params
    }
}

impl FaceDetector for HaarCascadeDetector {
    fn detect(&mut self, frame: &Frame<'_>) -> Result<Vec<BoundingBox>, BackendError> {
        let gray = frame.to_grayscale().ok_or_else(|| {
            BackendError::Inference(format!("expected 3 channels, got {}", frame.channels()))
        })?;

        let rects = self.cascade.detect_multi_scale(
            &gray,
            self.params.scale_factor,
            self.params.min_neighbors,
            self.params.min_size,
        );

        Ok(rects
            .into_iter()
            .map(|r| BoundingBox::from_xywh(r.x, r.y, r.width, r.height))
            .collect())
    }
}
