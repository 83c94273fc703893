use crate::detection::domain::backend_error::BackendError;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// Domain interface for a face-detection backend.
///
/// Implementations may hold mutable inference state (e.g., an ONNX
/// session), hence `&mut self`.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame<'_>) -> Result<Vec<BoundingBox>, BackendError>;
}
