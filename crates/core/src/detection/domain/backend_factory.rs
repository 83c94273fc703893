use crate::detection::domain::backend_error::BackendError;
use crate::detection::domain::face_detector::FaceDetector;

/// Builds one kind of backend on demand.
///
/// The selector calls `create` lazily and caches the result, so a factory
/// is invoked at most once per successful construction.
pub trait BackendFactory: Send {
    /// Human-readable backend name for log lines.
    fn name(&self) -> &str;

    fn create(&self) -> Result<Box<dyn FaceDetector>, BackendError>;
}
