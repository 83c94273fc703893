pub mod backend_error;
pub mod backend_factory;
pub mod backend_mode;
pub mod detection_outcome;
pub mod detector_selector;
pub mod face_detector;
