pub mod backend_factories;
pub mod cascade_locator;
pub mod execution_provider;
pub mod haar_cascade;
pub mod haar_cascade_detector;
pub mod math;
pub mod onnx_blazeface_detector;
