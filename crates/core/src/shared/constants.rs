/// Minimum score for a neural detection to be reported.
pub const MIN_DETECTION_CONFIDENCE: f64 = 0.6;

pub const NEURAL_MODEL_NAME: &str = "blaze_face_short_range.onnx";

/// Directory (relative to the working directory) holding model assets.
pub const DEFAULT_MODELS_DIR: &str = "models";

pub const CASCADE_FILE_NAME: &str = "haarcascade_frontalface_default.xml";

/// Environment variable naming an extra directory to search for the cascade.
pub const CASCADE_DIR_ENV: &str = "FACEDETECT_CASCADE_DIR";

/// Where OpenCV installs put its bundled Haar cascades.
pub const SYSTEM_CASCADE_DIRS: &[&str] = &[
    "/usr/share/opencv4/haarcascades",
    "/usr/local/share/opencv4/haarcascades",
    "/usr/share/opencv/haarcascades",
    "/usr/local/share/opencv/haarcascades",
    "/opt/homebrew/share/opencv4/haarcascades",
];

pub const CASCADE_SCALE_FACTOR: f64 = 1.1;
pub const CASCADE_MIN_NEIGHBORS: usize = 5;
/// Smallest cascade window, in pixels, on both axes.
pub const CASCADE_MIN_SIZE: u32 = 30;

/// Files fetched by the provisioning utility: `(file name, url)`.
pub const PROVISIONED_MODELS: &[(&str, &str)] = &[
    (
        "blaze_face_short_range.tflite",
        "https://storage.googleapis.com/mediapipe-models/face_detector/blaze_face_short_range/float16/1/blaze_face_short_range.tflite",
    ),
    (
        "face_embedder.tflite",
        "https://storage.googleapis.com/mediapipe-models/face_embedder/face_embedder/float16/1/face_embedder.tflite",
    ),
    (
        CASCADE_FILE_NAME,
        "https://raw.githubusercontent.com/opencv/opencv/4.x/data/haarcascades/haarcascade_frontalface_default.xml",
    ),
];

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
