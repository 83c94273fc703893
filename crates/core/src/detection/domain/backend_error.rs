use std::path::PathBuf;

use thiserror::Error;

/// Why a backend could not be built or could not finish a detection.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("asset not found at {path}")]
    AssetMissing { path: PathBuf },
    #[error("backend construction failed: {0}")]
    Construction(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

impl BackendError {
    pub fn is_asset_missing(&self) -> bool {
        matches!(self, BackendError::AssetMissing { .. })
    }
}
