use std::path::PathBuf;

use crate::config::DetectorConfig;
use crate::shared::constants::{CASCADE_DIR_ENV, CASCADE_FILE_NAME, SYSTEM_CASCADE_DIRS};

/// Directories searched for the cascade file, in priority order:
/// `$FACEDETECT_CASCADE_DIR`, the configured extra dirs, the models dir,
/// then `system_dirs`.
pub fn cascade_search_dirs(
    config: &DetectorConfig,
    env_dir: Option<PathBuf>,
    system_dirs: &[PathBuf],
) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    dirs.extend(env_dir);
    dirs.extend(config.cascade_dirs.iter().cloned());
    dirs.push(config.models_dir.clone());
    dirs.extend_from_slice(system_dirs);
    dirs
}

/// Where the cascade should be, whether or not it exists.
///
/// An explicit `cascade_path` wins outright. Otherwise the first search
/// directory holding the file is used, ending with the usual OpenCV data
/// directories; if none does, the path beneath the models directory is
/// returned so the caller can report it.
pub fn locate_cascade(config: &DetectorConfig) -> PathBuf {
    let env_dir = std::env::var_os(CASCADE_DIR_ENV).map(PathBuf::from);
    let system_dirs: Vec<PathBuf> = SYSTEM_CASCADE_DIRS.iter().map(PathBuf::from).collect();
    locate_cascade_in(config, env_dir, &system_dirs)
}

fn locate_cascade_in(
    config: &DetectorConfig,
    env_dir: Option<PathBuf>,
    system_dirs: &[PathBuf],
) -> PathBuf {
    if let Some(explicit) = &config.cascade_path {
        return explicit.clone();
    }
    cascade_search_dirs(config, env_dir, system_dirs)
        .iter()
        .map(|dir| dir.join(CASCADE_FILE_NAME))
        .find(|candidate| candidate.is_file())
        .unwrap_or_else(|| config.models_dir.join(CASCADE_FILE_NAME))
}
