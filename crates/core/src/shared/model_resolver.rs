use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::config::DetectorConfig;
use crate::shared::constants::PROVISIONED_MODELS;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("failed to create models directory {path}: {source}")]
    ModelsDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid model source '{0}', expected NAME=URL")]
    InvalidSource(String),
    #[error("no download URL configured for {name} (set neural_model_url or pass --model {name}=URL)")]
    NoSource { name: String },
}

/// A model file to fetch: the local file name and where to get it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSource {
    pub name: String,
    pub url: String,
}

impl ModelSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// The files every deployment needs.
    pub fn defaults() -> Vec<ModelSource> {
        PROVISIONED_MODELS
            .iter()
            .map(|(name, url)| ModelSource::new(*name, *url))
            .collect()
    }
}

impl FromStr for ModelSource {
    type Err = ModelResolveError;

    /// Parses `NAME=URL`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((name, url)) if !name.trim().is_empty() && !url.trim().is_empty() => {
                Ok(ModelSource::new(name.trim(), url.trim()))
            }
            _ => Err(ModelResolveError::InvalidSource(s.to_string())),
        }
    }
}

/// Outcome of one provisioning run. Individual failures never abort the run.
#[derive(Debug, Default)]
pub struct ProvisionReport {
    pub downloaded: Vec<PathBuf>,
    pub failed: Vec<(String, ModelResolveError)>,
}

impl ProvisionReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Everything to fetch for `config`: the default files, the neural model
/// when `neural_model_url` is set, then `extra`.
pub fn manifest(config: &DetectorConfig, extra: &[ModelSource]) -> Vec<ModelSource> {
    let mut sources = ModelSource::defaults();
    if let Some(url) = &config.neural_model_url {
        sources.push(ModelSource::new(config.neural_model.clone(), url.clone()));
    }
    sources.extend_from_slice(extra);
    sources
}

/// Provision the manifest for `config` into its models directory.
///
/// When nothing in the manifest supplies the configured neural model and
/// it is not already on disk, the report lists it as failed with
/// [`ModelResolveError::NoSource`].
pub fn provision_for(
    config: &DetectorConfig,
    extra: &[ModelSource],
    progress: Option<&dyn Fn(&str, u64, u64)>,
) -> Result<ProvisionReport, ModelResolveError> {
    let sources = manifest(config, extra);
    let mut report = provision(&config.models_dir, &sources, progress)?;
    let unsourced = unsourced_neural_model(config, &sources)
        .filter(|name| resolve_local(name, &config.models_dir).is_none());
    if let Some(name) = unsourced {
        log::warn!("No source for {name}; the neural detector will stay unavailable");
        report
            .failed
            .push((name.clone(), ModelResolveError::NoSource { name }));
    }
    Ok(report)
}

fn unsourced_neural_model(config: &DetectorConfig, sources: &[ModelSource]) -> Option<String> {
    let covered = sources.iter().any(|s| s.name == config.neural_model);
    (!covered).then(|| config.neural_model.clone())
}

/// Locate an already-provisioned model file without touching the network.
///
/// Resolution order:
/// 1. The configured models directory
/// 2. User cache directory (platform-specific)
pub fn resolve_local(name: &str, models_dir: &Path) -> Option<PathBuf> {
    let local = models_dir.join(name);
    if local.exists() {
        return Some(local);
    }
    let cached = model_cache_dir()?.join(name);
    cached.exists().then_some(cached)
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/facedetect/models/`
/// - Linux: `$XDG_CACHE_HOME/facedetect/models/` or `~/.cache/facedetect/models/`
/// - Windows: `%LOCALAPPDATA%/facedetect/models/`
pub fn model_cache_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir().map(|d| d.join("facedetect").join("models"))
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir().map(|d| d.join("facedetect").join("models"))
    }
}

/// Download every source into `models_dir`.
///
/// `progress` receives `(file_name, bytes_downloaded, total_bytes)`, where
/// `total_bytes` is 0 if the server didn't provide Content-Length.
///
/// Only failing to create the directory is fatal; a failed file is logged,
/// recorded in the report, and the loop moves on to the next one.
pub fn provision(
    models_dir: &Path,
    sources: &[ModelSource],
    progress: Option<&dyn Fn(&str, u64, u64)>,
) -> Result<ProvisionReport, ModelResolveError> {
    fs::create_dir_all(models_dir).map_err(|e| ModelResolveError::ModelsDir {
        path: models_dir.to_path_buf(),
        source: e,
    })?;

    let mut report = ProvisionReport::default();
    for source in sources {
        log::info!("Downloading {}...", source.name);
        let dest = models_dir.join(&source.name);
        let on_chunk: &dyn Fn(u64, u64) = &|downloaded: u64, total: u64| {
            if let Some(cb) = progress {
                cb(&source.name, downloaded, total);
            }
        };
        match download(&source.url, &dest, Some(on_chunk)) {
            Ok(()) => {
                log::info!("Downloaded {}", source.name);
                report.downloaded.push(dest);
            }
            Err(e) => {
                log::error!("Failed to download {}: {e}", source.name);
                report.failed.push((source.name.clone(), e));
            }
        }
    }
    Ok(report)
}

fn download(
    url: &str,
    dest: &Path,
    progress: Option<&dyn Fn(u64, u64)>,
) -> Result<(), ModelResolveError> {
    let temp_path = dest.with_extension("part");

    let result = download_inner(url, dest, &temp_path, progress);

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }

    result
}

fn download_inner(
    url: &str,
    dest: &Path,
    temp_path: &Path,
    progress: Option<&dyn Fn(u64, u64)>,
) -> Result<(), ModelResolveError> {
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ModelResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;

    let mut file = fs::File::create(temp_path).map_err(|e| ModelResolveError::Write {
        path: temp_path.to_path_buf(),
        source: e,
    })?;

    let mut reader = response;
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| ModelResolveError::Write {
                path: temp_path.to_path_buf(),
                source: e,
            })?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])
            .map_err(|e| ModelResolveError::Write {
                path: temp_path.to_path_buf(),
                source: e,
            })?;
        downloaded += n as u64;
        if let Some(cb) = progress {
            cb(downloaded, total);
        }
    }

    file.flush().map_err(|e| ModelResolveError::Write {
        path: temp_path.to_path_buf(),
        source: e,
    })?;
    drop(file);

    fs::rename(temp_path, dest).map_err(|e| ModelResolveError::Write {
        path: dest.to_path_buf(),
        source: e,
    })?;

    Ok(())
}
