use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use ndarray::{Array3, ArrayView3};

use facedetect_core::config::DetectorConfig;
use facedetect_core::detection::domain::detector_selector::DetectorSelector;
use facedetect_core::detection::infrastructure::backend_factories::{
    HaarCascadeFactory, OnnxBlazefaceFactory,
};
use facedetect_core::shared::constants::IMAGE_EXTENSIONS;
use facedetect_core::shared::model_resolver::{self, ModelSource};

/// Face detection with a neural detector and a Haar cascade fallback.
#[derive(Parser)]
#[command(name = "facedetect")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect faces in an image and print `[top, right, bottom, left]` boxes as JSON.
    Detect {
        /// Input image file.
        input: PathBuf,

        #[command(flatten)]
        detector: DetectorArgs,
    },
    /// Download the model files into the models directory.
    Provision {
        /// JSON config file (defaults to the per-user config, if any).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory to download into.
        #[arg(long)]
        models_dir: Option<PathBuf>,

        /// Where to download the neural model's ONNX export from.
        #[arg(long, value_name = "URL")]
        neural_model_url: Option<String>,

        /// Extra file to fetch, as NAME=URL (repeatable).
        #[arg(long = "model", value_name = "NAME=URL")]
        models: Vec<ModelSource>,
    },
    /// Report which assets are present and run a blank image through the detector.
    Check {
        #[command(flatten)]
        detector: DetectorArgs,
    },
}

#[derive(Args)]
struct DetectorArgs {
    /// JSON config file (defaults to the per-user config, if any).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the model assets.
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Haar cascade XML file, bypassing the directory search.
    #[arg(long)]
    cascade: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Detect { input, detector } => run_detect(&input, &load_config(&detector)?),
        Command::Provision {
            config,
            models_dir,
            neural_model_url,
            models,
        } => {
            let mut config = match config {
                Some(path) => DetectorConfig::load(&path)?,
                None => DetectorConfig::load_or_default(),
            };
            if let Some(dir) = models_dir {
                config.models_dir = dir;
            }
            if neural_model_url.is_some() {
                config.neural_model_url = neural_model_url;
            }
            run_provision(&config, &models)
        }
        Command::Check { detector } => run_check(&load_config(&detector)?),
    }
}

fn run_detect(input: &Path, config: &DetectorConfig) -> Result<(), Box<dyn std::error::Error>> {
    if !input.exists() {
        return Err(format!("Input file not found: {}", input.display()).into());
    }
    if !is_image(input) {
        return Err(format!("Unsupported image type: {}", input.display()).into());
    }

    let rgb = image::open(input)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    let view = ArrayView3::from_shape((height as usize, width as usize, 3), rgb.as_raw())?;

    let mut selector = DetectorSelector::from_config(config);
    let boxes = selector.detect_faces(view);
    log::info!(
        "Found {} face(s) using the {} backend",
        boxes.len(),
        selector.mode()
    );

    println!("{}", serde_json::to_string(&boxes)?);
    Ok(())
}

fn run_provision(
    config: &DetectorConfig,
    extra: &[ModelSource],
) -> Result<(), Box<dyn std::error::Error>> {
    let report = model_resolver::provision_for(config, extra, Some(&download_progress))?;
    eprintln!();

    for path in &report.downloaded {
        eprintln!("Downloaded {}", path.display());
    }
    for (name, err) in &report.failed {
        eprintln!("Failed to provision {name}: {err}");
    }
    if !report.is_complete() {
        log::warn!("{} model file(s) not provisioned", report.failed.len());
    }
    Ok(())
}

fn run_check(config: &DetectorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let neural = OnnxBlazefaceFactory::new(config);
    match neural.model_path() {
        Some(path) => println!("Neural model: {}", path.display()),
        None => {
            let expected = config.models_dir.join(&config.neural_model);
            println!("Neural model: missing ({})", expected.display());
            if let Some(tflite) = neural.tflite_sibling() {
                log::warn!(
                    "{} is present but ONNX Runtime needs {}; provision it with --neural-model-url",
                    tflite.display(),
                    expected.display()
                );
            }
        }
    }
    let cascade = HaarCascadeFactory::new(config).cascade_path();
    if cascade.is_file() {
        println!("Haar cascade: {}", cascade.display());
    } else {
        println!("Haar cascade: missing ({})", cascade.display());
    }

    let blank = Array3::<u8>::zeros((100, 100, 3));
    let mut selector = DetectorSelector::from_config(config);
    let boxes = selector.detect_faces(blank.view());
    println!("Faces in blank 100x100 image: {}", boxes.len());
    println!("Backend mode: {}", selector.mode());
    Ok(())
}

fn load_config(args: &DetectorArgs) -> Result<DetectorConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => DetectorConfig::load(path)?,
        None => DetectorConfig::load_or_default(),
    };
    if let Some(dir) = &args.models_dir {
        config.models_dir = dir.clone();
    }
    if let Some(cascade) = &args.cascade {
        config.cascade_path = Some(cascade.clone());
    }
    validate(&config)?;
    Ok(config)
}

fn validate(config: &DetectorConfig) -> Result<(), Box<dyn std::error::Error>> {
    if !(0.0..=1.0).contains(&config.min_detection_confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            config.min_detection_confidence
        )
        .into());
    }
    if config.scale_factor.is_nan() || config.scale_factor <= 1.0 {
        return Err(format!(
            "Scale factor must be greater than 1.0, got {}",
            config.scale_factor
        )
        .into());
    }
    Ok(())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn download_progress(name: &str, downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading {name}... {pct}%");
    } else {
        eprint!("\rDownloading {name}... {downloaded} bytes");
    }
}
