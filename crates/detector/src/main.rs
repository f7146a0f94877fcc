use anyhow::Context;
use clap::Parser;
use common::TelemetryGuard;
use detector::{DetectionService, DetectorConfig, ModelEngine, RawImage, logging::setup_logging};
use image::ImageFormat;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(not(feature = "ort-backend"))]
compile_error!("The 'ort-backend' feature must be enabled to build the detector binary");

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Detect objects in image files and print the outcome as JSON.
#[derive(Parser, Debug)]
#[command(name = "detector", version)]
struct Args {
    /// Confidence threshold in [0, 1]; defaults to DETECTION_THRESHOLD.
    #[arg(long)]
    threshold: Option<f32>,

    /// Print the engine health report.
    #[arg(long)]
    health: bool,

    /// Images to run detection on. Several files run as one batch.
    #[arg(required_unless_present = "health")]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = DetectorConfig::from_env()?;

    let _telemetry = match &config.otel_endpoint {
        Some(endpoint) => Some(TelemetryGuard::init("detector", endpoint, config.environment)?),
        None => {
            setup_logging(&config);
            None
        }
    };

    tracing::info!(config = ?config, "Loaded configuration");

    let engine = Arc::new(ModelEngine::load(&config));
    let service = DetectionService::from_config(engine, &config)?;

    if args.health {
        print_json(&service.health())?;
    }

    match args.files.as_slice() {
        [] => {}
        [path] => {
            let raw = read_image(path)?;
            print_json(&service.detect_image(&raw, args.threshold))?;
        }
        paths => {
            let items = paths
                .iter()
                .map(|path| read_image(path))
                .collect::<anyhow::Result<Vec<_>>>()?;
            print_json(&service.detect_batch(&items, args.threshold))?;
        }
    }

    Ok(())
}

fn read_image(path: &Path) -> anyhow::Result<RawImage> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let content_type = ImageFormat::from_path(path)
        .map(|format| format.to_mime_type())
        .unwrap_or(FALLBACK_CONTENT_TYPE);

    let raw = RawImage::new(bytes, content_type);
    Ok(match path.file_name() {
        Some(name) => raw.with_filename(name.to_string_lossy()),
        None => raw,
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
