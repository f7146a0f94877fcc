use crate::backend::ProviderPreference;
use crate::processing::ModelFamily;
use crate::threshold::Threshold;
use anyhow::Context;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::thread;

pub use common::Environment;

const DEFAULT_MODEL_PATH: &str = "models/detr.onnx";
const DEFAULT_INTRA_THREADS: usize = 4;

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub environment: Environment,
    pub model_path: PathBuf,
    pub labels_path: Option<PathBuf>,
    pub model_family: ModelFamily,
    pub execution_provider: ProviderPreference,
    pub input_size: (u32, u32),
    pub default_threshold: Threshold,
    pub batch_workers: usize,
    pub intra_threads: usize,
    pub otel_endpoint: Option<String>,
}

impl DetectorConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::from_env();

        let model_path = env::var("MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_MODEL_PATH));

        let labels_path = non_empty_var("LABELS_PATH").map(PathBuf::from);

        let model_family = match non_empty_var("MODEL_FAMILY") {
            Some(value) => ModelFamily::from_str(&value).map_err(anyhow::Error::msg)?,
            None => ModelFamily::default(),
        };

        let execution_provider = match non_empty_var("EXECUTION_PROVIDER") {
            Some(value) => ProviderPreference::from_str(&value).map_err(anyhow::Error::msg)?,
            None => ProviderPreference::default(),
        };

        let input_width = parsed_var("INPUT_WIDTH").unwrap_or(640);
        let input_height = parsed_var("INPUT_HEIGHT").unwrap_or(640);
        if input_width == 0 || input_height == 0 {
            anyhow::bail!(
                "INPUT_WIDTH and INPUT_HEIGHT must be at least 1, got {}x{}",
                input_width,
                input_height
            );
        }

        let default_threshold = match parsed_var::<f32>("DETECTION_THRESHOLD") {
            Some(value) => Threshold::new(value).context("DETECTION_THRESHOLD")?,
            None => Threshold::DEFAULT,
        };

        let batch_workers = parsed_var("BATCH_WORKERS").unwrap_or_else(default_workers);
        if batch_workers == 0 {
            anyhow::bail!("BATCH_WORKERS must be at least 1");
        }

        let intra_threads = parsed_var("INTRA_THREADS").unwrap_or(DEFAULT_INTRA_THREADS);

        let otel_endpoint = non_empty_var("OTEL_ENDPOINT");

        Ok(Self {
            environment,
            model_path,
            labels_path,
            model_family,
            execution_provider,
            input_size: (input_width, input_height),
            default_threshold,
            batch_workers,
            intra_threads,
            otel_endpoint,
        })
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            labels_path: None,
            model_family: ModelFamily::default(),
            execution_provider: ProviderPreference::default(),
            input_size: preprocess::DEFAULT_INPUT_SIZE,
            default_threshold: Threshold::DEFAULT,
            batch_workers: default_workers(),
            intra_threads: DEFAULT_INTRA_THREADS,
            otel_endpoint: None,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parsed_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
