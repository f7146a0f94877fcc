pub mod backend;
pub mod batch;
pub mod config;
pub mod detector;
pub mod engine;
pub mod errors;
pub mod input;
pub mod labels;
pub mod logging;
pub mod metrics;
pub mod outcome;
pub mod processing;
pub mod service;
pub mod threshold;

// Re-export commonly used types for convenience
pub use backend::{ExecutionProvider, InferenceBackend, InferenceOutput, ProviderPreference};
pub use batch::BatchCoordinator;
pub use config::DetectorConfig;
pub use detector::Detector;
pub use engine::{EngineHealth, InferenceEngine, ModelEngine};
pub use errors::{DetectionError, ErrorKind};
pub use input::{NormalizedImage, RawImage, validate_and_normalize};
pub use labels::LabelMap;
pub use outcome::{
    BatchOutcome, BoundingBox, DetectionFailure, DetectionOutcome, DetectionResult,
    DetectionSuccess, ImageSize,
};
pub use processing::{ModelFamily, RawDetection};
pub use service::{DetectionService, HealthReport, HealthStatus};
pub use threshold::Threshold;
