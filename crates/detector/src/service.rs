use crate::batch::BatchCoordinator;
use crate::config::DetectorConfig;
use crate::detector::Detector;
use crate::engine::InferenceEngine;
use crate::input::RawImage;
use crate::outcome::{BatchOutcome, DetectionOutcome};
use crate::threshold::Threshold;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: &'static str,
    pub model_loaded: bool,
    pub backend: String,
    pub uptime_seconds: f64,
}

/// Single-image, batch and health operations over one shared engine.
pub struct DetectionService<E> {
    detector: Arc<Detector<E>>,
    batch: BatchCoordinator<E>,
    started_at: Instant,
}

impl<E: InferenceEngine> DetectionService<E> {
    pub fn new(
        engine: Arc<E>,
        default_threshold: Threshold,
        workers: usize,
    ) -> anyhow::Result<Self> {
        let detector = Arc::new(Detector::new(engine, default_threshold));
        let batch = BatchCoordinator::new(detector.clone(), workers)?;

        Ok(Self {
            detector,
            batch,
            started_at: Instant::now(),
        })
    }

    pub fn from_config(engine: Arc<E>, config: &DetectorConfig) -> anyhow::Result<Self> {
        Self::new(engine, config.default_threshold, config.batch_workers)
    }

    pub fn detect(
        &self,
        bytes: impl Into<Vec<u8>>,
        content_type: Option<&str>,
        threshold: Option<f32>,
    ) -> DetectionOutcome {
        let raw = RawImage {
            bytes: bytes.into(),
            content_type: content_type.map(str::to_string),
            filename: None,
        };
        self.detector.detect(&raw, threshold)
    }

    /// Like [`Self::detect`] for callers that already hold a [`RawImage`].
    pub fn detect_image(&self, raw: &RawImage, threshold: Option<f32>) -> DetectionOutcome {
        self.detector.detect(raw, threshold)
    }

    pub fn detect_batch(&self, items: &[RawImage], threshold: Option<f32>) -> BatchOutcome {
        self.batch.detect_batch(items, threshold)
    }

    pub fn health(&self) -> HealthReport {
        let engine = self.detector.engine().health();
        HealthReport {
            status: if engine.model_loaded {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            version: env!("CARGO_PKG_VERSION"),
            model_loaded: engine.model_loaded,
            backend: engine.backend,
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
        }
    }
}
