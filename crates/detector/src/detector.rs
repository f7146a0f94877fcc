use crate::engine::InferenceEngine;
use crate::errors::DetectionError;
use crate::input::{RawImage, validate_and_normalize};
use crate::metrics::DetectionMetrics;
use crate::outcome::{
    BoundingBox, DetectionFailure, DetectionOutcome, DetectionResult, DetectionSuccess,
};
use crate::processing::RawDetection;
use crate::threshold::Threshold;
use std::sync::Arc;
use std::time::Instant;

/// Runs one image through validation, inference and result assembly.
///
/// Every failure is returned as a [`DetectionOutcome::Failure`]; nothing is
/// retried.
pub struct Detector<E> {
    engine: Arc<E>,
    default_threshold: Threshold,
    metrics: DetectionMetrics,
}

impl<E: InferenceEngine> Detector<E> {
    pub fn new(engine: Arc<E>, default_threshold: Threshold) -> Self {
        Self {
            engine,
            default_threshold,
            metrics: DetectionMetrics::default(),
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn default_threshold(&self) -> Threshold {
        self.default_threshold
    }

    #[tracing::instrument(
        skip_all,
        fields(
            bytes = raw.bytes.len(),
            content_type = raw.content_type.as_deref(),
            filename = raw.filename.as_deref(),
        )
    )]
    pub fn detect(&self, raw: &RawImage, threshold: Option<f32>) -> DetectionOutcome {
        if !raw.declares_image() {
            let content_type = raw.content_type.as_deref().unwrap_or("none");
            let mut failure = DetectionFailure::from(DetectionError::InvalidInput(format!(
                "file must be an image, got content type `{}`",
                content_type
            )))
            .with_detail("content_type", content_type);
            if let Some(filename) = &raw.filename {
                failure = failure.with_detail("filename", filename.as_str());
            }
            return self.fail(failure);
        }

        let image = match validate_and_normalize(raw) {
            Ok(image) => image,
            Err(e) => return self.fail(e.into()),
        };

        let threshold = match Threshold::resolve(threshold, self.default_threshold) {
            Ok(threshold) => threshold,
            Err(e) => return self.fail(e.into()),
        };

        let start = Instant::now();
        let raw_detections = match self.engine.infer(&image, threshold) {
            Ok(detections) => detections,
            Err(e) => return self.fail(e.into()),
        };
        let elapsed = start.elapsed().as_secs_f64();

        let detections: Vec<DetectionResult> = raw_detections
            .iter()
            .filter(|det| threshold.admits(det.score))
            .map(|det| self.to_result(det, threshold))
            .collect();

        self.metrics.record_success(elapsed, detections.len());
        tracing::debug!(
            detections = detections.len(),
            threshold = threshold.value(),
            elapsed_ms = elapsed * 1000.0,
            width = image.width(),
            height = image.height(),
            "Detection complete"
        );

        DetectionOutcome::Success(DetectionSuccess::new(
            detections,
            round_f64(elapsed, 4),
            image.size(),
        ))
    }

    fn to_result(&self, det: &RawDetection, threshold: Threshold) -> DetectionResult {
        // Rounding must not push a borderline score under the cutoff.
        let rounded = round_f32(det.score, 4);
        let score = if threshold.admits(rounded) {
            rounded
        } else {
            det.score
        };

        DetectionResult {
            label: self.engine.label(det.class_id),
            score,
            bounding_box: BoundingBox::from_corners(
                round_f32(det.x1, 2),
                round_f32(det.y1, 2),
                round_f32(det.x2, 2),
                round_f32(det.y2, 2),
            ),
        }
    }

    fn fail(&self, failure: DetectionFailure) -> DetectionOutcome {
        self.metrics.record_failure(failure.error_kind);

        if failure.error_kind.is_client_error() {
            tracing::warn!(
                error_kind = %failure.error_kind,
                message = %failure.message,
                "Rejected detection request"
            );
        } else {
            tracing::error!(
                error_kind = %failure.error_kind,
                message = %failure.message,
                "Detection failed"
            );
        }

        DetectionOutcome::Failure(failure)
    }
}

fn round_f32(value: f32, decimals: i32) -> f32 {
    let factor = 10f32.powi(decimals);
    (value * factor).round() / factor
}

fn round_f64(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
