use crate::errors::{DetectionError, ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Box corners in the original image's pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl BoundingBox {
    /// Builds a box from two arbitrary corners, ordering them.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            xmin: x1.min(x2),
            ymin: y1.min(y2),
            xmax: x1.max(x2),
            ymax: y1.max(y2),
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.xmin <= self.xmax && self.ymin <= self.ymax
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub label: String,
    pub score: f32,
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSuccess {
    pub detections: Vec<DetectionResult>,
    pub total_detections: usize,
    /// Seconds spent in inference, excluding decoding.
    pub processing_time: f64,
    pub image_size: ImageSize,
}

impl DetectionSuccess {
    pub fn new(
        detections: Vec<DetectionResult>,
        processing_time: f64,
        image_size: ImageSize,
    ) -> Self {
        Self {
            total_detections: detections.len(),
            detections,
            processing_time: processing_time.max(0.0),
            image_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionFailure {
    pub error_kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, String>>,
}

impl DetectionFailure {
    pub fn new(error_kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error_kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details
            .as_ref()
            .and_then(|details| details.get(key))
            .map(String::as_str)
    }
}

impl From<DetectionError> for DetectionFailure {
    fn from(err: DetectionError) -> Self {
        let failure = Self::new(err.kind(), err.to_string());
        match &err {
            DetectionError::InvalidImage(reason) => failure.with_detail("reason", reason.as_str()),
            _ => failure,
        }
    }
}

/// Result of one detection call. Failures are values, never panics or
/// propagated errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DetectionOutcome {
    Success(DetectionSuccess),
    Failure(DetectionFailure),
}

impl DetectionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DetectionOutcome::Success(_))
    }

    pub fn success(&self) -> Option<&DetectionSuccess> {
        match self {
            DetectionOutcome::Success(success) => Some(success),
            DetectionOutcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&DetectionFailure> {
        match self {
            DetectionOutcome::Success(_) => None,
            DetectionOutcome::Failure(failure) => Some(failure),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.failure().map(|failure| failure.error_kind)
    }
}

impl From<DetectionFailure> for DetectionOutcome {
    fn from(failure: DetectionFailure) -> Self {
        DetectionOutcome::Failure(failure)
    }
}

impl From<DetectionError> for DetectionOutcome {
    fn from(err: DetectionError) -> Self {
        DetectionOutcome::Failure(err.into())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// One outcome per input item, in input order.
    pub results: Vec<DetectionOutcome>,
    pub processed_count: usize,
    pub successful_count: usize,
    pub failed_count: usize,
}

impl BatchOutcome {
    /// Derives the counters from the completed per-item outcomes.
    pub fn from_results(results: Vec<DetectionOutcome>) -> Self {
        let successful_count = results.iter().filter(|r| r.is_success()).count();
        Self {
            processed_count: results.len(),
            failed_count: results.len() - successful_count,
            successful_count,
            results,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.successful_count + self.failed_count == self.processed_count
            && self.processed_count == self.results.len()
    }
}
