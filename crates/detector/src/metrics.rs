use crate::errors::ErrorKind;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};

/// Instruments recorded by the orchestrator on the global `detector` meter.
///
/// Without an installed meter provider these are no-ops.
#[derive(Clone)]
pub struct DetectionMetrics {
    duration: Histogram<f64>,
    images: Counter<u64>,
    failures: Counter<u64>,
    objects: Counter<u64>,
}

impl DetectionMetrics {
    pub fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 0.75, 1.0, 2.0, 5.0,
        ];

        Self {
            duration: meter
                .f64_histogram("detection_duration_seconds")
                .with_description("Time spent in model inference for one image")
                .with_unit("s")
                .with_boundaries(latency_buckets.to_vec())
                .build(),
            images: meter
                .u64_counter("detection_images_total")
                .with_description("Total images submitted for detection")
                .build(),
            failures: meter
                .u64_counter("detection_failures_total")
                .with_description("Total detection calls that produced a failure outcome")
                .build(),
            objects: meter
                .u64_counter("detection_objects_total")
                .with_description("Total objects detected")
                .build(),
        }
    }

    pub fn record_success(&self, elapsed_secs: f64, objects: usize) {
        self.images.add(1, &[]);
        self.duration.record(elapsed_secs, &[]);
        self.objects.add(objects as u64, &[]);
    }

    pub fn record_failure(&self, kind: ErrorKind) {
        self.images.add(1, &[]);
        self.failures
            .add(1, &[KeyValue::new("error_kind", kind.as_str())]);
    }
}

impl Default for DetectionMetrics {
    fn default() -> Self {
        Self::new("detector")
    }
}
