use crate::detector::Detector;
use crate::engine::InferenceEngine;
use crate::errors::DetectionError;
use crate::input::RawImage;
use crate::outcome::{BatchOutcome, DetectionOutcome};
use anyhow::Context;
use rayon::prelude::*;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Runs a batch of detections on a bounded worker pool.
///
/// Each item gets its own independent `detect` call and its outcome lands in
/// the slot with the item's index, so order and isolation hold however the
/// pool schedules the work.
pub struct BatchCoordinator<E> {
    detector: Arc<Detector<E>>,
    pool: rayon::ThreadPool,
}

impl<E: InferenceEngine> BatchCoordinator<E> {
    pub fn new(detector: Arc<Detector<E>>, workers: usize) -> anyhow::Result<Self> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("detect-worker-{}", i))
            .build()
            .context("failed to build batch worker pool")?;

        tracing::debug!(workers, "Batch worker pool ready");
        Ok(Self { detector, pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    #[tracing::instrument(skip_all, fields(items = items.len()))]
    pub fn detect_batch(&self, items: &[RawImage], threshold: Option<f32>) -> BatchOutcome {
        if items.is_empty() {
            return BatchOutcome::from_results(Vec::new());
        }

        let mut results: Vec<DetectionOutcome> = Vec::with_capacity(items.len());
        self.pool.install(|| {
            items
                .par_iter()
                .enumerate()
                .map(|(index, item)| self.detect_isolated(index, item, threshold))
                .collect_into_vec(&mut results);
        });

        let outcome = BatchOutcome::from_results(results);
        tracing::info!(
            processed = outcome.processed_count,
            successful = outcome.successful_count,
            failed = outcome.failed_count,
            "Batch complete"
        );
        outcome
    }

    fn detect_isolated(
        &self,
        index: usize,
        item: &RawImage,
        threshold: Option<f32>,
    ) -> DetectionOutcome {
        match panic::catch_unwind(AssertUnwindSafe(|| self.detector.detect(item, threshold))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(index, panic = %message, "Batch item panicked");
                DetectionError::InferenceFailure(format!("detection panicked: {}", message))
                    .into()
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
