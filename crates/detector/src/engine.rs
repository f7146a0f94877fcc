use crate::backend::{ExecutionProvider, InferenceBackend};
use crate::errors::DetectionError;
use crate::input::NormalizedImage;
use crate::labels::LabelMap;
use crate::processing::{ModelFamily, PostProcessor, RawDetection, TransformParams};
use crate::threshold::Threshold;
use common::span;
use preprocess::{CpuPreProcessor, Preprocess, PreprocessResult};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

/// Read-only detection capability shared by every request for the lifetime
/// of the process.
pub trait InferenceEngine: Send + Sync {
    /// Runs the model on one image. Every returned detection scores at least
    /// `threshold`; overlapping boxes are returned as the model produced them.
    fn infer(
        &self,
        image: &NormalizedImage,
        threshold: Threshold,
    ) -> Result<Vec<RawDetection>, DetectionError>;

    /// Human-readable name for a class id.
    fn label(&self, class_id: u32) -> String;

    fn health(&self) -> EngineHealth;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineHealth {
    pub model_loaded: bool,
    pub backend: String,
}

struct LoadedModel<B> {
    backend: B,
    preprocessor: CpuPreProcessor,
    postprocessor: PostProcessor,
}

enum EngineState<B> {
    Ready {
        model: Mutex<LoadedModel<B>>,
        provider: ExecutionProvider,
    },
    Unavailable {
        reason: String,
        backend: String,
    },
}

/// Model handle plus the label map bound to it at load time.
///
/// The backend and its preprocessing buffers sit behind one lock, so
/// concurrent `infer` calls run one at a time.
pub struct ModelEngine<B: InferenceBackend> {
    state: EngineState<B>,
    labels: LabelMap,
}

impl<B: InferenceBackend> ModelEngine<B> {
    pub fn new(backend: B, labels: LabelMap, family: ModelFamily, input_size: (u32, u32)) -> Self {
        let provider = backend.provider();
        tracing::info!(
            provider = %provider,
            family = %family,
            labels = labels.len(),
            input_width = input_size.0,
            input_height = input_size.1,
            "Inference engine ready"
        );

        Self {
            state: EngineState::Ready {
                model: Mutex::new(LoadedModel {
                    backend,
                    preprocessor: CpuPreProcessor::new(input_size),
                    postprocessor: PostProcessor::new(family),
                }),
                provider,
            },
            labels,
        }
    }

    /// An engine whose model failed to load. Every call reports
    /// `ModelUnavailable` until the process restarts.
    pub fn unavailable(
        reason: impl Into<String>,
        labels: LabelMap,
        backend: impl Into<String>,
    ) -> Self {
        let reason = reason.into();
        tracing::error!(reason = %reason, "Inference engine unavailable");

        Self {
            state: EngineState::Unavailable {
                reason,
                backend: backend.into(),
            },
            labels,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, EngineState::Ready { .. })
    }
}

fn lock_model<B>(model: &Mutex<LoadedModel<B>>) -> MutexGuard<'_, LoadedModel<B>> {
    match model.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            // Weights are never mutated; scratch buffers are rewritten per call.
            tracing::warn!("Recovering model lock poisoned by a panicked inference");
            poisoned.into_inner()
        }
    }
}

impl<B: InferenceBackend> InferenceEngine for ModelEngine<B> {
    fn infer(
        &self,
        image: &NormalizedImage,
        threshold: Threshold,
    ) -> Result<Vec<RawDetection>, DetectionError> {
        let model = match &self.state {
            EngineState::Ready { model, .. } => model,
            EngineState::Unavailable { reason, .. } => {
                return Err(DetectionError::ModelUnavailable(reason.clone()));
            }
        };

        let _s = span!("engine_infer");
        let mut guard = lock_model(model);
        let LoadedModel {
            backend,
            preprocessor,
            postprocessor,
        } = &mut *guard;

        let PreprocessResult {
            data,
            scale,
            offset_x,
            offset_y,
        } = preprocessor
            .preprocess(image.as_raw(), image.width(), image.height())
            .map_err(|e| DetectionError::InferenceFailure(format!("preprocessing: {:#}", e)))?;

        let output = backend
            .infer(&data)
            .map_err(|e| DetectionError::InferenceFailure(format!("{:#}", e)))?;

        let (input_width, input_height) = preprocessor.input_size();
        let transform = TransformParams {
            orig_width: image.width(),
            orig_height: image.height(),
            input_width,
            input_height,
            scale,
            offset_x,
            offset_y,
        };

        postprocessor
            .parse_detections(
                &output.boxes.view(),
                &output.logits.view(),
                &transform,
                threshold.value(),
            )
            .map_err(|e| DetectionError::InferenceFailure(format!("postprocessing: {:#}", e)))
    }

    fn label(&self, class_id: u32) -> String {
        self.labels.resolve(class_id)
    }

    fn health(&self) -> EngineHealth {
        match &self.state {
            EngineState::Ready { provider, .. } => EngineHealth {
                model_loaded: true,
                backend: provider.to_string(),
            },
            EngineState::Unavailable { backend, .. } => EngineHealth {
                model_loaded: false,
                backend: backend.clone(),
            },
        }
    }
}

impl<B: InferenceBackend> Drop for ModelEngine<B> {
    fn drop(&mut self) {
        if let EngineState::Ready { provider, .. } = &self.state {
            tracing::info!(provider = %provider, "Releasing inference model");
        }
    }
}

#[cfg(feature = "ort-backend")]
mod load {
    use super::ModelEngine;
    use crate::backend::ort::OrtBackend;
    use crate::config::DetectorConfig;
    use crate::labels::LabelMap;

    impl ModelEngine<OrtBackend> {
        /// Loads labels and the ONNX model named by `config`.
        ///
        /// Never fails: a model or label file that cannot be loaded yields an
        /// unavailable engine so the process can still answer health checks.
        pub fn load(config: &DetectorConfig) -> Self {
            let labels = match &config.labels_path {
                Some(path) => match LabelMap::load(path) {
                    Ok(labels) => labels,
                    Err(e) => {
                        return Self::unavailable(
                            format!("{:#}", e),
                            LabelMap::default(),
                            config.execution_provider.as_str(),
                        );
                    }
                },
                None => LabelMap::coco(),
            };

            match OrtBackend::load(
                &config.model_path,
                config.execution_provider,
                config.intra_threads,
                config.model_family,
            ) {
                Ok(backend) => Self::new(backend, labels, config.model_family, config.input_size),
                Err(e) => Self::unavailable(
                    format!("{:#}", e),
                    labels,
                    config.execution_provider.as_str(),
                ),
            }
        }
    }
}
