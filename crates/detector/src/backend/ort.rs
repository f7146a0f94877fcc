use super::{ExecutionProvider, InferenceBackend, InferenceOutput, ProviderPreference};
use crate::processing::ModelFamily;
use anyhow::Context;
use ndarray::{Array, IxDyn};
use ort::{
    execution_providers::{CUDAExecutionProvider, ExecutionProvider as _},
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use std::path::Path;

/// Tensor names used by each family's ONNX export.
struct TensorNames {
    input: &'static str,
    logits: &'static str,
    boxes: &'static str,
}

impl TensorNames {
    fn for_family(family: ModelFamily) -> Self {
        match family {
            ModelFamily::Detr => Self {
                input: "pixel_values",
                logits: "logits",
                boxes: "pred_boxes",
            },
            ModelFamily::RfDetr => Self {
                input: "input",
                logits: "labels",
                boxes: "dets",
            },
        }
    }
}

pub struct OrtBackend {
    session: Session,
    provider: ExecutionProvider,
    names: TensorNames,
}

impl OrtBackend {
    pub fn load(
        path: &Path,
        preference: ProviderPreference,
        intra_threads: usize,
        family: ModelFamily,
    ) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?;

        let provider = match preference {
            ProviderPreference::Cpu => ExecutionProvider::Cpu,
            ProviderPreference::Cuda => ExecutionProvider::Cuda,
            ProviderPreference::Auto => {
                let cuda_available = CUDAExecutionProvider::default()
                    .is_available()
                    .unwrap_or(false);
                if cuda_available {
                    ExecutionProvider::Cuda
                } else {
                    ExecutionProvider::Cpu
                }
            }
        };

        match provider {
            ExecutionProvider::Cuda => {
                tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
                builder = builder.with_execution_providers([CUDAExecutionProvider::default()
                    .with_device_id(0)
                    .build()
                    .error_on_failure()])?;
            }
            ExecutionProvider::Cpu => {
                tracing::info!("Initializing ONNX Runtime with CPU execution provider");
            }
        }

        let session = builder
            .commit_from_file(path)
            .with_context(|| format!("failed to load model from {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            family = %family,
            provider = %provider,
            "Model loaded"
        );

        Ok(Self {
            session,
            provider,
            names: TensorNames::for_family(family),
        })
    }
}

impl InferenceBackend for OrtBackend {
    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        let outputs = self.session.run(ort::inputs![
            self.names.input => TensorRef::from_array_view(images.view())?
        ])?;

        let logits = outputs[self.names.logits].try_extract_array::<f32>()?;
        let boxes = outputs[self.names.boxes].try_extract_array::<f32>()?;

        Ok(InferenceOutput {
            boxes: boxes.into_owned(),
            logits: logits.into_owned(),
        })
    }

    fn provider(&self) -> ExecutionProvider {
        self.provider
    }
}
