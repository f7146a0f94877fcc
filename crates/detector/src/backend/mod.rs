use ndarray::{Array, ArrayD, IxDyn};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "ort-backend")]
pub mod ort;

/// A loaded model that turns one NCHW tensor into raw DETR-style outputs.
///
/// Implementations own their session and may keep scratch state, so calls
/// take `&mut self`; callers serialize access.
pub trait InferenceBackend: Send {
    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput>;

    /// Where the model actually runs.
    fn provider(&self) -> ExecutionProvider;
}

pub struct InferenceOutput {
    pub boxes: ArrayD<f32>,  // [1, Q, 4] cxcywh (normalized 0-1)
    pub logits: ArrayD<f32>, // [1, Q, num_classes] class logits
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionProvider {
    Cpu,
    Cuda,
}

impl ExecutionProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionProvider::Cpu => "cpu",
            ExecutionProvider::Cuda => "cuda",
        }
    }
}

impl fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested provider. `Auto` picks CUDA when the runtime reports it usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderPreference {
    #[default]
    Auto,
    Cpu,
    Cuda,
}

impl ProviderPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderPreference::Auto => "auto",
            ProviderPreference::Cpu => "cpu",
            ProviderPreference::Cuda => "cuda",
        }
    }
}

impl fmt::Display for ProviderPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            other => Err(format!(
                "{} is not a supported execution provider. Use `auto`, `cpu` or `cuda`.",
                other
            )),
        }
    }
}
