pub mod config;
pub mod cpu;

use ndarray::{Array, IxDyn};

pub use config::DEFAULT_INPUT_SIZE;
pub use cpu::CpuPreProcessor;

/// Result of preprocessing including transformation parameters
#[derive(Debug)]
pub struct PreprocessResult {
    /// NCHW tensor ready for host-side inference
    pub data: Array<f32, IxDyn>,
    /// Scale factor applied during letterboxing
    pub scale: f32,
    /// X offset from letterboxing (in pixels)
    pub offset_x: f32,
    /// Y offset from letterboxing (in pixels)
    pub offset_y: f32,
}

/// Trait for image preprocessing implementations
pub trait Preprocess {
    /// Preprocess an image for inference
    ///
    /// # Arguments
    /// * `pixels` - RGB pixel data in HWC format
    /// * `width` - Image width
    /// * `height` - Image height
    ///
    /// # Returns
    /// Preprocessed result with transformation parameters
    fn preprocess(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<PreprocessResult>;

    /// Get the input size this preprocessor targets
    fn input_size(&self) -> (u32, u32);
}
