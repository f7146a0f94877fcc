use crate::config::DEFAULT_INPUT_SIZE;
use crate::{Preprocess, PreprocessResult};
use common::span;
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use ndarray::{Array, IxDyn};

const LETTERBOX_COLOR: u8 = 114;
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Letterboxing preprocessor that reuses its output buffer between calls.
pub struct CpuPreProcessor {
    pub input_size: (u32, u32),
    resizer: Resizer,
    letterboxed_buffer: Vec<u8>,
}

impl CpuPreProcessor {
    pub fn new(input_size: (u32, u32)) -> Self {
        Self {
            input_size,
            resizer: Resizer::new(),
            letterboxed_buffer: vec![LETTERBOX_COLOR; (input_size.0 * input_size.1 * 3) as usize],
        }
    }

    pub fn preprocess_rgb(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<(Array<f32, IxDyn>, f32, f32, f32)> {
        let _s = span!("preprocess_rgb");

        tracing::trace!(
            width,
            height,
            pixel_bytes = pixels.len(),
            "Preprocessing image dimensions"
        );

        if width == 0 || height == 0 {
            anyhow::bail!("Cannot preprocess an empty {}x{} image", width, height);
        }

        let expected_size = (width as usize) * (height as usize) * 3;
        if pixels.len() != expected_size {
            anyhow::bail!(
                "Buffer size mismatch: expected {}, got {} bytes",
                expected_size,
                pixels.len()
            );
        }

        let (scale, offset_x, offset_y, resized) =
            self.resize_and_letterbox(pixels, width, height)?;

        let input = Self::normalize(&resized)?;

        Ok((input, scale, offset_x, offset_y))
    }

    fn resize_and_letterbox(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<(f32, f32, f32, Image<'_>)> {
        let _s = span!("resize_and_letterbox");

        let (input_width, input_height) = self.input_size;
        if input_width == 0 || input_height == 0 {
            anyhow::bail!(
                "Model input size {}x{} has a zero dimension",
                input_width,
                input_height
            );
        }

        let scale = (input_width as f32 / width as f32).min(input_height as f32 / height as f32);
        // Very thin images would otherwise collapse to a zero-sized axis.
        let new_width = ((width as f32 * scale) as u32).clamp(1, input_width);
        let new_height = ((height as f32 * scale) as u32).clamp(1, input_height);

        let offset_x = (input_width - new_width) / 2;
        let offset_y = (input_height - new_height) / 2;

        let src = ImageRef::new(width, height, pixels, PixelType::U8x3)?;

        let mut resized = Image::new(new_width, new_height, PixelType::U8x3);

        self.resizer.resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;

        self.letterboxed_buffer.fill(LETTERBOX_COLOR);

        let resized_data = resized.buffer();
        let stride = input_width * 3;
        let row_bytes = (new_width * 3) as usize;

        for y in 0..new_height {
            let src_row = (y * new_width * 3) as usize;
            let dst_row = ((y + offset_y) * stride + offset_x * 3) as usize;

            self.letterboxed_buffer[dst_row..dst_row + row_bytes]
                .copy_from_slice(&resized_data[src_row..src_row + row_bytes]);
        }

        let final_img = Image::from_slice_u8(
            input_width,
            input_height,
            &mut self.letterboxed_buffer,
            PixelType::U8x3,
        )?;

        Ok((scale, offset_x as f32, offset_y as f32, final_img))
    }

    fn normalize(image: &Image) -> anyhow::Result<Array<f32, IxDyn>> {
        let _s = span!("normalize");

        let width = image.width() as usize;
        let height = image.height() as usize;
        let spatial = width * height;

        let mut output = vec![0.0f32; 3 * spatial];
        let buf = image.buffer();

        for (i, px) in buf.chunks_exact(3).enumerate() {
            let r = px[0] as f32 / 255.0;
            let g = px[1] as f32 / 255.0;
            let b = px[2] as f32 / 255.0;

            output[i] = (r - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
            output[i + spatial] = (g - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
            output[i + 2 * spatial] = (b - IMAGENET_MEAN[2]) / IMAGENET_STD[2];
        }

        Ok(Array::from_shape_vec(
            IxDyn(&[1, 3, height, width]),
            output,
        )?)
    }
}

impl Default for CpuPreProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}

impl Preprocess for CpuPreProcessor {
    fn preprocess(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<PreprocessResult> {
        let (data, scale, offset_x, offset_y) = self.preprocess_rgb(pixels, width, height)?;
        Ok(PreprocessResult {
            data,
            scale,
            offset_x,
            offset_y,
        })
    }

    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }
}
