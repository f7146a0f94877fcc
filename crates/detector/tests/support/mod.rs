#![allow(dead_code)]

use detector::{
    DetectionError, EngineHealth, ExecutionProvider, InferenceBackend, InferenceEngine,
    InferenceOutput, LabelMap, ModelEngine, ModelFamily, NormalizedImage, RawDetection, Threshold,
};
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use ndarray::{Array, IxDyn};
use std::io::Cursor;
use std::sync::Arc;

pub const INPUT_SIZE: (u32, u32) = (64, 64);
const NUM_CLASSES: usize = 92; // COCO-91 plus the trailing no-object slot

/// (class id, logit) per query. Against 91 zero logits the softmax scores
/// are roughly 0.996 (person), 0.620 (dog) and 0.375 (bottle).
pub const STUB_QUERIES: [(usize, f32, [f32; 4]); 3] = [
    (1, 10.0, [0.50, 0.50, 0.40, 0.60]),
    (18, 5.0, [0.25, 0.30, 0.20, 0.20]),
    (44, 4.0, [0.80, 0.75, 0.30, 0.40]),
];

/// Deterministic DETR-shaped backend that ignores pixel values.
pub struct StubBackend;

impl InferenceBackend for StubBackend {
    fn infer(&mut self, _images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        let q = STUB_QUERIES.len();
        let mut boxes = Vec::with_capacity(q * 4);
        let mut logits = vec![0.0f32; q * NUM_CLASSES];

        for (i, (class_id, logit, bbox)) in STUB_QUERIES.iter().enumerate() {
            boxes.extend_from_slice(bbox);
            logits[i * NUM_CLASSES + class_id] = *logit;
        }

        Ok(InferenceOutput {
            boxes: Array::from_shape_vec(IxDyn(&[1, q, 4]), boxes)?,
            logits: Array::from_shape_vec(IxDyn(&[1, q, NUM_CLASSES]), logits)?,
        })
    }

    fn provider(&self) -> ExecutionProvider {
        ExecutionProvider::Cpu
    }
}

pub struct FailingBackend;

impl InferenceBackend for FailingBackend {
    fn infer(&mut self, _images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        anyhow::bail!("unsupported input shape")
    }

    fn provider(&self) -> ExecutionProvider {
        ExecutionProvider::Cuda
    }
}

pub fn stub_engine() -> Arc<ModelEngine<StubBackend>> {
    Arc::new(ModelEngine::new(
        StubBackend,
        LabelMap::coco(),
        ModelFamily::Detr,
        INPUT_SIZE,
    ))
}

pub fn failing_engine() -> Arc<ModelEngine<FailingBackend>> {
    Arc::new(ModelEngine::new(
        FailingBackend,
        LabelMap::coco(),
        ModelFamily::Detr,
        INPUT_SIZE,
    ))
}

pub fn unavailable_engine() -> Arc<ModelEngine<StubBackend>> {
    Arc::new(ModelEngine::unavailable(
        "failed to load model from models/missing.onnx",
        LabelMap::coco(),
        "cuda",
    ))
}

/// Panics for images of a given width, otherwise reports one detection.
pub struct PanickingEngine {
    pub panic_on_width: u32,
}

impl InferenceEngine for PanickingEngine {
    fn infer(
        &self,
        image: &NormalizedImage,
        _threshold: Threshold,
    ) -> Result<Vec<RawDetection>, DetectionError> {
        if image.width() == self.panic_on_width {
            panic!("backend crashed on {}px wide image", image.width());
        }
        Ok(vec![RawDetection {
            class_id: 1,
            score: 0.9,
            x1: 0.0,
            y1: 0.0,
            x2: image.width() as f32,
            y2: image.height() as f32,
        }])
    }

    fn label(&self, class_id: u32) -> String {
        format!("class_{}", class_id)
    }

    fn health(&self) -> EngineHealth {
        EngineHealth {
            model_loaded: true,
            backend: "cpu".to_string(),
        }
    }
}

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, format)
        .expect("in-memory encoding cannot fail");
    buf.into_inner()
}

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8])
    })
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Jpeg)
}

pub fn gray_jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(
        DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([128]))),
        ImageFormat::Jpeg,
    )
}
