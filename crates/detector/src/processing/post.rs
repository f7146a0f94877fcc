use std::fmt;
use std::str::FromStr;

/// How a model encodes class scores in its `logits` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelFamily {
    /// Softmax over classes with a trailing "no object" logit.
    #[default]
    Detr,
    /// Independent sigmoid per class with index 0 reserved for background.
    RfDetr,
}

impl ModelFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Detr => "detr",
            ModelFamily::RfDetr => "rf-detr",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "detr" => Ok(Self::Detr),
            "rf-detr" | "rfdetr" | "rf_detr" => Ok(Self::RfDetr),
            other => Err(format!(
                "{} is not a supported model family. Use either `detr` or `rf-detr`.",
                other
            )),
        }
    }
}

pub struct TransformParams {
    pub orig_width: u32,
    pub orig_height: u32,
    pub input_width: u32,
    pub input_height: u32,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

/// One thresholded prediction with corners in original-image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub class_id: u32,
    pub score: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

pub struct PostProcessor {
    pub family: ModelFamily,
}

impl PostProcessor {
    pub fn new(family: ModelFamily) -> Self {
        Self { family }
    }

    /// Parse detections from DETR-style output.
    ///
    /// `boxes` is `[1, Q, 4]` in normalized cxcywh relative to the letterboxed
    /// input, `logits` is `[1, Q, C]`. Queries scoring below `threshold` are
    /// dropped; overlapping boxes are kept as the model produced them.
    #[tracing::instrument(skip(self, boxes, logits, transform))]
    pub fn parse_detections(
        &self,
        boxes: &ndarray::ArrayViewD<f32>,
        logits: &ndarray::ArrayViewD<f32>,
        transform: &TransformParams,
        threshold: f32,
    ) -> anyhow::Result<Vec<RawDetection>> {
        let (num_queries, num_classes) = validate_shapes(boxes.shape(), logits.shape())?;

        let mut detections = Vec::new();
        let mut probs = vec![0.0f32; num_classes];

        for i in 0..num_queries {
            let (class_id, score) = match self.family {
                ModelFamily::Detr => {
                    for (c, p) in probs.iter_mut().enumerate() {
                        *p = logits[[0, i, c]];
                    }
                    softmax_argmax(&mut probs)
                }
                ModelFamily::RfDetr => {
                    let mut max_logit = f32::NEG_INFINITY;
                    let mut class_idx = 1usize;
                    for c in 1..num_classes {
                        let logit = logits[[0, i, c]];
                        if logit > max_logit {
                            max_logit = logit;
                            class_idx = c;
                        }
                    }
                    (class_idx as u32, sigmoid(max_logit))
                }
            };

            // Written so NaN scores are rejected too.
            if !(score >= threshold) {
                continue;
            }

            let (x1_norm, y1_norm, x2_norm, y2_norm) = cxcywh_to_xyxy(
                boxes[[0, i, 0]],
                boxes[[0, i, 1]],
                boxes[[0, i, 2]],
                boxes[[0, i, 3]],
            );

            let (x1, y1) = transform.to_original(x1_norm, y1_norm);
            let (x2, y2) = transform.to_original(x2_norm, y2_norm);

            detections.push(RawDetection {
                class_id,
                score,
                x1: x1.min(x2),
                y1: y1.min(y2),
                x2: x1.max(x2),
                y2: y1.max(y2),
            });
        }

        tracing::trace!(
            queries = num_queries,
            kept = detections.len(),
            "Parsed detections"
        );

        Ok(detections)
    }
}

impl TransformParams {
    /// Maps a normalized point in letterboxed input space back to the
    /// original image, clamped to its bounds.
    fn to_original(&self, x_norm: f32, y_norm: f32) -> (f32, f32) {
        let x_input = x_norm * self.input_width as f32;
        let y_input = y_norm * self.input_height as f32;

        let x = ((x_input - self.offset_x) / self.scale)
            .max(0.0)
            .min(self.orig_width as f32);
        let y = ((y_input - self.offset_y) / self.scale)
            .max(0.0)
            .min(self.orig_height as f32);
        (x, y)
    }
}

fn validate_shapes(boxes: &[usize], logits: &[usize]) -> anyhow::Result<(usize, usize)> {
    if boxes.len() != 3 || boxes[0] != 1 || boxes[2] != 4 {
        anyhow::bail!("unsupported boxes shape {:?}, expected [1, Q, 4]", boxes);
    }
    if logits.len() != 3 || logits[0] != 1 {
        anyhow::bail!("unsupported logits shape {:?}, expected [1, Q, C]", logits);
    }
    let (num_queries, num_classes) = (boxes[1], logits[2]);
    if logits[1] != num_queries {
        anyhow::bail!(
            "query count mismatch: {} boxes but {} logit rows",
            num_queries,
            logits[1]
        );
    }
    if num_classes < 2 {
        anyhow::bail!("logits need at least two classes, got {}", num_classes);
    }
    Ok((num_queries, num_classes))
}

/// Softmax over all logits in place, then argmax over every class except the
/// trailing "no object" slot.
fn softmax_argmax(logits: &mut [f32]) -> (u32, f32) {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for v in logits.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }

    let mut best = (0u32, f32::NEG_INFINITY);
    for (c, v) in logits[..logits.len() - 1].iter().enumerate() {
        let p = v / sum;
        if p > best.1 {
            best = (c as u32, p);
        }
    }
    best
}

/// Sigmoid activation function
#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Convert bounding box from center-width-height format to corner format
#[inline]
fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
    let x1 = cx - w / 2.0;
    let y1 = cy - h / 2.0;
    let x2 = cx + w / 2.0;
    let y2 = cy + h / 2.0;
    (x1, y1, x2, y2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    /// Helper to create a TransformParams for a 512x512 model input
    fn test_transform(
        orig_width: u32,
        orig_height: u32,
        scale: f32,
        offset_x: f32,
        offset_y: f32,
    ) -> TransformParams {
        TransformParams {
            orig_width,
            orig_height,
            input_width: 512,
            input_height: 512,
            scale,
            offset_x,
            offset_y,
        }
    }

    /// Creates boxes [1, n, 4] and logits [1, n, num_classes], every logit
    /// -10.0 except the listed (class_idx, logit) per query.
    fn create_test_data(
        boxes_cxcywh: Vec<[f32; 4]>,
        class_logits: Vec<(usize, f32)>,
        num_classes: usize,
    ) -> (Array<f32, IxDyn>, Array<f32, IxDyn>) {
        let n = boxes_cxcywh.len();

        let mut boxes_data = Vec::with_capacity(n * 4);
        for box_coords in &boxes_cxcywh {
            boxes_data.extend_from_slice(box_coords);
        }
        let boxes = Array::from_shape_vec(IxDyn(&[1, n, 4]), boxes_data).unwrap();

        let mut logits_data = vec![-10.0f32; n * num_classes];
        for (i, (class_idx, logit_value)) in class_logits.iter().enumerate() {
            logits_data[i * num_classes + class_idx] = *logit_value;
        }
        let logits = Array::from_shape_vec(IxDyn(&[1, n, num_classes]), logits_data).unwrap();

        (boxes, logits)
    }

    fn rf_detr() -> PostProcessor {
        PostProcessor::new(ModelFamily::RfDetr)
    }

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[test]
    fn test_cxcywh_to_xyxy() {
        let (x1, y1, x2, y2) = cxcywh_to_xyxy(0.5, 0.5, 0.4, 0.2);
        assert!((x1 - 0.3).abs() < 1e-6);
        assert!((y1 - 0.4).abs() < 1e-6);
        assert!((x2 - 0.7).abs() < 1e-6);
        assert!((y2 - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_argmax_ignores_no_object_slot() {
        // No-object dominates, but the best real class is still reported.
        let mut logits = vec![1.0, 3.0, 0.0, 8.0];
        let (class_id, score) = softmax_argmax(&mut logits);
        assert_eq!(class_id, 1);
        assert!(score < 0.01, "Score should reflect the no-object mass");
    }

    #[test]
    fn test_model_family_parsing() {
        assert_eq!("detr".parse::<ModelFamily>().unwrap(), ModelFamily::Detr);
        assert_eq!("RF-DETR".parse::<ModelFamily>().unwrap(), ModelFamily::RfDetr);
        assert_eq!("rfdetr".parse::<ModelFamily>().unwrap(), ModelFamily::RfDetr);
        assert!("yolo".parse::<ModelFamily>().is_err());
    }

    /// Test that confidence threshold filters detections correctly
    #[test]
    fn test_confidence_threshold_filtering() {
        // sigmoid(0.62) ≈ 0.65, sigmoid(0.85) ≈ 0.7, sigmoid(1.39) ≈ 0.8
        let boxes = vec![
            [0.1, 0.1, 0.1, 0.1],
            [0.2, 0.2, 0.1, 0.1],
            [0.3, 0.3, 0.1, 0.1],
        ];
        let class_logits = vec![(1, 0.62), (2, 0.85), (3, 1.39)];
        let (boxes, logits) = create_test_data(boxes, class_logits, 91);

        let transform = test_transform(512, 512, 1.0, 0.0, 0.0);
        let detections = rf_detr()
            .parse_detections(&boxes.view(), &logits.view(), &transform, 0.69)
            .unwrap();

        assert_eq!(detections.len(), 2, "Should filter out confidence < 0.69");
        assert!(detections.iter().all(|d| d.score >= 0.69));
        assert_eq!(detections[0].class_id, 2, "Class ID should match (bicycle)");
        assert_eq!(detections[1].class_id, 3, "Class ID should match (car)");
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let (boxes, logits) = create_test_data(vec![[0.5, 0.5, 0.2, 0.2]], vec![(1, 0.0)], 4);
        let transform = test_transform(512, 512, 1.0, 0.0, 0.0);

        let kept = rf_detr()
            .parse_detections(&boxes.view(), &logits.view(), &transform, 0.5)
            .unwrap();
        assert_eq!(kept.len(), 1, "sigmoid(0) == 0.5 must pass a 0.5 threshold");
    }

    /// Test coordinate inverse transformation with known values
    #[test]
    fn test_coordinate_inverse_transformation() {
        // Original image: 800x600, input 512x512
        // Scale = min(512/800, 512/600) = 0.64, offset Y = (512-384)/2 = 64
        //
        // Box cxcywh (0.5, 0.5, 0.2, 0.2) -> xyxy (0.4, 0.4, 0.6, 0.6)
        // In 512x512 space: (204.8, 204.8, 307.2, 307.2)
        // After inverse transform: (320, 220, 480, 380)
        let (boxes, logits) = create_test_data(vec![[0.5, 0.5, 0.2, 0.2]], vec![(1, 5.0)], 91);

        let transform = test_transform(800, 600, 0.64, 0.0, 64.0);
        let detections = rf_detr()
            .parse_detections(&boxes.view(), &logits.view(), &transform, 0.5)
            .unwrap();

        assert_eq!(detections.len(), 1);
        let det = &detections[0];

        assert!((det.x1 - 320.0).abs() < 0.1, "x1 incorrect: {}", det.x1);
        assert!((det.y1 - 220.0).abs() < 0.1, "y1 incorrect: {}", det.y1);
        assert!((det.x2 - 480.0).abs() < 0.1, "x2 incorrect: {}", det.x2);
        assert!((det.y2 - 380.0).abs() < 0.1, "y2 incorrect: {}", det.y2);
    }

    /// Test that coordinates are clamped to image bounds
    #[test]
    fn test_coordinates_clamped_to_image_bounds() {
        let boxes = vec![
            [0.05, 0.05, 0.2, 0.2], // Will result in negative coords after offset
            [0.95, 0.95, 0.2, 0.2], // Will exceed bounds
            [0.5, 0.5, 0.2, 0.2],   // Normal, within bounds
        ];
        let class_logits = vec![(1, 5.0), (2, 5.0), (3, 5.0)];
        let (boxes, logits) = create_test_data(boxes, class_logits, 91);

        let transform = test_transform(400, 400, 1.0, 50.0, 50.0);
        let detections = rf_detr()
            .parse_detections(&boxes.view(), &logits.view(), &transform, 0.5)
            .unwrap();

        assert_eq!(detections.len(), 3);
        assert_eq!(detections[0].x1, 0.0, "Negative x1 should be clamped to 0");
        assert_eq!(detections[0].y1, 0.0, "Negative y1 should be clamped to 0");
        assert_eq!(detections[1].x2, 400.0, "x2 exceeding width should be clamped");
        assert_eq!(detections[1].y2, 400.0, "y2 exceeding height should be clamped");
    }

    #[test]
    fn test_negative_extent_yields_ordered_corners() {
        let (boxes, logits) = create_test_data(vec![[0.5, 0.5, -0.2, -0.1]], vec![(1, 5.0)], 4);
        let transform = test_transform(512, 512, 1.0, 0.0, 0.0);

        let detections = rf_detr()
            .parse_detections(&boxes.view(), &logits.view(), &transform, 0.5)
            .unwrap();

        let det = &detections[0];
        assert!(det.x1 <= det.x2 && det.y1 <= det.y2);
    }

    #[test]
    fn test_nan_scores_are_dropped() {
        let (boxes, logits) =
            create_test_data(vec![[0.5, 0.5, 0.2, 0.2]], vec![(1, f32::NAN)], 4);
        let transform = test_transform(512, 512, 1.0, 0.0, 0.0);

        let detections = PostProcessor::new(ModelFamily::Detr)
            .parse_detections(&boxes.view(), &logits.view(), &transform, 0.0)
            .unwrap();
        assert!(detections.is_empty());
    }

    /// Test that no detections are returned when all are below threshold
    #[test]
    fn test_zero_detections_when_all_below_threshold() {
        let boxes = vec![
            [0.1, 0.1, 0.1, 0.1],
            [0.2, 0.2, 0.1, 0.1],
            [0.3, 0.3, 0.1, 0.1],
        ];
        let class_logits = vec![(1, -2.0), (2, -1.0), (3, -0.1)];
        let (boxes, logits) = create_test_data(boxes, class_logits, 91);

        let transform = test_transform(512, 512, 1.0, 0.0, 0.0);
        let detections = rf_detr()
            .parse_detections(&boxes.view(), &logits.view(), &transform, 0.7)
            .unwrap();

        assert_eq!(detections.len(), 0);
    }

    #[test]
    fn test_rf_detr_skips_background_class() {
        // Background (index 0) has the highest logit but must never win.
        let (boxes, logits) = create_test_data(vec![[0.5, 0.5, 0.2, 0.2]], vec![(0, 9.0)], 4);
        let transform = test_transform(512, 512, 1.0, 0.0, 0.0);

        let detections = rf_detr()
            .parse_detections(&boxes.view(), &logits.view(), &transform, 0.0)
            .unwrap();
        assert_eq!(detections.len(), 1);
        assert_ne!(detections[0].class_id, 0);
    }

    #[test]
    fn test_detr_softmax_scores() {
        // 3 real classes + no-object. Query 0 is confidently class 2,
        // query 1 is confidently "no object".
        let num_classes = 4;
        let boxes = Array::from_shape_vec(
            IxDyn(&[1, 2, 4]),
            vec![0.5, 0.5, 0.2, 0.2, 0.3, 0.3, 0.1, 0.1],
        )
        .unwrap();
        let logits = Array::from_shape_vec(
            IxDyn(&[1, 2, num_classes]),
            vec![0.0, 0.0, 9.0, 0.0, 0.0, 0.0, 0.0, 9.0],
        )
        .unwrap();

        let transform = test_transform(512, 512, 1.0, 0.0, 0.0);
        let detections = PostProcessor::new(ModelFamily::Detr)
            .parse_detections(&boxes.view(), &logits.view(), &transform, 0.5)
            .unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_id, 2);
        assert!(detections[0].score > 0.99);
    }

    #[test]
    fn test_rejects_mismatched_shapes() {
        let boxes = Array::from_shape_vec(IxDyn(&[1, 2, 4]), vec![0.0; 8]).unwrap();
        let logits = Array::from_shape_vec(IxDyn(&[1, 3, 4]), vec![0.0; 12]).unwrap();
        let transform = test_transform(512, 512, 1.0, 0.0, 0.0);

        let err = rf_detr()
            .parse_detections(&boxes.view(), &logits.view(), &transform, 0.5)
            .unwrap_err();
        assert!(format!("{:#}", err).contains("mismatch"));

        let flat = Array::from_shape_vec(IxDyn(&[8]), vec![0.0; 8]).unwrap();
        assert!(
            rf_detr()
                .parse_detections(&flat.view(), &logits.view(), &transform, 0.5)
                .is_err()
        );
    }

    /// Test edge case: Empty detections (0 queries)
    #[test]
    fn test_empty_input() {
        let boxes = Array::from_shape_vec(IxDyn(&[1, 0, 4]), vec![]).unwrap();
        let logits = Array::from_shape_vec(IxDyn(&[1, 0, 91]), vec![]).unwrap();

        let transform = test_transform(512, 512, 1.0, 0.0, 0.0);
        let detections = rf_detr()
            .parse_detections(&boxes.view(), &logits.view(), &transform, 0.5)
            .unwrap();

        assert_eq!(detections.len(), 0, "Empty input should return no detections");
    }

    /// Simulates 300 queries with only 3 confident detections
    #[test]
    fn test_realistic_rf_detr_output() {
        let num_queries = 300;
        let num_classes = 91;

        let mut boxes_data = vec![0.0f32; num_queries * 4];
        boxes_data[0..4].copy_from_slice(&[0.2, 0.3, 0.2, 0.4]);
        boxes_data[4..8].copy_from_slice(&[0.5, 0.5, 0.3, 0.3]);
        boxes_data[8..12].copy_from_slice(&[0.8, 0.8, 0.3, 0.3]);
        let boxes = Array::from_shape_vec(IxDyn(&[1, num_queries, 4]), boxes_data).unwrap();

        let mut logits_data = vec![-10.0f32; num_queries * num_classes];
        logits_data[1] = 5.0; // Query 0, person
        logits_data[num_classes + 18] = 3.5; // Query 1, dog
        logits_data[2 * num_classes + 3] = 2.5; // Query 2, car
        let logits =
            Array::from_shape_vec(IxDyn(&[1, num_queries, num_classes]), logits_data).unwrap();

        let transform = test_transform(512, 512, 1.0, 0.0, 0.0);
        let detections = rf_detr()
            .parse_detections(&boxes.view(), &logits.view(), &transform, 0.7)
            .unwrap();

        assert_eq!(detections.len(), 3, "Should filter 300 queries to 3 detections");
        assert_eq!(detections[0].class_id, 1, "First detection: person");
        assert_eq!(detections[1].class_id, 18, "Second detection: dog");
        assert_eq!(detections[2].class_id, 3, "Third detection: car");
        assert!(detections[0].score > 0.99);
        assert!(detections[2].score > 0.90);
    }
}
