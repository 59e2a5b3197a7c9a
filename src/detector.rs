// src/detector.rs

use crate::types::{Frame, ModelConfig, RawDetection};
use anyhow::Result;
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::{debug, info};

/// One detection capability. Adapters are invoked per frame in declaration
/// order and must not retain or mutate the frame.
pub trait Detector {
    fn name(&self) -> &str;

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>>;
}

/// YOLO-family ONNX adapter. Model-load failures are fatal at startup;
/// a failed inference on a single frame is left to the driver to handle.
pub struct OnnxDetector {
    name: String,
    session: Session,
    classes: Vec<String>,
    confidence_threshold: f32,
    iou_threshold: f32,
    input_size: usize,
}

impl OnnxDetector {
    pub fn from_config(config: &ModelConfig, iou_threshold: f32) -> Result<Self> {
        info!("Loading model '{}': {}", config.name, config.path);

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&config.path)?;

        info!("✓ Detector '{}' ready ({} classes)", config.name, config.classes.len());

        Ok(Self {
            name: config.name.clone(),
            session,
            classes: config.classes.clone(),
            confidence_threshold: config.confidence_threshold,
            iou_threshold,
            input_size: config.input_size,
        })
    }

    fn preprocess(&self, src: &[u8], src_w: usize, src_h: usize) -> (Vec<f32>, f32, f32, f32) {
        let target_size = self.input_size;

        // Scale to fit inside the square input while keeping aspect ratio
        let scale = (target_size as f32 / src_w as f32).min(target_size as f32 / src_h as f32);
        let scaled_w = (src_w as f32 * scale) as usize;
        let scaled_h = (src_h as f32 * scale) as usize;

        let pad_x = (target_size - scaled_w) as f32 / 2.0;
        let pad_y = (target_size - scaled_h) as f32 / 2.0;

        let resized = resize_bilinear(src, src_w, src_h, scaled_w, scaled_h);

        // Padded square canvas, gray background
        let mut canvas = vec![114u8; target_size * target_size * 3];
        for y in 0..scaled_h {
            for x in 0..scaled_w {
                let src_idx = (y * scaled_w + x) * 3;
                let dst_x = x + pad_x as usize;
                let dst_y = y + pad_y as usize;
                let dst_idx = (dst_y * target_size + dst_x) * 3;
                canvas[dst_idx..dst_idx + 3].copy_from_slice(&resized[src_idx..src_idx + 3]);
            }
        }

        // Normalize [0, 255] -> [0, 1] and convert HWC -> CHW
        let mut input = vec![0.0f32; 3 * target_size * target_size];
        for c in 0..3 {
            for h in 0..target_size {
                for w in 0..target_size {
                    let hwc_idx = (h * target_size + w) * 3 + c;
                    let chw_idx = c * target_size * target_size + h * target_size + w;
                    input[chw_idx] = canvas[hwc_idx] as f32 / 255.0;
                }
            }
        }

        (input, scale, pad_x, pad_y)
    }

    fn infer(&mut self, input: Vec<f32>) -> Result<Vec<f32>> {
        let shape = [1, 3, self.input_size, self.input_size];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let output = &outputs[0];
        let (_, data) = output.try_extract_tensor::<f32>()?;

        Ok(data.to_vec())
    }

    fn postprocess(
        &self,
        output: &[f32],
        scale: f32,
        pad_x: f32,
        pad_y: f32,
    ) -> Vec<RawDetection> {
        let num_classes = self.classes.len();
        // Output layout: [1, 4 + num_classes, num_preds], channel-major
        let num_preds = output.len() / (4 + num_classes);

        let mut detections = Vec::new();

        for i in 0..num_preds {
            let cx = output[i];
            let cy = output[num_preds + i];
            let w = output[num_preds * 2 + i];
            let h = output[num_preds * 3 + i];

            let mut max_conf = 0.0f32;
            let mut best_class = 0;
            for c in 0..num_classes {
                let conf = output[num_preds * (4 + c) + i];
                if conf > max_conf {
                    max_conf = conf;
                    best_class = c;
                }
            }

            if max_conf < self.confidence_threshold {
                continue;
            }

            // Center format -> corner format, then reverse the letterbox
            let x1 = (cx - w / 2.0 - pad_x) / scale;
            let y1 = (cy - h / 2.0 - pad_y) / scale;
            let x2 = (cx + w / 2.0 - pad_x) / scale;
            let y2 = (cy + h / 2.0 - pad_y) / scale;

            detections.push(RawDetection {
                class_label: self.classes[best_class].clone(),
                confidence: max_conf,
                bbox: [x1, y1, x2, y2],
            });
        }

        nms(detections, self.iou_threshold)
    }
}

impl Detector for OnnxDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        let (input, scale, pad_x, pad_y) = self.preprocess(&frame.data, frame.width, frame.height);
        let output = self.infer(input)?;
        let detections = self.postprocess(&output, scale, pad_x, pad_y);

        debug!("'{}' detected {} objects", self.name, detections.len());
        Ok(detections)
    }
}

fn resize_bilinear(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];
    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sy = dy as f32 * y_ratio;
            let sx0 = sx.floor() as usize;
            let sy0 = sy.floor() as usize;
            let sx1 = (sx0 + 1).min(src_w - 1);
            let sy1 = (sy0 + 1).min(src_h - 1);
            let fx = sx - sx0 as f32;
            let fy = sy - sy0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;

                let val = p00 * (1.0 - fx) * (1.0 - fy)
                    + p10 * fx * (1.0 - fy)
                    + p01 * (1.0 - fx) * fy
                    + p11 * fx * fy;

                dst[(dy * dst_w + dx) * 3 + c] = val.round() as u8;
            }
        }
    }
    dst
}

fn nms(mut detections: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    if detections.is_empty() {
        return detections;
    }

    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();

    while !detections.is_empty() {
        let current = detections.remove(0);
        detections.retain(|det| calculate_iou(&current.bbox, &det.bbox) < iou_threshold);
        keep.push(current);
    }

    keep
}

fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str, conf: f32, bbox: [f32; 4]) -> RawDetection {
        RawDetection {
            class_label: label.to_string(),
            confidence: conf,
            bbox,
        }
    }

    #[test]
    fn test_nms_drops_overlapping_lower_confidence_box() {
        let detections = vec![
            det("no_helmet", 0.9, [10.0, 10.0, 50.0, 50.0]),
            det("no_helmet", 0.6, [12.0, 12.0, 52.0, 52.0]),
            det("no_helmet", 0.8, [200.0, 200.0, 240.0, 240.0]),
        ];

        let kept = nms(detections, 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.8);
    }

    #[test]
    fn test_iou_of_disjoint_boxes_is_zero() {
        let a = [0.0, 0.0, 10.0, 10.0];
        let b = [20.0, 20.0, 30.0, 30.0];
        assert_eq!(calculate_iou(&a, &b), 0.0);
    }

    #[test]
    fn test_iou_of_identical_boxes_is_one() {
        let a = [5.0, 5.0, 15.0, 25.0];
        assert!((calculate_iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_resize_preserves_solid_color() {
        // 2x2 solid red image scaled up stays red
        let src = vec![255, 0, 0, 255, 0, 0, 255, 0, 0, 255, 0, 0];
        let dst = resize_bilinear(&src, 2, 2, 4, 4);
        assert_eq!(dst.len(), 4 * 4 * 3);
        for px in dst.chunks(3) {
            assert_eq!(px, &[255, 0, 0]);
        }
    }
}
