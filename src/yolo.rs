// THEORY:
// The `yolo` module is the object-detector collaborator: a YOLOv8-style ONNX
// model run through `ort`. The model knows nothing about fire. Its job is to box
// "things" so the detector filter can check each box against the fire-color mask.
//
// The work splits into three steps, and only the middle one needs the runtime:
// 1.  **Preprocess**: stretch the frame to a square of `inference_size` pixels
//     and lay it out as a normalized 1x3xSxS planar float tensor.
// 2.  **Inference**: run the session (behind the `yolo` cargo feature).
// 3.  **Decode**: read the raw prediction grid, keep the best class per anchor
//     above the confidence threshold, map the boxes back to frame pixels as
//     corner coordinates, and drop overlapping duplicates per class.
//
// Decode accepts both the channel-major (1, 4 + classes, anchors) layout YOLOv8
// exports by default and the transposed (1, anchors, 4 + classes) layout.

use crate::collaborators::{DetectionBox, InferenceRequest};
use crate::core_modules::frame::{BoundingBox, Frame};
use crate::error::DetectorError;
use image::imageops::{self, FilterType};

/// Boxes of the same class overlapping more than this are duplicates.
pub const NMS_IOU_THRESHOLD: f32 = 0.7;

/// Upper bound on boxes reported per frame.
pub const MAX_DETECTIONS: usize = 300;

/// Number of box coordinates (cx, cy, w, h) ahead of the class scores.
const BOX_ATTRIBUTES: usize = 4;

/// Resizes `frame` to `size` x `size` and returns it as planar RGB floats in [0, 1].
pub fn preprocess(frame: &Frame, size: u32) -> Vec<f32> {
    let resized = imageops::resize(frame.image.as_ref(), size, size, FilterType::Triangle);
    let plane = (size as usize) * (size as usize);
    let mut tensor = vec![0.0f32; 3 * plane];
    for (i, pixel) in resized.pixels().enumerate() {
        for channel in 0..3 {
            tensor[channel * plane + i] = pixel.0[channel] as f32 / 255.0;
        }
    }
    tensor
}

/// A decoded box before it is snapped to frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
struct RawBox {
    class_id: usize,
    confidence: f32,
    corners: [f32; 4],
}

/// Decodes a raw prediction tensor into frame-space detections.
pub fn decode_predictions(
    shape: &[usize],
    data: &[f32],
    request: &InferenceRequest,
    frame_size: (u32, u32),
) -> Result<Vec<DetectionBox>, DetectorError> {
    let [batch, a, b] = shape else {
        return Err(DetectorError::Malformed(format!(
            "expected a 3-d prediction tensor, got shape {:?}",
            shape
        )));
    };
    if *batch != 1 || a * b != data.len() {
        return Err(DetectorError::Malformed(format!(
            "prediction shape {:?} does not match {} values",
            shape,
            data.len()
        )));
    }

    let channel_major = a <= b;
    let (attributes, anchors) = if channel_major { (*a, *b) } else { (*b, *a) };
    if attributes <= BOX_ATTRIBUTES {
        return Err(DetectorError::Malformed(format!(
            "prediction rows carry {} values, no class scores",
            attributes
        )));
    }
    let value = |attribute: usize, anchor: usize| {
        if channel_major {
            data[attribute * anchors + anchor]
        } else {
            data[anchor * attributes + attribute]
        }
    };

    let (frame_width, frame_height) = frame_size;
    let size = request.inference_size.max(1) as f32;
    let scale_x = frame_width as f32 / size;
    let scale_y = frame_height as f32 / size;

    let mut raw = Vec::new();
    for anchor in 0..anchors {
        let Some((class_id, confidence)) = (BOX_ATTRIBUTES..attributes)
            .map(|attribute| (attribute - BOX_ATTRIBUTES, value(attribute, anchor)))
            .filter(|(_, score)| score.is_finite())
            .max_by(|x, y| x.1.total_cmp(&y.1))
        else {
            continue;
        };
        if confidence < request.confidence_threshold {
            continue;
        }

        let (cx, cy) = (value(0, anchor), value(1, anchor));
        let (w, h) = (value(2, anchor), value(3, anchor));
        raw.push(RawBox {
            class_id,
            confidence,
            corners: [
                (cx - w / 2.0) * scale_x,
                (cy - h / 2.0) * scale_y,
                (cx + w / 2.0) * scale_x,
                (cy + h / 2.0) * scale_y,
            ],
        });
    }

    Ok(non_max_suppression(raw, NMS_IOU_THRESHOLD)
        .into_iter()
        .take(MAX_DETECTIONS)
        .filter_map(|r| {
            let [x1, y1, x2, y2] = r.corners;
            BoundingBox::from_corners(x1, y1, x2, y2, frame_width, frame_height).map(|bbox| {
                DetectionBox {
                    class_id: r.class_id,
                    confidence: r.confidence,
                    bbox,
                }
            })
        })
        .collect())
}

/// Greedy per-class suppression, highest confidence first.
fn non_max_suppression(mut boxes: Vec<RawBox>, iou_threshold: f32) -> Vec<RawBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<RawBox> = Vec::new();
    for candidate in boxes {
        let duplicate = kept.iter().any(|k| {
            k.class_id == candidate.class_id && iou(&k.corners, &candidate.corners) > iou_threshold
        });
        if !duplicate {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let width = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let height = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let intersection = width * height;
    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - intersection;
    if union <= 0.0 { 0.0 } else { intersection / union }
}

#[cfg(feature = "yolo")]
pub use onnx::YoloDetector;

#[cfg(feature = "yolo")]
mod onnx {
    use super::*;
    use crate::collaborators::Detector;
    use crate::error::FireError;
    use ort::session::Session;
    use ort::value::Tensor;
    use std::path::Path;
    use tracing::{debug, info};

    /// YOLOv8 ONNX model on the CPU.
    ///
    /// Exported models with a fixed input size only accept that size; set
    /// `inference_size` to match or export with dynamic axes.
    pub struct YoloDetector {
        session: Session,
        input_name: String,
    }

    impl YoloDetector {
        pub fn load(model_path: &Path) -> Result<Self, FireError> {
            let session = Session::builder()
                .and_then(|builder| builder.commit_from_file(model_path))
                .map_err(|e| {
                    FireError::Detector(format!(
                        "Failed to load YOLO model {}: {}",
                        model_path.display(),
                        e
                    ))
                })?;
            let input_name = session
                .inputs
                .first()
                .map(|input| input.name.clone())
                .unwrap_or_else(|| "images".to_string());
            info!("YOLO model loaded from {}", model_path.display());
            Ok(Self {
                session,
                input_name,
            })
        }
    }

    impl Detector for YoloDetector {
        fn infer(
            &mut self,
            frame: &Frame,
            request: &InferenceRequest,
        ) -> Result<Vec<DetectionBox>, DetectorError> {
            let size = request.inference_size as usize;
            let input = Tensor::from_array(([1usize, 3, size, size], preprocess(frame, request.inference_size)))
                .map_err(|e| DetectorError::Inference(format!("input tensor: {}", e)))?;

            let outputs = self
                .session
                .run(ort::inputs![self.input_name.as_str() => input])
                .map_err(|e| DetectorError::Inference(e.to_string()))?;
            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::Malformed(e.to_string()))?;
            let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
            debug!("YOLO output shape {:?} for frame {}", dims, frame.frame_id);

            decode_predictions(&dims, data, request, frame.dimensions())
        }
    }
}
