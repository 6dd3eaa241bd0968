// THEORY:
// The `detector_filter` stage asks a general-purpose object detector where the
// objects in a frame are, then decides which of those boxes count as fire.
//
// The detector has no notion of fire, so a box is never evidence on its own:
// 1.  Boxes whose class is on the excluded list (people, by default) are dropped
//     outright. Skin and warm clothing sit close to the flame hues and would
//     otherwise trigger alarms on whoever stands in front of the camera.
// 2.  Every other box is cross-checked against the fire-color mask. Only a box
//     containing at least one fire-colored pixel confirms fire.
//
// A failing detector must never take the color-motion signal down with it. Any
// error, including malformed output, is logged and turns this tick's detector
// signal off; the next tick tries again.

use crate::collaborators::{DetectionBox, Detector, InferenceRequest};
use crate::core_modules::frame::{AnnotatedFrame, BoundingBox, DETECTION_COLOR, Frame};
use crate::core_modules::segmenter::MASK_OFF;
use crate::error::DetectorError;
use image::GrayImage;
use tracing::{debug, warn};

/// What the filter decided about a single detector box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionVerdict {
    /// Box overlaps fire-colored pixels.
    Confirmed,
    /// Box class is on the excluded list.
    Excluded,
    /// Box contains no fire-colored pixel.
    NoFireColor,
    /// Box confidence is below the configured threshold.
    BelowConfidence,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDetection {
    pub detection: DetectionBox,
    pub verdict: DetectionVerdict,
}

/// Outcome of the detector stage for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectorReport {
    pub detections: Vec<ScoredDetection>,
    pub yolo_fire: bool,
    /// Set when the detector failed and this tick carries no detector signal.
    pub failure: Option<DetectorError>,
}

impl DetectorReport {
    pub fn confirmed(&self) -> impl Iterator<Item = &DetectionBox> {
        self.detections
            .iter()
            .filter(|d| d.verdict == DetectionVerdict::Confirmed)
            .map(|d| &d.detection)
    }

    /// Draws every confirmed box with its confidence label.
    pub fn annotate(&self, annotated: &mut AnnotatedFrame) {
        for detection in self.confirmed() {
            annotated.draw_box(
                detection.bbox,
                format!("Fire: {:.2}", detection.confidence),
                DETECTION_COLOR,
            );
        }
    }
}

/// Runs `detector` on `frame` and keeps the boxes confirmed by `fire_color_mask`.
pub fn filter_detections(
    detector: &mut dyn Detector,
    frame: &Frame,
    fire_color_mask: &GrayImage,
    request: &InferenceRequest,
    excluded_classes: &[usize],
) -> DetectorReport {
    let boxes = match detector.infer(frame, request).and_then(validate) {
        Ok(boxes) => boxes,
        Err(err) => {
            warn!(
                "Detector failed on frame {}; continuing with color-motion only: {}",
                frame.frame_id, err
            );
            return DetectorReport {
                failure: Some(err),
                ..DetectorReport::default()
            };
        }
    };

    let detections: Vec<ScoredDetection> = boxes
        .into_iter()
        .map(|detection| {
            let verdict = if detection.confidence < request.confidence_threshold {
                DetectionVerdict::BelowConfidence
            } else if excluded_classes.contains(&detection.class_id) {
                DetectionVerdict::Excluded
            } else if mask_overlaps(fire_color_mask, &detection.bbox) {
                DetectionVerdict::Confirmed
            } else {
                DetectionVerdict::NoFireColor
            };
            ScoredDetection { detection, verdict }
        })
        .collect();

    let yolo_fire = detections
        .iter()
        .any(|d| d.verdict == DetectionVerdict::Confirmed);

    debug!(
        "Frame {}: {} detector boxes, fire confirmed: {}",
        frame.frame_id,
        detections.len(),
        yolo_fire
    );

    DetectorReport {
        detections,
        yolo_fire,
        failure: None,
    }
}

fn validate(boxes: Vec<DetectionBox>) -> Result<Vec<DetectionBox>, DetectorError> {
    if let Some(bad) = boxes
        .iter()
        .find(|b| !b.confidence.is_finite() || !(0.0..=1.0).contains(&b.confidence))
    {
        return Err(DetectorError::Malformed(format!(
            "confidence {} for class {}",
            bad.confidence, bad.class_id
        )));
    }
    Ok(boxes)
}

/// True when any pixel of `mask` inside `bbox` is set. Parts of the box outside the mask are ignored.
pub fn mask_overlaps(mask: &GrayImage, bbox: &BoundingBox) -> bool {
    let x_end = bbox.x.saturating_add(bbox.width).min(mask.width());
    let y_end = bbox.y.saturating_add(bbox.height).min(mask.height());
    (bbox.y..y_end).any(|y| (bbox.x..x_end).any(|x| mask.get_pixel(x, y).0[0] != MASK_OFF))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::COCO_PERSON_CLASS_ID;
    use image::{Luma, RgbImage};

    struct ScriptedDetector {
        result: Result<Vec<DetectionBox>, DetectorError>,
        calls: usize,
    }

    impl Detector for ScriptedDetector {
        fn infer(
            &mut self,
            _frame: &Frame,
            _request: &InferenceRequest,
        ) -> Result<Vec<DetectionBox>, DetectorError> {
            self.calls += 1;
            self.result.clone()
        }
    }

    fn scripted(boxes: Vec<DetectionBox>) -> ScriptedDetector {
        ScriptedDetector {
            result: Ok(boxes),
            calls: 0,
        }
    }

    fn request() -> InferenceRequest {
        InferenceRequest {
            confidence_threshold: 0.3,
            inference_size: 256,
        }
    }

    /// 64x64 mask with fire color in the top-left 20x20 square.
    fn mask() -> GrayImage {
        let mut mask = GrayImage::new(64, 64);
        for y in 0..20 {
            for x in 0..20 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        mask
    }

    fn frame() -> Frame {
        Frame::new(0, RgbImage::new(64, 64))
    }

    fn detection(class_id: usize, confidence: f32, bbox: BoundingBox) -> DetectionBox {
        DetectionBox {
            class_id,
            confidence,
            bbox,
        }
    }

    #[test]
    fn box_over_fire_color_confirms_fire() {
        let mut detector = scripted(vec![detection(56, 0.8, BoundingBox::new(10, 10, 20, 20))]);
        let report = filter_detections(&mut detector, &frame(), &mask(), &request(), &[COCO_PERSON_CLASS_ID]);
        assert!(report.yolo_fire);
        assert_eq!(report.detections[0].verdict, DetectionVerdict::Confirmed);
        assert_eq!(detector.calls, 1);
    }

    #[test]
    fn excluded_class_never_confirms_fire() {
        let mut detector = scripted(vec![detection(
            COCO_PERSON_CLASS_ID,
            0.99,
            BoundingBox::new(0, 0, 20, 20),
        )]);
        let report = filter_detections(&mut detector, &frame(), &mask(), &request(), &[COCO_PERSON_CLASS_ID]);
        assert!(!report.yolo_fire);
        assert_eq!(report.detections[0].verdict, DetectionVerdict::Excluded);
    }

    #[test]
    fn excluded_list_is_configurable() {
        let boxes = vec![detection(7, 0.9, BoundingBox::new(0, 0, 10, 10))];
        let report = filter_detections(&mut scripted(boxes.clone()), &frame(), &mask(), &request(), &[7]);
        assert!(!report.yolo_fire);
        let report = filter_detections(&mut scripted(boxes), &frame(), &mask(), &request(), &[]);
        assert!(report.yolo_fire);
    }

    #[test]
    fn box_without_fire_color_is_ignored_even_when_confident() {
        let mut detector = scripted(vec![detection(2, 1.0, BoundingBox::new(30, 30, 20, 20))]);
        let report = filter_detections(&mut detector, &frame(), &mask(), &request(), &[COCO_PERSON_CLASS_ID]);
        assert!(!report.yolo_fire);
        assert_eq!(report.detections[0].verdict, DetectionVerdict::NoFireColor);
        assert_eq!(report.confirmed().count(), 0);
    }

    #[test]
    fn low_confidence_box_is_dropped() {
        let mut detector = scripted(vec![detection(2, 0.1, BoundingBox::new(0, 0, 20, 20))]);
        let report = filter_detections(&mut detector, &frame(), &mask(), &request(), &[]);
        assert!(!report.yolo_fire);
        assert_eq!(report.detections[0].verdict, DetectionVerdict::BelowConfidence);
    }

    #[test]
    fn detector_error_means_no_signal() {
        let mut detector = ScriptedDetector {
            result: Err(DetectorError::Inference("model offline".to_string())),
            calls: 0,
        };
        let report = filter_detections(&mut detector, &frame(), &mask(), &request(), &[]);
        assert!(!report.yolo_fire);
        assert!(report.detections.is_empty());
        assert!(matches!(report.failure, Some(DetectorError::Inference(_))));
    }

    #[test]
    fn malformed_output_drops_the_whole_tick() {
        let mut detector = scripted(vec![
            detection(2, 0.9, BoundingBox::new(0, 0, 20, 20)),
            detection(3, f32::NAN, BoundingBox::new(0, 0, 5, 5)),
        ]);
        let report = filter_detections(&mut detector, &frame(), &mask(), &request(), &[]);
        assert!(!report.yolo_fire);
        assert!(matches!(report.failure, Some(DetectorError::Malformed(_))));
    }

    #[test]
    fn overlap_check_clamps_to_mask() {
        let mask = mask();
        assert!(mask_overlaps(&mask, &BoundingBox::new(19, 19, 500, 500)));
        assert!(!mask_overlaps(&mask, &BoundingBox::new(100, 100, 10, 10)));
        assert!(!mask_overlaps(&mask, &BoundingBox::new(0, 0, 0, 0)));
    }

    #[test]
    fn annotate_labels_confirmed_boxes_with_confidence() {
        let mut detector = scripted(vec![
            detection(56, 0.8, BoundingBox::new(10, 10, 20, 20)),
            detection(2, 0.9, BoundingBox::new(40, 40, 10, 10)),
        ]);
        let report = filter_detections(&mut detector, &frame(), &mask(), &request(), &[]);
        let mut annotated = AnnotatedFrame::from_frame(&frame());
        report.annotate(&mut annotated);
        assert_eq!(annotated.labels().collect::<Vec<_>>(), vec!["Fire: 0.80"]);
    }
}
