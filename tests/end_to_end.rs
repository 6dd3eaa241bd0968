use ember_vision::core_modules::detector_filter::DetectionVerdict;
use ember_vision::{
    AlertState, AlertTransition, AnnotatedFrame, BoundingBox, DetectionBox, Detector,
    DetectorError, FireConfig, FirePipeline, Frame, InferenceRequest, LogNotifier, NoDetector,
    Notifier, NotifyError, NotifyOutcome,
};
use image::{Rgb, RgbImage};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const WIDTH: u32 = 128;
const HEIGHT: u32 = 96;

fn blank() -> RgbImage {
    RgbImage::new(WIDTH, HEIGHT)
}

/// A 20x40 orange flame whose left edge sits at `x`.
fn flame_at(x: u32) -> RgbImage {
    let mut image = blank();
    for py in 30..70 {
        for px in x..x + 20 {
            image.put_pixel(px, py, Rgb([255, 100, 0]));
        }
    }
    image
}

/// Flickering flame: alternates position so every fire tick carries motion.
fn flicker(tick: usize) -> RgbImage {
    if tick % 2 == 0 { flame_at(10) } else { flame_at(70) }
}

#[derive(Clone, Default)]
struct RecordingNotifier {
    frames: Arc<Mutex<Vec<u64>>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, frame: &AnnotatedFrame) -> Result<(), NotifyError> {
        self.frames.lock().unwrap().push(frame.frame_id);
        Ok(())
    }
}

fn config(fire: u32, clear: u32) -> FireConfig {
    FireConfig {
        fire_debounce_frames: fire,
        clear_debounce_frames: clear,
        ..FireConfig::default()
    }
}

#[test]
fn ten_tick_scenario_latches_and_holds() {
    let mut pipeline =
        FirePipeline::new(config(5, 20), Box::new(NoDetector), Box::new(LogNotifier)).unwrap();

    let ticks: Vec<RgbImage> = (0..10)
        .map(|tick| if (2..7).contains(&tick) { flicker(tick) } else { blank() })
        .collect();

    let mut decisions = Vec::new();
    let mut states = Vec::new();
    let mut transitions = Vec::new();
    for (id, image) in ticks.into_iter().enumerate() {
        let report = pipeline.process_frame(Frame::new(id as u64, image));
        decisions.push(report.fire_detected());
        states.push(report.alert);
        if let Some(t) = report.transition {
            transitions.push((id, t));
        }
    }

    assert_eq!(
        decisions,
        vec![false, false, true, true, true, true, true, false, false, false]
    );
    use AlertState::*;
    assert_eq!(states, vec![Off, Off, Off, Off, Off, Off, Armed, Armed, Armed, Armed]);
    assert_eq!(transitions, vec![(6, AlertTransition::Raised)]);
}

#[test]
fn alert_clears_after_long_quiet_stretch() {
    let mut pipeline =
        FirePipeline::new(config(2, 4), Box::new(NoDetector), Box::new(LogNotifier)).unwrap();

    let mut id = 0u64;
    let mut tick = |pipeline: &mut FirePipeline, image: RgbImage| {
        let report = pipeline.process_frame(Frame::new(id, image));
        id += 1;
        report
    };

    tick(&mut pipeline, flicker(0));
    assert_eq!(tick(&mut pipeline, flicker(1)).alert, AlertState::Armed);
    for _ in 0..3 {
        assert_eq!(tick(&mut pipeline, blank()).alert, AlertState::Armed);
    }
    let cleared = tick(&mut pipeline, blank());
    assert_eq!(cleared.alert, AlertState::Off);
    assert_eq!(cleared.transition, Some(AlertTransition::Cleared));
}

#[test]
fn notifications_follow_cooldown_not_debounce() {
    let notifier = RecordingNotifier::default();
    let sent = notifier.frames.clone();
    let mut pipeline =
        FirePipeline::new(config(3, 20), Box::new(NoDetector), Box::new(notifier)).unwrap();

    let start = Instant::now();
    let mut outcomes = Vec::new();
    for tick in 0..4usize {
        let at = start + Duration::from_secs(tick as u64 * 5);
        let report = pipeline.process_frame_at(Frame::new(tick as u64, flicker(tick)), at);
        outcomes.push(report.notification);
    }

    // The first positive tick notifies even though the alert is not armed yet.
    assert_eq!(outcomes[0], Some(NotifyOutcome::Sent));
    assert!(matches!(outcomes[1], Some(NotifyOutcome::CoolingDown { .. })));
    assert_eq!(*sent.lock().unwrap(), vec![0]);

    let late = start + Duration::from_secs(45);
    let report = pipeline.process_frame_at(Frame::new(4, flicker(4)), late);
    assert!(report.notified());
    assert_eq!(*sent.lock().unwrap(), vec![0, 4]);
}

/// Detector that reports a fixed set of boxes on every call.
struct StaticDetector(Vec<DetectionBox>);

impl Detector for StaticDetector {
    fn infer(
        &mut self,
        _frame: &Frame,
        _request: &InferenceRequest,
    ) -> Result<Vec<DetectionBox>, DetectorError> {
        Ok(self.0.clone())
    }
}

#[test]
fn detector_signal_needs_fire_color_and_no_person() {
    let flame_box = BoundingBox::new(60, 20, 40, 60);
    let detector = StaticDetector(vec![
        DetectionBox {
            class_id: 0,
            confidence: 0.95,
            bbox: flame_box,
        },
        DetectionBox {
            class_id: 56,
            confidence: 0.9,
            bbox: BoundingBox::new(0, 0, 8, 8),
        },
        DetectionBox {
            class_id: 56,
            confidence: 0.1,
            bbox: flame_box,
        },
    ]);
    let mut pipeline =
        FirePipeline::new(FireConfig::default(), Box::new(detector), Box::new(LogNotifier))
            .unwrap();

    // Same static flame twice: the second frame has no motion, so only the detector could fire.
    pipeline.process_frame(Frame::new(0, flame_at(70)));
    let report = pipeline.process_frame(Frame::new(1, flame_at(70)));

    assert!(!report.analysis.color_motion_fire);
    assert!(!report.analysis.yolo_fire);
    assert!(!report.fire_detected());
    let verdicts: Vec<DetectionVerdict> = report
        .analysis
        .detections
        .detections
        .iter()
        .map(|d| d.verdict)
        .collect();
    assert!(verdicts.contains(&DetectionVerdict::Excluded));
    assert!(verdicts.contains(&DetectionVerdict::NoFireColor));
}

#[test]
fn status_border_matches_decision() {
    let mut pipeline =
        FirePipeline::new(FireConfig::default(), Box::new(NoDetector), Box::new(LogNotifier))
            .unwrap();

    let fire = pipeline.analyze_image(flame_at(40));
    assert_eq!(fire.annotated.status.as_ref().unwrap().label, "Fire Detected!");
    assert_eq!(*fire.annotated.image.get_pixel(0, 0), Rgb([255, 0, 0]));
    assert!(fire.annotated.labels().any(|l| l == "Fire (Color+Motion)"));

    let clear = pipeline.analyze_image(blank());
    assert_eq!(clear.annotated.status.as_ref().unwrap().label, "No Fire");
    assert_eq!(*clear.annotated.image.get_pixel(0, 0), Rgb([0, 255, 0]));
}
