// THEORY:
// The `pipeline` module is the top-level API for the fire engine. It wires the
// stages into one call per frame and owns everything that must persist between
// frames: the previous frame for motion, the debouncer, the cooldown gate and
// the alert cell readers subscribe to.
//
// Stage order per tick:
// 1.  Segment the frame into the fire-color and color-motion masks.
// 2.  Extract flame candidates from the color-motion mask.
// 3.  Ask the detector, keeping only boxes confirmed by the fire-color mask.
// 4.  Fuse both signals (OR) and stamp the status.
// 5.  Debounce the decision into a stable alert state.
// 6.  Once the positive streak reaches the fire threshold, sound the alarm
//     unless it is still playing.
// 7.  On a positive decision, try to notify through the cooldown gate.
// 8.  Publish the new alert snapshot.
//
// The pipeline is fully synchronous. It suspends nowhere, so it can run inside a
// plain poll loop or be driven by the stream worker in `stream_pipeline`.

use crate::alert_cell::{AlertCell, AlertReader, AlertSnapshot};
use crate::collaborators::{
    Alarm, AlarmOutcome, Detector, FrameSource, InferenceRequest, LogAlarm, Notifier,
};
use crate::config::FireConfig;
use crate::core_modules::candidate_extractor::{CandidateReport, CandidateRules, candidate_extractor};
use crate::core_modules::debouncer::{AlertDebouncer, AlertState, AlertTransition, DebouncePhase};
use crate::core_modules::detector_filter::{DetectorReport, filter_detections};
use crate::core_modules::frame::{AnnotatedFrame, Frame};
use crate::core_modules::fuser;
use crate::core_modules::notifier_gate::{NotifierGate, NotifyOutcome};
use crate::core_modules::segmenter::Segmenter;
use crate::error::FireError;
use image::RgbImage;
use std::time::Instant;
use tracing::{debug, info};

/// The per-frame decision with everything that produced it.
#[derive(Debug, Clone)]
pub struct FrameAnalysis {
    pub frame_id: u64,
    pub fire_detected: bool,
    pub color_motion_fire: bool,
    pub yolo_fire: bool,
    pub candidates: CandidateReport,
    pub detections: DetectorReport,
    pub annotated: AnnotatedFrame,
}

/// The primary output of the pipeline for a single tick.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub analysis: FrameAnalysis,
    pub alert: AlertState,
    pub phase: DebouncePhase,
    pub transition: Option<AlertTransition>,
    /// `None` when the positive streak is below the fire threshold.
    pub alarm: Option<AlarmOutcome>,
    /// `None` when the decision was negative and no attempt was made.
    pub notification: Option<NotifyOutcome>,
}

impl FrameReport {
    pub fn frame_id(&self) -> u64 {
        self.analysis.frame_id
    }

    pub fn fire_detected(&self) -> bool {
        self.analysis.fire_detected
    }

    pub fn notified(&self) -> bool {
        self.notification
            .as_ref()
            .map(NotifyOutcome::notified)
            .unwrap_or(false)
    }
}

/// The main, top-level struct for the fire engine.
pub struct FirePipeline {
    config: FireConfig,
    segmenter: Segmenter,
    debouncer: AlertDebouncer,
    gate: NotifierGate,
    detector: Box<dyn Detector>,
    notifier: Box<dyn Notifier>,
    alarm: Box<dyn Alarm>,
    previous_frame: Option<Frame>,
    alert_cell: AlertCell,
}

impl FirePipeline {
    /// Builds a pipeline. Fails fast on an invalid configuration.
    pub fn new(
        config: FireConfig,
        detector: Box<dyn Detector>,
        notifier: Box<dyn Notifier>,
    ) -> Result<Self, FireError> {
        config.validate()?;
        Ok(Self {
            segmenter: Segmenter::new(config.color_ranges.clone(), config.motion_threshold),
            debouncer: AlertDebouncer::new(config.fire_debounce_frames, config.clear_debounce_frames),
            gate: NotifierGate::new(config.notify_cooldown()),
            detector,
            notifier,
            alarm: Box::new(LogAlarm),
            previous_frame: None,
            alert_cell: AlertCell::new(),
            config,
        })
    }

    /// Replaces the default log-only alarm.
    pub fn with_alarm(mut self, alarm: Box<dyn Alarm>) -> Self {
        self.alarm = alarm;
        self
    }

    /// Runs a full tick at the current wall-clock instant.
    pub fn process_frame(&mut self, frame: Frame) -> FrameReport {
        self.process_frame_at(frame, Instant::now())
    }

    /// Runs a full tick, using `now` for the notification cooldown.
    pub fn process_frame_at(&mut self, frame: Frame, now: Instant) -> FrameReport {
        let previous = self.previous_frame.take();
        let analysis = self.analyze(&frame, previous.as_ref());
        self.previous_frame = Some(frame);

        let outcome = self.debouncer.update(analysis.fire_detected);
        if let Some(transition) = outcome.transition {
            match transition {
                AlertTransition::Raised => info!("Fire alert raised at frame {}", analysis.frame_id),
                AlertTransition::Cleared => info!("Fire alert cleared at frame {}", analysis.frame_id),
            }
        }

        let alarm = if analysis.fire_detected && self.debouncer.fire_streak_reached() {
            Some(self.ring_alarm())
        } else {
            None
        };

        let notification = if analysis.fire_detected {
            Some(self.gate.maybe_notify(now, self.notifier.as_ref(), &analysis.annotated))
        } else {
            None
        };

        self.alert_cell.publish(AlertSnapshot {
            frame_id: Some(analysis.frame_id),
            alert: outcome.alert,
            phase: outcome.phase,
            fire_detected: analysis.fire_detected,
            last_notified: self.gate.last_notified(),
        });

        debug!(
            "Frame {}: fire={} (color-motion={}, detector={}) alert={} phase={}",
            analysis.frame_id,
            analysis.fire_detected,
            analysis.color_motion_fire,
            analysis.yolo_fire,
            outcome.alert,
            outcome.phase
        );

        FrameReport {
            analysis,
            alert: outcome.alert,
            phase: outcome.phase,
            transition: outcome.transition,
            alarm,
            notification,
        }
    }

    fn ring_alarm(&self) -> AlarmOutcome {
        if self.alarm.is_playing() {
            return AlarmOutcome::AlreadyPlaying;
        }
        self.alarm.sound();
        AlarmOutcome::Started
    }

    /// Decides a single still image with no motion reference. Debounce,
    /// cooldown and the stored previous frame are left untouched.
    pub fn analyze_image(&mut self, image: RgbImage) -> FrameAnalysis {
        let frame = Frame::new(0, image);
        self.analyze(&frame, None)
    }

    /// Per-frame decision: segmentation, candidates, detector, fusion.
    pub fn analyze(&mut self, frame: &Frame, previous: Option<&Frame>) -> FrameAnalysis {
        let segmentation = self.segmenter.segment(frame, previous);

        let candidates = candidate_extractor::extract(
            &segmentation.combined,
            &CandidateRules {
                min_area: self.config.min_candidate_area,
                aspect_ratio_bounds: self.config.aspect_ratio_bounds,
            },
        );

        let detections = filter_detections(
            self.detector.as_mut(),
            frame,
            &segmentation.fire_color,
            &InferenceRequest {
                confidence_threshold: self.config.confidence_threshold,
                inference_size: self.config.inference_size,
            },
            &self.config.excluded_classes,
        );

        let fire_detected = fuser::decide(candidates.color_motion_fire, detections.yolo_fire);

        let mut annotated = AnnotatedFrame::from_frame(frame);
        candidates.annotate(&mut annotated);
        detections.annotate(&mut annotated);
        fuser::stamp_status(&mut annotated, fire_detected);

        FrameAnalysis {
            frame_id: frame.frame_id,
            fire_detected,
            color_motion_fire: candidates.color_motion_fire,
            yolo_fire: detections.yolo_fire,
            candidates,
            detections,
            annotated,
        }
    }

    /// Swaps in a new configuration between ticks. Streak counters, the cooldown
    /// clock and the motion reference carry over.
    pub fn reconfigure(&mut self, config: FireConfig) -> Result<(), FireError> {
        config.validate()?;
        self.segmenter = Segmenter::new(config.color_ranges.clone(), config.motion_threshold);
        self.debouncer
            .set_thresholds(config.fire_debounce_frames, config.clear_debounce_frames);
        self.gate.set_cooldown(config.notify_cooldown());
        info!("Configuration replaced");
        self.config = config;
        Ok(())
    }

    pub fn config(&self) -> &FireConfig {
        &self.config
    }

    pub fn alert_state(&self) -> AlertState {
        self.debouncer.alert_state()
    }

    pub fn snapshot(&self) -> AlertSnapshot {
        self.alert_cell.current()
    }

    pub fn subscribe(&self) -> AlertReader {
        self.alert_cell.subscribe()
    }
}


/// Single-threaded poll loop: pull, decide, hand the report to `on_report`.
///
/// Stops when the source is exhausted or after `max_frames` ticks. A source
/// failure ends the loop with `SourceUnavailable`; the pipeline is not run for
/// that tick.
pub fn run_poll_loop<S, F>(
    source: &mut S,
    pipeline: &mut FirePipeline,
    max_frames: Option<usize>,
    mut on_report: F,
) -> Result<usize, FireError>
where
    S: FrameSource + ?Sized,
    F: FnMut(&FrameReport),
{
    let mut processed = 0usize;
    while max_frames.is_none_or(|limit| processed < limit) {
        let Some(frame) = source.next_frame()? else {
            break;
        };
        let report = pipeline.process_frame(frame);
        on_report(&report);
        processed += 1;
    }
    info!("Poll loop finished after {} frames", processed);
    Ok(processed)
}
