// THEORY:
// This file is the main entry point for the `ember_vision` library crate. It
// exports the `FirePipeline` and its associated data structures (`FireConfig`,
// `FrameReport`, `AlertSnapshot`, etc.) as the high-level interface for the fire
// engine. The per-frame stages live in `core_modules`; callers normally only
// touch them through the reports the pipeline hands back.
//
// The `yolo` module decodes YOLOv8 predictions; with the `yolo` feature it also
// provides an ONNX-backed `Detector`.
//
// Two drivers sit on top of the same pipeline: a synchronous poll loop in
// `pipeline` and an async worker in `stream_pipeline` that feeds reports to any
// number of presentation subscribers.

pub mod alert_cell;
pub mod collaborators;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod stream_pipeline;
pub mod yolo;

pub use alert_cell::{AlertReader, AlertSnapshot};
pub use collaborators::{
    Alarm, AlarmOutcome, CommandAlarm, DetectionBox, Detector, FrameSource, ImageDirSource,
    InferenceRequest, LogAlarm, LogNotifier, MemorySource, NoDetector, Notifier,
    SnapshotNotifier,
};
pub use config::{ColorRange, FireConfig};
pub use core_modules::debouncer::{AlertState, AlertTransition, DebouncePhase};
pub use core_modules::frame::{AnnotatedFrame, BoundingBox, Frame};
pub use core_modules::notifier_gate::NotifyOutcome;
pub use error::{DetectorError, FireError, NotifyError};
pub use pipeline::{FirePipeline, FrameAnalysis, FrameReport, run_poll_loop};
pub use stream_pipeline::StreamPipeline;

#[cfg(feature = "yolo")]
pub use yolo::YoloDetector;
