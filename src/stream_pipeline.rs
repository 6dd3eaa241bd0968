// THEORY:
// The stream pipeline runs the synchronous `FirePipeline` behind a tokio worker
// so a frame producer (a capture callback, a decoder task) never blocks on the
// per-frame work. It is the producer-callback shape of the engine.
//
// Key principles:
// 1.  **One Worker, Ordered Ticks**: a single task owns the pipeline. Frames are
//     queued on a bounded mpsc channel and processed strictly in arrival order,
//     so the debouncer always sees a consistent stream.
// 2.  **Blocking Work Off the Runtime**: each tick moves the pipeline into
//     `spawn_blocking` and takes it back afterwards.
// 3.  **Config Between Ticks**: a replacement config travels over a watch
//     channel and is applied before the next frame, never in the middle of one.
// 4.  **Fan-out**: every report goes out on a broadcast bus; the alert snapshot
//     is readable at any time through an `AlertReader`.

use crate::alert_cell::AlertReader;
use crate::collaborators::FrameSource;
use crate::config::FireConfig;
use crate::core_modules::frame::Frame;
use crate::error::FireError;
use crate::pipeline::{FirePipeline, FrameReport};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const FRAME_QUEUE_SIZE: usize = 8;
const REPORT_BUS_CAPACITY: usize = 32;

pub struct StreamPipeline {
    frame_sender: mpsc::Sender<Frame>,
    config_sender: watch::Sender<FireConfig>,
    report_sender: broadcast::Sender<Arc<FrameReport>>,
    alert_reader: AlertReader,
    worker: JoinHandle<Result<FirePipeline, FireError>>,
}

impl StreamPipeline {
    /// Moves `pipeline` onto a worker task. Must be called inside a tokio runtime.
    pub fn spawn(pipeline: FirePipeline) -> Self {
        let (frame_sender, frame_receiver) = mpsc::channel(FRAME_QUEUE_SIZE);
        let (config_sender, config_receiver) = watch::channel(pipeline.config().clone());
        let (report_sender, _) = broadcast::channel(REPORT_BUS_CAPACITY);
        let alert_reader = pipeline.subscribe();

        let worker = tokio::spawn(run_worker(
            pipeline,
            frame_receiver,
            config_receiver,
            report_sender.clone(),
        ));

        Self {
            frame_sender,
            config_sender,
            report_sender,
            alert_reader,
            worker,
        }
    }

    /// Queues a frame, waiting while the queue is full.
    pub async fn submit(&self, frame: Frame) -> Result<(), FireError> {
        self.frame_sender
            .send(frame)
            .await
            .map_err(|_| FireError::StreamClosed)
    }

    /// Feeds every frame from `frames` until it ends. Returns how many were queued.
    pub async fn run_stream<S>(&self, frames: S) -> Result<usize, FireError>
    where
        S: Stream<Item = Frame>,
    {
        let mut frames = std::pin::pin!(frames);
        let mut submitted = 0usize;
        while let Some(frame) = frames.next().await {
            self.submit(frame).await?;
            submitted += 1;
        }
        debug!("Frame stream ended after {} frames", submitted);
        Ok(submitted)
    }

    /// Feeds `source` until it is exhausted, fails or `max_frames` frames were
    /// queued, then shuts the worker down. Frames queued before a source failure
    /// are still processed and broadcast; the failure is returned afterwards.
    pub async fn drain_source<S>(
        self,
        source: &mut S,
        max_frames: Option<usize>,
    ) -> Result<(usize, FirePipeline), FireError>
    where
        S: FrameSource + ?Sized,
    {
        let mut submitted = 0usize;
        let fed = async {
            while max_frames.is_none_or(|limit| submitted < limit) {
                let Some(frame) = source.next_frame()? else {
                    break;
                };
                self.submit(frame).await?;
                submitted += 1;
            }
            Ok::<(), FireError>(())
        }
        .await;

        let pipeline = self.shutdown().await?;
        fed?;
        Ok((submitted, pipeline))
    }

    /// Validates `config` and hands it to the worker for the next tick.
    pub fn reconfigure(&self, config: FireConfig) -> Result<(), FireError> {
        config.validate()?;
        self.config_sender.send_replace(config);
        Ok(())
    }

    pub fn subscribe_reports(&self) -> broadcast::Receiver<Arc<FrameReport>> {
        self.report_sender.subscribe()
    }

    pub fn alert_reader(&self) -> AlertReader {
        self.alert_reader.clone()
    }

    /// Closes the frame queue, drains what is left and returns the pipeline.
    pub async fn shutdown(self) -> Result<FirePipeline, FireError> {
        drop(self.frame_sender);
        match self.worker.await {
            Ok(result) => result,
            Err(err) => {
                error!("Stream worker panicked: {}", err);
                Err(FireError::StreamClosed)
            }
        }
    }
}

async fn run_worker(
    mut pipeline: FirePipeline,
    mut frames: mpsc::Receiver<Frame>,
    mut config: watch::Receiver<FireConfig>,
    reports: broadcast::Sender<Arc<FrameReport>>,
) -> Result<FirePipeline, FireError> {
    info!("Stream worker started");
    while let Some(frame) = frames.recv().await {
        if config.has_changed().unwrap_or(false) {
            let replacement = config.borrow_and_update().clone();
            if let Err(err) = pipeline.reconfigure(replacement) {
                warn!("Ignoring replacement config: {}", err);
            }
        }

        let (returned, report) = tokio::task::spawn_blocking(move || {
            let report = pipeline.process_frame(frame);
            (pipeline, report)
        })
        .await
        .map_err(|err| {
            error!("Frame tick aborted: {}", err);
            FireError::StreamClosed
        })?;
        pipeline = returned;

        // No subscribers is fine; the alert cell still has the state.
        let _ = reports.send(Arc::new(report));
    }
    info!("Stream worker stopped");
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{LogNotifier, NoDetector};
    use crate::core_modules::debouncer::{AlertState, AlertTransition};
    use image::{Rgb, RgbImage};

    fn flame_image(offset: u32) -> RgbImage {
        let mut image = RgbImage::new(96, 96);
        for y in 20..60 {
            for x in (10 + offset)..(30 + offset) {
                image.put_pixel(x, y, Rgb([255, 128, 0]));
            }
        }
        image
    }

    fn pipeline(fire: u32, clear: u32) -> FirePipeline {
        let mut config = FireConfig::default();
        config.fire_debounce_frames = fire;
        config.clear_debounce_frames = clear;
        FirePipeline::new(config, Box::new(NoDetector), Box::new(LogNotifier)).unwrap()
    }

    #[tokio::test]
    async fn reports_arrive_in_order() {
        let stream = StreamPipeline::spawn(pipeline(3, 20));
        let mut reports = stream.subscribe_reports();

        for id in 0..3 {
            stream.submit(Frame::new(id, RgbImage::new(32, 32))).await.unwrap();
        }
        for id in 0..3 {
            let report = reports.recv().await.unwrap();
            assert_eq!(report.frame_id(), id);
            assert!(!report.fire_detected());
        }
        stream.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn moving_flame_raises_alert() {
        let stream = StreamPipeline::spawn(pipeline(2, 4));
        let mut reports = stream.subscribe_reports();
        let reader = stream.alert_reader();

        let frames = futures::stream::iter(vec![
            Frame::new(0, flame_image(0)),
            Frame::new(1, flame_image(40)),
        ]);
        assert_eq!(stream.run_stream(frames).await.unwrap(), 2);

        reports.recv().await.unwrap();
        let second = reports.recv().await.unwrap();
        assert_eq!(second.transition, Some(AlertTransition::Raised));

        let pipeline = stream.shutdown().await.unwrap();
        assert_eq!(pipeline.alert_state(), AlertState::Armed);
        assert_eq!(reader.current().alert, AlertState::Armed);
        assert_eq!(reader.current().frame_id, Some(1));
    }

    #[tokio::test]
    async fn replacement_config_applies_before_next_frame() {
        let stream = StreamPipeline::spawn(pipeline(3, 20));
        let mut reports = stream.subscribe_reports();

        let mut config = FireConfig::default();
        config.fire_debounce_frames = 1;
        config.clear_debounce_frames = 2;
        stream.reconfigure(config).unwrap();

        stream.submit(Frame::new(0, flame_image(0))).await.unwrap();
        let report = reports.recv().await.unwrap();
        assert_eq!(report.alert, AlertState::Armed);

        let pipeline = stream.shutdown().await.unwrap();
        assert_eq!(pipeline.config().fire_debounce_frames, 1);
    }

    /// Yields its frames, then fails like an unplugged camera.
    struct FailingAfter {
        frames: crate::collaborators::MemorySource,
    }

    impl FrameSource for FailingAfter {
        fn next_frame(&mut self) -> Result<Option<Frame>, FireError> {
            match self.frames.next_frame()? {
                Some(frame) => Ok(Some(frame)),
                None => Err(FireError::SourceUnavailable("camera unplugged".to_string())),
            }
        }
    }

    #[tokio::test]
    async fn source_failure_still_delivers_queued_frames() {
        let stream = StreamPipeline::spawn(pipeline(3, 20));
        let mut reports = stream.subscribe_reports();
        let mut source = FailingAfter {
            frames: crate::collaborators::MemorySource::new(vec![
                RgbImage::new(32, 32),
                RgbImage::new(32, 32),
            ]),
        };

        let result = stream.drain_source(&mut source, None).await;
        assert!(matches!(result, Err(FireError::SourceUnavailable(_))));

        assert_eq!(reports.recv().await.unwrap().frame_id(), 0);
        assert_eq!(reports.recv().await.unwrap().frame_id(), 1);
        assert!(matches!(
            reports.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn drain_source_stops_at_frame_limit() {
        let stream = StreamPipeline::spawn(pipeline(3, 20));
        let mut source = crate::collaborators::MemorySource::new(vec![RgbImage::new(32, 32); 5]);
        let (submitted, pipeline) = stream.drain_source(&mut source, Some(3)).await.unwrap();
        assert_eq!(submitted, 3);
        assert_eq!(pipeline.snapshot().frame_id, Some(2));
    }

    #[tokio::test]
    async fn invalid_replacement_is_rejected_up_front() {
        let stream = StreamPipeline::spawn(pipeline(3, 20));
        let mut config = FireConfig::default();
        config.color_ranges.clear();
        assert!(matches!(stream.reconfigure(config), Err(FireError::Config(_))));
        stream.shutdown().await.unwrap();
    }
}
