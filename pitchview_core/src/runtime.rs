//! Concurrent multi-view runtime.
//!
//! # Architecture
//!
//! ```text
//!  FrameSource ─► ViewWorker(view0) ─┐ done(snapshot)
//!  FrameSource ─► ViewWorker(view1) ─┼──────────────► fusion task
//!  FrameSource ─► ViewWorker(viewN) ─┘                    │
//!        ▲                                                 │
//!        └──────────── watch<FusionFeedback> ◄─────────────┘
//! ```
//!
//! Each round every worker reads one frame, runs segmentation and blob
//! extraction, then waits until fusion has published the feedback of the
//! previous round before tracking. The snapshot goes to fusion over a
//! one-slot channel. Fusion gathers exactly one snapshot per view, runs
//! and publishes the next feedback.
//!
//! A worker whose feed ends simply returns; its closed channel ends the
//! fusion loop, and the dropped feedback sender releases the remaining
//! workers. A feed error or a frame of the wrong size raises the stop flag
//! and fails the whole run with [`RuntimeError::WorkerAborted`]. The
//! [`StopHandle`] flag also stops everything from the outside: a worker
//! finishes the frame it is on and reads no further.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pitchview_env::{EnvError, FrameSource, Perception, ViewId};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::fusion::{FrameReport, FusionEngine};
use crate::snapshot::{FusionFeedback, ViewSnapshot};
use crate::view_tracker::ViewTracker;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("No view workers to run")]
    NoViews,

    #[error("Worker for {view} aborted: {reason}")]
    WorkerAborted { view: ViewId, reason: String },

    #[error("Fusion task aborted: {0}")]
    FusionAborted(String),
}

// ============================================================================
// STOP FLAG
// ============================================================================

/// Shared stop flag for a running pipeline.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ============================================================================
// WORKER
// ============================================================================

/// One camera view: its feed, its perception services and its tracker.
pub struct ViewWorker {
    tracker: ViewTracker,
    source: Box<dyn FrameSource>,
    perception: Arc<dyn Perception>,
}

/// What a worker hands back when it exits cleanly.
pub struct WorkerOutcome {
    pub tracker: ViewTracker,
    pub frames: u64,
}

impl ViewWorker {
    pub fn new(tracker: ViewTracker, source: impl FrameSource, perception: Arc<dyn Perception>) -> Self {
        Self {
            tracker,
            source: Box::new(source),
            perception,
        }
    }

    pub fn view(&self) -> ViewId {
        self.tracker.view()
    }

    async fn run(
        mut self,
        done: mpsc::Sender<ViewSnapshot>,
        mut feedback: watch::Receiver<FusionFeedback>,
        stop: StopHandle,
    ) -> Result<WorkerOutcome, EnvError> {
        let view = self.tracker.view();
        let expected = self.tracker.camera().frame_size();
        let mut published: u64 = 0;

        loop {
            if stop.is_stopped() {
                debug!(%view, "stop requested");
                break;
            }

            let frame = match self.source.next_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!(%view, frames = published, "end of stream");
                    break;
                }
                Err(e) => {
                    error!(%view, error = %e, "frame source failed");
                    stop.stop();
                    return Err(e);
                }
            };

            if (frame.width, frame.height) != expected {
                let e = EnvError::GeometryMismatch {
                    expected,
                    actual: (frame.width, frame.height),
                };
                error!(%view, error = %e, "frame rejected");
                stop.stop();
                return Err(e);
            }

            let mask = self.perception.segment(&frame);
            let blobs = self.perception.extract(&mask);

            // Fusion must have consumed our previous snapshot
            let round = published;
            let current = match feedback.wait_for(|fb| fb.round >= round).await {
                Ok(fb) => fb.clone(),
                Err(_) => break,
            };

            let snapshot = self
                .tracker
                .process_frame(&frame, &blobs, &current, self.perception.as_ref());
            if done.send(snapshot).await.is_err() {
                break;
            }
            published += 1;
        }

        Ok(WorkerOutcome {
            tracker: self.tracker,
            frames: published,
        })
    }
}

// ============================================================================
// RUNTIME
// ============================================================================

/// Everything a finished run leaves behind.
pub struct RunOutcome {
    pub reports: Vec<FrameReport>,
    pub workers: Vec<WorkerOutcome>,
    pub fusion: FusionEngine,
}

impl RunOutcome {
    pub fn tracker(&self, view: ViewId) -> Option<&ViewTracker> {
        self.workers
            .iter()
            .map(|w| &w.tracker)
            .find(|t| t.view() == view)
    }
}

#[derive(Default)]
pub struct PitchViewRuntime {
    stop: StopHandle,
}

impl PitchViewRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Runs the workers and the fusion stage until a feed ends or a stop is
    /// requested.
    ///
    /// Fails with [`RuntimeError::WorkerAborted`] naming the first view whose
    /// feed errored or delivered a frame of the wrong size.
    pub async fn run(&self, workers: Vec<ViewWorker>, fusion: FusionEngine) -> Result<RunOutcome, RuntimeError> {
        if workers.is_empty() {
            return Err(RuntimeError::NoViews);
        }

        let (feedback_tx, feedback_rx) = watch::channel(FusionFeedback::default());
        let mut done = Vec::with_capacity(workers.len());
        let mut handles = Vec::with_capacity(workers.len());

        for worker in workers {
            let (tx, rx) = mpsc::channel(1);
            let view = worker.view();
            done.push(rx);
            handles.push((
                view,
                tokio::spawn(worker.run(tx, feedback_rx.clone(), self.stop.clone())),
            ));
        }
        drop(feedback_rx);

        info!(views = handles.len(), "pipeline started");
        let fusion_task = tokio::spawn(fuse(fusion, done, feedback_tx, self.stop.clone()));
        let (fusion, reports) = fusion_task
            .await
            .map_err(|e| RuntimeError::FusionAborted(e.to_string()))?;

        let mut outcomes = Vec::with_capacity(handles.len());
        let mut failure = None;
        for (view, handle) in handles {
            let joined = handle.await.map_err(|e| e.to_string());
            match joined.and_then(|result| result.map_err(|e| e.to_string())) {
                Ok(outcome) => outcomes.push(outcome),
                Err(reason) => {
                    failure.get_or_insert(RuntimeError::WorkerAborted { view, reason });
                }
            }
        }
        if let Some(e) = failure {
            error!(error = %e, rounds = reports.len(), "pipeline aborted");
            return Err(e);
        }

        info!(rounds = reports.len(), "pipeline finished");
        Ok(RunOutcome {
            reports,
            workers: outcomes,
            fusion,
        })
    }
}

async fn fuse(
    mut engine: FusionEngine,
    mut done: Vec<mpsc::Receiver<ViewSnapshot>>,
    feedback: watch::Sender<FusionFeedback>,
    stop: StopHandle,
) -> (FusionEngine, Vec<FrameReport>) {
    let mut reports = Vec::new();

    'rounds: loop {
        if stop.is_stopped() {
            break;
        }

        let mut snapshots = Vec::with_capacity(done.len());
        for rx in done.iter_mut() {
            match rx.recv().await {
                Some(snapshot) => snapshots.push(snapshot),
                None => break 'rounds,
            }
        }

        reports.push(engine.process(&snapshots));
        if feedback.send(engine.feedback()).is_err() {
            break;
        }
    }

    (engine, reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PitchViewConfig;
    use crate::test_support::{camera, frame, ScriptedScorer};
    use pitchview_env::{Frame, ReplayFrameSource};

    fn worker(view: usize, frames: u64, perception: Arc<dyn Perception>) -> ViewWorker {
        let config = PitchViewConfig::default();
        ViewWorker::new(
            ViewTracker::new(camera(view), &config),
            ReplayFrameSource::new((0..frames).map(frame)),
            perception,
        )
    }

    fn fusion(views: usize) -> FusionEngine {
        let cameras = (0..views).map(camera).collect();
        FusionEngine::new(PitchViewConfig::default().fusion, cameras).unwrap()
    }

    #[tokio::test]
    async fn test_rounds_are_lockstep() {
        let perception: Arc<dyn Perception> = Arc::new(ScriptedScorer::new());
        let workers = vec![worker(0, 5, perception.clone()), worker(1, 5, perception)];

        let outcome = PitchViewRuntime::new().run(workers, fusion(2)).await.unwrap();

        assert_eq!(outcome.reports.len(), 5);
        for (i, report) in outcome.reports.iter().enumerate() {
            assert_eq!(report.round, i as u64 + 1);
            assert_eq!(report.snapshots.len(), 2);
            assert!(report.snapshots.iter().all(|s| s.frame == i as u64));
        }
        assert_eq!(outcome.fusion.round(), 5);
        assert_eq!(outcome.tracker(ViewId(1)).unwrap().trajectory().len(), 5);
    }

    #[tokio::test]
    async fn test_shortest_feed_ends_run() {
        let perception: Arc<dyn Perception> = Arc::new(ScriptedScorer::new());
        let workers = vec![worker(0, 3, perception.clone()), worker(1, 8, perception)];

        let outcome = PitchViewRuntime::new().run(workers, fusion(2)).await.unwrap();

        assert_eq!(outcome.reports.len(), 3);
        let long = outcome.workers.iter().find(|w| w.tracker.view() == ViewId(1)).unwrap();
        assert!(long.frames <= 4);
    }

    #[tokio::test]
    async fn test_stop_before_start_processes_nothing() {
        let perception: Arc<dyn Perception> = Arc::new(ScriptedScorer::new());
        let runtime = PitchViewRuntime::new();
        runtime.stop_handle().stop();

        let outcome = runtime
            .run(vec![worker(0, 5, perception)], fusion(1))
            .await
            .unwrap();
        assert!(outcome.reports.is_empty());
        assert_eq!(outcome.workers[0].frames, 0);
    }

    #[tokio::test]
    async fn test_wrong_frame_size_fails_worker() {
        let perception: Arc<dyn Perception> = Arc::new(ScriptedScorer::new());
        let config = PitchViewConfig::default();
        let bad = ViewWorker::new(
            ViewTracker::new(camera(0), &config),
            ReplayFrameSource::new([Frame::filled(0, 32, 32, 0)]),
            perception,
        );

        let runtime = PitchViewRuntime::new();
        let result = runtime.run(vec![bad], fusion(1)).await;
        match result {
            Err(RuntimeError::WorkerAborted { view, reason }) => {
                assert_eq!(view, ViewId(0));
                assert!(reason.contains("32"), "reason names the frame size: {reason}");
            }
            other => panic!("expected WorkerAborted, got {:?}", other.map(|o| o.reports.len())),
        }
        assert!(runtime.stop_handle().is_stopped());
    }

    struct UnpluggedSource;

    #[async_trait::async_trait]
    impl FrameSource for UnpluggedSource {
        async fn next_frame(&mut self) -> Result<Option<Frame>, EnvError> {
            Err(EnvError::source("device unplugged"))
        }
    }

    #[tokio::test]
    async fn test_source_error_stops_pipeline() {
        let perception: Arc<dyn Perception> = Arc::new(ScriptedScorer::new());
        let config = PitchViewConfig::default();
        let broken = ViewWorker::new(
            ViewTracker::new(camera(0), &config),
            UnpluggedSource,
            perception.clone(),
        );
        let runtime = PitchViewRuntime::new();
        let stop = runtime.stop_handle();

        let result = runtime
            .run(vec![broken, worker(1, 5, perception)], fusion(2))
            .await;

        assert!(stop.is_stopped());
        assert!(matches!(
            result,
            Err(RuntimeError::WorkerAborted { view: ViewId(0), .. })
        ));
    }

    #[tokio::test]
    async fn test_no_workers_is_an_error() {
        let result = PitchViewRuntime::new().run(Vec::new(), fusion(1)).await;
        assert!(matches!(result, Err(RuntimeError::NoViews)));
    }
}
