//! Per-view tracking pipeline.
//!
//! A [`ViewTracker`] owns everything one camera needs between frames: its
//! ball candidates, its player tracks, the id allocator both draw from,
//! and the reporting history. The runtime feeds it one frame at a time
//! together with the fusion feedback of the previous round.

use nalgebra::{Point2, Point3};
use pitchview_env::{AppearanceScorer, Blobs, CandidateId, Frame, IdAllocator, Pixel, TeamClassifier, ViewId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ball::BallState;
use crate::camera::Camera;
use crate::config::{PitchViewConfig, TrackerConfig};
use crate::lifecycle::{CandidateManager, SeedConstraint};
use crate::metrics::AccuracyMetric;
use crate::player::PlayerTracker;
use crate::snapshot::{BallReport, FusionFeedback, ViewSnapshot};
use crate::triangulation::ground_intersection;

/// Where this view stands in finding the ball.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerPhase {
    /// No candidate is tracking; seeding from blobs every frame
    BallNotFound,
    /// A candidate is tracking but no other view has confirmed it
    BallFound,
    /// Fusion confirmed this view's ball by triangulation
    TruePositiveFound,
}

pub struct ViewTracker {
    view: ViewId,
    camera: Camera,
    config: TrackerConfig,
    ids: IdAllocator,
    balls: CandidateManager,
    players: PlayerTracker,
    phase: TrackerPhase,
    trajectory: Vec<Option<Pixel>>,
    metric: AccuracyMetric,
}

impl ViewTracker {
    pub fn new(camera: Camera, config: &PitchViewConfig) -> Self {
        let view = camera.view();
        Self {
            view,
            camera,
            config: config.tracker.clone(),
            ids: IdAllocator::new(view),
            balls: CandidateManager::new(config.tracker.clone()),
            players: PlayerTracker::new(config.players.clone()),
            phase: TrackerPhase::BallNotFound,
            trajectory: Vec::new(),
            metric: AccuracyMetric::new(config.tracker.accuracy_distance, config.tracker.accuracy_window),
        }
    }

    pub fn view(&self) -> ViewId {
        self.view
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn phase(&self) -> TrackerPhase {
        self.phase
    }

    pub fn balls(&self) -> &CandidateManager {
        &self.balls
    }

    pub fn players(&self) -> &PlayerTracker {
        &self.players
    }

    /// Reported ball position per processed frame.
    pub fn trajectory(&self) -> &[Option<Pixel>] {
        &self.trajectory
    }

    pub fn metric(&self) -> &AccuracyMetric {
        &self.metric
    }

    /// Processes one frame and returns the snapshot for fusion.
    pub fn process_frame<P>(
        &mut self,
        frame: &Frame,
        blobs: &Blobs,
        feedback: &FusionFeedback,
        perception: &P,
    ) -> ViewSnapshot
    where
        P: AppearanceScorer + TeamClassifier + ?Sized,
    {
        self.players.update(frame, &blobs.players, perception, &mut self.ids);

        if feedback.is_real(self.view) && self.phase != TrackerPhase::TruePositiveFound {
            info!(view = %self.view, frame = frame.index, "ball confirmed by fusion");
            self.phase = TrackerPhase::TruePositiveFound;
        }

        self.balls.prune_lost();
        self.balls.prune_stuck();
        if self.phase == TrackerPhase::BallNotFound {
            self.balls.prune_outdated(self.config.max_unconfirmed_age);
            let constraint = feedback.ball.and_then(|ball| self.reseed_constraint(&ball));
            self.balls.seed(
                frame,
                &blobs.balls,
                &self.players,
                perception,
                &self.camera,
                &mut self.ids,
                constraint,
            );
        }

        self.balls.advance_all(frame, perception, &self.players, &self.camera);
        let main = self.balls.select_main();
        self.balls.merge(frame.index);

        match (main, self.phase) {
            (None, TrackerPhase::TruePositiveFound) => {
                self.balls.prune_outdated(1);
                self.phase = TrackerPhase::BallNotFound;
                debug!(view = %self.view, frame = frame.index, "confirmed ball lost");
            }
            (None, _) => self.phase = TrackerPhase::BallNotFound,
            (Some(_), TrackerPhase::BallNotFound) => self.phase = TrackerPhase::BallFound,
            (Some(_), _) => {}
        }

        let ball = self.balls.main().map(|c| BallReport {
            id: c.id,
            position: c.position(),
            rect: c.search_rect(),
            predicted: c.predicted,
            score: c.score,
        });

        let reported = ball.map(|b| b.position);
        let tracking = self
            .balls
            .main()
            .is_some_and(|c| c.state() == BallState::Tracking);
        self.metric.record(frame.ground_truth, reported, tracking);
        if let Some(main) = self.balls.main() {
            self.metric.track_ratio = main.track_ratio();
        }
        self.trajectory.push(reported);

        ViewSnapshot {
            view: self.view,
            frame: frame.index,
            ball,
            ground_truth: frame.ground_truth,
            players: self.players.summaries(),
        }
    }

    /// Places a tracking candidate at `position`, bypassing seeding.
    pub fn add_candidate_manually(&mut self, frame: &Frame, position: Pixel) -> CandidateId {
        let id = self.balls.add_manual(frame, position, &self.camera, &mut self.ids);
        self.phase = TrackerPhase::BallFound;
        info!(view = %self.view, ball = %id, "ball candidate added manually");
        id
    }

    /// Image position of a fused 3D ball, via its ground shadow.
    pub fn reproject(&self, ball: &Point3<f64>) -> Option<Pixel> {
        let ground = if ball.z.abs() < f64::EPSILON {
            Point2::new(ball.x, ball.y)
        } else {
            ground_intersection(&self.camera.position(), ball)?
        };
        self.camera.ground_to_image(&ground)
    }

    fn reseed_constraint(&self, ball: &Point3<f64>) -> Option<SeedConstraint> {
        self.reproject(ball).map(|center| SeedConstraint {
            center,
            radius: self.config.reseed_radius,
        })
    }
}
