//! Messages exchanged between the view workers and the fusion stage.

use std::collections::BTreeSet;

use nalgebra::Point3;
use pitchview_env::{CandidateId, Pixel, Rect, ViewId};
use serde::{Deserialize, Serialize};

use crate::player::PlayerSummary;

/// The ball a view reports for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallReport {
    pub id: CandidateId,
    pub position: Pixel,
    pub rect: Rect,

    /// Position expected on the next frame
    pub predicted: Option<Pixel>,

    pub score: f64,
}

/// One view's output for one frame. Produced once, consumed once by fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSnapshot {
    pub view: ViewId,
    pub frame: u64,
    pub ball: Option<BallReport>,
    pub ground_truth: Option<Pixel>,
    pub players: Vec<PlayerSummary>,
}

impl ViewSnapshot {
    pub fn empty(view: ViewId, frame: u64) -> Self {
        Self {
            view,
            frame,
            ball: None,
            ground_truth: None,
            players: Vec::new(),
        }
    }
}

/// What fusion tells every view after each round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FusionFeedback {
    /// Fusion round that produced this feedback (0 = none yet)
    pub round: u64,

    /// Views whose ball is currently confirmed by triangulation
    pub real_views: BTreeSet<ViewId>,

    /// 3D ball position committed by this round, in metres
    pub ball: Option<Point3<f64>>,

    /// Views allowed to claim the ball next, when a handover is pending
    pub handover_views: Option<BTreeSet<ViewId>>,
}

impl FusionFeedback {
    pub fn is_real(&self, view: ViewId) -> bool {
        self.real_views.contains(&view)
    }
}
