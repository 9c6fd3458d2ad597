//! Scripted collaborators shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use nalgebra::{Matrix3, Point3};
use pitchview_env::{
    AppearanceMatch, AppearanceScorer, BlobExtractor, Blobs, ForegroundMask, ForegroundSegmenter,
    Frame, Pixel, Rect, ScoreQuery, TeamClassifier, TeamLabel,
};

use crate::camera::{Camera, CameraConfig};
use crate::config::FieldConfig;

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 360;

/// Scorer that replays a queue of canned answers, one per call.
#[derive(Default)]
pub struct ScriptedScorer {
    script: Mutex<VecDeque<Vec<AppearanceMatch>>>,
    queries: Mutex<Vec<ScoreQuery>>,
}

impl ScriptedScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, matches: Vec<AppearanceMatch>) -> &Self {
        self.script.lock().unwrap().push_back(matches);
        self
    }

    pub fn push_match(&self, x: f64, y: f64, score: f64) -> &Self {
        self.push(vec![AppearanceMatch {
            position: Pixel::new(x, y),
            score,
        }])
    }

    pub fn push_empty(&self) -> &Self {
        self.push(Vec::new())
    }

    pub fn queries(&self) -> Vec<ScoreQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn pending(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

impl AppearanceScorer for ScriptedScorer {
    fn score(&self, _frame: &Frame, query: &ScoreQuery) -> Vec<AppearanceMatch> {
        self.queries.lock().unwrap().push(query.clone());
        let mut matches = self.script.lock().unwrap().pop_front().unwrap_or_default();
        matches.truncate(query.max_matches);
        matches
    }
}

impl TeamClassifier for ScriptedScorer {
    fn classify(&self, _frame: &Frame, _rect: &Rect) -> TeamLabel {
        TeamLabel::Home
    }
}

impl ForegroundSegmenter for ScriptedScorer {
    fn segment(&self, frame: &Frame) -> ForegroundMask {
        ForegroundMask::empty(frame.width, frame.height)
    }
}

impl BlobExtractor for ScriptedScorer {
    fn extract(&self, _mask: &ForegroundMask) -> Blobs {
        Blobs::default()
    }
}

pub fn frame(index: u64) -> Frame {
    Frame::filled(index, WIDTH, HEIGHT, 0)
}

/// Camera whose homography is the identity (image pixel == plan pixel).
pub fn camera(view: usize) -> Camera {
    Camera::new(
        CameraConfig {
            view,
            homography: Matrix3::identity(),
            position: Point3::new(50.0, -30.0, 20.0),
            frame_width: WIDTH,
            frame_height: HEIGHT,
            flip_view: false,
            flip_projection: false,
            hue_range: (35.0, 85.0),
            template_radii: (3, 6),
            perspective_ratio: 1.0,
        },
        &FieldConfig::default(),
    )
    .unwrap()
}
