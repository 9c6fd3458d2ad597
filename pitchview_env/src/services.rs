//! Perception services consumed by the tracking core.
//!
//! These are the image-processing collaborators the core relies on but does
//! not implement itself: foreground segmentation, blob extraction, template
//! scoring and team classification. Production deployments plug in real
//! vision code; `pitchview_sim` ships synthetic reference implementations.

use crate::types::{Blobs, ForegroundMask, Frame, Pixel, Rect, TeamLabel};
use serde::{Deserialize, Serialize};

/// A scored template match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AppearanceMatch {
    /// Centre of the matched template, in frame pixels
    pub position: Pixel,

    /// Correlation score in `[-1, 1]`
    pub score: f64,
}

/// A request for the best template matches inside a search window.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreQuery {
    /// Search window (already clipped to the frame)
    pub window: Rect,

    /// Maximum number of matches to return
    pub max_matches: usize,

    /// Regions the scorer must ignore (e.g. player bodies around an attached ball)
    pub exclude: Vec<Rect>,
}

impl ScoreQuery {
    pub fn new(window: Rect, max_matches: usize) -> Self {
        Self {
            window,
            max_matches,
            exclude: Vec::new(),
        }
    }

    pub fn excluding(mut self, exclude: Vec<Rect>) -> Self {
        self.exclude = exclude;
        self
    }
}

/// Separates moving foreground from the static background.
pub trait ForegroundSegmenter: Send + Sync {
    fn segment(&self, frame: &Frame) -> ForegroundMask;
}

/// Turns a foreground mask into player rectangles and ball centroids.
pub trait BlobExtractor: Send + Sync {
    fn extract(&self, mask: &ForegroundMask) -> Blobs;
}

/// Scores image regions against the ball template.
///
/// Implementations must return matches ranked by descending score, at most
/// `query.max_matches` of them, and an empty list for an empty window.
pub trait AppearanceScorer: Send + Sync {
    fn score(&self, frame: &Frame, query: &ScoreQuery) -> Vec<AppearanceMatch>;
}

/// Assigns a team label to a player rectangle.
pub trait TeamClassifier: Send + Sync {
    fn classify(&self, frame: &Frame, rect: &Rect) -> TeamLabel;
}

/// The full set of perception services one view needs.
///
/// Bundled so a view worker can be handed a single trait object.
pub trait Perception: ForegroundSegmenter + BlobExtractor + AppearanceScorer + TeamClassifier {}

impl<T> Perception for T where T: ForegroundSegmenter + BlobExtractor + AppearanceScorer + TeamClassifier {}
