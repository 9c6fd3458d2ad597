//! Tunable thresholds for every stage of the pipeline.
//!
//! Defaults reproduce the reference broadcast setup (25 fps, 105 × 68 m
//! field rendered onto a 1920 × 1080 top-down plan). All structs
//! deserialize with `#[serde(default)]`, so a JSON file only needs to name
//! the values it overrides.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::handover::HandoverRegion;

// ============================================================================
// SMOOTHER NOISE
// ============================================================================

/// Noise parameters of a constant-velocity Kalman smoother.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmootherNoise {
    /// Process noise variance (Q diagonal)
    pub process: f64,

    /// Measurement noise variance (R diagonal)
    pub measurement: f64,

    /// Initial error covariance (P diagonal)
    pub error: f64,
}

impl SmootherNoise {
    pub const fn new(process: f64, measurement: f64, error: f64) -> Self {
        Self {
            process,
            measurement,
            error,
        }
    }
}

impl Default for SmootherNoise {
    fn default() -> Self {
        Self::new(1e-4, 0.01, 0.01)
    }
}

// ============================================================================
// BALL TRACKING
// ============================================================================

/// Configuration of the per-view ball state machine and candidate lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Search half-size while tracking (default: 45 × 35 px)
    pub default_radius: Vector2<f64>,

    /// Search half-size used to score a freshly seeded blob (default: 22 × 22 px)
    pub initial_radius: Vector2<f64>,

    /// Extra half-size around a carrying player's body (default: 100 × 60 px)
    pub attach_radius: Vector2<f64>,

    /// Per-frame growth of the search window while searching (default: 15 × 15 px)
    pub search_increment: Vector2<f64>,

    /// Scale search windows with vertical image position
    pub perspective: bool,

    /// Multiplier applied to every camera's perspective ratio (default: 1.15)
    pub perspective_gain: f64,

    /// Below this score a tracked ball starts searching (default: 0.94)
    pub loose_threshold: f64,

    /// Score a searching ball needs to be found again (default: 0.96)
    pub find_threshold: f64,

    /// Score an isolated match needs to detach a ball from a player (default: 0.95)
    pub isolation_threshold: f64,

    /// Ball-to-player-rectangle distance that triggers attachment (default: 15 px)
    pub attach_distance: f64,

    /// Distance from every player that makes a match "isolated" (default: 50 px)
    pub isolation_distance: f64,

    /// Matches requested while attached (default: 2)
    pub attached_max_matches: usize,

    /// Frames a candidate may keep searching before it is lost (default: 4)
    pub search_patience: u64,

    /// Score a seeded blob needs to become a candidate (default: 0.9)
    pub seed_threshold: f64,

    /// Seeding happens while fewer candidates than this exist (default: 2)
    pub max_candidates: usize,

    /// Age above which unestablished candidates are dropped (default: 5 frames)
    pub max_unconfirmed_age: u32,

    /// Minimum fraction of life spent in Init/Tracking (default: 0.4)
    pub min_track_ratio: f64,

    /// Overlap (fraction of the smaller window) that merges two candidates (default: 0.7)
    pub merge_overlap: f64,

    /// Radius around the reprojected fused ball used when reseeding (default: 60 px)
    pub reseed_radius: f64,

    /// Kalman noise of each ball candidate's smoother
    pub smoother: SmootherNoise,

    /// Ground-truth distance counted as a correct detection (default: 5 px)
    pub accuracy_distance: f64,

    /// Rolling window of the accuracy metric (default: 15 frames)
    pub accuracy_window: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            default_radius: Vector2::new(45.0, 35.0),
            initial_radius: Vector2::new(22.0, 22.0),
            attach_radius: Vector2::new(100.0, 60.0),
            search_increment: Vector2::new(15.0, 15.0),
            perspective: true,
            perspective_gain: 1.15,
            loose_threshold: 0.94,
            find_threshold: 0.96,
            isolation_threshold: 0.95,
            attach_distance: 15.0,
            isolation_distance: 50.0,
            attached_max_matches: 2,
            search_patience: 4,
            seed_threshold: 0.9,
            max_candidates: 2,
            max_unconfirmed_age: 5,
            min_track_ratio: 0.4,
            merge_overlap: 0.7,
            reseed_radius: 60.0,
            smoother: SmootherNoise::new(1e-4, 0.01, 0.01),
            accuracy_distance: 5.0,
            accuracy_window: 15,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("loose_threshold", self.loose_threshold),
            ("find_threshold", self.find_threshold),
            ("isolation_threshold", self.isolation_threshold),
            ("seed_threshold", self.seed_threshold),
        ] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(name, value));
            }
        }
        for (name, value) in [
            ("min_track_ratio", self.min_track_ratio),
            ("merge_overlap", self.merge_overlap),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(name, value));
            }
        }
        if self.default_radius.x <= 0.0 || self.default_radius.y <= 0.0 {
            return Err(ConfigError::invalid("default_radius", self.default_radius.min()));
        }
        if self.attached_max_matches == 0 {
            return Err(ConfigError::invalid("attached_max_matches", 0.0));
        }
        if self.accuracy_window == 0 {
            return Err(ConfigError::invalid("accuracy_window", 0.0));
        }
        Ok(())
    }
}

// ============================================================================
// PLAYER ASSOCIATION
// ============================================================================

/// Configuration of per-view player association.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Maximum centroid distance accepted as a match (default: 20 px)
    pub match_distance: f64,

    /// Coasting frames after which a track is dropped (default: 5)
    pub max_predict_time: u32,

    /// Run matched centroids through the track's Kalman filter
    pub smooth: bool,

    /// Noise of the association filter
    pub filter: SmootherNoise,

    /// Noise of the display smoother that produces the filtered history
    pub display: SmootherNoise,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            match_distance: 20.0,
            max_predict_time: 5,
            smooth: true,
            filter: SmootherNoise::new(1e-4, 0.01, 0.01),
            display: SmootherNoise::new(1e-5, 0.01, 0.01),
        }
    }
}

impl PlayerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.match_distance <= 0.0 {
            return Err(ConfigError::invalid("match_distance", self.match_distance));
        }
        Ok(())
    }
}

// ============================================================================
// FIELD & FUSION
// ============================================================================

/// Physical field and the top-down plan the homographies project onto.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    /// Metres per plan pixel along x and y (default: 0.05464 × 0.06291)
    pub scale: Vector2<f64>,

    /// Lower-left corner of the valid area in metres
    pub min: Point2<f64>,

    /// Upper-right corner of the valid area in metres (default: 105 × 68)
    pub max: Point2<f64>,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            scale: Vector2::new(0.05464, 0.06291),
            min: Point2::new(0.0, 0.0),
            max: Point2::new(105.0, 68.0),
        }
    }
}

impl FieldConfig {
    /// Converts a plan pixel to metres.
    pub fn to_metric(&self, plan: &Point2<f64>) -> Point2<f64> {
        Point2::new(plan.x * self.scale.x, plan.y * self.scale.y)
    }

    /// Converts metres to a plan pixel.
    pub fn to_plan(&self, metric: &Point2<f64>) -> Point2<f64> {
        Point2::new(metric.x / self.scale.x, metric.y / self.scale.y)
    }

    /// Plan extent in pixels.
    pub fn plan_size(&self) -> Vector2<f64> {
        Vector2::new(self.max.x / self.scale.x, self.max.y / self.scale.y)
    }

    /// True if the planar coordinates lie inside the field.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min.x && x <= self.max.x && y >= self.min.y && y <= self.max.y
    }
}

/// Configuration of cross-view fusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Ray separation below which a pair of views is accepted (default: 1.0 m)
    pub tolerance: f64,

    /// Determinant below which two rays are treated as parallel
    pub degenerate_epsilon: f64,

    pub field: FieldConfig,

    /// Kalman noise of each fused track's plan-position smoother
    pub smoother: SmootherNoise,

    /// Frame rate used for the kinematic landing estimate (default: 25)
    pub fps: f64,

    /// Gravity in m/s² (default: 9.81)
    pub gravity: f64,

    /// Field regions that steer which views may claim the ball after a loss
    pub handover_regions: Vec<HandoverRegion>,

    /// Rounds a pending handover restricts pairing before any pair may
    /// claim the ball again (default: 25)
    pub handover_patience: u32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            tolerance: 1.0,
            degenerate_epsilon: 1e-9,
            field: FieldConfig::default(),
            smoother: SmootherNoise::new(0.001, 0.1, 0.01),
            fps: 25.0,
            gravity: 9.81,
            handover_regions: Vec::new(),
            handover_patience: 25,
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tolerance <= 0.0 {
            return Err(ConfigError::invalid("tolerance", self.tolerance));
        }
        if self.field.scale.x <= 0.0 || self.field.scale.y <= 0.0 {
            return Err(ConfigError::invalid("field.scale", self.field.scale.min()));
        }
        if self.field.max.x <= self.field.min.x || self.field.max.y <= self.field.min.y {
            return Err(ConfigError::invalid("field.max", self.field.max.x));
        }
        if self.fps <= 0.0 {
            return Err(ConfigError::invalid("fps", self.fps));
        }
        Ok(())
    }
}

// ============================================================================
// TOP LEVEL
// ============================================================================

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchViewConfig {
    pub tracker: TrackerConfig,
    pub players: PlayerConfig,
    pub fusion: FusionConfig,
}

impl PitchViewConfig {
    /// Parses a (possibly partial) JSON configuration and validates it.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tracker.validate()?;
        self.players.validate()?;
        self.fusion.validate()
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: f64 },

    #[error("Homography of {0} is singular")]
    SingularHomography(String),

    #[error("Rig has no cameras")]
    NoCameras,

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    pub fn invalid(name: impl Into<String>, value: f64) -> Self {
        Self::InvalidValue {
            name: name.into(),
            value,
        }
    }
}
