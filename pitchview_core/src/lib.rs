//! PitchView Core - Multi-Camera Ball and Player Tracking
//!
//! Tracks a football and the players in several fixed camera views and
//! fuses the per-view ball positions into one 3D trajectory:
//! 1. **Per-view tracking**: ball candidates driven by a state machine
//!    (tracking, searching, riding a player) plus nearest-neighbour
//!    player association, see [`ViewTracker`]
//! 2. **Cross-view fusion**: ray triangulation between views to confirm
//!    the ball and estimate its height, see [`FusionEngine`]
//! 3. **Runtime**: one tokio task per view and a fusion task, stepped in
//!    lockstep rounds, see [`PitchViewRuntime`]

pub mod ball;
pub mod ball_state;
pub mod camera;
pub mod config;
pub mod fusion;
pub mod geometry;
pub mod handover;
pub mod lifecycle;
pub mod metrics;
pub mod player;
pub mod runtime;
pub mod smoother;
pub mod snapshot;
pub mod triangulation;
pub mod union_find;
pub mod view_tracker;

#[cfg(test)]
mod test_support;

// Re-export key types for convenience
pub use ball::{BallCandidate, BallState};
pub use camera::{Camera, CameraConfig};
pub use config::{ConfigError, FieldConfig, FusionConfig, PitchViewConfig, PlayerConfig, TrackerConfig};
pub use fusion::{FrameReport, FusedBallTrack, FusionEngine};
pub use handover::HandoverRegion;
pub use metrics::{AccuracyMetric, AccuracySummary};
pub use runtime::{PitchViewRuntime, RunOutcome, RuntimeError, StopHandle, ViewWorker, WorkerOutcome};
pub use snapshot::{BallReport, FusionFeedback, ViewSnapshot};
pub use view_tracker::{TrackerPhase, ViewTracker};
