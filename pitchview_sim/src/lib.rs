//! PitchView Deterministic Stadium Simulator
//!
//! A controlled environment in which the whole multi-camera pipeline runs
//! end to end against known ground truth.
//!
//! # Core Principle: One Seed
//!
//! Every source of non-determinism derives from a single 64-bit seed:
//! - **Physics**: ball and player motion from the [`Oracle`]
//! - **Rendering**: per-view sensor noise seeded from the run seed and view
//! - **Scheduling**: the core runtime runs views in lockstep, so the fused
//!   output does not depend on task interleaving
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   WorldState    ┌──────────────┐  Frame   ┌────────────┐
//! │    Oracle    │ ──────────────► │ StadiumFeed  │ ───────► │ ViewWorker │ ×N
//! │  (physics)   │   (timeline)    │  (renderer)  │          └─────┬──────┘
//! └──────────────┘                 └──────────────┘                │ snapshot
//!                                                           ┌──────▼───────┐
//!                                                           │ FusionEngine │
//!                                                           └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use pitchview_sim::{ScenarioId, ScenarioRunner};
//!
//! let result = ScenarioRunner::new(42, 100).run(ScenarioId::Lob)?;
//! assert!(result.passed);
//! ```

mod error;
mod exporter;
mod feed;
mod oracle;
mod perception;
mod render;
mod rig;
mod runner;
pub mod scenarios;

pub use error::SimError;
pub use exporter::{ImagePosition, Position, SimExport, SimFrame, ViewFrame};
pub use feed::StadiumFeed;
pub use oracle::{BallTruth, Oracle, PlayerTruth, WorldState, BALL_RADIUS, PLAYER_HEIGHT};
pub use perception::{ComponentExtractor, DiskScorer, IntensityClassifier, StadiumPerception, ThresholdSegmenter};
pub use render::{RenderStyle, Renderer};
pub use rig::{StadiumRig, SyntheticCamera};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRun, ScenarioRunner, ViewMetrics, MAX_RMS_ERROR};
pub use scenarios::ScenarioId;
