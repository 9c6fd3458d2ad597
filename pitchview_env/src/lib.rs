//! PitchView Environment Abstraction Layer
//!
//! This crate holds everything the tracking core needs from the outside
//! world, expressed as plain data types and traits:
//!
//! - **Frames** (`FrameSource`): one feed per camera view, async, with
//!   end-of-stream signalled by `None`
//! - **Perception** (`ForegroundSegmenter`, `BlobExtractor`,
//!   `AppearanceScorer`, `TeamClassifier`): the image-processing services
//! - **Identity** (`ViewId`, `CandidateId`, `IdAllocator`): per-view id
//!   namespaces
//!
//! Keeping these behind traits lets the same core run against live
//! cameras or against the deterministic stadium in `pitchview_sim`.
//!
//! # Example
//!
//! ```ignore
//! use pitchview_env::{FrameSource, ReplayFrameSource};
//!
//! async fn drain<S: FrameSource>(mut src: S) {
//!     while let Ok(Some(frame)) = src.next_frame().await {
//!         println!("frame {}", frame.index);
//!     }
//! }
//! ```

mod error;
mod services;
mod source;
mod types;

pub use error::EnvError;
pub use services::{
    AppearanceMatch, AppearanceScorer, BlobExtractor, ForegroundSegmenter, Perception, ScoreQuery,
    TeamClassifier,
};
pub use source::{ChannelFrameSource, FrameSource, ReplayFrameSource};
pub use types::{
    Blobs, CandidateId, ForegroundMask, Frame, IdAllocator, Pixel, Rect, TeamLabel, ViewId,
};
