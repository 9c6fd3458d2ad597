//! Ball candidates: one hypothesis of where the ball is in a single view.

use nalgebra::Vector2;
use pitchview_env::{CandidateId, Pixel, Rect};
use serde::{Deserialize, Serialize};

use crate::config::SmootherNoise;
use crate::smoother::{KalmanSmoother, PositionSmoother};

/// State of a ball candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BallState {
    Init,
    Searching,
    GotLost,
    Tracking,
    /// Reserved; never entered.
    Kicked,
    AttachedToPlayer,
    /// Reserved; never entered.
    SeparatedFromPlayer,
    OutOfField,
}

impl BallState {
    /// Terminal states are removed by the next pruning pass.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BallState::GotLost | BallState::OutOfField)
    }

    /// States that count towards the track ratio.
    pub fn is_tracking_like(&self) -> bool {
        matches!(self, BallState::Init | BallState::Tracking)
    }
}

/// A recorded state change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub frame: u64,
    pub from: BallState,
    pub to: BallState,
}

/// The player a candidate is riding on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub player: CandidateId,

    /// Vertical offset into the player's rectangle, 0 = head, 1 = feet
    pub height: f64,
}

/// A single hypothesis of the ball in one view.
#[derive(Debug, Clone)]
pub struct BallCandidate {
    pub id: CandidateId,
    position: Pixel,
    radius: Vector2<f64>,
    search_rect: Rect,
    frame_size: (u32, u32),

    /// Score of the last accepted match
    pub score: f64,

    state: BallState,
    attachment: Option<Attachment>,

    /// Frames this candidate has been stepped
    pub life_time: u32,

    /// Frames in a row without a fresh match
    pub predict_time: u32,

    /// Frame the candidate was created on
    pub born_frame: u64,

    /// Position predicted for the next frame by the smoother
    pub predicted: Option<Pixel>,

    /// Motion model used to predict the next position
    motion: KalmanSmoother,
    /// Display smoother producing the filtered history
    smoother: KalmanSmoother,
    state_recorded: bool,

    positions: Vec<Pixel>,
    filtered: Vec<Pixel>,
    radii: Vec<Vector2<f64>>,
    scores: Vec<f64>,
    states: Vec<BallState>,
    transitions: Vec<StateTransition>,
}

impl BallCandidate {
    pub fn new(
        id: CandidateId,
        frame: u64,
        position: Pixel,
        radius: Vector2<f64>,
        frame_size: (u32, u32),
        noise: SmootherNoise,
    ) -> Self {
        let mut candidate = Self {
            id,
            position,
            radius,
            search_rect: Rect::default(),
            frame_size,
            score: 0.0,
            state: BallState::Init,
            attachment: None,
            life_time: 0,
            predict_time: 0,
            born_frame: frame,
            predicted: None,
            motion: KalmanSmoother::at(noise, position),
            smoother: KalmanSmoother::at(noise, position),
            state_recorded: false,
            positions: Vec::new(),
            filtered: Vec::new(),
            radii: Vec::new(),
            scores: Vec::new(),
            states: Vec::new(),
            transitions: Vec::new(),
        };
        candidate.fit_frame();
        candidate
    }

    pub fn position(&self) -> Pixel {
        self.position
    }

    pub fn radius(&self) -> Vector2<f64> {
        self.radius
    }

    /// Current search window, always clipped to the frame.
    pub fn search_rect(&self) -> Rect {
        self.search_rect
    }

    pub fn state(&self) -> BallState {
        self.state
    }

    pub fn attachment(&self) -> Option<Attachment> {
        self.attachment
    }

    pub fn motion_mut(&mut self) -> &mut KalmanSmoother {
        &mut self.motion
    }

    /// Moves the window centre. The search rectangle follows.
    pub fn set_position(&mut self, position: Pixel) {
        self.position = position;
        self.fit_frame();
    }

    /// Resizes the window. The search rectangle follows.
    pub fn set_radius(&mut self, radius: Vector2<f64>) {
        self.radius = radius;
        self.fit_frame();
    }

    /// Overrides the search rectangle (used by merging, which keeps the
    /// union of the merged windows rather than a centred one).
    pub fn set_search_rect(&mut self, rect: Rect) {
        self.search_rect = rect.clip(self.frame_size.0, self.frame_size.1);
    }

    /// Switches state, recording the transition.
    ///
    /// Leaving `AttachedToPlayer` always drops the attachment.
    pub fn switch_state(&mut self, frame: u64, next: BallState) {
        if !self.state_recorded {
            self.states.push(self.state);
            self.state_recorded = true;
        }
        self.transitions.push(StateTransition {
            frame,
            from: self.state,
            to: next,
        });
        self.state = next;
        if next != BallState::AttachedToPlayer {
            self.attachment = None;
        }
    }

    /// Enters `AttachedToPlayer` riding on `attachment.player`.
    pub fn attach(&mut self, frame: u64, attachment: Attachment) {
        self.switch_state(frame, BallState::AttachedToPlayer);
        self.attachment = Some(Attachment {
            height: attachment.height.clamp(0.0, 1.0),
            ..attachment
        });
    }

    /// Frames since the last state change, or `None` if it never changed.
    pub fn last_state_duration(&self, frame: u64) -> Option<u64> {
        self.transitions
            .last()
            .map(|t| frame.saturating_sub(t.frame))
    }

    /// Records the end of one frame step into the histories.
    pub fn update_step(&mut self) {
        if !self.state_recorded {
            self.states.push(self.state);
        }
        self.state_recorded = false;
        self.fit_frame();

        self.positions.push(self.position);
        let filtered = self.smoother.process(self.position);
        self.filtered.push(filtered);
        self.radii.push(self.radius);
        self.scores.push(self.score);
        self.life_time += 1;
    }

    /// Fraction of recorded frames spent in Init or Tracking.
    pub fn track_ratio(&self) -> f64 {
        if self.life_time == 0 {
            return 1.0;
        }
        let tracked = self.states.iter().filter(|s| s.is_tracking_like()).count();
        tracked as f64 / self.life_time as f64
    }

    /// Number of recorded frames spent in `state`.
    pub fn state_duration(&self, state: BallState) -> usize {
        self.states.iter().filter(|s| **s == state).count()
    }

    pub fn positions(&self) -> &[Pixel] {
        &self.positions
    }

    pub fn filtered_positions(&self) -> &[Pixel] {
        &self.filtered
    }

    pub fn radii(&self) -> &[Vector2<f64>] {
        &self.radii
    }

    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    pub fn states(&self) -> &[BallState] {
        &self.states
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    fn fit_frame(&mut self) {
        self.search_rect =
            Rect::from_center(self.position, self.radius).clip(self.frame_size.0, self.frame_size.1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitchview_env::ViewId;
    use proptest::prelude::*;

    fn candidate(x: f64, y: f64) -> BallCandidate {
        BallCandidate::new(
            CandidateId::new(ViewId(0), 1),
            0,
            Pixel::new(x, y),
            Vector2::new(45.0, 35.0),
            (640, 360),
            SmootherNoise::default(),
        )
    }

    #[test]
    fn test_search_rect_clipped_at_corner() {
        let c = candidate(5.0, 5.0);
        assert_eq!(c.search_rect(), Rect::new(0, 0, 50, 40));
    }

    #[test]
    fn test_attachment_cleared_on_leave() {
        let mut c = candidate(100.0, 100.0);
        c.attach(
            3,
            Attachment {
                player: CandidateId::new(ViewId(0), 9),
                height: 1.7,
            },
        );
        assert_eq!(c.attachment().map(|a| a.height), Some(1.0), "height is clamped");
        c.switch_state(4, BallState::Tracking);
        assert!(c.attachment().is_none());
        assert_eq!(c.last_state_duration(6), Some(2));
    }

    #[test]
    fn test_track_ratio_counts_frame_states() {
        let mut c = candidate(100.0, 100.0);
        c.switch_state(0, BallState::Tracking);
        c.update_step(); // Init
        c.update_step(); // Tracking
        c.switch_state(2, BallState::Searching);
        c.update_step(); // Tracking (pre-switch)
        c.update_step(); // Searching
        assert_eq!(c.life_time, 4);
        assert_eq!(c.states(), &[BallState::Init, BallState::Tracking, BallState::Tracking, BallState::Searching]);
        assert!((c.track_ratio() - 0.75).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_search_rect_inside_frame(
            x in -200.0f64..900.0,
            y in -200.0f64..600.0,
            rx in 0.0f64..400.0,
            ry in 0.0f64..400.0,
        ) {
            let mut c = candidate(100.0, 100.0);
            c.set_radius(Vector2::new(rx, ry));
            c.set_position(Pixel::new(x, y));
            c.update_step();
            let frame = Rect::frame(640, 360);
            let r = c.search_rect();
            prop_assert!(r.is_empty() || frame.contains_rect(&r));
        }
    }
}
