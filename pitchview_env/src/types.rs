//! Common types for the PitchView environment abstraction.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// A position in image pixel coordinates (x to the right, y down).
pub type Pixel = Point2<f64>;

/// Index of a camera view in the rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewId(pub usize);

impl ViewId {
    /// Returns the view index.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ViewId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "view{}", self.0)
    }
}

/// Identifier of a tracked object (ball or player candidate).
///
/// Ids are namespaced per view: each view hands out its own sequence
/// numbers, so views never contend on a shared counter and two views can
/// never produce the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateId {
    pub view: ViewId,
    pub seq: u64,
}

impl CandidateId {
    pub fn new(view: ViewId, seq: u64) -> Self {
        Self { view, seq }
    }
}

impl std::fmt::Display for CandidateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.view, self.seq)
    }
}

/// Per-view id allocator.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    view: ViewId,
    next: u64,
}

impl IdAllocator {
    pub fn new(view: ViewId) -> Self {
        Self { view, next: 0 }
    }

    /// Hands out the next id of this view's namespace.
    pub fn allocate(&mut self) -> CandidateId {
        let id = CandidateId::new(self.view, self.next);
        self.next += 1;
        id
    }
}

// ============================================================================
// RECTANGLES
// ============================================================================

/// Axis-aligned integer rectangle in pixel coordinates.
///
/// `x`/`y` is the top-left corner; the rectangle covers
/// `[x, x + width) × [y, y + height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Builds the rectangle `center ± radius`.
    pub fn from_center(center: Pixel, radius: Vector2<f64>) -> Self {
        let x = (center.x - radius.x).round() as i32;
        let y = (center.y - radius.y).round() as i32;
        let right = (center.x + radius.x).round() as i32;
        let bottom = (center.y + radius.y).round() as i32;
        Self::new(x, y, (right - x).max(0), (bottom - y).max(0))
    }

    /// Rectangle covering the whole frame.
    pub fn frame(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn center(&self) -> Pixel {
        Pixel::new(
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// Returns true if the point lies inside the rectangle.
    pub fn contains(&self, p: &Pixel) -> bool {
        p.x >= self.x as f64
            && p.x < self.right() as f64
            && p.y >= self.y as f64
            && p.y < self.bottom() as f64
    }

    /// Returns true if `other` lies entirely inside this rectangle.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Intersection of two rectangles (empty rectangle if they do not overlap).
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return Rect::default();
        }
        Rect::new(x, y, right - x, bottom - y)
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.intersect(other).is_empty()
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }

    /// Clips the rectangle to a `width × height` frame.
    pub fn clip(&self, width: u32, height: u32) -> Rect {
        self.intersect(&Rect::frame(width, height))
    }

    /// Same size, moved so that its top-left corner is at `(x, y)`.
    pub fn moved_to(&self, x: i32, y: i32) -> Rect {
        Rect::new(x, y, self.width, self.height)
    }
}

// ============================================================================
// FRAMES
// ============================================================================

/// Team affiliation of a player, as reported by the team classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TeamLabel {
    Home,
    Away,
    Referee,
    Unknown,
}

impl std::fmt::Display for TeamLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TeamLabel::Home => "home",
            TeamLabel::Away => "away",
            TeamLabel::Referee => "referee",
            TeamLabel::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A single grayscale video frame of one view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Zero-based frame index in the stream
    pub index: u64,

    pub width: u32,
    pub height: u32,

    /// Row-major 8-bit intensities, `width * height` long
    pub pixels: Vec<u8>,

    /// Annotated ball position, when the stream carries ground truth
    pub ground_truth: Option<Pixel>,
}

impl Frame {
    /// Creates a frame filled with a constant intensity.
    pub fn filled(index: u64, width: u32, height: u32, value: u8) -> Self {
        Self {
            index,
            width,
            height,
            pixels: vec![value; width as usize * height as usize],
            ground_truth: None,
        }
    }

    /// Intensity at `(x, y)`, or `None` outside the frame.
    pub fn at(&self, x: i32, y: i32) -> Option<u8> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        self.pixels.get(y as usize * self.width as usize + x as usize).copied()
    }

    /// Sets the intensity at `(x, y)`; out-of-frame writes are ignored.
    pub fn set(&mut self, x: i32, y: i32, value: u8) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let idx = y as usize * self.width as usize + x as usize;
        self.pixels[idx] = value;
    }

    pub fn bounds(&self) -> Rect {
        Rect::frame(self.width, self.height)
    }
}

/// Binary foreground mask produced by a segmenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundMask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<bool>,
}

impl ForegroundMask {
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![false; width as usize * height as usize],
        }
    }

    pub fn is_set(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return false;
        }
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: i32, y: i32, value: bool) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let idx = y as usize * self.width as usize + x as usize;
        self.data[idx] = value;
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }
}

/// Blobs extracted from a foreground mask.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blobs {
    /// Bounding rectangles of player-sized blobs
    pub players: Vec<Rect>,

    /// Centroids of ball-sized blobs
    pub balls: Vec<Pixel>,
}
