//! Reference perception services for rendered frames.
//!
//! These are deliberately simple: they only have to work on the clean
//! synthetic frames produced by [`crate::render`].
//!
//! - [`ThresholdSegmenter`]: foreground = pixels far from the grass value
//! - [`ComponentExtractor`]: 4-connected components sorted into ball and
//!   player blobs by size and shape
//! - [`DiskScorer`]: normalized cross-correlation with a disk template
//! - [`IntensityClassifier`]: team from the mean box intensity

use std::collections::VecDeque;

use pitchview_env::{
    AppearanceMatch, AppearanceScorer, BlobExtractor, Blobs, ForegroundMask, ForegroundSegmenter,
    Frame, Pixel, Rect, ScoreQuery, TeamClassifier, TeamLabel,
};

use crate::render::RenderStyle;

// ============================================================================
// SEGMENTATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ThresholdSegmenter {
    pub background: u8,
    pub tolerance: u8,
}

impl ForegroundSegmenter for ThresholdSegmenter {
    fn segment(&self, frame: &Frame) -> ForegroundMask {
        ForegroundMask {
            width: frame.width,
            height: frame.height,
            data: frame
                .pixels
                .iter()
                .map(|p| p.abs_diff(self.background) > self.tolerance)
                .collect(),
        }
    }
}

// ============================================================================
// BLOBS
// ============================================================================

#[derive(Debug, Clone)]
pub struct ComponentExtractor {
    /// Smallest ball blob side in pixels
    pub min_ball_size: i32,

    /// Largest ball blob side in pixels
    pub max_ball_size: i32,

    /// Smallest player blob height in pixels
    pub min_player_height: i32,
}

impl Default for ComponentExtractor {
    fn default() -> Self {
        Self {
            min_ball_size: 3,
            max_ball_size: 14,
            min_player_height: 8,
        }
    }
}

struct Component {
    min: (i32, i32),
    max: (i32, i32),
    count: usize,
    sum: (f64, f64),
}

impl Component {
    fn width(&self) -> i32 {
        self.max.0 - self.min.0 + 1
    }

    fn height(&self) -> i32 {
        self.max.1 - self.min.1 + 1
    }
}

impl ComponentExtractor {
    fn components(mask: &ForegroundMask) -> Vec<Component> {
        let (w, h) = (mask.width as i32, mask.height as i32);
        let mut visited = vec![false; mask.data.len()];
        let mut found = Vec::new();
        let mut queue = VecDeque::new();

        for start in 0..mask.data.len() {
            if visited[start] || !mask.data[start] {
                continue;
            }
            visited[start] = true;
            queue.push_back(start);
            let mut c = Component {
                min: (i32::MAX, i32::MAX),
                max: (i32::MIN, i32::MIN),
                count: 0,
                sum: (0.0, 0.0),
            };

            while let Some(idx) = queue.pop_front() {
                let (x, y) = ((idx as i32) % w, (idx as i32) / w);
                c.min = (c.min.0.min(x), c.min.1.min(y));
                c.max = (c.max.0.max(x), c.max.1.max(y));
                c.count += 1;
                c.sum = (c.sum.0 + x as f64, c.sum.1 + y as f64);

                for (nx, ny) in [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)] {
                    if nx < 0 || ny < 0 || nx >= w || ny >= h {
                        continue;
                    }
                    let n = (ny * w + nx) as usize;
                    if !visited[n] && mask.data[n] {
                        visited[n] = true;
                        queue.push_back(n);
                    }
                }
            }
            found.push(c);
        }
        found
    }
}

impl BlobExtractor for ComponentExtractor {
    fn extract(&self, mask: &ForegroundMask) -> Blobs {
        let mut blobs = Blobs::default();
        for c in Self::components(mask) {
            let (w, h) = (c.width(), c.height());
            let aspect = w as f64 / h as f64;
            let ball_sized = (self.min_ball_size..=self.max_ball_size).contains(&w)
                && (self.min_ball_size..=self.max_ball_size).contains(&h);
            if ball_sized && (0.6..=1.67).contains(&aspect) {
                let n = c.count as f64;
                blobs.balls.push(Pixel::new(c.sum.0 / n, c.sum.1 / n));
            } else if h >= self.min_player_height && h >= w {
                blobs.players.push(Rect::new(c.min.0, c.min.1, w, h));
            }
        }
        blobs
    }
}

// ============================================================================
// APPEARANCE
// ============================================================================

/// Bright-disk matcher using normalized cross-correlation.
#[derive(Debug, Clone)]
pub struct DiskScorer {
    radius: i32,
    half: i32,

    /// Zero-mean template, row-major over `(2 * half + 1)²`
    template: Vec<f64>,
    template_energy: f64,
}

impl DiskScorer {
    pub fn new(radius: u32) -> Self {
        let radius = radius.max(1) as i32;
        let half = radius + 2;
        let raw: Vec<f64> = (-half..=half)
            .flat_map(|dy| (-half..=half).map(move |dx| (dx, dy)))
            .map(|(dx, dy)| if dx * dx + dy * dy <= radius * radius { 1.0 } else { 0.0 })
            .collect();
        let mean = raw.iter().sum::<f64>() / raw.len() as f64;
        let template: Vec<f64> = raw.iter().map(|v| v - mean).collect();
        let template_energy = template.iter().map(|v| v * v).sum();
        Self {
            radius,
            half,
            template,
            template_energy,
        }
    }

    pub fn radius(&self) -> u32 {
        self.radius as u32
    }

    /// NCC of the template centred on `(x, y)`, `None` when the patch leaves
    /// the frame or is flat.
    fn correlate(&self, frame: &Frame, x: i32, y: i32) -> Option<f64> {
        let s = self.half;
        if x - s < 0 || y - s < 0 || x + s >= frame.width as i32 || y + s >= frame.height as i32 {
            return None;
        }
        let side = (2 * s + 1) as usize;
        let width = frame.width as usize;
        let mut patch = Vec::with_capacity(side * side);
        for py in (y - s)..=(y + s) {
            let row = py as usize * width;
            patch.extend(
                frame.pixels[row + (x - s) as usize..=row + (x + s) as usize]
                    .iter()
                    .map(|v| *v as f64),
            );
        }
        let mean = patch.iter().sum::<f64>() / patch.len() as f64;
        let mut dot = 0.0;
        let mut energy = 0.0;
        for (p, t) in patch.iter().zip(&self.template) {
            let d = p - mean;
            dot += d * t;
            energy += d * d;
        }
        if energy <= f64::EPSILON {
            return None;
        }
        Some(dot / (energy * self.template_energy).sqrt())
    }
}

impl AppearanceScorer for DiskScorer {
    fn score(&self, frame: &Frame, query: &ScoreQuery) -> Vec<AppearanceMatch> {
        let window = query.window.intersect(&frame.bounds());
        if window.is_empty() || query.max_matches == 0 {
            return Vec::new();
        }

        let mut scored: Vec<AppearanceMatch> = Vec::new();
        for y in window.y..window.bottom() {
            for x in window.x..window.right() {
                let position = Pixel::new(x as f64, y as f64);
                if query.exclude.iter().any(|r| r.contains(&position)) {
                    continue;
                }
                if let Some(score) = self.correlate(frame, x, y) {
                    scored.push(AppearanceMatch { position, score });
                }
            }
        }
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));

        // Non-maximum suppression
        let min_gap = (2 * self.radius) as f64;
        let mut picked: Vec<AppearanceMatch> = Vec::with_capacity(query.max_matches);
        for m in scored {
            if picked.len() == query.max_matches {
                break;
            }
            if picked
                .iter()
                .all(|p| nalgebra::distance(&p.position, &m.position) > min_gap)
            {
                picked.push(m);
            }
        }
        picked
    }
}

// ============================================================================
// TEAMS
// ============================================================================

#[derive(Debug, Clone)]
pub struct IntensityClassifier {
    pub background: u8,
    pub tolerance: u8,
    pub teams: Vec<(TeamLabel, u8)>,
}

impl TeamClassifier for IntensityClassifier {
    fn classify(&self, frame: &Frame, rect: &Rect) -> TeamLabel {
        let area = rect.intersect(&frame.bounds());
        let (mut sum, mut n) = (0.0, 0usize);
        for y in area.y..area.bottom() {
            for x in area.x..area.right() {
                if let Some(v) = frame.at(x, y) {
                    if v.abs_diff(self.background) > self.tolerance {
                        sum += v as f64;
                        n += 1;
                    }
                }
            }
        }
        if n == 0 {
            return TeamLabel::Unknown;
        }
        let mean = sum / n as f64;
        self.teams
            .iter()
            .min_by(|a, b| (a.1 as f64 - mean).abs().total_cmp(&(b.1 as f64 - mean).abs()))
            .map_or(TeamLabel::Unknown, |(team, _)| *team)
    }
}

// ============================================================================
// BUNDLE
// ============================================================================

/// All four services tuned to one render style.
#[derive(Debug, Clone)]
pub struct StadiumPerception {
    pub segmenter: ThresholdSegmenter,
    pub extractor: ComponentExtractor,
    pub scorer: DiskScorer,
    pub classifier: IntensityClassifier,
}

impl StadiumPerception {
    pub fn new(style: &RenderStyle) -> Self {
        let tolerance = 25;
        Self {
            segmenter: ThresholdSegmenter {
                background: style.background,
                tolerance,
            },
            extractor: ComponentExtractor::default(),
            scorer: DiskScorer::new(style.min_ball_radius.round() as u32),
            classifier: IntensityClassifier {
                background: style.background,
                tolerance,
                teams: vec![
                    (TeamLabel::Home, style.home),
                    (TeamLabel::Away, style.away),
                    (TeamLabel::Referee, style.referee),
                ],
            },
        }
    }
}

impl ForegroundSegmenter for StadiumPerception {
    fn segment(&self, frame: &Frame) -> ForegroundMask {
        self.segmenter.segment(frame)
    }
}

impl BlobExtractor for StadiumPerception {
    fn extract(&self, mask: &ForegroundMask) -> Blobs {
        self.extractor.extract(mask)
    }
}

impl AppearanceScorer for StadiumPerception {
    fn score(&self, frame: &Frame, query: &ScoreQuery) -> Vec<AppearanceMatch> {
        self.scorer.score(frame, query)
    }
}

impl TeamClassifier for StadiumPerception {
    fn classify(&self, frame: &Frame, rect: &Rect) -> TeamLabel {
        self.classifier.classify(frame, rect)
    }
}
