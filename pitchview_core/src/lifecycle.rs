//! Ball candidate lifecycle for one view.
//!
//! The manager owns every ball candidate of its view in an id-keyed
//! arena and runs the per-frame pipeline pieces:
//! 1. Pruning (lost, stuck and, while no ball is established, outdated)
//! 2. Seeding from blob centroids
//! 3. Advancing every candidate through the state machine
//! 4. Selecting the main candidate
//! 5. Merging overlapping windows

use std::collections::BTreeMap;

use nalgebra::Vector2;
use pitchview_env::{AppearanceScorer, CandidateId, Frame, IdAllocator, Pixel, Rect, ScoreQuery};
use tracing::debug;

use crate::ball::{BallCandidate, BallState};
use crate::ball_state::{advance, BallStepContext};
use crate::camera::Camera;
use crate::config::TrackerConfig;
use crate::player::PlayerTracker;
use crate::union_find::DisjointSet;

/// Restricts seeding to blobs near an expected position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeedConstraint {
    pub center: Pixel,
    pub radius: f64,
}

/// Owner of one view's ball candidates.
#[derive(Debug, Clone)]
pub struct CandidateManager {
    config: TrackerConfig,
    candidates: BTreeMap<CandidateId, BallCandidate>,
    main: Option<CandidateId>,
}

impl CandidateManager {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            candidates: BTreeMap::new(),
            main: None,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, id: &CandidateId) -> Option<&BallCandidate> {
        self.candidates.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BallCandidate> {
        self.candidates.values()
    }

    /// The view's reported ball, if one was selected this frame.
    pub fn main(&self) -> Option<&BallCandidate> {
        self.main.and_then(|id| self.candidates.get(&id))
    }

    pub fn insert(&mut self, candidate: BallCandidate) {
        self.candidates.insert(candidate.id, candidate);
    }

    /// Window half-size for image row `y`.
    fn radius(&self, camera: &Camera, base: Vector2<f64>, y: f64) -> Vector2<f64> {
        if self.config.perspective {
            camera.scaled_radius(base, y, self.config.perspective_gain)
        } else {
            base
        }
    }

    // ========================================================================
    // PRUNING
    // ========================================================================

    /// Drops candidates older than `max_age` frames.
    pub fn prune_outdated(&mut self, max_age: u32) -> usize {
        self.remove_where(|c| c.life_time > max_age, "outdated")
    }

    /// Drops candidates in a terminal state.
    pub fn prune_lost(&mut self) -> usize {
        self.remove_where(|c| c.state().is_terminal(), "lost")
    }

    /// Drops candidates that spent too little of their life tracking.
    pub fn prune_stuck(&mut self) -> usize {
        let min_ratio = self.config.min_track_ratio;
        self.remove_where(|c| c.track_ratio() < min_ratio, "stuck")
    }

    fn remove_where<F>(&mut self, mut predicate: F, reason: &str) -> usize
    where
        F: FnMut(&BallCandidate) -> bool,
    {
        let before = self.candidates.len();
        self.candidates.retain(|id, c| {
            let remove = predicate(c);
            if remove {
                debug!(ball = %id, reason, "ball candidate removed");
            }
            !remove
        });
        if let Some(main) = self.main {
            if !self.candidates.contains_key(&main) {
                self.main = None;
            }
        }
        before - self.candidates.len()
    }

    // ========================================================================
    // SEEDING
    // ========================================================================

    /// Spawns candidates from blob centroids while fewer than
    /// `max_candidates` exist. Returns the number of candidates added.
    #[allow(clippy::too_many_arguments)]
    pub fn seed<S>(
        &mut self,
        frame: &Frame,
        blobs: &[Pixel],
        players: &PlayerTracker,
        scorer: &S,
        camera: &Camera,
        ids: &mut IdAllocator,
        constraint: Option<SeedConstraint>,
    ) -> usize
    where
        S: AppearanceScorer + ?Sized,
    {
        if self.candidates.len() >= self.config.max_candidates {
            return 0;
        }

        let mut provisional: Vec<(Pixel, f64)> = blobs
            .iter()
            .filter(|p| !self.candidates.values().any(|c| c.search_rect().contains(p)))
            .filter(|p| !players.covers(p))
            .filter(|p| {
                constraint.map_or(true, |c| nalgebra::distance(&c.center, p) <= c.radius)
            })
            .map(|p| {
                let window = Rect::from_center(*p, self.radius(camera, self.config.initial_radius, p.y))
                    .clip(frame.width, frame.height);
                scorer
                    .score(frame, &ScoreQuery::new(window, 1))
                    .first()
                    .map_or((*p, 0.0), |m| (m.position, m.score))
            })
            .collect();

        provisional.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut added = 0;
        for (position, score) in provisional.into_iter().take(self.config.max_candidates) {
            if score <= self.config.seed_threshold {
                continue;
            }
            let radius = self.radius(camera, self.config.default_radius, position.y);
            let mut candidate = BallCandidate::new(
                ids.allocate(),
                frame.index,
                position,
                radius,
                (frame.width, frame.height),
                self.config.smoother,
            );
            candidate.score = score;
            candidate.switch_state(frame.index, BallState::Tracking);
            candidate.update_step();
            debug!(ball = %candidate.id, x = position.x, y = position.y, score, "ball candidate seeded");
            self.insert(candidate);
            added += 1;
        }
        added
    }

    /// Inserts an operator-placed candidate that starts out tracking.
    pub fn add_manual(&mut self, frame: &Frame, position: Pixel, camera: &Camera, ids: &mut IdAllocator) -> CandidateId {
        let radius = self.radius(camera, self.config.default_radius, position.y);
        let mut candidate = BallCandidate::new(
            ids.allocate(),
            frame.index,
            position,
            radius,
            (frame.width, frame.height),
            self.config.smoother,
        );
        candidate.score = 1.0;
        candidate.switch_state(frame.index, BallState::Tracking);
        candidate.update_step();
        let id = candidate.id;
        self.insert(candidate);
        id
    }

    // ========================================================================
    // ADVANCE / SELECT / MERGE
    // ========================================================================

    /// Steps every candidate not born on this frame.
    pub fn advance_all<S>(&mut self, frame: &Frame, scorer: &S, players: &PlayerTracker, camera: &Camera)
    where
        S: AppearanceScorer + ?Sized,
    {
        let ctx = BallStepContext {
            frame,
            scorer,
            players,
            camera,
            config: &self.config,
        };
        for candidate in self.candidates.values_mut() {
            if candidate.born_frame == frame.index {
                continue;
            }
            advance(candidate, &ctx);
        }
    }

    /// Picks the highest-scoring tracking candidate and destroys all others.
    ///
    /// With no tracking candidate nothing is reported and nothing is destroyed.
    pub fn select_main(&mut self) -> Option<CandidateId> {
        let best = self
            .candidates
            .values()
            .filter(|c| c.state() == BallState::Tracking)
            .fold(None::<&BallCandidate>, |best, c| match best {
                Some(b) if b.score >= c.score => Some(b),
                _ => Some(c),
            })
            .map(|c| c.id);

        self.main = best;
        if let Some(main) = best {
            self.candidates.retain(|id, _| *id == main);
        }
        best
    }

    /// Merges candidates whose windows overlap by more than the configured
    /// fraction of the smaller window. Returns the number of merge groups.
    pub fn merge(&mut self, frame: u64) -> usize {
        let ids: Vec<CandidateId> = self.candidates.keys().copied().collect();
        let rects: Vec<Rect> = self.candidates.values().map(|c| c.search_rect()).collect();

        let mut sets = DisjointSet::new(ids.len());
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let smaller = rects[i].area().min(rects[j].area()) as f64;
                let overlap = rects[i].intersect(&rects[j]).area() as f64;
                if overlap > self.config.merge_overlap * smaller {
                    sets.union(i, j);
                }
            }
        }

        let mut merged = 0;
        for group in sets.groups().into_iter().filter(|g| g.len() > 1) {
            let union = group.iter().fold(Rect::default(), |acc, &i| acc.union(&rects[i]));
            let common = group[1..]
                .iter()
                .fold(rects[group[0]], |acc, &i| acc.intersect(&rects[i]));
            let center = if common.is_empty() {
                union.center()
            } else {
                common.center()
            };

            let score = group
                .iter()
                .filter_map(|&i| self.candidates.get(&ids[i]))
                .map(|c| c.score)
                .fold(f64::NEG_INFINITY, f64::max);

            for &i in &group[1..] {
                self.candidates.remove(&ids[i]);
            }

            let survivor = ids[group[0]];
            if let Some(c) = self.candidates.get_mut(&survivor) {
                c.set_position(center);
                c.set_radius(Vector2::new(union.width as f64 / 2.0, union.height as f64 / 2.0));
                c.set_search_rect(union);
                c.score = score;
                c.switch_state(frame, BallState::Searching);
                debug!(ball = %survivor, members = group.len(), "ball candidates merged");
            }
            merged += 1;
        }

        if let Some(main) = self.main {
            if !self.candidates.contains_key(&main) {
                self.main = None;
            }
        }
        merged
    }
}
