//! Player association.
//!
//! Greedy nearest-neighbour assignment of per-frame player detections to
//! persistent tracks. Tracks that miss a detection coast on their Kalman
//! prediction for a few frames before they are dropped.

use std::collections::{BTreeMap, BTreeSet};

use pitchview_env::{CandidateId, Frame, IdAllocator, Pixel, Rect, TeamClassifier, TeamLabel};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PlayerConfig;
use crate::geometry::point_rect_distance;
use crate::smoother::{KalmanSmoother, PositionSmoother};

/// Anchor point of a player rectangle: top centre.
pub fn player_anchor(rect: &Rect) -> Pixel {
    Pixel::new(rect.x as f64 + rect.width as f64 / 2.0, rect.y as f64)
}

/// A persistent player track in one view.
#[derive(Debug, Clone)]
pub struct PlayerCandidate {
    pub id: CandidateId,
    pub team: TeamLabel,
    pub position: Pixel,
    pub rect: Rect,

    /// Set while this track absorbed a co-located duplicate
    pub occluded: bool,

    /// Set while the position is a prediction rather than a detection
    pub predicted: bool,

    pub life_time: u32,
    pub predict_time: u32,

    filter: KalmanSmoother,
    display: KalmanSmoother,
    positions: Vec<Pixel>,
    filtered: Vec<Pixel>,
    rects: Vec<Rect>,
}

impl PlayerCandidate {
    pub fn new(id: CandidateId, rect: Rect, team: TeamLabel, config: &PlayerConfig) -> Self {
        let position = player_anchor(&rect);
        Self {
            id,
            team,
            position,
            rect,
            occluded: false,
            predicted: false,
            life_time: 0,
            predict_time: 0,
            filter: KalmanSmoother::at(config.filter, position),
            display: KalmanSmoother::at(config.display, position),
            positions: Vec::new(),
            filtered: Vec::new(),
            rects: Vec::new(),
        }
    }

    fn matched(&mut self, rect: Rect, smooth: bool) {
        let anchor = player_anchor(&rect);
        self.position = if smooth {
            self.filter.process(anchor)
        } else {
            self.filter.initialize(anchor);
            anchor
        };
        self.rect = rect;
        self.predicted = false;
        self.occluded = false;
        self.predict_time = 0;
    }

    fn coast(&mut self) {
        let p = self.filter.predict();
        self.position = p;
        self.rect = self
            .rect
            .moved_to((p.x - self.rect.width as f64 / 2.0).round() as i32, p.y.round() as i32);
        self.predicted = true;
        self.predict_time += 1;
    }

    fn record(&mut self) {
        self.positions.push(self.position);
        let smoothed = self.display.process(self.position);
        self.filtered.push(smoothed);
        self.rects.push(self.rect);
        self.life_time += 1;
    }

    pub fn positions(&self) -> &[Pixel] {
        &self.positions
    }

    pub fn filtered_positions(&self) -> &[Pixel] {
        &self.filtered
    }

    pub fn previous_rects(&self) -> &[Rect] {
        &self.rects
    }
}

/// Compact view of a player for snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub id: CandidateId,
    pub team: TeamLabel,
    pub position: Pixel,
    pub rect: Rect,
    pub predicted: bool,
}

impl From<&PlayerCandidate> for PlayerSummary {
    fn from(p: &PlayerCandidate) -> Self {
        Self {
            id: p.id,
            team: p.team,
            position: p.position,
            rect: p.rect,
            predicted: p.predicted,
        }
    }
}

/// All player tracks of one view, keyed by id.
#[derive(Debug, Clone)]
pub struct PlayerTracker {
    config: PlayerConfig,
    players: BTreeMap<CandidateId, PlayerCandidate>,
}

impl PlayerTracker {
    pub fn new(config: PlayerConfig) -> Self {
        Self {
            config,
            players: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn get(&self, id: &CandidateId) -> Option<&PlayerCandidate> {
        self.players.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerCandidate> {
        self.players.values()
    }

    pub fn summaries(&self) -> Vec<PlayerSummary> {
        self.players.values().map(PlayerSummary::from).collect()
    }

    /// Nearest player by point-to-rectangle distance.
    pub fn nearest(&self, p: &Pixel) -> Option<(&PlayerCandidate, f64)> {
        self.players
            .values()
            .map(|player| (player, point_rect_distance(p, &player.rect)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Rectangles of every player overlapping `window`.
    pub fn rects_intersecting(&self, window: &Rect) -> Vec<Rect> {
        self.players
            .values()
            .map(|p| p.rect)
            .filter(|r| r.intersects(window))
            .collect()
    }

    /// True if `p` lies inside any player rectangle.
    pub fn covers(&self, p: &Pixel) -> bool {
        self.players.values().any(|player| player.rect.contains(p))
    }

    /// Associates this frame's detections with the existing tracks.
    pub fn update<C>(&mut self, frame: &Frame, detections: &[Rect], classifier: &C, ids: &mut IdAllocator)
    where
        C: TeamClassifier + ?Sized,
    {
        let anchors: Vec<Pixel> = detections.iter().map(player_anchor).collect();
        let mut used = vec![false; detections.len()];
        let mut assignment: BTreeMap<CandidateId, usize> = BTreeMap::new();

        // Greedy nearest neighbour, one detection may feed several tracks
        for player in self.players.values_mut() {
            let nearest = anchors
                .iter()
                .enumerate()
                .map(|(i, a)| (i, nalgebra::distance(&player.position, a)))
                .min_by(|a, b| a.1.total_cmp(&b.1));

            match nearest {
                Some((idx, dist)) if dist < self.config.match_distance => {
                    player.matched(detections[idx], self.config.smooth);
                    used[idx] = true;
                    assignment.insert(player.id, idx);
                }
                _ => player.coast(),
            }
        }

        self.merge_colocated(&assignment);

        for (idx, rect) in detections.iter().enumerate() {
            if used[idx] {
                continue;
            }
            let id = ids.allocate();
            let team = classifier.classify(frame, rect);
            debug!(player = %id, %team, "new player track");
            self.players.insert(id, PlayerCandidate::new(id, *rect, team, &self.config));
        }

        let max_predict = self.config.max_predict_time;
        self.players.retain(|id, p| {
            let keep = p.predict_time <= max_predict;
            if !keep {
                debug!(player = %id, "player track expired");
            }
            keep
        });

        for player in self.players.values_mut() {
            player.record();
        }
    }

    /// Collapses tracks that matched the same detection or sit on the same
    /// position; the oldest track survives and is flagged occluded.
    fn merge_colocated(&mut self, assignment: &BTreeMap<CandidateId, usize>) {
        let ids: Vec<CandidateId> = self.players.keys().copied().collect();
        let mut absorbed: BTreeSet<CandidateId> = BTreeSet::new();
        let mut survivors: BTreeSet<CandidateId> = BTreeSet::new();

        for (i, a) in ids.iter().enumerate() {
            if absorbed.contains(a) {
                continue;
            }
            for b in &ids[i + 1..] {
                if absorbed.contains(b) {
                    continue;
                }
                let same_detection = matches!(
                    (assignment.get(a), assignment.get(b)),
                    (Some(x), Some(y)) if x == y
                );
                let same_position = self.players[a].position == self.players[b].position;
                if same_detection || same_position {
                    absorbed.insert(*b);
                    survivors.insert(*a);
                }
            }
        }

        for id in &absorbed {
            self.players.remove(id);
        }
        for id in &survivors {
            if let Some(p) = self.players.get_mut(id) {
                p.occluded = true;
                debug!(player = %id, "merged co-located player tracks");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitchview_env::ViewId;

    struct FixedTeam;

    impl TeamClassifier for FixedTeam {
        fn classify(&self, _frame: &Frame, _rect: &Rect) -> TeamLabel {
            TeamLabel::Home
        }
    }

    fn setup() -> (PlayerTracker, IdAllocator, Frame) {
        (
            PlayerTracker::new(PlayerConfig::default()),
            IdAllocator::new(ViewId(0)),
            Frame::filled(0, 640, 360, 0),
        )
    }

    #[test]
    fn test_new_detection_spawns_labelled_track() {
        let (mut tracker, mut ids, frame) = setup();
        tracker.update(&frame, &[Rect::new(100, 100, 20, 40)], &FixedTeam, &mut ids);
        assert_eq!(tracker.len(), 1);
        let p = tracker.iter().next().unwrap();
        assert_eq!(p.team, TeamLabel::Home);
        assert_eq!(p.position, Pixel::new(110.0, 100.0));
    }

    #[test]
    fn test_nearby_detection_updates_track() {
        let (mut tracker, mut ids, frame) = setup();
        tracker.update(&frame, &[Rect::new(100, 100, 20, 40)], &FixedTeam, &mut ids);
        tracker.update(&frame, &[Rect::new(105, 102, 20, 40)], &FixedTeam, &mut ids);
        assert_eq!(tracker.len(), 1, "moved detection must not spawn a second track");
        let p = tracker.iter().next().unwrap();
        assert!(!p.predicted);
        assert_eq!(p.predict_time, 0);
        assert_eq!(p.rect, Rect::new(105, 102, 20, 40));
        assert_eq!(p.positions().len(), 2);
    }

    #[test]
    fn test_predict_time_boundary() {
        let (mut tracker, mut ids, frame) = setup();
        tracker.update(&frame, &[Rect::new(100, 100, 20, 40)], &FixedTeam, &mut ids);
        for _ in 0..5 {
            tracker.update(&frame, &[], &FixedTeam, &mut ids);
        }
        assert_eq!(tracker.len(), 1, "track survives 5 predicted frames");
        assert_eq!(tracker.iter().next().unwrap().predict_time, 5);
        assert!(tracker.iter().next().unwrap().predicted);

        tracker.update(&frame, &[], &FixedTeam, &mut ids);
        assert!(tracker.is_empty(), "track removed on the 6th predicted frame");
    }

    #[test]
    fn test_match_resets_predict_time() {
        let (mut tracker, mut ids, frame) = setup();
        tracker.update(&frame, &[Rect::new(100, 100, 20, 40)], &FixedTeam, &mut ids);
        tracker.update(&frame, &[], &FixedTeam, &mut ids);
        tracker.update(&frame, &[], &FixedTeam, &mut ids);
        tracker.update(&frame, &[Rect::new(100, 100, 20, 40)], &FixedTeam, &mut ids);
        assert_eq!(tracker.iter().next().unwrap().predict_time, 0);
    }

    #[test]
    fn test_colocated_tracks_merge_keeping_oldest() {
        let (mut tracker, mut ids, frame) = setup();
        tracker.update(
            &frame,
            &[Rect::new(100, 100, 20, 40), Rect::new(110, 100, 20, 40)],
            &FixedTeam,
            &mut ids,
        );
        assert_eq!(tracker.len(), 2);
        let oldest = tracker.iter().next().unwrap().id;

        // Both tracks now see the same single detection
        tracker.update(&frame, &[Rect::new(104, 100, 20, 40)], &FixedTeam, &mut ids);
        assert_eq!(tracker.len(), 1);
        let survivor = tracker.iter().next().unwrap();
        assert_eq!(survivor.id, oldest);
        assert!(survivor.occluded);
    }

    #[test]
    fn test_nearest_uses_rectangle_distance() {
        let (mut tracker, mut ids, frame) = setup();
        tracker.update(&frame, &[Rect::new(100, 100, 20, 40)], &FixedTeam, &mut ids);
        let (_, d) = tracker.nearest(&Pixel::new(110.0, 150.0)).unwrap();
        assert_eq!(d, 10.0);
        assert!(tracker.covers(&Pixel::new(110.0, 120.0)));
    }
}
