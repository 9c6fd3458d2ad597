//! The per-candidate ball state machine.
//!
//! ```text
//!  Init ──► Tracking ◄──► Searching ──► GotLost
//!              ▲  │
//!              │  ▼
//!        AttachedToPlayer
//! ```
//!
//! Each frame [`advance`] runs the handler of the candidate's current
//! state once and then records the step into the candidate's history.
//! An empty answer from the appearance scorer is a normal outcome and
//! only ever drives a transition.

use nalgebra::Vector2;
use pitchview_env::{AppearanceMatch, AppearanceScorer, Frame, Pixel, Rect, ScoreQuery};
use tracing::debug;

use crate::ball::{Attachment, BallCandidate, BallState};
use crate::camera::Camera;
use crate::config::TrackerConfig;
use crate::geometry::point_rect_distance;
use crate::player::PlayerTracker;
use crate::smoother::PositionSmoother;

/// Everything a state handler may read.
pub struct BallStepContext<'a, S: ?Sized> {
    pub frame: &'a Frame,
    pub scorer: &'a S,
    pub players: &'a PlayerTracker,
    pub camera: &'a Camera,
    pub config: &'a TrackerConfig,
}

impl<'a, S: ?Sized> BallStepContext<'a, S> {
    /// Window half-size for image row `y`.
    pub fn radius(&self, base: Vector2<f64>, y: f64) -> Vector2<f64> {
        if self.config.perspective {
            self.camera.scaled_radius(base, y, self.config.perspective_gain)
        } else {
            base
        }
    }
}

/// Vertical offset of `y` into `rect`, 0 at the top edge and 1 at the bottom.
pub fn attachment_height(rect: &Rect, y: f64) -> f64 {
    if y < rect.y as f64 {
        0.0
    } else if y > rect.bottom() as f64 || rect.height <= 0 {
        1.0
    } else {
        (y - rect.y as f64) / rect.height as f64
    }
}

/// Runs one frame of the state machine for `candidate`.
pub fn advance<S>(candidate: &mut BallCandidate, ctx: &BallStepContext<'_, S>)
where
    S: AppearanceScorer + ?Sized,
{
    match candidate.state() {
        BallState::Tracking => step_tracking(candidate, ctx),
        BallState::Searching => step_searching(candidate, ctx),
        BallState::AttachedToPlayer => step_attached(candidate, ctx),
        // Reserved states and terminal states do nothing
        BallState::Init
        | BallState::GotLost
        | BallState::OutOfField
        | BallState::Kicked
        | BallState::SeparatedFromPlayer => {}
    }
    candidate.update_step();
}

fn step_tracking<S>(candidate: &mut BallCandidate, ctx: &BallStepContext<'_, S>)
where
    S: AppearanceScorer + ?Sized,
{
    let frame = ctx.frame.index;
    let pos = candidate.position();

    if let Some((player, dist)) = ctx.players.nearest(&pos) {
        if dist < ctx.config.attach_distance {
            let height = attachment_height(&player.rect, pos.y);
            candidate.attach(
                frame,
                Attachment {
                    player: player.id,
                    height,
                },
            );
            ride_player(candidate, &player.rect, height, ctx);
            candidate.score = 0.0;
            debug!(ball = %candidate.id, player = %player.id, height, "ball attached to player");
            return;
        }
    }

    candidate.motion_mut().predict();
    let matches = ctx
        .scorer
        .score(ctx.frame, &ScoreQuery::new(candidate.search_rect(), 1));
    let Some(best) = matches.first().copied() else {
        candidate.predict_time += 1;
        candidate.switch_state(frame, BallState::GotLost);
        debug!(ball = %candidate.id, "no match while tracking, ball lost");
        return;
    };

    candidate.motion_mut().correct(best.position);
    candidate.predicted = Some(candidate.motion_mut().peek());

    if best.score < ctx.config.loose_threshold {
        candidate.predict_time += 1;
        candidate.switch_state(frame, BallState::Searching);
        debug!(ball = %candidate.id, score = best.score, "weak match, searching");
        return;
    }

    accept(candidate, best, ctx);
    if outside_field(&candidate.position(), ctx.camera) {
        candidate.switch_state(frame, BallState::OutOfField);
        debug!(ball = %candidate.id, "ball left the field");
    }
}

fn step_searching<S>(candidate: &mut BallCandidate, ctx: &BallStepContext<'_, S>)
where
    S: AppearanceScorer + ?Sized,
{
    let frame = ctx.frame.index;
    if candidate.last_state_duration(frame).unwrap_or(0) > ctx.config.search_patience {
        candidate.switch_state(frame, BallState::GotLost);
        debug!(ball = %candidate.id, "search window exhausted, ball lost");
        return;
    }

    let grown = candidate.radius() + ctx.radius(ctx.config.search_increment, candidate.position().y);
    candidate.set_radius(grown);

    let matches = ctx
        .scorer
        .score(ctx.frame, &ScoreQuery::new(candidate.search_rect(), 1));
    match matches.first().copied() {
        Some(best) if best.score >= ctx.config.find_threshold => {
            candidate.motion_mut().initialize(best.position);
            accept(candidate, best, ctx);
            candidate.switch_state(frame, BallState::Tracking);
            debug!(ball = %candidate.id, score = best.score, "ball found again");
        }
        _ => candidate.predict_time += 1,
    }
}

fn step_attached<S>(candidate: &mut BallCandidate, ctx: &BallStepContext<'_, S>)
where
    S: AppearanceScorer + ?Sized,
{
    let frame = ctx.frame.index;
    let pos = candidate.position();
    let carrier = candidate.attachment().and_then(|a| {
        ctx.players
            .get(&a.player)
            .map(|player| (player.rect, a.height))
    });

    let Some((rect, height)) = carrier else {
        release(candidate, ctx);
        debug!(ball = %candidate.id, "carrying player gone, back to tracking");
        return;
    };

    let dist = point_rect_distance(&pos, &rect);
    if dist >= ctx.config.attach_distance {
        release(candidate, ctx);
        debug!(ball = %candidate.id, dist, "carrying player moved away, back to tracking");
        return;
    }

    ride_player(candidate, &rect, height, ctx);

    let window = candidate.search_rect();
    let query = ScoreQuery::new(window, ctx.config.attached_max_matches)
        .excluding(ctx.players.rects_intersecting(&window));
    let matches = ctx.scorer.score(ctx.frame, &query);

    let isolated = matches.iter().copied().find(|m| {
        let clear = ctx
            .players
            .nearest(&m.position)
            .map_or(true, |(_, d)| d > ctx.config.isolation_distance);
        clear && m.score >= ctx.config.isolation_threshold
    });

    let chosen = isolated.or_else(|| {
        matches
            .first()
            .copied()
            .filter(|m| m.score > ctx.config.find_threshold)
    });

    if let Some(m) = chosen {
        candidate.motion_mut().initialize(m.position);
        accept(candidate, m, ctx);
        candidate.switch_state(frame, BallState::Tracking);
        debug!(ball = %candidate.id, score = m.score, "ball separated from player");
    }
}

/// Places the candidate on the carrying player's body and widens the window
/// around it.
fn ride_player<S: ?Sized>(
    candidate: &mut BallCandidate,
    rect: &Rect,
    height: f64,
    ctx: &BallStepContext<'_, S>,
) {
    let pos = Pixel::new(
        rect.x as f64 + rect.width as f64 / 2.0,
        rect.y as f64 + rect.height as f64 * height,
    );
    let body = Vector2::new(rect.width as f64 / 2.0, rect.height as f64 / 2.0);
    candidate.set_position(pos);
    candidate.set_radius(body + ctx.radius(ctx.config.attach_radius, pos.y));
}

fn accept<S: ?Sized>(candidate: &mut BallCandidate, m: AppearanceMatch, ctx: &BallStepContext<'_, S>) {
    candidate.set_position(m.position);
    candidate.set_radius(ctx.radius(ctx.config.default_radius, m.position.y));
    candidate.score = m.score;
    candidate.predict_time = 0;
}

fn release<S: ?Sized>(candidate: &mut BallCandidate, ctx: &BallStepContext<'_, S>) {
    let y = candidate.position().y;
    candidate.set_radius(ctx.radius(ctx.config.default_radius, y));
    candidate.switch_state(ctx.frame.index, BallState::Tracking);
}

fn outside_field(p: &Pixel, camera: &Camera) -> bool {
    camera
        .image_to_ground(p)
        .map_or(false, |g| !camera.field().contains(g.x, g.y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PlayerConfig, SmootherNoise};
    use crate::test_support::{camera, frame, ScriptedScorer, HEIGHT, WIDTH};
    use pitchview_env::{CandidateId, IdAllocator, ViewId};

    fn config() -> TrackerConfig {
        TrackerConfig {
            perspective: false,
            ..TrackerConfig::default()
        }
    }

    fn tracking_candidate(x: f64, y: f64) -> BallCandidate {
        let mut c = BallCandidate::new(
            CandidateId::new(ViewId(0), 0),
            0,
            Pixel::new(x, y),
            Vector2::new(45.0, 35.0),
            (WIDTH, HEIGHT),
            SmootherNoise::default(),
        );
        c.switch_state(0, BallState::Tracking);
        c.score = 0.95;
        c.update_step();
        c
    }

    fn players_with(rects: &[Rect]) -> PlayerTracker {
        let mut players = PlayerTracker::new(PlayerConfig::default());
        let mut ids = IdAllocator::new(ViewId(0));
        players.update(&frame(0), rects, &ScriptedScorer::new(), &mut ids);
        players
    }

    fn step(candidate: &mut BallCandidate, scorer: &ScriptedScorer, players: &PlayerTracker, index: u64) {
        let cam = camera(0);
        let cfg = config();
        let f = frame(index);
        let ctx = BallStepContext {
            frame: &f,
            scorer,
            players,
            camera: &cam,
            config: &cfg,
        };
        advance(candidate, &ctx);
    }

    #[test]
    fn test_tracking_accepts_strong_match() {
        let scorer = ScriptedScorer::new();
        scorer.push_match(104.0, 102.0, 0.97);
        let players = players_with(&[]);
        let mut c = tracking_candidate(100.0, 100.0);

        step(&mut c, &scorer, &players, 1);
        assert_eq!(c.state(), BallState::Tracking);
        assert_eq!(c.position(), Pixel::new(104.0, 102.0));
        assert_eq!(c.radius(), Vector2::new(45.0, 35.0));
        assert_eq!(c.score, 0.97);
        assert!(c.predicted.is_some());
        assert_eq!(scorer.queries()[0].max_matches, 1);
    }

    #[test]
    fn test_tracking_weak_match_starts_search() {
        let scorer = ScriptedScorer::new();
        scorer.push_match(104.0, 102.0, 0.93);
        let mut c = tracking_candidate(100.0, 100.0);
        step(&mut c, &scorer, &players_with(&[]), 1);
        assert_eq!(c.state(), BallState::Searching);
        assert_eq!(c.position(), Pixel::new(100.0, 100.0), "weak match is not accepted");
    }

    #[test]
    fn test_tracking_without_match_is_lost() {
        let scorer = ScriptedScorer::new();
        scorer.push_empty();
        let mut c = tracking_candidate(100.0, 100.0);
        step(&mut c, &scorer, &players_with(&[]), 1);
        assert_eq!(c.state(), BallState::GotLost);
    }

    #[test]
    fn test_searching_gives_up_after_patience() {
        let players = players_with(&[]);
        let scorer = ScriptedScorer::new();
        scorer.push_match(100.0, 100.0, 0.5);
        let mut c = tracking_candidate(100.0, 100.0);
        step(&mut c, &scorer, &players, 1);
        assert_eq!(c.state(), BallState::Searching);

        let mut last_width = c.search_rect().width;
        for k in 0..4 {
            scorer.push_match(100.0, 100.0, 0.9);
            step(&mut c, &scorer, &players, 2 + k);
            assert_eq!(c.state(), BallState::Searching, "still searching after {} frames", k + 1);
            assert!(c.search_rect().width > last_width, "window grows while searching");
            last_width = c.search_rect().width;
        }

        scorer.push_match(100.0, 100.0, 0.9);
        step(&mut c, &scorer, &players, 6);
        assert_eq!(c.state(), BallState::GotLost, "lost on the 5th search frame");
    }

    #[test]
    fn test_searching_recovers_on_find_threshold() {
        let players = players_with(&[]);
        let scorer = ScriptedScorer::new();
        scorer.push_match(100.0, 100.0, 0.5);
        let mut c = tracking_candidate(100.0, 100.0);
        step(&mut c, &scorer, &players, 1);

        scorer.push_match(130.0, 90.0, 0.96);
        step(&mut c, &scorer, &players, 2);
        assert_eq!(c.state(), BallState::Tracking);
        assert_eq!(c.position(), Pixel::new(130.0, 90.0));
        assert_eq!(c.radius(), Vector2::new(45.0, 35.0), "window reset to default size");
    }

    #[test]
    fn test_attaches_to_nearby_player() {
        // Player body spans y 80..120, ball sits inside it at y = 90
        let players = players_with(&[Rect::new(90, 80, 20, 40)]);
        let scorer = ScriptedScorer::new();
        let mut c = tracking_candidate(105.0, 90.0);

        step(&mut c, &scorer, &players, 1);
        assert_eq!(c.state(), BallState::AttachedToPlayer);
        let attachment = c.attachment().unwrap();
        assert!((attachment.height - 0.25).abs() < 1e-12);
        assert_eq!(c.position(), Pixel::new(100.0, 90.0));
        assert_eq!(c.radius(), Vector2::new(110.0, 80.0));
        assert_eq!(c.score, 0.0);
        assert!(scorer.queries().is_empty(), "attaching does not query the scorer");
    }

    #[test]
    fn test_attached_prefers_isolated_match() {
        let players = players_with(&[Rect::new(90, 80, 20, 40)]);
        let scorer = ScriptedScorer::new();
        let mut c = tracking_candidate(105.0, 90.0);
        step(&mut c, &scorer, &players, 1);

        // First match is close to the player, second is isolated
        scorer.push(vec![
            AppearanceMatch { position: Pixel::new(125.0, 100.0), score: 0.99 },
            AppearanceMatch { position: Pixel::new(200.0, 100.0), score: 0.955 },
        ]);
        step(&mut c, &scorer, &players, 2);
        assert_eq!(c.state(), BallState::Tracking);
        assert_eq!(c.position(), Pixel::new(200.0, 100.0));
        assert!(c.attachment().is_none());

        let query = scorer.queries().last().cloned().unwrap();
        assert_eq!(query.max_matches, 2);
        assert_eq!(query.exclude, vec![Rect::new(90, 80, 20, 40)], "player body is masked");
    }

    #[test]
    fn test_attached_falls_back_to_best_match() {
        let players = players_with(&[Rect::new(90, 80, 20, 40)]);
        let scorer = ScriptedScorer::new();
        let mut c = tracking_candidate(105.0, 90.0);
        step(&mut c, &scorer, &players, 1);

        scorer.push(vec![AppearanceMatch { position: Pixel::new(125.0, 100.0), score: 0.97 }]);
        step(&mut c, &scorer, &players, 2);
        assert_eq!(c.state(), BallState::Tracking);
        assert_eq!(c.position(), Pixel::new(125.0, 100.0));
    }

    #[test]
    fn test_attached_stays_on_weak_matches() {
        let players = players_with(&[Rect::new(90, 80, 20, 40)]);
        let scorer = ScriptedScorer::new();
        let mut c = tracking_candidate(105.0, 90.0);
        step(&mut c, &scorer, &players, 1);

        scorer.push(vec![AppearanceMatch { position: Pixel::new(125.0, 100.0), score: 0.9 }]);
        step(&mut c, &scorer, &players, 2);
        assert_eq!(c.state(), BallState::AttachedToPlayer);
        assert!(c.attachment().is_some());
    }

    #[test]
    fn test_attached_released_when_player_gone() {
        let players = players_with(&[Rect::new(90, 80, 20, 40)]);
        let scorer = ScriptedScorer::new();
        let mut c = tracking_candidate(105.0, 90.0);
        step(&mut c, &scorer, &players, 1);

        let empty = players_with(&[]);
        step(&mut c, &scorer, &empty, 2);
        assert_eq!(c.state(), BallState::Tracking);
        assert_eq!(c.radius(), Vector2::new(45.0, 35.0));
        assert!(c.attachment().is_none());
    }

    #[test]
    fn test_attached_released_when_player_moves_away() {
        let mut players = PlayerTracker::new(PlayerConfig::default());
        let mut ids = IdAllocator::new(ViewId(0));
        let classifier = ScriptedScorer::new();
        players.update(&frame(0), &[Rect::new(90, 80, 6, 40)], &classifier, &mut ids);

        let scorer = ScriptedScorer::new();
        let mut c = tracking_candidate(93.0, 90.0);
        step(&mut c, &scorer, &players, 1);
        assert_eq!(c.state(), BallState::AttachedToPlayer);
        let carrier = c.attachment().unwrap().player;

        // Same track, but its body is now 16 px from the ball
        players.update(&frame(1), &[Rect::new(109, 80, 6, 40)], &classifier, &mut ids);
        assert!(players.get(&carrier).is_some(), "player keeps its id");

        step(&mut c, &scorer, &players, 2);
        assert_eq!(c.state(), BallState::Tracking);
        assert!(c.attachment().is_none());
        assert_eq!(c.radius(), Vector2::new(45.0, 35.0));
        assert_eq!(c.position(), Pixel::new(93.0, 90.0));
    }

    #[test]
    fn test_attachment_height_clamps() {
        let r = Rect::new(0, 100, 10, 50);
        assert_eq!(attachment_height(&r, 90.0), 0.0);
        assert_eq!(attachment_height(&r, 160.0), 1.0);
        assert_eq!(attachment_height(&r, 125.0), 0.5);
    }

    #[test]
    fn test_reserved_states_are_inert() {
        let scorer = ScriptedScorer::new();
        let mut c = tracking_candidate(100.0, 100.0);
        c.switch_state(1, BallState::Kicked);
        step(&mut c, &scorer, &players_with(&[]), 2);
        assert_eq!(c.state(), BallState::Kicked);
        assert!(scorer.queries().is_empty());
    }
}
