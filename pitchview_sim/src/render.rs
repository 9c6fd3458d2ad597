//! Grayscale renderer for the synthetic stadium.
//!
//! Draws, far to near: grass, players as team-shaded boxes, and the ball
//! as a bright disk. The ball centre is snapped to the pixel grid so the
//! rendered disk matches an integer-centred template exactly; the frame's
//! ground truth keeps the exact projection.

use pitchview_env::{Frame, Pixel, TeamLabel};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::oracle::{WorldState, BALL_RADIUS, PLAYER_HEIGHT};
use crate::rig::SyntheticCamera;

/// Intensities and noise of rendered frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderStyle {
    pub background: u8,
    pub home: u8,
    pub away: u8,
    pub referee: u8,
    pub ball: u8,

    /// Standard deviation of per-pixel sensor noise (0 = none)
    pub noise_std: f64,

    /// Smallest ball radius drawn, in pixels
    pub min_ball_radius: f64,

    /// Player box width as a fraction of its height
    pub player_aspect: f64,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            background: 60,
            home: 200,
            away: 140,
            referee: 20,
            ball: 255,
            noise_std: 0.0,
            min_ball_radius: 3.0,
            player_aspect: 0.4,
        }
    }
}

impl RenderStyle {
    pub fn team_intensity(&self, team: TeamLabel) -> u8 {
        match team {
            TeamLabel::Home => self.home,
            TeamLabel::Away => self.away,
            TeamLabel::Referee | TeamLabel::Unknown => self.referee,
        }
    }
}

enum Sprite {
    Player { left: f64, top: f64, width: f64, height: f64, value: u8 },
    Ball { center: Pixel, radius: f64 },
}

pub struct Renderer {
    style: RenderStyle,
    rng: ChaCha8Rng,
}

impl Renderer {
    pub fn new(style: RenderStyle, seed: u64) -> Self {
        Self {
            style,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn style(&self) -> &RenderStyle {
        &self.style
    }

    /// Renders `world` as seen by `camera`.
    pub fn render(&mut self, camera: &SyntheticCamera, world: &WorldState) -> Frame {
        let (width, height) = camera.frame_size();
        let mut frame = Frame::filled(world.frame, width, height, self.style.background);

        let mut sprites: Vec<(f64, Sprite)> = Vec::with_capacity(world.players.len() + 1);
        for player in &world.players {
            let feet = nalgebra::Point3::new(player.position.x, player.position.y, 0.0);
            let head = nalgebra::Point3::new(player.position.x, player.position.y, PLAYER_HEIGHT);
            let (Some(f), Some(h)) = (camera.project(&feet), camera.project(&head)) else {
                continue;
            };
            let box_height = f.y - h.y;
            if box_height < 1.0 {
                continue;
            }
            let box_width = (box_height * self.style.player_aspect).max(1.0);
            sprites.push((
                camera.depth(&feet),
                Sprite::Player {
                    left: f.x - box_width / 2.0,
                    top: h.y,
                    width: box_width,
                    height: box_height,
                    value: self.style.team_intensity(player.team),
                },
            ));
        }

        let ball = world.ball.position;
        if let Some(center) = camera.project(&ball) {
            let depth = camera.depth(&ball);
            let radius = (camera.focal() * BALL_RADIUS / depth).max(self.style.min_ball_radius);
            sprites.push((depth, Sprite::Ball { center, radius }));
            if camera.in_frame(&center) {
                frame.ground_truth = Some(center);
            }
        }

        // Far to near
        sprites.sort_by(|a, b| b.0.total_cmp(&a.0));
        for (_, sprite) in &sprites {
            match sprite {
                Sprite::Player { left, top, width, height, value } => {
                    let (x0, y0) = (left.round() as i32, top.round() as i32);
                    let (w, h) = (width.round().max(1.0) as i32, height.round().max(1.0) as i32);
                    for y in y0..y0 + h {
                        for x in x0..x0 + w {
                            frame.set(x, y, *value);
                        }
                    }
                }
                Sprite::Ball { center, radius } => {
                    let (cx, cy) = (center.x.round() as i32, center.y.round() as i32);
                    let r = radius.round() as i32;
                    for dy in -r..=r {
                        for dx in -r..=r {
                            if dx * dx + dy * dy <= r * r {
                                frame.set(cx + dx, cy + dy, self.style.ball);
                            }
                        }
                    }
                }
            }
        }

        if self.style.noise_std > 0.0 {
            if let Ok(normal) = Normal::new(0.0, self.style.noise_std) {
                for px in frame.pixels.iter_mut() {
                    let noisy = *px as f64 + normal.sample(&mut self.rng);
                    *px = noisy.round().clamp(0.0, 255.0) as u8;
                }
            }
        }

        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{BallTruth, PlayerTruth};
    use crate::rig::StadiumRig;
    use nalgebra::{Point2, Point3, Vector2, Vector3};
    use pitchview_core::FieldConfig;

    fn world(ball: Point3<f64>, players: Vec<PlayerTruth>) -> WorldState {
        WorldState {
            frame: 3,
            time_sec: 0.12,
            ball: BallTruth {
                position: ball,
                velocity: Vector3::zeros(),
                carrier: None,
            },
            players,
        }
    }

    #[test]
    fn test_ball_drawn_at_ground_truth() {
        let rig = StadiumRig::broadcast(1, 960, 540, FieldConfig::default()).unwrap();
        let camera = &rig.cameras()[0];
        let mut renderer = Renderer::new(RenderStyle::default(), 1);

        let frame = renderer.render(camera, &world(Point3::new(52.5, 34.0, BALL_RADIUS), Vec::new()));
        assert_eq!(frame.index, 3);
        let gt = frame.ground_truth.unwrap();
        let (x, y) = (gt.x.round() as i32, gt.y.round() as i32);
        assert_eq!(frame.at(x, y), Some(255));
        assert_eq!(frame.at(0, 0), Some(60));
    }

    #[test]
    fn test_player_box_is_team_shaded() {
        let rig = StadiumRig::broadcast(1, 960, 540, FieldConfig::default()).unwrap();
        let camera = &rig.cameras()[0];
        let mut renderer = Renderer::new(RenderStyle::default(), 1);
        let player = PlayerTruth {
            id: 0,
            position: Point2::new(40.0, 30.0),
            velocity: Vector2::zeros(),
            team: TeamLabel::Away,
        };

        let frame = renderer.render(camera, &world(Point3::new(80.0, 60.0, BALL_RADIUS), vec![player]));
        let torso = camera.project(&Point3::new(40.0, 30.0, 0.9)).unwrap();
        assert_eq!(frame.at(torso.x.round() as i32, torso.y.round() as i32), Some(140));
    }

    #[test]
    fn test_ball_outside_view_has_no_ground_truth() {
        let rig = StadiumRig::broadcast(1, 960, 540, FieldConfig::default()).unwrap();
        let mut renderer = Renderer::new(RenderStyle::default(), 1);
        let frame = renderer.render(&rig.cameras()[0], &world(Point3::new(52.5, -30.0, 0.11), Vec::new()));
        assert!(frame.ground_truth.is_none());
    }
}
