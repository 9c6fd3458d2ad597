//! Ground truth oracle for the synthetic stadium.
//!
//! The Oracle owns the true state of the match:
//! - Ball kinematics (rolling with friction, ballistic flight with bounces,
//!   or carried by a player)
//! - Players wandering the pitch with seeded velocity jitter
//!
//! Every source of randomness derives from one physics seed, so the same
//! seed always replays the same match.

use nalgebra::{Point2, Point3, Vector2, Vector3};
use pitchview_env::TeamLabel;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Ball radius in metres.
pub const BALL_RADIUS: f64 = 0.11;

/// Rendered player height in metres.
pub const PLAYER_HEIGHT: f64 = 1.8;

const MAX_PLAYER_SPEED: f64 = 7.0;

/// True ball state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallTruth {
    /// Centre of the ball in field metres (z up)
    pub position: Point3<f64>,
    pub velocity: Vector3<f64>,

    /// Player currently dribbling the ball
    pub carrier: Option<u64>,
}

impl BallTruth {
    pub fn is_airborne(&self) -> bool {
        self.position.z > BALL_RADIUS + 1e-9 || self.velocity.z > 0.0
    }
}

/// True player state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerTruth {
    pub id: u64,

    /// Feet position on the ground in metres
    pub position: Point2<f64>,
    pub velocity: Vector2<f64>,
    pub team: TeamLabel,
}

/// Everything true at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub frame: u64,
    pub time_sec: f64,
    pub ball: BallTruth,
    pub players: Vec<PlayerTruth>,
}

/// The Oracle - maintains ground truth and advances the physics.
pub struct Oracle {
    /// Master seed for the physics
    physics_seed: u64,

    physics_rng: ChaCha8Rng,

    ball: BallTruth,
    players: Vec<PlayerTruth>,
    next_id: u64,

    /// Current simulation time (seconds)
    current_time: f64,

    gravity: f64,

    /// Fraction of vertical speed kept after a bounce
    restitution: f64,

    /// Fraction of rolling speed lost per second
    rolling_friction: f64,

    /// Standard deviation of player acceleration noise (m/s²)
    player_jitter_std: f64,

    field_max: Point2<f64>,
}

impl Oracle {
    pub fn new(physics_seed: u64) -> Self {
        Self {
            physics_seed,
            physics_rng: ChaCha8Rng::seed_from_u64(physics_seed),
            ball: BallTruth {
                position: Point3::new(52.5, 34.0, BALL_RADIUS),
                velocity: Vector3::zeros(),
                carrier: None,
            },
            players: Vec::new(),
            next_id: 0,
            current_time: 0.0,
            gravity: 9.81,
            restitution: 0.5,
            rolling_friction: 0.3,
            player_jitter_std: 1.5,
            field_max: Point2::new(105.0, 68.0),
        }
    }

    pub fn seed(&self) -> u64 {
        self.physics_seed
    }

    pub fn set_player_jitter(&mut self, std_dev: f64) {
        self.player_jitter_std = std_dev;
    }

    /// Places the ball. A position below the ground is lifted onto it.
    pub fn place_ball(&mut self, position: Point3<f64>, velocity: Vector3<f64>) {
        self.ball = BallTruth {
            position: Point3::new(position.x, position.y, position.z.max(BALL_RADIUS)),
            velocity,
            carrier: None,
        };
    }

    /// Releases the ball from any carrier with the given velocity.
    pub fn kick(&mut self, velocity: Vector3<f64>) {
        self.ball.carrier = None;
        self.ball.velocity = velocity;
    }

    /// Hands the ball to a player who then dribbles it.
    pub fn give_ball(&mut self, player: u64) -> bool {
        if self.players.iter().any(|p| p.id == player) {
            self.ball.carrier = Some(player);
            true
        } else {
            false
        }
    }

    /// Spawns a player and returns its id.
    pub fn spawn_player(&mut self, position: Point2<f64>, velocity: Vector2<f64>, team: TeamLabel) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.players.push(PlayerTruth {
            id,
            position,
            velocity,
            team,
        });
        id
    }

    pub fn time(&self) -> f64 {
        self.current_time
    }

    pub fn ball(&self) -> &BallTruth {
        &self.ball
    }

    pub fn players(&self) -> &[PlayerTruth] {
        &self.players
    }

    pub fn player(&self, id: u64) -> Option<&PlayerTruth> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Advances physics by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        self.current_time += dt;
        self.step_players(dt);
        self.step_ball(dt);
    }

    /// Current truth, labelled with a frame index.
    pub fn state(&self, frame: u64) -> WorldState {
        WorldState {
            frame,
            time_sec: self.current_time,
            ball: self.ball,
            players: self.players.clone(),
        }
    }

    fn step_players(&mut self, dt: f64) {
        let noise = Normal::new(0.0, self.player_jitter_std).ok();
        let max = self.field_max;

        for player in &mut self.players {
            if let Some(normal) = &noise {
                player.velocity.x += normal.sample(&mut self.physics_rng) * dt;
                player.velocity.y += normal.sample(&mut self.physics_rng) * dt;
            }
            let speed = player.velocity.norm();
            if speed > MAX_PLAYER_SPEED {
                player.velocity *= MAX_PLAYER_SPEED / speed;
            }

            player.position += player.velocity * dt;

            // Reflect off the touchlines
            if player.position.x < 0.0 || player.position.x > max.x {
                player.velocity.x = -player.velocity.x;
                player.position.x = player.position.x.clamp(0.0, max.x);
            }
            if player.position.y < 0.0 || player.position.y > max.y {
                player.velocity.y = -player.velocity.y;
                player.position.y = player.position.y.clamp(0.0, max.y);
            }
        }
    }

    fn step_ball(&mut self, dt: f64) {
        if let Some(carrier) = self.ball.carrier.and_then(|id| self.player(id)).copied() {
            let heading = if carrier.velocity.norm() > 1e-6 {
                carrier.velocity.normalize()
            } else {
                Vector2::x()
            };
            let at = carrier.position + heading * 0.6;
            self.ball.position = Point3::new(at.x, at.y, BALL_RADIUS);
            self.ball.velocity = Vector3::new(carrier.velocity.x, carrier.velocity.y, 0.0);
            return;
        }

        let ball = &mut self.ball;
        if ball.is_airborne() {
            ball.velocity.z -= self.gravity * dt;
            ball.position += ball.velocity * dt;
            if ball.position.z < BALL_RADIUS {
                ball.position.z = BALL_RADIUS;
                ball.velocity.z = -ball.velocity.z * self.restitution;
                if ball.velocity.z < 0.5 {
                    ball.velocity.z = 0.0;
                }
            }
        } else {
            let keep = (1.0 - self.rolling_friction * dt).max(0.0);
            ball.velocity.x *= keep;
            ball.velocity.y *= keep;
            ball.position += ball.velocity * dt;
        }
    }
}
