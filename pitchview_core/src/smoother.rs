//! Linear position smoothing.
//!
//! Every tracked object (ball candidate, player, fused track) owns a small
//! constant-velocity Kalman filter over its 2D position. The filter is
//! the classic predict/correct pair:
//!
//! ```text
//! predict:  x = F x              P = F P Fᵀ + Q
//! correct:  K = P Hᵀ (H P Hᵀ + R)⁻¹
//!           x = x + K (z - H x)  P = (I - K H) P
//! ```
//!
//! with state `[x, y, vx, vy]`, measurement `[x, y]` and a unit time step.

use nalgebra::{Matrix2, Matrix2x4, Matrix4, Matrix4x2, Point2, Vector2, Vector4};
use serde::{Deserialize, Serialize};

use crate::config::SmootherNoise;

/// A stateful per-track position filter.
pub trait PositionSmoother {
    /// Resets the filter to rest at `position`.
    fn initialize(&mut self, position: Point2<f64>);

    /// Advances one step and returns the predicted position.
    fn predict(&mut self) -> Point2<f64>;

    /// Folds in a measurement and returns the corrected position.
    fn correct(&mut self, measurement: Point2<f64>) -> Point2<f64>;

    /// Predict followed by correct.
    fn process(&mut self, measurement: Point2<f64>) -> Point2<f64> {
        self.predict();
        self.correct(measurement)
    }
}

/// Constant-velocity Kalman filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KalmanSmoother {
    state: Vector4<f64>,
    covariance: Matrix4<f64>,
    transition: Matrix4<f64>,
    observation: Matrix2x4<f64>,
    process_noise: Matrix4<f64>,
    measurement_noise: Matrix2<f64>,
    initial_error: f64,
    initialized: bool,
}

impl KalmanSmoother {
    pub fn new(noise: SmootherNoise) -> Self {
        #[rustfmt::skip]
        let transition = Matrix4::new(
            1.0, 0.0, 1.0, 0.0,
            0.0, 1.0, 0.0, 1.0,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );
        #[rustfmt::skip]
        let observation = Matrix2x4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
        );
        Self {
            state: Vector4::zeros(),
            covariance: Matrix4::identity() * noise.error,
            transition,
            observation,
            process_noise: Matrix4::identity() * noise.process,
            measurement_noise: Matrix2::identity() * noise.measurement,
            initial_error: noise.error,
            initialized: false,
        }
    }

    /// Creates a filter already resting at `position`.
    pub fn at(noise: SmootherNoise, position: Point2<f64>) -> Self {
        let mut kf = Self::new(noise);
        kf.initialize(position);
        kf
    }

    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.state[0], self.state[1])
    }

    pub fn velocity(&self) -> Vector2<f64> {
        Vector2::new(self.state[2], self.state[3])
    }

    /// Position one step ahead, without advancing the filter.
    pub fn peek(&self) -> Point2<f64> {
        let next = self.transition * self.state;
        Point2::new(next[0], next[1])
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl PositionSmoother for KalmanSmoother {
    fn initialize(&mut self, position: Point2<f64>) {
        self.state = Vector4::new(position.x, position.y, 0.0, 0.0);
        self.covariance = Matrix4::identity() * self.initial_error;
        self.initialized = true;
    }

    fn predict(&mut self) -> Point2<f64> {
        self.state = self.transition * self.state;
        self.covariance =
            self.transition * self.covariance * self.transition.transpose() + self.process_noise;
        self.position()
    }

    fn correct(&mut self, measurement: Point2<f64>) -> Point2<f64> {
        if !self.initialized {
            self.initialize(measurement);
            return measurement;
        }

        let innovation_cov =
            self.observation * self.covariance * self.observation.transpose() + self.measurement_noise;
        let Some(inv) = innovation_cov.try_inverse() else {
            // Degenerate covariance: keep the prediction
            return self.position();
        };

        let gain: Matrix4x2<f64> = self.covariance * self.observation.transpose() * inv;
        let residual = Vector2::new(measurement.x, measurement.y) - self.observation * self.state;
        self.state += gain * residual;
        self.covariance = (Matrix4::identity() - gain * self.observation) * self.covariance;
        self.position()
    }
}
