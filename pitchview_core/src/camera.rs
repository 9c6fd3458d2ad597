//! Static camera calibration.

use nalgebra::{Matrix3, Point2, Point3, Vector2};
use pitchview_env::{Pixel, ViewId};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, FieldConfig};
use crate::geometry::{perspective_radius, project};

/// Calibration of one camera, as supplied by the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub view: usize,

    /// Image → top-down plan homography
    pub homography: Matrix3<f64>,

    /// Camera centre in field metres (z up)
    pub position: Point3<f64>,

    pub frame_width: u32,
    pub frame_height: u32,

    /// Frames arrive mirrored left-right
    #[serde(default)]
    pub flip_view: bool,

    /// The homography targets the plan rotated by 180°
    #[serde(default)]
    pub flip_projection: bool,

    /// Hue interval of the field colour, used by colour-based segmenters
    #[serde(default)]
    pub hue_range: (f64, f64),

    /// Smallest and largest ball template radius in pixels
    #[serde(default = "default_template_radii")]
    pub template_radii: (u32, u32),

    /// Window scale at the top image row (1.0 = no perspective)
    #[serde(default = "default_perspective_ratio")]
    pub perspective_ratio: f64,
}

fn default_template_radii() -> (u32, u32) {
    (3, 6)
}

fn default_perspective_ratio() -> f64 {
    1.0
}

/// A calibrated camera view. Read-only after setup.
#[derive(Debug, Clone)]
pub struct Camera {
    view: ViewId,
    homography: Matrix3<f64>,
    inverse: Matrix3<f64>,
    position: Point3<f64>,
    frame_width: u32,
    frame_height: u32,
    flip_view: bool,
    flip_projection: bool,
    hue_range: (f64, f64),
    template_radii: (u32, u32),
    perspective_ratio: f64,
    field: FieldConfig,
}

impl Camera {
    pub fn new(config: CameraConfig, field: &FieldConfig) -> Result<Self, ConfigError> {
        let view = ViewId(config.view);
        let inverse = config
            .homography
            .try_inverse()
            .ok_or_else(|| ConfigError::SingularHomography(view.to_string()))?;
        if config.frame_width == 0 || config.frame_height == 0 {
            return Err(ConfigError::invalid("frame_width", config.frame_width as f64));
        }
        Ok(Self {
            view,
            homography: config.homography,
            inverse,
            position: config.position,
            frame_width: config.frame_width,
            frame_height: config.frame_height,
            flip_view: config.flip_view,
            flip_projection: config.flip_projection,
            hue_range: config.hue_range,
            template_radii: config.template_radii,
            perspective_ratio: config.perspective_ratio,
            field: field.clone(),
        })
    }

    pub fn view(&self) -> ViewId {
        self.view
    }

    pub fn position(&self) -> Point3<f64> {
        self.position
    }

    pub fn homography(&self) -> &Matrix3<f64> {
        &self.homography
    }

    pub fn frame_size(&self) -> (u32, u32) {
        (self.frame_width, self.frame_height)
    }

    pub fn hue_range(&self) -> (f64, f64) {
        self.hue_range
    }

    pub fn template_radii(&self) -> (u32, u32) {
        self.template_radii
    }

    pub fn perspective_ratio(&self) -> f64 {
        self.perspective_ratio
    }

    pub fn field(&self) -> &FieldConfig {
        &self.field
    }

    /// Image pixel → plan pixel.
    pub fn image_to_plan(&self, p: &Pixel) -> Option<Point2<f64>> {
        let p = if self.flip_view {
            Point2::new(self.frame_width as f64 - p.x, p.y)
        } else {
            *p
        };
        let plan = project(&self.homography, &p)?;
        Some(self.flip_plan(plan))
    }

    /// Plan pixel → image pixel.
    pub fn plan_to_image(&self, plan: &Point2<f64>) -> Option<Pixel> {
        let plan = self.flip_plan(*plan);
        let p = project(&self.inverse, &plan)?;
        if self.flip_view {
            Some(Pixel::new(self.frame_width as f64 - p.x, p.y))
        } else {
            Some(p)
        }
    }

    /// Image pixel → ground point in metres.
    pub fn image_to_ground(&self, p: &Pixel) -> Option<Point2<f64>> {
        self.image_to_plan(p).map(|plan| self.field.to_metric(&plan))
    }

    /// Ground point in metres → image pixel.
    pub fn ground_to_image(&self, ground: &Point2<f64>) -> Option<Pixel> {
        self.plan_to_image(&self.field.to_plan(ground))
    }

    /// Window half-size scaled for image row `y`.
    pub fn scaled_radius(&self, base: Vector2<f64>, y: f64, gain: f64) -> Vector2<f64> {
        perspective_radius(
            base,
            self.perspective_ratio * gain,
            y,
            self.frame_height as f64,
        )
    }

    fn flip_plan(&self, plan: Point2<f64>) -> Point2<f64> {
        if self.flip_projection {
            let size = self.field.plan_size();
            Point2::new(size.x - plan.x, size.y - plan.y)
        } else {
            plan
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn config(homography: Matrix3<f64>) -> CameraConfig {
        CameraConfig {
            view: 0,
            homography,
            position: Point3::new(50.0, -20.0, 15.0),
            frame_width: 640,
            frame_height: 360,
            flip_view: false,
            flip_projection: false,
            hue_range: (35.0, 85.0),
            template_radii: (3, 6),
            perspective_ratio: 0.5,
        }
    }

    #[test]
    fn test_singular_homography_rejected() {
        let err = Camera::new(config(Matrix3::zeros()), &FieldConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::SingularHomography(_)));
    }

    #[test]
    fn test_round_trip_through_plan() {
        let h = Matrix3::new(2.0, 0.1, 5.0, 0.0, 1.5, -3.0, 0.0, 0.0005, 1.0);
        let cam = Camera::new(config(h), &FieldConfig::default()).unwrap();
        let p = Pixel::new(120.0, 80.0);
        let back = cam.plan_to_image(&cam.image_to_plan(&p).unwrap()).unwrap();
        assert_relative_eq!(back.x, p.x, epsilon = 1e-9);
        assert_relative_eq!(back.y, p.y, epsilon = 1e-9);
    }

    #[test]
    fn test_flips_round_trip() {
        let mut c = config(Matrix3::identity());
        c.flip_view = true;
        c.flip_projection = true;
        let cam = Camera::new(c, &FieldConfig::default()).unwrap();
        let p = Pixel::new(100.0, 50.0);
        let plan = cam.image_to_plan(&p).unwrap();
        assert_relative_eq!(plan.x, cam.field().plan_size().x - (640.0 - 100.0), epsilon = 1e-9);
        let back = cam.plan_to_image(&plan).unwrap();
        assert_relative_eq!(back.x, 100.0, epsilon = 1e-9);
        assert_relative_eq!(back.y, 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_ground_uses_field_scale() {
        let cam = Camera::new(config(Matrix3::identity()), &FieldConfig::default()).unwrap();
        let g = cam.image_to_ground(&Pixel::new(100.0, 100.0)).unwrap();
        assert_relative_eq!(g.x, 5.464, epsilon = 1e-9);
        assert_relative_eq!(g.y, 6.291, epsilon = 1e-9);
    }

    #[test]
    fn test_scaled_radius_applies_gain() {
        let cam = Camera::new(config(Matrix3::identity()), &FieldConfig::default()).unwrap();
        // ratio 0.5 * gain 1.0 at the top row
        assert_eq!(cam.scaled_radius(Vector2::new(40.0, 20.0), 0.0, 1.0), Vector2::new(20.0, 10.0));
    }
}
