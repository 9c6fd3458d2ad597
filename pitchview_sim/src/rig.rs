//! Synthetic pinhole cameras around the pitch.
//!
//! Each [`SyntheticCamera`] is an ideal pinhole with square pixels and the
//! principal point at the image centre. Because the geometry is known
//! exactly, the image → plan homography handed to the tracking core is
//! derived from the same pose the renderer projects with.

use nalgebra::{Matrix3, Point3, Vector3};
use pitchview_core::{Camera, CameraConfig, FieldConfig};
use pitchview_env::{Pixel, ViewId};

use crate::error::SimError;

/// Points closer than this to the image plane are not projected.
const NEAR_PLANE: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    view: ViewId,
    position: Point3<f64>,

    /// World → camera rotation; rows are right, down and forward
    rotation: Matrix3<f64>,

    focal: f64,
    width: u32,
    height: u32,
}

impl SyntheticCamera {
    /// Camera at `position` looking at `target`, with the horizon level.
    pub fn look_at(
        view: ViewId,
        position: Point3<f64>,
        target: Point3<f64>,
        focal: f64,
        width: u32,
        height: u32,
    ) -> Result<Self, SimError> {
        let forward = (target - position)
            .try_normalize(1e-9)
            .ok_or_else(|| SimError::geometry(format!("{view} looks at its own position")))?;
        let right = forward
            .cross(&Vector3::z())
            .try_normalize(1e-9)
            .ok_or_else(|| SimError::geometry(format!("{view} looks straight up or down")))?;
        let down = forward.cross(&right);
        let rotation = Matrix3::from_rows(&[right.transpose(), down.transpose(), forward.transpose()]);

        Ok(Self {
            view,
            position,
            rotation,
            focal,
            width,
            height,
        })
    }

    pub fn view(&self) -> ViewId {
        self.view
    }

    pub fn position(&self) -> Point3<f64> {
        self.position
    }

    pub fn focal(&self) -> f64 {
        self.focal
    }

    pub fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn intrinsics(&self) -> Matrix3<f64> {
        #[rustfmt::skip]
        let k = Matrix3::new(
            self.focal, 0.0, self.width as f64 / 2.0,
            0.0, self.focal, self.height as f64 / 2.0,
            0.0, 0.0, 1.0,
        );
        k
    }

    /// Distance of `p` along the viewing direction.
    pub fn depth(&self, p: &Point3<f64>) -> f64 {
        (self.rotation * (p - self.position)).z
    }

    /// Image position of a world point, `None` behind the camera.
    pub fn project(&self, p: &Point3<f64>) -> Option<Pixel> {
        let c = self.rotation * (p - self.position);
        if c.z < NEAR_PLANE {
            return None;
        }
        Some(Pixel::new(
            self.focal * c.x / c.z + self.width as f64 / 2.0,
            self.focal * c.y / c.z + self.height as f64 / 2.0,
        ))
    }

    pub fn in_frame(&self, p: &Pixel) -> bool {
        p.x >= 0.0 && p.y >= 0.0 && p.x < self.width as f64 && p.y < self.height as f64
    }

    /// Homography mapping ground points `(x, y, 1)` in metres to pixels.
    pub fn ground_homography(&self) -> Matrix3<f64> {
        let t = -(self.rotation * self.position.coords);
        let mut rt = Matrix3::zeros();
        rt.set_column(0, &self.rotation.column(0));
        rt.set_column(1, &self.rotation.column(1));
        rt.set_column(2, &t);
        self.intrinsics() * rt
    }

    /// Homography mapping pixels to plan pixels of `field`.
    pub fn plan_homography(&self, field: &FieldConfig) -> Result<Matrix3<f64>, SimError> {
        let to_ground = self
            .ground_homography()
            .try_inverse()
            .ok_or_else(|| SimError::geometry(format!("{} sees the ground edge-on", self.view)))?;
        let to_plan = Matrix3::new(
            1.0 / field.scale.x, 0.0, 0.0,
            0.0, 1.0 / field.scale.y, 0.0,
            0.0, 0.0, 1.0,
        );
        Ok(to_plan * to_ground)
    }

    /// Calibration handed to the tracking core.
    pub fn camera_config(&self, field: &FieldConfig) -> Result<CameraConfig, SimError> {
        Ok(CameraConfig {
            view: self.view.index(),
            homography: self.plan_homography(field)?,
            position: self.position,
            frame_width: self.width,
            frame_height: self.height,
            flip_view: false,
            flip_projection: false,
            hue_range: (0.0, 0.0),
            template_radii: (3, 6),
            perspective_ratio: 1.0,
        })
    }
}

/// The set of cameras covering one match.
#[derive(Debug, Clone)]
pub struct StadiumRig {
    cameras: Vec<SyntheticCamera>,
    field: FieldConfig,
}

impl StadiumRig {
    /// Main stand, both goal ends and the opposite stand, in that order.
    /// `views` keeps the first `views` of them (1 to 4).
    pub fn broadcast(views: usize, width: u32, height: u32, field: FieldConfig) -> Result<Self, SimError> {
        let (mx, my) = (field.max.x, field.max.y);
        let (cx, cy) = (mx / 2.0, my / 2.0);
        let focal = width as f64 * 0.44;
        let placements = [
            (Point3::new(cx, -20.0, 15.0), Point3::new(cx, cy, 0.0)),
            (Point3::new(-10.0, cy, 12.0), Point3::new(mx * 0.3, cy, 0.0)),
            (Point3::new(mx + 10.0, cy, 12.0), Point3::new(mx * 0.7, cy, 0.0)),
            (Point3::new(cx, my + 20.0, 15.0), Point3::new(cx, cy, 0.0)),
        ];
        if views == 0 || views > placements.len() {
            return Err(SimError::geometry(format!("unsupported view count {views}")));
        }

        let cameras = placements
            .iter()
            .take(views)
            .enumerate()
            .map(|(i, (pos, target))| SyntheticCamera::look_at(ViewId(i), *pos, *target, focal, width, height))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { cameras, field })
    }

    pub fn cameras(&self) -> &[SyntheticCamera] {
        &self.cameras
    }

    pub fn field(&self) -> &FieldConfig {
        &self.field
    }

    /// Calibrated core cameras, one per synthetic camera.
    pub fn core_cameras(&self) -> Result<Vec<Camera>, SimError> {
        self.cameras
            .iter()
            .map(|c| Ok(Camera::new(c.camera_config(&self.field)?, &self.field)?))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point2;

    fn rig() -> StadiumRig {
        StadiumRig::broadcast(4, 960, 540, FieldConfig::default()).unwrap()
    }

    #[test]
    fn test_target_projects_to_image_centre() {
        let rig = rig();
        let cam = &rig.cameras()[0];
        let centre = cam.project(&Point3::new(52.5, 34.0, 0.0)).unwrap();
        assert_relative_eq!(centre, Pixel::new(480.0, 270.0), epsilon = 1e-9);
    }

    #[test]
    fn test_point_behind_camera_not_projected() {
        let rig = rig();
        let cam = &rig.cameras()[0];
        assert!(cam.project(&Point3::new(52.5, -40.0, 0.0)).is_none());
    }

    #[test]
    fn test_core_camera_inverts_projection() {
        let rig = rig();
        let cameras = rig.core_cameras().unwrap();
        for (synthetic, core) in rig.cameras().iter().zip(&cameras) {
            let ground = Point3::new(40.0, 30.0, 0.0);
            let pixel = synthetic.project(&ground).unwrap();
            let back = core.image_to_ground(&pixel).unwrap();
            assert_relative_eq!(back, Point2::new(40.0, 30.0), epsilon = 1e-6);
            assert_eq!(core.position(), synthetic.position());
        }
    }

    #[test]
    fn test_rejects_bad_geometry() {
        let up = SyntheticCamera::look_at(
            ViewId(0),
            Point3::new(0.0, 0.0, 10.0),
            Point3::new(0.0, 0.0, 0.0),
            400.0,
            640,
            360,
        );
        assert!(matches!(up, Err(SimError::Geometry(_))));
        assert!(StadiumRig::broadcast(5, 960, 540, FieldConfig::default()).is_err());
    }
}
