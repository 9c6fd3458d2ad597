//! Planar geometry helpers: homography projection, point-to-rectangle
//! distance and perspective window scaling.

use nalgebra::{Matrix3, Point2, Vector2, Vector3};
use pitchview_env::{Pixel, Rect};

/// Projects a point through a 3×3 homography.
///
/// Returns `None` when the point maps to infinity (w ≈ 0).
pub fn project(h: &Matrix3<f64>, p: &Point2<f64>) -> Option<Point2<f64>> {
    let v = h * Vector3::new(p.x, p.y, 1.0);
    if v.z.abs() < 1e-12 {
        return None;
    }
    Some(Point2::new(v.x / v.z, v.y / v.z))
}

/// Projects the four corners of a rectangle (clockwise from the top-left).
pub fn project_rect(h: &Matrix3<f64>, rect: &Rect) -> Option<[Point2<f64>; 4]> {
    let corners = [
        Point2::new(rect.x as f64, rect.y as f64),
        Point2::new(rect.right() as f64, rect.y as f64),
        Point2::new(rect.right() as f64, rect.bottom() as f64),
        Point2::new(rect.x as f64, rect.bottom() as f64),
    ];
    Some([
        project(h, &corners[0])?,
        project(h, &corners[1])?,
        project(h, &corners[2])?,
        project(h, &corners[3])?,
    ])
}

/// Euclidean distance from a point to the closest corner or side of a
/// rectangle; 0 when the point is inside.
pub fn point_rect_distance(p: &Pixel, rect: &Rect) -> f64 {
    let dx = if p.x < rect.x as f64 {
        rect.x as f64 - p.x
    } else if p.x > rect.right() as f64 {
        p.x - rect.right() as f64
    } else {
        0.0
    };
    let dy = if p.y < rect.y as f64 {
        rect.y as f64 - p.y
    } else if p.y > rect.bottom() as f64 {
        p.y - rect.bottom() as f64
    } else {
        0.0
    };
    (dx * dx + dy * dy).sqrt()
}

/// Scale factor for a window at image row `y`.
///
/// Rows near the top of the frame are further away, so windows shrink to
/// `ratio` there and grow linearly to full size at the bottom row.
pub fn perspective_scale(ratio: f64, y: f64, frame_height: f64) -> f64 {
    if frame_height <= 0.0 {
        return 1.0;
    }
    let d = y / frame_height;
    ratio + (1.0 - ratio) * d
}

/// Scales a window half-size by [`perspective_scale`], truncating to whole
/// pixels.
pub fn perspective_radius(base: Vector2<f64>, ratio: f64, y: f64, frame_height: f64) -> Vector2<f64> {
    let scale = perspective_scale(ratio, y, frame_height);
    Vector2::new((scale * base.x).trunc(), (scale * base.y).trunc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_project_identity_and_translation() {
        let mut h = Matrix3::identity();
        assert_eq!(project(&h, &Point2::new(3.0, 4.0)), Some(Point2::new(3.0, 4.0)));

        h[(0, 2)] = 10.0;
        h[(1, 2)] = -2.0;
        assert_eq!(project(&h, &Point2::new(3.0, 4.0)), Some(Point2::new(13.0, 2.0)));
    }

    #[test]
    fn test_project_at_infinity() {
        let h = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, -1.0);
        assert!(project(&h, &Point2::new(1.0, 5.0)).is_none());
    }

    #[test]
    fn test_project_rect_corners() {
        let h = Matrix3::new_scaling(2.0);
        let mut h = h;
        h[(2, 2)] = 1.0;
        let quad = project_rect(&h, &Rect::new(1, 1, 2, 3)).unwrap();
        assert_eq!(quad[0], Point2::new(2.0, 2.0));
        assert_eq!(quad[2], Point2::new(6.0, 8.0));
    }

    #[test]
    fn test_point_rect_distance() {
        let r = Rect::new(10, 10, 20, 10);
        assert_eq!(point_rect_distance(&Pixel::new(15.0, 15.0), &r), 0.0);
        assert_eq!(point_rect_distance(&Pixel::new(5.0, 15.0), &r), 5.0);
        assert_eq!(point_rect_distance(&Pixel::new(15.0, 24.0), &r), 4.0);
        // Nearest corner (30, 20)
        assert_relative_eq!(point_rect_distance(&Pixel::new(33.0, 24.0), &r), 5.0);
    }

    #[test]
    fn test_perspective_scaling() {
        assert_relative_eq!(perspective_scale(0.5, 0.0, 100.0), 0.5);
        assert_relative_eq!(perspective_scale(0.5, 100.0, 100.0), 1.0);
        assert_relative_eq!(perspective_scale(0.5, 50.0, 100.0), 0.75);

        let r = perspective_radius(Vector2::new(45.0, 35.0), 0.5, 50.0, 100.0);
        assert_eq!(r, Vector2::new(33.0, 26.0));
    }
}
