//! Ray geometry for cross-view fusion.
//!
//! Each view that reports a ball defines a ray from its camera centre
//! through the ball's ground-plane projection. Two such rays rarely meet
//! exactly; the closest-point-of-approach between them gives both a
//! consistency measure (their separation) and a 3D estimate (the midpoint
//! of the connecting segment).

use nalgebra::{Matrix2, Point2, Point3, Vector2, Vector3};

/// A half-line `origin + t * direction`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Point3<f64>,
    pub direction: Vector3<f64>,
}

impl Ray {
    pub fn new(origin: Point3<f64>, direction: Vector3<f64>) -> Self {
        Self { origin, direction }
    }

    /// Ray from `origin` through `target`.
    pub fn through(origin: Point3<f64>, target: Point3<f64>) -> Self {
        Self::new(origin, target - origin)
    }

    pub fn at(&self, t: f64) -> Point3<f64> {
        self.origin + self.direction * t
    }
}

/// Result of [`closest_approach`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestApproach {
    /// Length of the shortest segment joining the two lines
    pub distance: f64,

    /// End of that segment on the first ray
    pub on_first: Point3<f64>,

    /// End of that segment on the second ray
    pub on_second: Point3<f64>,

    pub midpoint: Point3<f64>,

    /// The rays are parallel (system determinant below epsilon)
    pub degenerate: bool,
}

/// Closest-point-of-approach between two rays.
///
/// With rays `P1 + t·L1` and `P2 + s·L2`, requiring the connecting segment
/// to be perpendicular to both gives
///
/// ```text
/// | L2·L1  -L1·L1 | | s |     | (P2-P1)·L1 |
/// | L2·L2  -L1·L2 | | t | = - | (P2-P1)·L2 |
/// ```
///
/// which is solved by direct inversion. When the determinant is below
/// `epsilon` (relative to `|L1|²|L2|²`) the rays are parallel: the first
/// ray's origin is paired with its projection onto the second line and the
/// result is flagged `degenerate`. Identical rays therefore yield distance
/// 0 with the midpoint on the ray.
pub fn closest_approach(first: &Ray, second: &Ray, epsilon: f64) -> ClosestApproach {
    let (p1, l1) = (first.origin, first.direction);
    let (p2, l2) = (second.origin, second.direction);
    let w = p2 - p1;

    let l1l1 = l1.dot(&l1);
    let l2l2 = l2.dot(&l2);
    let l1l2 = l1.dot(&l2);

    #[rustfmt::skip]
    let system = Matrix2::new(
        l1l2, -l1l1,
        l2l2, -l1l2,
    );
    let rhs = -Vector2::new(w.dot(&l1), w.dot(&l2));

    let det = system.determinant();
    let scale = (l1l1 * l2l2).max(f64::MIN_POSITIVE);
    let solved = if det.abs() / scale < epsilon {
        None
    } else {
        system.try_inverse().map(|inv| inv * rhs)
    };

    let (on_first, on_second, degenerate) = match solved {
        Some(st) => (first.at(st[1]), second.at(st[0]), false),
        None => {
            let s = if l2l2 > 0.0 { (p1 - p2).dot(&l2) / l2l2 } else { 0.0 };
            (p1, second.at(s), true)
        }
    };

    ClosestApproach {
        distance: nalgebra::distance(&on_first, &on_second),
        on_first,
        on_second,
        midpoint: nalgebra::center(&on_first, &on_second),
        degenerate,
    }
}

/// Where the ray from `camera` through `point` meets the ground (z = 0).
///
/// `None` when the ray runs parallel to the ground.
pub fn ground_intersection(camera: &Point3<f64>, point: &Point3<f64>) -> Option<Point2<f64>> {
    let v = point - camera;
    if v.z.abs() < 1e-12 {
        return None;
    }
    let t = camera.z / -v.z;
    Some(Point2::new(camera.x + v.x * t, camera.y + v.y * t))
}

/// A vertical plane `a·x + b·y + d = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerticalPlane {
    pub normal: Vector3<f64>,
    pub d: f64,
}

impl VerticalPlane {
    /// Plane containing the vertical line through `a` and the one through `b`.
    ///
    /// `None` when the two points share the same ground position.
    pub fn through(a: &Point3<f64>, b: &Point3<f64>) -> Option<Self> {
        let ab = b - a;
        if ab.x.abs() < 1e-12 && ab.y.abs() < 1e-12 {
            return None;
        }
        let normal = Vector3::new(-ab.y, ab.x, 0.0);
        let d = -(normal.x * a.x + normal.y * a.y);
        Some(Self { normal, d })
    }

    /// Coefficients `[a, b, c, d]` with `c = 0`.
    pub fn coefficients(&self) -> [f64; 4] {
        [self.normal.x, self.normal.y, 0.0, self.d]
    }

    /// Intersects the ray from `camera` through `target` with the plane.
    pub fn intersect(&self, camera: &Point3<f64>, target: &Point3<f64>) -> Option<Point3<f64>> {
        let (a, b) = (self.normal.x, self.normal.y);
        let dir = target - camera;
        let denom = dir.x * a + dir.y * b;
        if denom.abs() < 1e-12 {
            return None;
        }
        let t = (-self.d - camera.x * a - camera.y * b) / denom;
        Some(camera + dir * t)
    }
}
