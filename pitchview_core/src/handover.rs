//! Handover regions.
//!
//! When no view holds a confirmed ball, fusion extrapolates the last
//! committed positions one step ahead. If that point falls inside a
//! configured region, only the region's preferred views may claim the
//! ball on the next round.

use std::collections::BTreeSet;

use nalgebra::{Point2, Point3};
use pitchview_env::ViewId;
use serde::{Deserialize, Serialize};

/// Axis-aligned field area (metres) covered best by some set of views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoverRegion {
    pub name: String,
    pub min: Point2<f64>,
    pub max: Point2<f64>,
    pub preferred_views: BTreeSet<ViewId>,
}

impl HandoverRegion {
    pub fn new(name: impl Into<String>, min: Point2<f64>, max: Point2<f64>, views: &[ViewId]) -> Self {
        Self {
            name: name.into(),
            min,
            max,
            preferred_views: views.iter().copied().collect(),
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min.x && x <= self.max.x && y >= self.min.y && y <= self.max.y
    }
}

/// One-step linear extrapolation of a committed trajectory.
pub fn extrapolate(trajectory: &[Point3<f64>]) -> Option<Point3<f64>> {
    match trajectory {
        [.., prev, last] => Some(last + (last - prev)),
        _ => None,
    }
}

/// First region containing the extrapolated ball position.
pub fn predict_region<'a>(
    regions: &'a [HandoverRegion],
    trajectory: &[Point3<f64>],
) -> Option<&'a HandoverRegion> {
    let next = extrapolate(trajectory)?;
    regions.iter().find(|r| r.contains(next.x, next.y))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regions() -> Vec<HandoverRegion> {
        vec![
            HandoverRegion::new("left", Point2::new(0.0, 0.0), Point2::new(30.0, 68.0), &[ViewId(0), ViewId(1)]),
            HandoverRegion::new("right", Point2::new(75.0, 0.0), Point2::new(105.0, 68.0), &[ViewId(2)]),
        ]
    }

    #[test]
    fn test_extrapolate_needs_two_points() {
        assert!(extrapolate(&[]).is_none());
        assert!(extrapolate(&[Point3::new(1.0, 1.0, 0.0)]).is_none());
        let next = extrapolate(&[Point3::new(1.0, 1.0, 0.0), Point3::new(2.0, 3.0, 1.0)]).unwrap();
        assert_eq!(next, Point3::new(3.0, 5.0, 2.0));
    }

    #[test]
    fn test_predict_region_follows_direction() {
        let regions = regions();
        let towards_right = [Point3::new(70.0, 30.0, 0.0), Point3::new(73.0, 30.0, 0.0)];
        let region = predict_region(&regions, &towards_right).unwrap();
        assert_eq!(region.name, "right");
        assert!(region.preferred_views.contains(&ViewId(2)));

        let midfield = [Point3::new(50.0, 30.0, 0.0), Point3::new(51.0, 30.0, 0.0)];
        assert!(predict_region(&regions, &midfield).is_none());
    }

    #[test]
    fn test_region_serde() {
        let json = serde_json::to_string(&regions()[0]).unwrap();
        let back: HandoverRegion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, regions()[0]);
    }
}
