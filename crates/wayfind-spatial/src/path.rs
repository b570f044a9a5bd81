//! Path query contract and polyline helpers.
//!
//! A [`PathQuery`] answers two questions about a navigable surface:
//!
//! * `query_path(start, end)` – an ordered polyline of waypoints (corners)
//!   plus a [`PathStatus`].
//! * `sample_navigable(point, radius)` – the nearest point on the surface
//!   within `radius`, if any.
//!
//! Implementations must be deterministic for a given surface snapshot so the
//! tracker can be tested against a fake oracle.
//!
//! # Example
//!
//! ```rust
//! use wayfind_spatial::path::{optimal_length, PathQuery};
//! use wayfind_spatial::sim::StraightLineOracle;
//! use wayfind_types::Vec3;
//!
//! let oracle = StraightLineOracle;
//! let len = optimal_length(&oracle, Vec3::zero(), Vec3::new(3.0, 0.0, 4.0));
//! assert!((len - 5.0).abs() < 1e-5);
//! ```

use std::sync::Arc;

use wayfind_types::Vec3;

// ────────────────────────────────────────────────────────────────────────────
// Query result
// ────────────────────────────────────────────────────────────────────────────

/// Outcome of a path query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStatus {
    /// The polyline ends at the requested target.
    Complete,
    /// A polyline was found but ends short of the target.
    Partial,
    /// No polyline could be produced.
    Unreachable,
}

/// A polyline of waypoints and its [`PathStatus`].  Ephemeral: recomputed on
/// demand and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PathQueryResult {
    pub waypoints: Vec<Vec3>,
    pub status: PathStatus,
}

impl PathQueryResult {
    pub fn new(waypoints: Vec<Vec3>, status: PathStatus) -> Self {
        Self { waypoints, status }
    }

    pub fn unreachable() -> Self {
        Self::new(Vec::new(), PathStatus::Unreachable)
    }

    /// `true` when the query produced a usable polyline (at least two
    /// waypoints and not [`PathStatus::Unreachable`]).
    pub fn has_route(&self) -> bool {
        self.status != PathStatus::Unreachable && self.waypoints.len() >= 2
    }

    /// Cumulative Euclidean length of the polyline.
    pub fn length(&self) -> f32 {
        polyline_length(&self.waypoints)
    }

    /// Polyline length when there is a usable route, otherwise the
    /// straight-line distance from `start` to `end`.
    pub fn length_or_straight(&self, start: Vec3, end: Vec3) -> f32 {
        if self.has_route() {
            self.length()
        } else {
            start.distance(end)
        }
    }

    /// Minimum distance from `point` to any waypoint, or `None` when the
    /// polyline is empty.
    pub fn min_distance_to(&self, point: Vec3) -> Option<f32> {
        min_waypoint_distance(point, &self.waypoints)
    }

    /// Distance between the last waypoint and `target`.
    pub fn end_gap(&self, target: Vec3) -> Option<f32> {
        self.waypoints.last().map(|end| end.distance(target))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PathQuery trait
// ────────────────────────────────────────────────────────────────────────────

/// The navigable-surface oracle consumed by the route tracker.
pub trait PathQuery: Send + Sync {
    /// Compute a polyline from `start` to `end`.
    fn query_path(&self, start: Vec3, end: Vec3) -> PathQueryResult;

    /// Nearest point on the navigable surface within `radius` of `point`.
    fn sample_navigable(&self, point: Vec3, radius: f32) -> Option<Vec3>;
}

impl<T: PathQuery + ?Sized> PathQuery for Arc<T> {
    fn query_path(&self, start: Vec3, end: Vec3) -> PathQueryResult {
        (**self).query_path(start, end)
    }

    fn sample_navigable(&self, point: Vec3, radius: f32) -> Option<Vec3> {
        (**self).sample_navigable(point, radius)
    }
}

impl<T: PathQuery + ?Sized> PathQuery for Box<T> {
    fn query_path(&self, start: Vec3, end: Vec3) -> PathQueryResult {
        (**self).query_path(start, end)
    }

    fn sample_navigable(&self, point: Vec3, radius: f32) -> Option<Vec3> {
        (**self).sample_navigable(point, radius)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

/// Sum of segment lengths of `points`.  Zero for fewer than two points.
pub fn polyline_length(points: &[Vec3]) -> f32 {
    points.windows(2).map(|w| w[0].distance(w[1])).sum()
}

/// Minimum distance from `point` to any of `waypoints`.
pub fn min_waypoint_distance(point: Vec3, waypoints: &[Vec3]) -> Option<f32> {
    waypoints
        .iter()
        .map(|w| point.distance(*w))
        .min_by(|a, b| a.total_cmp(b))
}

/// Optimal path length from `start` to `end`.
///
/// Uses the polyline length of a complete or partial query with at least two
/// waypoints; otherwise falls back to the straight-line distance.
pub fn optimal_length(query: &dyn PathQuery, start: Vec3, end: Vec3) -> f32 {
    query.query_path(start, end).length_or_straight(start, end)
}

/// Snap `point` onto the navigable surface, trying each radius in turn.
///
/// Returns the unmodified point when no radius yields a sample.
pub fn snap_to_surface(query: &dyn PathQuery, point: Vec3, radii: &[f32]) -> Vec3 {
    radii
        .iter()
        .find_map(|r| query.sample_navigable(point, *r))
        .unwrap_or(point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::ScriptedOracle;

    #[test]
    fn polyline_length_sums_segments() {
        let pts = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(3.0, 0.0, 0.0),
            Vec3::new(3.0, 0.0, 4.0),
        ];
        assert!((polyline_length(&pts) - 7.0).abs() < 1e-5);
        assert_eq!(polyline_length(&pts[..1]), 0.0);
        assert_eq!(polyline_length(&[]), 0.0);
    }

    #[test]
    fn min_waypoint_distance_picks_closest() {
        let pts = [Vec3::new(0.0, 0.0, 0.0), Vec3::new(10.0, 0.0, 0.0)];
        let d = min_waypoint_distance(Vec3::new(9.0, 0.0, 0.0), &pts).unwrap();
        assert!((d - 1.0).abs() < 1e-5);
        assert!(min_waypoint_distance(Vec3::zero(), &[]).is_none());
    }

    #[test]
    fn optimal_length_uses_polyline_when_available() {
        let oracle = ScriptedOracle::new(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 6.0),
                Vec3::new(8.0, 0.0, 6.0),
            ],
            PathStatus::Partial,
        );
        let len = optimal_length(&oracle, Vec3::zero(), Vec3::new(8.0, 0.0, 6.0));
        assert!((len - 14.0).abs() < 1e-5);
    }

    #[test]
    fn optimal_length_falls_back_to_straight_line() {
        let target = Vec3::new(8.0, 0.0, 6.0);

        let failed = ScriptedOracle::new(Vec::new(), PathStatus::Unreachable);
        assert!((optimal_length(&failed, Vec3::zero(), target) - 10.0).abs() < 1e-5);

        let single = ScriptedOracle::new(vec![Vec3::zero()], PathStatus::Complete);
        assert!((optimal_length(&single, Vec3::zero(), target) - 10.0).abs() < 1e-5);
    }

    #[test]
    fn snap_to_surface_keeps_point_when_nothing_sampled() {
        let oracle = ScriptedOracle::new(Vec::new(), PathStatus::Unreachable).with_surface(false);
        let p = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(snap_to_surface(&oracle, p, &[0.5, 5.0]), p);
    }

    #[test]
    fn end_gap_measures_last_waypoint() {
        let result = PathQueryResult::new(
            vec![Vec3::zero(), Vec3::new(4.0, 0.0, 0.0)],
            PathStatus::Partial,
        );
        let gap = result.end_gap(Vec3::new(7.0, 0.0, 0.0)).unwrap();
        assert!((gap - 3.0).abs() < 1e-5);
        assert!(PathQueryResult::unreachable().end_gap(Vec3::zero()).is_none());
    }
}
