//! Deterministic path oracles for tests and headless runs.
//!
//! * [`StraightLineOracle`] – every query succeeds with a two-point polyline
//!   and every point is on the surface.
//! * [`ScriptedOracle`] – returns a scripted polyline and status regardless
//!   of the requested endpoints.  The script can be swapped at any time
//!   through a shared [`Arc`][std::sync::Arc] handle, which lets a test move
//!   the "path" under a running tracker.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use wayfind_spatial::path::{PathQuery, PathStatus};
//! use wayfind_spatial::sim::ScriptedOracle;
//! use wayfind_types::Vec3;
//!
//! let oracle = Arc::new(ScriptedOracle::new(
//!     vec![Vec3::zero(), Vec3::new(5.0, 0.0, 0.0)],
//!     PathStatus::Complete,
//! ));
//! oracle.set_status(PathStatus::Unreachable);
//! let result = oracle.query_path(Vec3::zero(), Vec3::new(5.0, 0.0, 0.0));
//! assert_eq!(result.status, PathStatus::Unreachable);
//! ```

use std::sync::Mutex;

use wayfind_types::Vec3;

use crate::path::{PathQuery, PathQueryResult, PathStatus};

// ────────────────────────────────────────────────────────────────────────────
// Straight line
// ────────────────────────────────────────────────────────────────────────────

/// An unobstructed open plane.
#[derive(Debug, Clone, Copy, Default)]
pub struct StraightLineOracle;

impl PathQuery for StraightLineOracle {
    fn query_path(&self, start: Vec3, end: Vec3) -> PathQueryResult {
        PathQueryResult::new(vec![start, end], PathStatus::Complete)
    }

    fn sample_navigable(&self, point: Vec3, _radius: f32) -> Option<Vec3> {
        Some(point)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Scripted
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Script {
    waypoints: Vec<Vec3>,
    status: PathStatus,
}

/// An oracle that replays a fixed polyline.
#[derive(Debug)]
pub struct ScriptedOracle {
    script: Mutex<Script>,
    surface: bool,
}

impl ScriptedOracle {
    pub fn new(waypoints: Vec<Vec3>, status: PathStatus) -> Self {
        Self {
            script: Mutex::new(Script { waypoints, status }),
            surface: true,
        }
    }

    /// When `false`, `sample_navigable` never finds the surface.
    pub fn with_surface(mut self, surface: bool) -> Self {
        self.surface = surface;
        self
    }

    /// Replace the scripted polyline and status.
    pub fn set_route(&self, waypoints: Vec<Vec3>, status: PathStatus) {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        script.waypoints = waypoints;
        script.status = status;
    }

    pub fn set_status(&self, status: PathStatus) {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).status = status;
    }
}

impl PathQuery for ScriptedOracle {
    fn query_path(&self, _start: Vec3, _end: Vec3) -> PathQueryResult {
        let script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        match script.status {
            PathStatus::Unreachable => PathQueryResult::unreachable(),
            status => PathQueryResult::new(script.waypoints.clone(), status),
        }
    }

    fn sample_navigable(&self, point: Vec3, _radius: f32) -> Option<Vec3> {
        self.surface.then_some(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_returns_both_endpoints() {
        let a = Vec3::zero();
        let b = Vec3::new(1.0, 0.0, 1.0);
        let result = StraightLineOracle.query_path(a, b);
        assert_eq!(result.waypoints, vec![a, b]);
        assert_eq!(result.status, PathStatus::Complete);
    }

    #[test]
    fn scripted_route_can_be_replaced() {
        let oracle = ScriptedOracle::new(vec![Vec3::zero()], PathStatus::Complete);
        oracle.set_route(
            vec![Vec3::zero(), Vec3::new(2.0, 0.0, 0.0)],
            PathStatus::Partial,
        );
        let result = oracle.query_path(Vec3::zero(), Vec3::zero());
        assert_eq!(result.waypoints.len(), 2);
        assert_eq!(result.status, PathStatus::Partial);
    }

    #[test]
    fn unreachable_script_returns_no_waypoints() {
        let oracle = ScriptedOracle::new(vec![Vec3::zero()], PathStatus::Unreachable);
        assert!(oracle.query_path(Vec3::zero(), Vec3::zero()).waypoints.is_empty());
    }
}
