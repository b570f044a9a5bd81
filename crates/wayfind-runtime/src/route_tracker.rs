//! [`RouteTracker`] – route computation, arrival and deviation detection.
//!
//! The tracker never touches metrics itself.  Every state change is returned
//! as a [`RouteSignal`] so the owner can finalise, count and publish in one
//! place, in the order the signals were produced.
//!
//! Per tick, while a trip is active:
//!
//! 1. Snap the agent (0.5 m, then 5 m) and the target (0.5 m, then 10 m)
//!    onto the navigable surface and re-query the path between them.
//! 2. `Unreachable` ends the trip ([`TripEnd::Unreachable`]) and stops.
//! 3. **Arrival**: planar distance from the agent to the snapped target
//!    below the arrival radius ends the trip as [`TripEnd::Reached`] and
//!    stops.  Nothing else is evaluated on that tick.
//! 4. **Deviation**: minimum distance from the agent to any waypoint.  Above
//!    the off-path threshold, and not already off path, yields one
//!    [`RouteSignal::Deviation`]; below the recovery threshold clears the
//!    flag.  Values in between change nothing.
//! 5. **Partial path**: a `Partial` status whose last waypoint is further
//!    than the gap threshold from the target warns once per trip.
//! 6. **Remaining distance**: path length for a complete path, otherwise the
//!    planar distance to the target.
//!
//! # Example
//!
//! ```rust
//! use wayfind_runtime::route_tracker::{RouteSignal, RouteTracker, TrackerThresholds};
//! use wayfind_spatial::sim::StraightLineOracle;
//! use wayfind_types::{Destination, TripEnd, Vec3};
//!
//! let mut tracker = RouteTracker::new(Box::new(StraightLineOracle), TrackerThresholds::default());
//! tracker.place_agent(Vec3::zero());
//! tracker
//!     .set_destination(Some(Destination::new("Oficinas", Vec3::new(10.0, 0.0, 0.0))))
//!     .unwrap();
//!
//! let signals = tracker.tick(Vec3::new(9.0, 0.0, 0.0));
//! assert!(matches!(
//!     signals.as_slice(),
//!     [RouteSignal::TripEnded { cause: TripEnd::Reached, .. }]
//! ));
//! ```

use tracing::{debug, error, info, warn};
use wayfind_spatial::path::{snap_to_surface, PathQuery, PathStatus};
use wayfind_types::{Destination, TripEnd, Vec3, WayfindError};

// ─────────────────────────────────────────────────────────────────────────────
// Thresholds
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerThresholds {
    /// Planar distance to the target that counts as arrival.
    pub arrival_radius: f32,
    /// Minimum path distance above which the agent is off path.
    pub off_path: f32,
    /// Minimum path distance below which the agent is back on path.
    pub recovery: f32,
    /// End-of-path gap that makes a partial path worth a warning.
    pub partial_gap: f32,
    /// Radii tried in order when snapping the agent onto the surface.
    pub start_snap_radii: Vec<f32>,
    /// Radii tried in order when snapping the target onto the surface.
    pub target_snap_radii: Vec<f32>,
}

impl Default for TrackerThresholds {
    fn default() -> Self {
        Self {
            arrival_radius: 1.5,
            off_path: 4.0,
            recovery: 2.0,
            partial_gap: 1.0,
            start_snap_radii: vec![0.5, 5.0],
            target_snap_radii: vec![0.5, 10.0],
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Signals
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum RouteSignal {
    TripStarted {
        destination: String,
        optimal_length: f32,
        origin: Vec3,
    },
    TripEnded {
        destination: String,
        cause: TripEnd,
    },
    Deviation {
        min_distance: f32,
    },
    PartialPath {
        destination: String,
        gap_m: f32,
    },
    PathUnavailable {
        destination: String,
    },
}

#[derive(Debug)]
struct ActiveRoute {
    destination: Destination,
    optimal_length: f32,
    off_path: bool,
    partial_logged: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// RouteTracker
// ─────────────────────────────────────────────────────────────────────────────

pub struct RouteTracker {
    query: Box<dyn PathQuery>,
    thresholds: TrackerThresholds,
    active: Option<ActiveRoute>,
    agent_position: Option<Vec3>,
    remaining_distance: f32,
    total_distance: f32,
    current_path: Vec<Vec3>,
}

impl RouteTracker {
    pub fn new(query: Box<dyn PathQuery>, thresholds: TrackerThresholds) -> Self {
        Self {
            query,
            thresholds,
            active: None,
            agent_position: None,
            remaining_distance: 0.0,
            total_distance: 0.0,
            current_path: Vec::new(),
        }
    }

    /// Record where the agent is without evaluating anything.
    pub fn place_agent(&mut self, position: Vec3) {
        self.agent_position = Some(position);
    }

    pub fn agent_position(&self) -> Option<Vec3> {
        self.agent_position
    }

    pub fn thresholds(&self) -> &TrackerThresholds {
        &self.thresholds
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn destination(&self) -> Option<&Destination> {
        self.active.as_ref().map(|a| &a.destination)
    }

    pub fn optimal_length(&self) -> Option<f32> {
        self.active.as_ref().map(|a| a.optimal_length)
    }

    pub fn is_off_path(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.off_path)
    }

    /// Display-only estimate; never used for arrival or deviation.
    pub fn remaining_distance(&self) -> f32 {
        self.remaining_distance
    }

    pub fn total_distance(&self) -> f32 {
        self.total_distance
    }

    /// Waypoints of the most recent query, for the rendering collaborator.
    pub fn current_path(&self) -> &[Vec3] {
        &self.current_path
    }

    /// Start a trip to `target`, or cancel with `None`.
    ///
    /// An active trip is ended as [`TripEnd::Redirected`] before the new one
    /// starts, so the returned signals always close the old trip first.
    ///
    /// # Errors
    ///
    /// [`WayfindError::MissingAgentReference`] if the agent has never been
    /// placed.  Nothing changes in that case.
    pub fn set_destination(
        &mut self,
        target: Option<Destination>,
    ) -> Result<Vec<RouteSignal>, WayfindError> {
        let Some(destination) = target else {
            info!("destination cleared");
            return Ok(self.cancel());
        };
        let Some(origin) = self.agent_position else {
            error!(destination = %destination.name, "no agent position; tracking not started");
            return Err(WayfindError::MissingAgentReference);
        };

        let mut signals = Vec::new();
        if self.active.is_some() {
            signals.extend(self.end_trip(TripEnd::Redirected));
        }

        let result = self.query.query_path(origin, destination.position);
        let optimal = result.length_or_straight(origin, destination.position);
        info!(
            destination = %destination.name,
            position = %destination.position,
            optimal_m = optimal,
            status = ?result.status,
            "new destination"
        );

        self.total_distance = optimal;
        self.remaining_distance = origin.planar_distance(destination.position);
        self.current_path = result.waypoints;
        signals.push(RouteSignal::TripStarted {
            destination: destination.name.clone(),
            optimal_length: optimal,
            origin,
        });
        self.active = Some(ActiveRoute {
            destination,
            optimal_length: optimal,
            off_path: false,
            partial_logged: false,
        });
        Ok(signals)
    }

    /// End the active trip as cancelled.  Idempotent.
    pub fn cancel(&mut self) -> Vec<RouteSignal> {
        self.end_trip(TripEnd::Cancelled)
    }

    fn end_trip(&mut self, cause: TripEnd) -> Vec<RouteSignal> {
        let Some(active) = self.active.take() else {
            return Vec::new();
        };
        self.current_path.clear();
        if cause == TripEnd::Reached {
            self.remaining_distance = 0.0;
        }
        debug!(destination = %active.destination.name, ?cause, "trip ended");
        vec![RouteSignal::TripEnded {
            destination: active.destination.name,
            cause,
        }]
    }

    /// Evaluate one simulation step at `position`.
    pub fn tick(&mut self, position: Vec3) -> Vec<RouteSignal> {
        self.agent_position = Some(position);
        let Some(target) = self.active.as_ref().map(|a| a.destination.position) else {
            return Vec::new();
        };

        let start = snap_to_surface(self.query.as_ref(), position, &self.thresholds.start_snap_radii);
        let target = snap_to_surface(self.query.as_ref(), target, &self.thresholds.target_snap_radii);
        let result = self.query.query_path(start, target);

        if result.status == PathStatus::Unreachable {
            let mut signals = self.end_trip(TripEnd::Unreachable);
            if let Some(RouteSignal::TripEnded { destination, .. }) = signals.first() {
                error!(destination = %destination, "no route could be computed to destination");
                let destination = destination.clone();
                signals.push(RouteSignal::PathUnavailable { destination });
            }
            return signals;
        }

        let planar = position.planar_distance(target);
        if planar < self.thresholds.arrival_radius {
            info!(distance_m = planar, "destination reached");
            return self.end_trip(TripEnd::Reached);
        }

        let mut signals = Vec::new();
        let Some(active) = self.active.as_mut() else {
            return signals;
        };

        if let Some(min_distance) = result.min_distance_to(position) {
            if min_distance > self.thresholds.off_path && !active.off_path {
                active.off_path = true;
                signals.push(RouteSignal::Deviation { min_distance });
            } else if min_distance < self.thresholds.recovery && active.off_path {
                debug!(min_distance, "back on path");
                active.off_path = false;
            }
        }

        if result.status == PathStatus::Partial
            && !active.partial_logged
            && let Some(gap_m) = result.end_gap(target)
            && gap_m > self.thresholds.partial_gap
        {
            warn!(
                destination = %active.destination.name,
                gap_m,
                "partial path: destination lies beyond the navigable area"
            );
            active.partial_logged = true;
            signals.push(RouteSignal::PartialPath {
                destination: active.destination.name.clone(),
                gap_m,
            });
        }

        self.remaining_distance = if result.status == PathStatus::Complete && result.waypoints.len() >= 2 {
            result.length()
        } else {
            planar
        };
        self.current_path = result.waypoints;
        signals
    }
}
