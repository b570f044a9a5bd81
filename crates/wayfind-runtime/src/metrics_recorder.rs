//! [`MetricsRecorder`] – per-trip behavioural metrics.
//!
//! At most one trip is open at a time.  While open, [`tick`][MetricsRecorder::tick]
//! accumulates elapsed time unconditionally and planar distance whenever the
//! agent moved further than the jitter floor since the last sampled position.
//! Distance only ever grows: backtracking adds to it.
//!
//! [`finalize`][MetricsRecorder::finalize] closes the trip and returns the
//! frozen [`TripMetrics`]; calling it again returns `None`, which is what
//! makes emission exactly-once.
//!
//! # Example
//!
//! ```rust
//! use wayfind_runtime::metrics_recorder::MetricsRecorder;
//! use wayfind_types::Vec3;
//!
//! let mut recorder = MetricsRecorder::new(0.01);
//! recorder.start_trip("Recepcion", 10.0, Vec3::zero());
//! recorder.tick(1.0, Vec3::new(12.5, 0.0, 0.0));
//!
//! let metrics = recorder.finalize(true).unwrap();
//! assert!((metrics.route_match_percent - 80.0).abs() < 1e-3);
//! assert!(recorder.finalize(true).is_none());
//! ```

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;
use wayfind_types::{TripMetrics, Vec3};

/// Default minimum per-tick movement counted as travel, in metres.
pub const DEFAULT_JITTER_FLOOR: f32 = 0.01;

/// Route-match percentage: `clamp(optimal / traveled * 100, 0, 100)` when
/// both are positive, otherwise 100 if reached and 0 if not.
pub fn route_match_percent(optimal: f32, traveled: f32, reached: bool) -> f32 {
    if optimal > 0.0 && traveled > 0.0 {
        (optimal / traveled * 100.0).clamp(0.0, 100.0)
    } else if reached {
        100.0
    } else {
        0.0
    }
}

/// Live view of the open trip.
#[derive(Debug, Clone, PartialEq)]
pub struct TripProgress {
    pub trip_id: Uuid,
    pub destination_name: String,
    pub optimal_length_m: f32,
    pub time_seconds: f32,
    pub distance_meters: f32,
    pub deviation_count: u32,
    pub error_count: u32,
    pub help_interventions: u32,
}

#[derive(Debug)]
struct OpenTrip {
    trip_id: Uuid,
    destination_name: String,
    optimal_length: f32,
    time_seconds: f32,
    distance: f32,
    deviations: u32,
    errors: u32,
    help_interventions: u32,
    last_position: Vec3,
    started_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct MetricsRecorder {
    jitter_floor: f32,
    open: Option<OpenTrip>,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_JITTER_FLOOR)
    }
}

impl MetricsRecorder {
    pub fn new(jitter_floor: f32) -> Self {
        Self {
            jitter_floor,
            open: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Open a new trip with zeroed counters.
    ///
    /// Returns the id of the new trip and, if a trip was still open, its
    /// metrics finalised as not reached.  The caller must emit those.
    pub fn start_trip(
        &mut self,
        destination_name: impl Into<String>,
        optimal_length: f32,
        origin: Vec3,
    ) -> (Uuid, Option<TripMetrics>) {
        let superseded = self.finalize(false);
        let trip = OpenTrip {
            trip_id: Uuid::new_v4(),
            destination_name: destination_name.into(),
            optimal_length,
            time_seconds: 0.0,
            distance: 0.0,
            deviations: 0,
            errors: 0,
            help_interventions: 0,
            last_position: origin,
            started_at: Utc::now(),
        };
        info!(
            trip_id = %trip.trip_id,
            destination = %trip.destination_name,
            optimal_m = optimal_length,
            "trip recording started"
        );
        let trip_id = trip.trip_id;
        self.open = Some(trip);
        (trip_id, superseded)
    }

    /// Accumulate `delta_seconds` and the planar movement since the last
    /// sampled position.  No-op without an open trip.
    pub fn tick(&mut self, delta_seconds: f32, position: Vec3) {
        let Some(trip) = self.open.as_mut() else {
            return;
        };
        trip.time_seconds += delta_seconds.max(0.0);
        let moved = trip.last_position.planar_distance(position);
        if moved > self.jitter_floor {
            trip.distance += moved;
            trip.last_position = position;
        }
    }

    /// Count one deviation; returns the new total, or `None` without an open
    /// trip.
    pub fn record_deviation(&mut self) -> Option<u32> {
        let trip = self.open.as_mut()?;
        trip.deviations += 1;
        info!(total = trip.deviations, destination = %trip.destination_name, "route deviation");
        Some(trip.deviations)
    }

    pub fn record_error(&mut self) -> Option<u32> {
        let trip = self.open.as_mut()?;
        trip.errors += 1;
        info!(total = trip.errors, destination = %trip.destination_name, "route error");
        Some(trip.errors)
    }

    pub fn record_help_intervention(&mut self) -> Option<u32> {
        let trip = self.open.as_mut()?;
        trip.help_interventions += 1;
        info!(
            total = trip.help_interventions,
            destination = %trip.destination_name,
            "help intervention"
        );
        Some(trip.help_interventions)
    }

    pub fn progress(&self) -> Option<TripProgress> {
        self.open.as_ref().map(|t| TripProgress {
            trip_id: t.trip_id,
            destination_name: t.destination_name.clone(),
            optimal_length_m: t.optimal_length,
            time_seconds: t.time_seconds,
            distance_meters: t.distance,
            deviation_count: t.deviations,
            error_count: t.errors,
            help_interventions: t.help_interventions,
        })
    }

    /// Close the open trip and freeze its metrics.  `None` when no trip is
    /// open.
    pub fn finalize(&mut self, reached: bool) -> Option<TripMetrics> {
        let Some(trip) = self.open.take() else {
            debug!("finalize without an open trip ignored");
            return None;
        };
        let metrics = TripMetrics {
            trip_id: trip.trip_id,
            destination_name: trip.destination_name,
            optimal_length_m: trip.optimal_length,
            time_seconds: trip.time_seconds,
            distance_meters: trip.distance,
            deviation_count: trip.deviations,
            error_count: trip.errors,
            help_interventions: trip.help_interventions,
            route_match_percent: route_match_percent(trip.optimal_length, trip.distance, reached),
            reached_destination: reached,
            independent_trip: trip.help_interventions == 0,
            started_at: trip.started_at,
            finished_at: Utc::now(),
        };
        info!(
            trip_id = %metrics.trip_id,
            destination = %metrics.destination_name,
            time_s = metrics.time_seconds,
            distance_m = metrics.distance_meters,
            optimal_m = metrics.optimal_length_m,
            route_match = metrics.route_match_percent,
            deviations = metrics.deviation_count,
            errors = metrics.error_count,
            help = metrics.help_interventions,
            reached,
            "trip finished"
        );
        Some(metrics)
    }
}
