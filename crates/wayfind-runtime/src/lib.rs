//! `wayfind-runtime` – The tracking core.
//!
//! Runs once per simulation tick: re-queries the route, detects arrival and
//! deviation, accumulates the trip's behavioural metrics and hands the frozen
//! record to the session controller exactly once.
//!
//! # Modules
//!
//! - [`route_tracker`] – [`RouteTracker`][route_tracker::RouteTracker]:
//!   optimal-length computation, per-tick arrival test, deviation hysteresis,
//!   partial-path warning and remaining-distance estimate.
//! - [`metrics_recorder`] – [`MetricsRecorder`][metrics_recorder::MetricsRecorder]:
//!   time/distance accumulation with a jitter floor, event counters and
//!   finalisation into an immutable [`TripMetrics`][wayfind_types::TripMetrics].
//! - [`wrong_destination`] – [`WrongDestinationDetector`][wrong_destination::WrongDestinationDetector]:
//!   one error per trip when the agent wanders up to the other area.
//! - [`navigation_loop`] – [`NavigationLoop`][navigation_loop::NavigationLoop]:
//!   the top-level context that owns all of the above plus the session
//!   controller, event bus and journal, and drives them in a fixed order.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   global `tracing` subscriber with an optional OTLP span exporter.

pub mod metrics_recorder;
pub mod navigation_loop;
pub mod route_tracker;
pub mod telemetry;
pub mod wrong_destination;

pub use metrics_recorder::{route_match_percent, MetricsRecorder, TripProgress};
pub use navigation_loop::{NavigationConfig, NavigationLoop, NavigationView};
pub use route_tracker::{RouteSignal, RouteTracker, TrackerThresholds};
pub use telemetry::{init_tracing, TracerProviderGuard};
pub use wrong_destination::WrongDestinationDetector;
