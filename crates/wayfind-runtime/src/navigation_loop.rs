//! [`NavigationLoop`] – the single top-level context of a study run.
//!
//! Owns the route tracker, the metrics recorder, the wrong-destination
//! detector, the session controller, the event bus and (optionally) the trip
//! journal, and drives them in a fixed order on every tick:
//!
//! 1. **Session** – fold in registration/persistence completions and publish
//!    them on [`Topic::Session`].
//! 2. **Accumulate** – advance the open trip's time and distance.
//! 3. **Track** – re-query the route; arrival, then deviation, then the
//!    partial-path warning.  Terminal signals finalise the trip here, before
//!    anything else can start a new one.
//! 4. **Errors** – one wrong-destination error per recorded trip.
//!
//! Admin sessions get paths, arrival notifications and the live view, but
//! the recorder is never started for them, so nothing is ever emitted.
//!
//! # Example
//!
//! ```rust
//! use wayfind_middleware::{EventBus, dispatcher::dispatch_channel};
//! use wayfind_runtime::navigation_loop::{NavigationConfig, NavigationLoop};
//! use wayfind_session::SessionController;
//! use wayfind_spatial::sim::StraightLineOracle;
//! use wayfind_types::{Destination, Group, Vec3};
//!
//! let (handle, _inbox) = dispatch_channel();
//! let config = NavigationConfig {
//!     destinations: vec![Destination::new("Recepcion", Vec3::new(10.0, 0.0, 0.0))],
//!     ..NavigationConfig::default()
//! };
//! let mut nav = NavigationLoop::new(
//!     config,
//!     Box::new(StraightLineOracle),
//!     SessionController::new(handle, "ADMIN2026"),
//!     EventBus::default(),
//! );
//!
//! nav.login("ADMIN2026", Group::Control).unwrap();
//! nav.place_agent(Vec3::zero());
//! nav.set_destination(Some("Recepcion")).unwrap();
//! assert!(!nav.view().tracking);
//! ```

use tracing::{debug, info, warn};
use wayfind_memory::journal::TripJournal;
use wayfind_middleware::{EventBus, Topic};
use wayfind_session::{EmitOutcome, LoginProgress, SessionController, SessionState, SessionUpdate};
use wayfind_spatial::PathQuery;
use wayfind_types::{
    Destination, Event, EventPayload, Group, Phase, TripMetrics, Vec3, WayfindError,
};

use crate::metrics_recorder::{DEFAULT_JITTER_FLOOR, MetricsRecorder, TripProgress};
use crate::route_tracker::{RouteSignal, RouteTracker, TrackerThresholds};
use crate::wrong_destination::{self, WrongDestinationDetector};

const EVENT_SOURCE: &str = "wayfind-runtime::navigation_loop";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NavigationConfig {
    pub thresholds: TrackerThresholds,
    /// Minimum per-tick movement counted as travel, in metres.
    pub jitter_floor: f32,
    pub wrong_destination_radius: f32,
    /// Assumed walking pace for the ETA shown in the live view.
    pub eta_speed_mps: f32,
    /// Named targets selectable with [`NavigationLoop::set_destination`].
    pub destinations: Vec<Destination>,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            thresholds: TrackerThresholds::default(),
            jitter_floor: DEFAULT_JITTER_FLOOR,
            wrong_destination_radius: wrong_destination::DEFAULT_RADIUS,
            eta_speed_mps: 1.5,
            destinations: Vec::new(),
        }
    }
}

/// Read-only snapshot polled by the UI once per refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationView {
    pub destination: String,
    pub remaining_m: f32,
    pub total_m: f32,
    /// `1 - remaining / total`, clamped to `[0, 1]`.
    pub progress: f32,
    pub eta_seconds: Option<f32>,
    /// A trip is being recorded.
    pub tracking: bool,
    pub off_path: bool,
    pub aids_visible: bool,
    pub path: Vec<Vec3>,
}

// ─────────────────────────────────────────────────────────────────────────────
// NavigationLoop
// ─────────────────────────────────────────────────────────────────────────────

pub struct NavigationLoop {
    tracker: RouteTracker,
    recorder: MetricsRecorder,
    detector: WrongDestinationDetector,
    session: SessionController,
    bus: EventBus,
    journal: Option<TripJournal>,
    destinations: Vec<Destination>,
    eta_speed_mps: f32,
}

impl NavigationLoop {
    pub fn new(
        config: NavigationConfig,
        query: Box<dyn PathQuery>,
        session: SessionController,
        bus: EventBus,
    ) -> Self {
        Self {
            tracker: RouteTracker::new(query, config.thresholds),
            recorder: MetricsRecorder::new(config.jitter_floor),
            detector: WrongDestinationDetector::new(config.wrong_destination_radius),
            session,
            bus,
            journal: None,
            destinations: config.destinations,
            eta_speed_mps: config.eta_speed_mps,
        }
    }

    /// Also append every emitted trip to `journal`.
    pub fn with_journal(mut self, journal: TripJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn journal(&self) -> Option<&TripJournal> {
        self.journal.as_ref()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionController {
        &mut self.session
    }

    pub fn destinations(&self) -> &[Destination] {
        &self.destinations
    }

    pub fn agent_position(&self) -> Option<Vec3> {
        self.tracker.agent_position()
    }

    /// A destination is set, whether or not the trip is being recorded.
    pub fn route_active(&self) -> bool {
        self.tracker.is_active()
    }

    pub fn trip_progress(&self) -> Option<TripProgress> {
        self.recorder.progress()
    }

    /// Bind the agent position source before the first destination is set.
    pub fn place_agent(&mut self, position: Vec3) {
        self.tracker.place_agent(position);
    }

    // ── Commands ────────────────────────────────────────────────────────────

    /// Start a session for `participant_id`.
    ///
    /// A trip still being recorded belongs to the current identity, so it is
    /// cancelled and emitted before the identity changes.  A login the session
    /// would refuse anyway leaves the trip running.
    pub fn login(&mut self, participant_id: &str, group: Group) -> Result<LoginProgress, WayfindError> {
        if self.recorder.is_open() {
            if participant_id.trim().is_empty() {
                return Err(WayfindError::EmptyParticipantId);
            }
            if matches!(self.session.state(), SessionState::Registering { .. }) {
                return Err(WayfindError::RegistrationInFlight);
            }
            info!(participant_id = participant_id.trim(), "login during a recorded trip; closing it first");
            self.cancel();
        }
        self.session.login(participant_id, group)
    }

    pub fn set_phase(&mut self, value: &str) -> Result<Phase, WayfindError> {
        self.session.set_phase(value)
    }

    /// Start a trip to the named catalog destination, or cancel with `None`.
    ///
    /// Names match case-insensitively.  An unknown name or a missing agent
    /// position leaves the active trip untouched.
    pub fn set_destination(&mut self, name: Option<&str>) -> Result<(), WayfindError> {
        let target = match name {
            Some(name) => Some(self.lookup(name)?.clone()),
            None => None,
        };
        let signals = self.tracker.set_destination(target)?;
        self.apply_signals(signals);
        Ok(())
    }

    pub fn cancel(&mut self) {
        let signals = self.tracker.cancel();
        self.apply_signals(signals);
    }

    /// Count a help intervention (e.g. the map menu was opened) against the
    /// recorded trip.  `None` when nothing is being recorded.
    pub fn record_help_intervention(&mut self) -> Option<u32> {
        let total = self.recorder.record_help_intervention()?;
        self.publish(Topic::Metrics, EventPayload::HelpIntervention { total });
        Some(total)
    }

    fn lookup(&self, name: &str) -> Result<&Destination, WayfindError> {
        self.destinations
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| WayfindError::UnknownDestination(name.to_string()))
    }

    // ── Tick ────────────────────────────────────────────────────────────────

    /// Advance one simulation step with the agent at `position`.
    pub fn tick(&mut self, position: Vec3, delta_seconds: f32) {
        self.pump_session();
        self.recorder.tick(delta_seconds, position);

        let signals = self.tracker.tick(position);
        self.apply_signals(signals);

        if !self.recorder.is_open() {
            return;
        }
        let Some(intended) = self.tracker.destination().map(|d| d.name.clone()) else {
            return;
        };
        if let Some(nearby) = self.detector.check(&intended, position, &self.destinations)
            && self.recorder.record_error().is_some()
        {
            self.publish(Topic::Metrics, EventPayload::WrongDestination { intended, nearby });
        }
    }

    /// Fold in session completions without advancing the simulation.
    pub fn pump_session(&mut self) {
        for update in self.session.poll() {
            let payload = match update {
                SessionUpdate::Registered { handle } => EventPayload::Registered { handle },
                SessionUpdate::Duplicate { participant_id } => EventPayload::RegistrationRejected {
                    reason: WayfindError::DuplicateRegistration(participant_id),
                },
                SessionUpdate::Failed { reason } => EventPayload::RegistrationRejected { reason },
                SessionUpdate::Persisted { trip_id } => EventPayload::RecordPersisted { trip_id },
                SessionUpdate::PersistFailed { trip_id, reason } => EventPayload::PersistenceFailed {
                    trip_id,
                    reason: reason.to_string(),
                },
                SessionUpdate::RecordsDiscarded { count } => EventPayload::RecordsDiscarded { count },
            };
            self.publish(Topic::Session, payload);
        }
    }

    fn apply_signals(&mut self, signals: Vec<RouteSignal>) {
        for signal in signals {
            match signal {
                RouteSignal::TripStarted {
                    destination,
                    optimal_length,
                    origin,
                } => {
                    self.detector.reset();
                    if !self.session.tracking_allowed() {
                        debug!(destination = %destination, "no recording session; trip not recorded");
                        continue;
                    }
                    let (trip_id, superseded) =
                        self.recorder.start_trip(destination.clone(), optimal_length, origin);
                    if let Some(metrics) = superseded {
                        self.emit(metrics);
                    }
                    self.publish(
                        Topic::Navigation,
                        EventPayload::TripStarted {
                            trip_id,
                            destination,
                            optimal_length_m: optimal_length,
                        },
                    );
                }
                RouteSignal::TripEnded { destination, cause } => {
                    if let Some(metrics) = self.recorder.finalize(cause.reached()) {
                        self.emit(metrics);
                    }
                    self.publish(
                        Topic::Navigation,
                        EventPayload::TripEnded {
                            destination: destination.clone(),
                            cause,
                        },
                    );
                    if cause.reached() {
                        self.publish(Topic::Navigation, EventPayload::DestinationReached { destination });
                    }
                }
                RouteSignal::Deviation { min_distance } => {
                    if let Some(total) = self.recorder.record_deviation() {
                        debug!(min_distance, total, "deviation counted");
                        self.publish(Topic::Metrics, EventPayload::DeviationRecorded { total });
                    }
                }
                RouteSignal::PartialPath { destination, gap_m } => {
                    self.publish(Topic::Diagnostics, EventPayload::PartialPath { destination, gap_m });
                }
                RouteSignal::PathUnavailable { destination } => {
                    self.publish(Topic::Diagnostics, EventPayload::PathUnavailable { destination });
                }
            }
        }
    }

    /// Hand a frozen trip to the session controller and the journal.
    fn emit(&mut self, metrics: TripMetrics) {
        let outcome = self.session.submit(metrics.clone());
        if outcome == EmitOutcome::Suppressed {
            return;
        }
        info!(trip_id = %metrics.trip_id, ?outcome, "trip metrics emitted");

        if let Some(journal) = &self.journal
            && let Err(e) = journal.append(self.session.participant_id(), self.session.phase(), &metrics)
        {
            warn!(trip_id = %metrics.trip_id, error = %e, "trip could not be journaled");
        }
        self.publish(Topic::Metrics, EventPayload::MetricsEmitted(metrics));
    }

    fn publish(&self, topic: Topic, payload: EventPayload) {
        if let Err(e) = self.bus.publish_to(topic, Event::new(EVENT_SOURCE, payload)) {
            warn!(?topic, error = %e, "event not published");
        }
    }

    // ── View ────────────────────────────────────────────────────────────────

    pub fn view(&self) -> NavigationView {
        let remaining_m = self.tracker.remaining_distance();
        let total_m = self.tracker.total_distance();
        let active = self.tracker.is_active();

        let progress = if active && total_m > 0.0 {
            (1.0 - remaining_m / total_m).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let eta_seconds = (active
            && self.eta_speed_mps > 0.0
            && remaining_m > self.tracker.thresholds().arrival_radius)
            .then(|| remaining_m / self.eta_speed_mps);

        NavigationView {
            destination: self
                .tracker
                .destination()
                .map_or_else(|| "no destination".to_string(), |d| d.name.clone()),
            remaining_m,
            total_m,
            progress,
            eta_seconds,
            tracking: self.recorder.is_open(),
            off_path: self.tracker.is_off_path(),
            aids_visible: self.session.aids_visible(),
            path: self.tracker.current_path().to_vec(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
